//! Durable cross-actor notifications, the audit trail and read receipts.

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::db::{
    AuditEntry, Backend, JsonLog, NotificationEvent, Stage, AUDIT_KEY, NOTIFICATIONS_KEY,
    RECEIPTS_KEY,
};
use crate::error::StoreError;
use crate::storage::generate_notification_id;

/// Appends events for a delivery collaborator. Events are never edited.
#[derive(Debug, Clone)]
pub struct Notifier {
    log: JsonLog<NotificationEvent>,
}

impl Notifier {
    pub fn new(backend: Arc<Backend>) -> Self {
        Self {
            log: JsonLog::new(backend, NOTIFICATIONS_KEY),
        }
    }

    pub async fn emit(
        &self,
        target_user: &str,
        filename: &str,
        target_stage: Stage,
        message: impl Into<String>,
    ) -> Result<NotificationEvent, StoreError> {
        let event = NotificationEvent {
            id: generate_notification_id(),
            filename: filename.to_string(),
            target_user: target_user.to_string(),
            target_stage,
            time: Utc::now().timestamp_millis(),
            message: message.into(),
        };
        self.log.append(&event).await?;
        info!(
            id = %event.id,
            target = %event.target_user,
            filename = %event.filename,
            "Notification emitted"
        );
        Ok(event)
    }

    pub async fn all(&self) -> Result<Vec<NotificationEvent>, StoreError> {
        self.log.entries().await
    }

    pub async fn for_user(&self, user: &str) -> Result<Vec<NotificationEvent>, StoreError> {
        let mut events = self.log.entries().await?;
        events.retain(|e| e.target_user.eq_ignore_ascii_case(user));
        Ok(events)
    }

    /// Events per target user.
    pub async fn counts(&self) -> Result<BTreeMap<String, usize>, StoreError> {
        let mut counts = BTreeMap::new();
        for event in self.log.entries().await? {
            *counts.entry(event.target_user).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

#[derive(Debug, Clone)]
pub struct AuditLog {
    log: JsonLog<AuditEntry>,
}

impl AuditLog {
    pub fn new(backend: Arc<Backend>) -> Self {
        Self {
            log: JsonLog::new(backend, AUDIT_KEY),
        }
    }

    pub async fn record(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        self.log.append(entry).await?;
        debug!(user = %entry.user, action = ?entry.action, filename = %entry.filename, "Audit entry");
        Ok(())
    }

    pub async fn entries(&self) -> Result<Vec<AuditEntry>, StoreError> {
        self.log.entries().await
    }
}

/// Which files have been opened at least once.
#[derive(Debug)]
pub struct Receipts {
    backend: Arc<Backend>,
    lock: Mutex<()>,
}

impl Receipts {
    pub fn new(backend: Arc<Backend>) -> Self {
        Self {
            backend,
            lock: Mutex::new(()),
        }
    }

    pub async fn all(&self) -> Result<BTreeMap<String, bool>, StoreError> {
        let Some(raw) = self.backend.get(RECEIPTS_KEY).await? else {
            return Ok(BTreeMap::new());
        };
        match serde_json::from_str(&raw) {
            Ok(map) => Ok(map),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable receipts");
                Ok(BTreeMap::new())
            }
        }
    }

    /// Returns `true` the first time a file is marked.
    pub async fn mark(&self, filename: &str) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().await;
        let mut receipts = self.all().await?;
        if receipts.get(filename).copied().unwrap_or(false) {
            return Ok(false);
        }
        receipts.insert(filename.to_string(), true);
        self.backend
            .put(RECEIPTS_KEY, serde_json::to_string(&receipts)?)
            .await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{AuditAction, FileBackend};

    fn backend(dir: &std::path::Path) -> Arc<Backend> {
        Arc::new(Backend::File(FileBackend::new(dir)))
    }

    #[tokio::test]
    async fn emitted_events_are_listed_per_user() {
        let temp = tempfile::tempdir().unwrap();
        let notifier = Notifier::new(backend(temp.path()));

        let event = notifier
            .emit("alice_lee", "alice_lee_Stage2.pdf", Stage::Stage0, "sent back")
            .await
            .unwrap();
        assert!(event.id.starts_with("notification_"));
        notifier
            .emit("marian", "bob_ray_Stage2.pdf", Stage::Stage2, "returned")
            .await
            .unwrap();

        let mine = notifier.for_user("alice_lee").await.unwrap();
        assert_eq!(mine, vec![event]);

        let counts = notifier.counts().await.unwrap();
        assert_eq!(counts.get("alice_lee"), Some(&1));
        assert_eq!(counts.get("marian"), Some(&1));
    }

    #[tokio::test]
    async fn audit_entries_append_in_order() {
        let temp = tempfile::tempdir().unwrap();
        let audit = AuditLog::new(backend(temp.path()));
        for (time, action) in [(1, AuditAction::Approved), (2, AuditAction::SentBack)] {
            audit
                .record(&AuditEntry {
                    time,
                    user: "marian".into(),
                    action,
                    stage: None,
                    filename: "a_b_Stage2.pdf".into(),
                    notes: String::new(),
                })
                .await
                .unwrap();
        }
        let actions: Vec<_> = audit.entries().await.unwrap().iter().map(|e| e.action).collect();
        assert_eq!(actions, vec![AuditAction::Approved, AuditAction::SentBack]);
    }

    #[tokio::test]
    async fn receipts_mark_once() {
        let temp = tempfile::tempdir().unwrap();
        let receipts = Receipts::new(backend(temp.path()));
        assert!(receipts.mark("a_b_Stage1.pdf").await.unwrap());
        assert!(!receipts.mark("a_b_Stage1.pdf").await.unwrap());
        assert_eq!(receipts.all().await.unwrap().len(), 1);
    }
}
