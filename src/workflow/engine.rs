//! Applies planned transitions against the shared store and fans out the
//! side effects (notification, audit entry) once the new version is durable.

use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use super::identity::{base_identity, submission_filename};
use super::projection::is_resolved_history;
use super::sanitize::sanitize_notes;
use super::transitions::{self, NotificationDraft, Transition};
use crate::db::{Actor, AuditAction, AuditEntry, NotificationEvent, Role, Stage, Submission};
use crate::error::{WorkflowError, WorkflowResult};
use crate::notify::{AuditLog, Notifier, Receipts};
use crate::prefs::ActorPreferences;
use crate::store::{apply_upsert, current_index, current_view, next_version, SubmissionStore};

const CLEAR_HISTORY_PROMPT: &str = "Clear all documents you have sent to final review?";

#[derive(Debug)]
pub struct TransitionRequest {
    /// Selected file; ignored for student submissions.
    pub filename: Option<String>,
    pub transition: Transition,
    pub confirmed: bool,
    /// `time` the caller last saw. A mismatch is rejected instead of
    /// overwriting a newer version.
    pub expected_version: Option<i64>,
}

impl TransitionRequest {
    pub fn new(filename: Option<String>, transition: Transition) -> Self {
        Self {
            filename,
            transition,
            confirmed: false,
            expected_version: None,
        }
    }

    pub fn confirmed(mut self) -> Self {
        self.confirmed = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Applied(T),
    /// Nothing happened; ask the actor and retry with `confirmed`.
    ConfirmationRequired { prompt: &'static str },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub record: Submission,
    pub notification: Option<NotificationEvent>,
}

#[derive(Debug)]
pub struct WorkflowEngine {
    store: Arc<SubmissionStore>,
    notifier: Notifier,
    audit: AuditLog,
    receipts: Receipts,
    max_upload_mb: u64,
}

impl WorkflowEngine {
    pub fn new(store: Arc<SubmissionStore>, max_upload_mb: u64) -> Self {
        let backend = store.backend().clone();
        Self {
            notifier: Notifier::new(backend.clone()),
            audit: AuditLog::new(backend.clone()),
            receipts: Receipts::new(backend),
            store,
            max_upload_mb,
        }
    }

    pub fn store(&self) -> &Arc<SubmissionStore> {
        &self.store
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn receipts(&self) -> &Receipts {
        &self.receipts
    }

    pub async fn apply(
        &self,
        actor: &Actor,
        prefs: &ActorPreferences,
        request: TransitionRequest,
    ) -> WorkflowResult<Outcome<Applied>> {
        let TransitionRequest {
            filename,
            transition,
            confirmed,
            expected_version,
        } = request;
        let is_submit = matches!(transition, Transition::Submit(_));

        let filename = filename.filter(|f| !f.trim().is_empty());
        if !is_submit && filename.is_none() {
            return Err(WorkflowError::SelectionRequired);
        }
        if let Some(prompt) = transition.confirmation_prompt(prefs.confirm_actions) {
            if !confirmed {
                info!(actor = %actor.name, action = %transition, "Confirmation required");
                return Ok(Outcome::ConfirmationRequired { prompt });
            }
        }

        let name = transition.to_string();
        let now = Utc::now().timestamp_millis();
        let max_upload_mb = self.max_upload_mb;
        let plan = self
            .store
            .mutate(|records| {
                let current = if is_submit {
                    own_current(records, &actor.name)
                } else {
                    let filename = filename.as_deref().unwrap_or_default();
                    Some(locate(records, filename)?)
                };
                if let (Some(expected), Some(current)) = (expected_version, current.as_ref()) {
                    if current.time != expected {
                        return Err(WorkflowError::StaleVersion {
                            filename: current.filename.clone(),
                            expected,
                            actual: current.time,
                        });
                    }
                }

                let version = next_version(records, now);
                let plan =
                    transitions::plan(transition, current.as_ref(), actor, version, max_upload_mb)?;
                apply_upsert(records, plan.record.clone(), &plan.supersede);
                Ok(plan)
            })
            .await?;

        info!(
            actor = %actor.name,
            action = %name,
            filename = %plan.record.filename,
            stage = %plan.record.stage,
            "Transition applied"
        );

        let notification = match plan.notification {
            Some(draft) => self.notify(draft).await,
            None => None,
        };
        self.record_audit(&plan.audit).await;

        Ok(Outcome::Applied(Applied {
            record: plan.record,
            notification,
        }))
    }

    /// Opens a record and marks it received.
    pub async fn select(&self, filename: &str) -> WorkflowResult<Submission> {
        let records = self.store.load().await?;
        let idx = current_index(&records, filename)
            .ok_or_else(|| WorkflowError::NotFound(filename.to_string()))?;
        match self.receipts.mark(filename).await {
            Ok(true) => info!(filename, "Marked as received"),
            Ok(false) => {}
            Err(e) => warn!(filename, error = %e, "Could not record receipt"),
        }
        Ok(records[idx].clone())
    }

    pub async fn set_deadline(
        &self,
        actor: &Actor,
        filename: &str,
        deadline: Option<NaiveDate>,
    ) -> WorkflowResult<Submission> {
        require_staff(actor, "change a deadline")?;
        let record = self
            .store
            .update_record(filename, |r| r.deadline = deadline)
            .await?;
        let notes = deadline.map_or_else(|| "Deadline cleared".to_string(), |d| {
            format!("Deadline set to {}", d)
        });
        self.record_audit(&entry(actor, AuditAction::DeadlineChanged, &record, notes))
            .await;
        Ok(record)
    }

    pub async fn annotate(
        &self,
        actor: &Actor,
        filename: &str,
        notes: &str,
    ) -> WorkflowResult<Submission> {
        require_staff(actor, "edit notes")?;
        let clean = sanitize_notes(notes);
        let record = self
            .store
            .update_record(filename, |r| {
                r.notes = if clean.is_empty() { None } else { Some(clean.clone()) };
            })
            .await?;
        self.record_audit(&entry(actor, AuditAction::NotesChanged, &record, clean))
            .await;
        Ok(record)
    }

    /// Removes the actor's resolved history (documents they sent to final
    /// review). Always asks first.
    pub async fn clear_history(
        &self,
        actor: &Actor,
        confirmed: bool,
    ) -> WorkflowResult<Outcome<Vec<Submission>>> {
        require_staff(actor, "clear history")?;
        if !confirmed {
            return Ok(Outcome::ConfirmationRequired {
                prompt: CLEAR_HISTORY_PROMPT,
            });
        }
        let removed = self
            .store
            .clear_history(&actor.name, is_resolved_history)
            .await?;
        info!(actor = %actor.name, removed = removed.len(), "History cleared");
        self.record_audit(&AuditEntry {
            time: Utc::now().timestamp_millis(),
            user: actor.name.clone(),
            action: AuditAction::HistoryCleared,
            stage: None,
            filename: String::new(),
            notes: format!("{} removed", removed.len()),
        })
        .await;
        Ok(Outcome::Applied(removed))
    }

    async fn notify(&self, draft: NotificationDraft) -> Option<NotificationEvent> {
        match self
            .notifier
            .emit(&draft.target_user, &draft.filename, draft.target_stage, draft.message)
            .await
        {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(target = %draft.target_user, error = %e, "Notification not delivered");
                None
            }
        }
    }

    async fn record_audit(&self, entry: &AuditEntry) {
        if let Err(e) = self.audit.record(entry).await {
            warn!(error = %e, "Audit entry not written");
        }
    }
}

fn require_staff(actor: &Actor, action: &'static str) -> WorkflowResult<()> {
    match actor.role {
        Role::Librarian | Role::Reviewer => Ok(()),
        role => Err(WorkflowError::Forbidden { role, action }),
    }
}

fn entry(actor: &Actor, action: AuditAction, record: &Submission, notes: String) -> AuditEntry {
    AuditEntry {
        time: Utc::now().timestamp_millis(),
        user: actor.name.clone(),
        action,
        stage: Some(record.stage),
        filename: record.filename.clone(),
        notes,
    }
}

/// The current version of `filename`. Naming an older version of a document
/// is a stale selection rather than a missing one.
fn locate(records: &[Submission], filename: &str) -> WorkflowResult<Submission> {
    if let Some(idx) = current_index(records, filename) {
        return Ok(records[idx].clone());
    }
    let base = base_identity(filename);
    let stale = records.iter().find(|r| r.filename == filename);
    let newest = current_view(records)
        .into_iter()
        .find(|r| base_identity(&r.filename) == base);
    match (stale, newest) {
        (Some(old), Some(new)) => Err(WorkflowError::StaleVersion {
            filename: filename.to_string(),
            expected: old.time,
            actual: new.time,
        }),
        _ => Err(WorkflowError::NotFound(filename.to_string())),
    }
}

fn own_current(records: &[Submission], student: &str) -> Option<Submission> {
    let base = base_identity(&submission_filename(student, Stage::Stage1));
    current_view(records)
        .into_iter()
        .find(|r| base_identity(&r.filename) == base)
        .cloned()
}
