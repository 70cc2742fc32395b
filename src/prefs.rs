use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::db::{preferences_key, Backend};
use crate::error::StoreError;
use crate::workflow::projection::ViewFilter;

/// Per-actor settings, stored under `preferences_<actor>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorPreferences {
    /// Ask before approving or re-sending. Send-back always asks.
    #[serde(default)]
    pub confirm_actions: bool,
    /// Filter applied to views when a request brings none of its own.
    #[serde(default)]
    pub filter: ViewFilter,
}

#[derive(Debug, Clone)]
pub struct PreferenceStore {
    backend: Arc<Backend>,
}

impl PreferenceStore {
    pub fn new(backend: Arc<Backend>) -> Self {
        Self { backend }
    }

    pub async fn get(&self, actor: &str) -> Result<ActorPreferences, StoreError> {
        let Some(raw) = self.backend.get(&preferences_key(actor)).await? else {
            return Ok(ActorPreferences::default());
        };
        Ok(serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(actor, error = %e, "Unreadable preferences, using defaults");
            ActorPreferences::default()
        }))
    }

    pub async fn save(&self, actor: &str, prefs: &ActorPreferences) -> Result<(), StoreError> {
        let text = serde_json::to_string(prefs)?;
        self.backend.put(&preferences_key(actor), text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::FileBackend;

    #[tokio::test]
    async fn missing_or_corrupt_preferences_default() {
        let temp = tempfile::tempdir().unwrap();
        let backend = Arc::new(Backend::File(FileBackend::new(temp.path())));
        let prefs = PreferenceStore::new(backend.clone());

        assert_eq!(prefs.get("marian").await.unwrap(), ActorPreferences::default());

        backend
            .put(&preferences_key("marian"), "{oops".into())
            .await
            .unwrap();
        assert_eq!(prefs.get("marian").await.unwrap(), ActorPreferences::default());
    }

    #[tokio::test]
    async fn saved_preferences_are_per_actor() {
        let temp = tempfile::tempdir().unwrap();
        let prefs = PreferenceStore::new(Arc::new(Backend::File(FileBackend::new(temp.path()))));

        let mut mine = ActorPreferences {
            confirm_actions: true,
            ..Default::default()
        };
        mine.filter.user = Some("alice".into());
        prefs.save("marian", &mine).await.unwrap();

        assert_eq!(prefs.get("marian").await.unwrap(), mine);
        assert!(!prefs.get("rhea").await.unwrap().confirm_actions);
    }
}
