use crate::config::Config;
use crate::db::Backend;
use crate::prefs::PreferenceStore;
use crate::store::SubmissionStore;
use crate::sync::Sessions;
use crate::workflow::WorkflowEngine;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SubmissionStore>,
    pub engine: Arc<WorkflowEngine>,
    pub prefs: PreferenceStore,
    pub sessions: Arc<Sessions>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(backend: Arc<Backend>, config: Config) -> Self {
        let store = Arc::new(SubmissionStore::new(backend.clone()));
        Self {
            engine: Arc::new(WorkflowEngine::new(store.clone(), config.max_upload_mb)),
            prefs: PreferenceStore::new(backend),
            sessions: Arc::new(Sessions::new(store.clone(), config.sync_interval)),
            store,
            config: Arc::new(config),
        }
    }
}
