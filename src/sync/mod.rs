//! Keeps each logged-in actor's picture of the shared store fresh.
//!
//! A poller re-reads the store on a fixed interval and publishes through a
//! watch channel only when the current view actually changed, so subscribers
//! wake on changes written by any session or process. Every publish bumps a
//! generation counter that clients can compare cheaply.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::db::Submission;
use crate::error::StoreError;
use crate::store::SubmissionStore;

pub type Snapshot = Arc<Vec<Submission>>;

#[derive(Debug)]
pub struct SyncPoller {
    snapshot: watch::Receiver<Snapshot>,
    generation: Arc<AtomicU64>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SyncPoller {
    /// Loads once before returning, then keeps polling in the background.
    pub async fn start(store: Arc<SubmissionStore>, every: Duration) -> Result<Self, StoreError> {
        let initial = store.current().await?;
        let (tx, rx) = watch::channel(Arc::new(initial));
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let generation = Arc::new(AtomicU64::new(0));
        let bump = generation.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately and the eager load covered it.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match store.current().await {
                            Ok(records) => {
                                let changed = tx.send_if_modified(|current| {
                                    if current.as_slice() == records.as_slice() {
                                        false
                                    } else {
                                        *current = Arc::new(records);
                                        // Bumped under the channel's write lock, before receivers wake.
                                        bump.fetch_add(1, Ordering::Release);
                                        true
                                    }
                                });
                                if changed {
                                    debug!("Store changed, snapshot published");
                                }
                            }
                            Err(e) => warn!(error = %e, "Sync poll failed"),
                        }
                    }
                    _ = &mut stop_rx => break,
                }
            }
            debug!("Sync poller stopped");
        });

        Ok(Self {
            snapshot: rx,
            generation,
            shutdown: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    /// Number of snapshots published since start. Goes up by one for every
    /// change, including edits that leave record versions alone.
    pub fn version(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Snapshot and generation read together.
    pub fn current(&self) -> (Snapshot, u64) {
        let snapshot = self.snapshot.borrow();
        (snapshot.clone(), self.generation.load(Ordering::Acquire))
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.clone()
    }

    /// Cancels the timer and waits for the task to finish.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for SyncPoller {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// One poller per logged-in actor.
#[derive(Debug)]
pub struct Sessions {
    store: Arc<SubmissionStore>,
    every: Duration,
    active: Mutex<HashMap<String, SyncPoller>>,
}

impl Sessions {
    pub fn new(store: Arc<SubmissionStore>, every: Duration) -> Self {
        Self {
            store,
            every,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Starts polling for `actor`. Logging in twice keeps the running poller.
    pub async fn login(&self, actor: &str) -> Result<(Snapshot, u64), StoreError> {
        let mut active = self.active.lock().await;
        if let Some(poller) = active.get(actor) {
            return Ok(poller.current());
        }
        let poller = SyncPoller::start(self.store.clone(), self.every).await?;
        let current = poller.current();
        active.insert(actor.to_string(), poller);
        info!(actor, sessions = active.len(), "Session started");
        Ok(current)
    }

    /// Returns `false` when the actor had no session.
    pub async fn logout(&self, actor: &str) -> bool {
        let poller = self.active.lock().await.remove(actor);
        match poller {
            Some(poller) => {
                poller.stop().await;
                info!(actor, "Session ended");
                true
            }
            None => false,
        }
    }

    pub async fn snapshot(&self, actor: &str) -> Option<Snapshot> {
        self.active.lock().await.get(actor).map(SyncPoller::snapshot)
    }

    pub async fn current(&self, actor: &str) -> Option<(Snapshot, u64)> {
        self.active.lock().await.get(actor).map(SyncPoller::current)
    }

    pub async fn count(&self) -> usize {
        self.active.lock().await.len()
    }

    pub async fn shutdown_all(&self) {
        let pollers: Vec<_> = self.active.lock().await.drain().collect();
        let count = pollers.len();
        for (_, poller) in pollers {
            poller.stop().await;
        }
        info!(sessions = count, "All sessions stopped");
    }
}
