//! The canonical, versioned submission set shared by every actor.
//!
//! Each mutation re-reads the persisted set, applies the change to an owned
//! copy and writes the whole set back in a single `put`, so a reader never
//! sees a half-applied change (zero or two current versions of a document).
//! Writers inside this process are serialized; writers in other processes
//! are last-writer-wins.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::db::{Backend, Stage, Submission, SUBMISSIONS_KEY};
use crate::error::{StoreError, WorkflowError, WorkflowResult};
use crate::storage::{encode_payload, normalize_all};
use crate::workflow::identity::base_identity;

/// Which records a new version replaces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Supersede {
    /// Filename of the version being replaced.
    pub replaced: Option<String>,
    /// Every record of the same identity in one of these stages goes too.
    pub stages: Vec<Stage>,
}

impl Supersede {
    pub fn version(filename: impl Into<String>) -> Self {
        Self {
            replaced: Some(filename.into()),
            stages: Vec::new(),
        }
    }

    pub fn with_stages(mut self, stages: &[Stage]) -> Self {
        self.stages.extend_from_slice(stages);
        self
    }
}

/// Persisted set as read: parsed records plus entries this crate cannot
/// parse, which are written back untouched.
#[derive(Debug, Default)]
struct Ledger {
    records: Vec<Submission>,
    foreign: Vec<Value>,
}

#[derive(Debug)]
pub struct SubmissionStore {
    backend: Arc<Backend>,
    write_lock: Mutex<()>,
}

impl SubmissionStore {
    pub fn new(backend: Arc<Backend>) -> Self {
        Self {
            backend,
            write_lock: Mutex::new(()),
        }
    }

    pub fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }

    /// Every stored version, legacy content already materialized.
    pub async fn load(&self) -> Result<Vec<Submission>, StoreError> {
        Ok(self.read_ledger().await?.records)
    }

    /// Latest version of every document.
    pub async fn current(&self) -> Result<Vec<Submission>, StoreError> {
        let records = self.load().await?;
        Ok(current_view(&records).into_iter().cloned().collect())
    }

    /// Read, change, persist. When `f` fails nothing is written.
    pub async fn mutate<T, F>(&self, f: F) -> WorkflowResult<T>
    where
        F: FnOnce(&mut Vec<Submission>) -> WorkflowResult<T>,
    {
        let _guard = self.write_lock.lock().await;
        let mut ledger = self.read_ledger().await?;
        let out = f(&mut ledger.records)?;
        self.write_ledger(ledger).await?;
        Ok(out)
    }

    pub async fn upsert(
        &self,
        new_version: Submission,
        supersede: &Supersede,
    ) -> WorkflowResult<Submission> {
        self.mutate(|records| {
            apply_upsert(records, new_version.clone(), supersede);
            Ok(new_version)
        })
        .await
    }

    pub async fn replace_all(&self, records: Vec<Submission>) -> WorkflowResult<()> {
        self.mutate(move |current| {
            *current = records;
            Ok(())
        })
        .await
    }

    /// Edits fields of the current version in place, without a new version.
    pub async fn update_record<F>(&self, filename: &str, f: F) -> WorkflowResult<Submission>
    where
        F: FnOnce(&mut Submission),
    {
        self.mutate(|records| {
            let idx = current_index(records, filename)
                .ok_or_else(|| WorkflowError::NotFound(filename.to_string()))?;
            f(&mut records[idx]);
            Ok(records[idx].clone())
        })
        .await
    }

    /// Removes the records `predicate` selects for `actor` and returns them.
    pub async fn clear_history<P>(&self, actor: &str, predicate: P) -> WorkflowResult<Vec<Submission>>
    where
        P: Fn(&Submission, &str) -> bool,
    {
        self.mutate(|records| {
            let (removed, kept): (Vec<_>, Vec<_>) =
                records.drain(..).partition(|r| predicate(r, actor));
            *records = kept;
            Ok(removed)
        })
        .await
    }

    async fn read_ledger(&self) -> Result<Ledger, StoreError> {
        let Some(raw) = self.backend.get(SUBMISSIONS_KEY).await? else {
            return Ok(Ledger::default());
        };
        if raw.trim().is_empty() {
            return Ok(Ledger::default());
        }

        let entries: Vec<Value> = serde_json::from_str(&raw)?;
        let mut ledger = Ledger::default();
        for entry in entries {
            match serde_json::from_value::<Submission>(entry.clone()) {
                Ok(record) => ledger.records.push(record),
                Err(e) => {
                    warn!(error = %e, "Keeping unreadable submission record as-is");
                    ledger.foreign.push(entry);
                }
            }
        }
        ledger.records = normalize_all(ledger.records).await?;
        Ok(ledger)
    }

    async fn write_ledger(&self, ledger: Ledger) -> Result<(), StoreError> {
        let count = ledger.records.len();
        let text = tokio::task::spawn_blocking(move || serialize_ledger(ledger)).await??;
        self.backend.put(SUBMISSIONS_KEY, text).await?;
        debug!(records = count, "Persisted submissions");
        Ok(())
    }
}

fn serialize_ledger(ledger: Ledger) -> Result<String, serde_json::Error> {
    let mut entries = Vec::with_capacity(ledger.records.len() + ledger.foreign.len());
    for record in &ledger.records {
        let mut value = serde_json::to_value(record)?;
        if let (Some(payload), Value::Object(map)) = (&record.payload, &mut value) {
            map.insert("content".into(), Value::String(encode_payload(payload)));
        }
        entries.push(value);
    }
    entries.extend(ledger.foreign);
    serde_json::to_string(&entries)
}

/// For every base identity, the record with the greatest `time`. An
/// identity keeps the position where it first appears.
pub fn current_view(records: &[Submission]) -> Vec<&Submission> {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut view: Vec<&Submission> = Vec::new();
    for record in records {
        let base = base_identity(&record.filename);
        match slots.get(&base) {
            Some(&slot) => {
                if record.time > view[slot].time {
                    view[slot] = record;
                }
            }
            None => {
                slots.insert(base, view.len());
                view.push(record);
            }
        }
    }
    view
}

/// Index of `filename` if that file is the current version of its document.
pub fn current_index(records: &[Submission], filename: &str) -> Option<usize> {
    let base = base_identity(filename);
    records
        .iter()
        .enumerate()
        .filter(|(_, r)| base_identity(&r.filename) == base)
        .fold(None::<usize>, |best, (i, r)| match best {
            Some(b) if records[b].time >= r.time => Some(b),
            _ => Some(i),
        })
        .filter(|&i| records[i].filename == filename)
}

/// Version stamp strictly above everything already stored.
pub fn next_version(records: &[Submission], now: i64) -> i64 {
    records
        .iter()
        .map(|r| r.time)
        .max()
        .map_or(now, |latest| now.max(latest + 1))
}

pub fn apply_upsert(records: &mut Vec<Submission>, new_version: Submission, supersede: &Supersede) {
    let base = base_identity(&new_version.filename);
    records.retain(|r| {
        let replaced = supersede.replaced.as_deref() == Some(r.filename.as_str());
        let superseded =
            supersede.stages.contains(&r.stage) && base_identity(&r.filename) == base;
        !(replaced || superseded)
    });
    records.push(new_version);
}
