use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::warn;

use super::Backend;
use crate::error::StoreError;

/// Typed append-only log stored under one backend key.
#[derive(Debug)]
pub struct JsonLog<T> {
    backend: Arc<Backend>,
    key: &'static str,
    _entry: PhantomData<fn() -> T>,
}

impl<T> Clone for JsonLog<T> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            key: self.key,
            _entry: PhantomData,
        }
    }
}

impl<T> JsonLog<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(backend: Arc<Backend>, key: &'static str) -> Self {
        Self {
            backend,
            key,
            _entry: PhantomData,
        }
    }

    pub async fn append(&self, entry: &T) -> Result<(), StoreError> {
        let line = serde_json::to_string(entry)?;
        self.backend.append(self.key, line).await
    }

    /// All entries in append order. Lines that no longer parse are skipped.
    pub async fn entries(&self) -> Result<Vec<T>, StoreError> {
        let lines = self.backend.read_log(self.key).await?;
        Ok(lines
            .iter()
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(key = self.key, error = %e, "Skipping unreadable log entry");
                    None
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::FileBackend;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Entry {
        n: u32,
    }

    #[tokio::test]
    async fn corrupt_lines_do_not_hide_the_rest() {
        let temp = tempfile::tempdir().unwrap();
        let backend = Arc::new(Backend::File(FileBackend::new(temp.path())));
        let log: JsonLog<Entry> = JsonLog::new(backend.clone(), "entries");

        log.append(&Entry { n: 1 }).await.unwrap();
        backend.append("entries", "not json".into()).await.unwrap();
        log.append(&Entry { n: 2 }).await.unwrap();

        assert_eq!(
            log.entries().await.unwrap(),
            vec![Entry { n: 1 }, Entry { n: 2 }]
        );
    }
}
