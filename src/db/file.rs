use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::error::StoreError;

/// Key/value space kept as one file per key inside a data directory.
///
/// Documents are `<key>.json`, written through a temp file in the same
/// directory and renamed into place. Logs are `<key>.jsonl`, one entry per
/// line, opened in append mode.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn document_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(key)))
    }

    fn log_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", file_stem(key)))
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match tokio::fs::read_to_string(self.document_path(key)).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn put(&self, key: &str, value: String) -> Result<(), StoreError> {
        let dir = self.dir.clone();
        let path = self.document_path(key);
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            std::fs::create_dir_all(&dir)?;
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            tmp.write_all(value.as_bytes())?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await??;
        Ok(())
    }

    pub async fn append(&self, key: &str, entry: String) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let mut line = entry.replace('\n', " ");
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(key))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    pub async fn read_log(&self, key: &str) -> Result<Vec<String>, StoreError> {
        match tokio::fs::read_to_string(self.log_path(key)).await {
            Ok(text) => Ok(text
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(str::to_string)
                .collect()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Keys carry actor names. Anything outside `[A-Za-z0-9_.-]`, and a leading
/// dot, becomes `%XX` per UTF-8 byte so distinct keys never share a file.
fn file_stem(key: &str) -> String {
    let mut stem = String::with_capacity(key.len());
    for (i, byte) in key.bytes().enumerate() {
        let plain = byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.');
        if plain && !(i == 0 && byte == b'.') {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("%{:02X}", byte));
        }
    }
    stem
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_key_reads_as_none() {
        let temp = tempfile::tempdir().unwrap();
        let files = FileBackend::new(temp.path());
        assert_eq!(files.get("submissions").await.unwrap(), None);
        assert!(files.read_log("adminLog").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn put_overwrites_whole_document() {
        let temp = tempfile::tempdir().unwrap();
        let files = FileBackend::new(temp.path());
        files.put("submissions", "[1,2,3]".into()).await.unwrap();
        files.put("submissions", "[]".into()).await.unwrap();
        assert_eq!(files.get("submissions").await.unwrap().as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn append_keeps_one_entry_per_line() {
        let temp = tempfile::tempdir().unwrap();
        let files = FileBackend::new(temp.path());
        files.append("log", "{\"a\":1}".into()).await.unwrap();
        files.append("log", "{\"b\":\n2}".into()).await.unwrap();
        let entries = files.read_log("log").await.unwrap();
        assert_eq!(entries, vec!["{\"a\":1}".to_string(), "{\"b\": 2}".to_string()]);
    }

    #[test]
    fn file_stem_escapes_path_characters() {
        assert_eq!(file_stem("submissions"), "submissions");
        assert_eq!(file_stem("preferences_../etc/passwd"), "preferences_..%2Fetc%2Fpasswd");
        assert_eq!(file_stem("../x"), "%2E.%2Fx");
        assert_eq!(file_stem("preferences_Mary Jo"), "preferences_Mary%20Jo");
        assert_eq!(file_stem("50%"), "50%25");
    }

    #[tokio::test]
    async fn similar_actor_names_get_separate_documents() {
        let temp = tempfile::tempdir().unwrap();
        let files = FileBackend::new(temp.path());
        files.put("preferences_Mary Jo", "{\"a\":1}".into()).await.unwrap();
        files.put("preferences_Mary_Jo", "{\"b\":2}".into()).await.unwrap();
        assert_eq!(
            files.get("preferences_Mary Jo").await.unwrap().as_deref(),
            Some("{\"a\":1}")
        );
        assert_eq!(
            files.get("preferences_Mary_Jo").await.unwrap().as_deref(),
            Some("{\"b\":2}")
        );
    }
}
