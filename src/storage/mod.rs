//! PDF payload handling: legacy base64 content, upload checks and ids.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::db::Submission;
use crate::error::{DecodeError, WorkflowError};

const PDF_MIME: &str = "application/pdf";
const PDF_MAGIC: &[u8] = b"%PDF-";
const MB: u64 = 1024 * 1024;

/// Older writers sometimes dropped the trailing `=` padding.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

pub fn generate_notification_id() -> String {
    format!(
        "notification_{}_{}",
        Utc::now().timestamp_millis(),
        &Uuid::new_v4().simple().to_string()[..8]
    )
}

pub fn ensure_dirs(data_dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(data_dir)
}

/// Decodes persisted `content`: an optional `data:...;base64,` header,
/// arbitrary whitespace, then standard base64.
pub fn decode_content(raw: &str) -> Result<Vec<u8>, DecodeError> {
    let body = if raw.trim_start().starts_with("data:") {
        raw.split_once(',').map(|(_, rest)| rest).unwrap_or("")
    } else {
        raw
    };
    let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(DecodeError::Empty);
    }
    Ok(LENIENT.decode(compact.as_bytes())?)
}

pub fn encode_payload(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Materializes the binary payload of a record that still carries legacy
/// `content`. A record whose content does not decode comes back unchanged.
pub fn normalize(mut record: Submission) -> Submission {
    if record.payload.is_some() {
        record.content = None;
        return record;
    }
    let Some(raw) = record.content.as_deref() else {
        return record;
    };
    match decode_content(raw) {
        Ok(bytes) => {
            record.payload = Some(Arc::from(bytes));
            record.content = None;
        }
        Err(e) => {
            warn!(filename = %record.filename, error = %e, "Could not decode stored content");
        }
    }
    record
}

/// Runs [`normalize`] over a whole record set off the async worker threads.
pub async fn normalize_all(records: Vec<Submission>) -> Result<Vec<Submission>, tokio::task::JoinError> {
    let needs_work = records
        .iter()
        .any(|r| r.payload.is_none() && r.content.is_some());
    if !needs_work {
        return Ok(records);
    }
    tokio::task::spawn_blocking(move || records.into_iter().map(normalize).collect()).await
}

/// A file handed in by drag-and-drop or the upload form.
#[derive(Debug, Clone)]
pub struct Upload {
    pub name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn pdf(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: Some(PDF_MIME.to_string()),
            bytes,
        }
    }

    /// Rejects anything that is not a PDF, then anything above the ceiling.
    pub fn check(&self, max_upload_mb: u64) -> Result<(), WorkflowError> {
        let declared_pdf = match self.content_type.as_deref() {
            Some(ct) if !ct.is_empty() && ct != "application/octet-stream" => {
                ct.split(';').next().map(str::trim) == Some(PDF_MIME)
            }
            _ => mime_guess::from_path(&self.name)
                .first_raw()
                .map_or(false, |m| m == PDF_MIME),
        };
        if !declared_pdf || !self.bytes.starts_with(PDF_MAGIC) {
            return Err(WorkflowError::InvalidFileType(self.name.clone()));
        }

        let size = self.bytes.len() as u64;
        if size > max_upload_mb * MB {
            return Err(WorkflowError::FileTooLarge {
                size_mb: size as f64 / MB as f64,
                limit_mb: max_upload_mb,
            });
        }
        Ok(())
    }
}
