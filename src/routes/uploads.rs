use axum::{
    extract::{Multipart, State},
    response::Response,
};
use serde_json::json;
use std::sync::Arc;

use super::{outcome_response, SubmissionView};
use crate::db::Actor;
use crate::error::{WorkflowError, WorkflowResult};
use crate::prefs::ActorPreferences;
use crate::state::AppState;
use crate::storage::Upload;
use crate::workflow::{Outcome, Transition, TransitionRequest};

/// Fields of an upload form. `file` is the document, the rest is text.
#[derive(Debug, Default)]
struct UploadForm {
    filename: Option<String>,
    expected_version: Option<i64>,
    file: Option<Upload>,
}

async fn read_form(mut multipart: Multipart) -> WorkflowResult<UploadForm> {
    let mut form = UploadForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| WorkflowError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "filename" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| WorkflowError::BadRequest(e.to_string()))?;
                form.filename = Some(text.trim().to_string()).filter(|t| !t.is_empty());
            }
            "expectedVersion" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| WorkflowError::BadRequest(e.to_string()))?;
                form.expected_version = Some(text.trim().parse().map_err(|_| {
                    WorkflowError::BadRequest(format!("expectedVersion is not a number: {}", text))
                })?);
            }
            "file" => {
                let upload_name = field.file_name().unwrap_or("upload.pdf").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| WorkflowError::BadRequest(e.to_string()))?;
                form.file = Some(Upload {
                    name: upload_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            _ => {}
        }
    }
    Ok(form)
}

/// Student hand-in (`file`).
pub async fn submit(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    multipart: Multipart,
) -> WorkflowResult<Response> {
    let form = read_form(multipart).await?;
    let upload = form
        .file
        .ok_or_else(|| WorkflowError::BadRequest("file field is required".into()))?;

    let mut request = TransitionRequest::new(None, Transition::Submit(upload));
    request.expected_version = form.expected_version;
    apply(&state, &actor, request).await
}

/// Replaces the file of the selected submission (`filename`, `file`).
pub async fn replace(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    multipart: Multipart,
) -> WorkflowResult<Response> {
    let form = read_form(multipart).await?;
    if form.filename.is_none() {
        return Err(WorkflowError::SelectionRequired);
    }
    let upload = form
        .file
        .ok_or_else(|| WorkflowError::BadRequest("file field is required".into()))?;

    let mut request = TransitionRequest::new(form.filename, Transition::ReplaceFile(upload));
    request.expected_version = form.expected_version;
    apply(&state, &actor, request).await
}

async fn apply(
    state: &AppState,
    actor: &Actor,
    request: TransitionRequest,
) -> WorkflowResult<Response> {
    // Uploads never ask for confirmation.
    let outcome = state
        .engine
        .apply(actor, &ActorPreferences::default(), request)
        .await?;
    if let Outcome::Applied(applied) = &outcome {
        tracing::info!(
            actor = %actor.name,
            filename = %applied.record.filename,
            bytes = applied.record.payload_len(),
            "Upload stored"
        );
    }
    Ok(outcome_response(outcome, |applied| {
        json!({ "record": SubmissionView::from(&applied.record) })
    }))
}
