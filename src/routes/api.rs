use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{ensure_visible, SubmissionView};
use crate::calendar::{deadline_event, generate_ics};
use crate::db::{Actor, Submission};
use crate::error::{WorkflowError, WorkflowResult};
use crate::state::AppState;
use crate::store::current_index;

/// Current documents visible to the actor.
pub async fn list(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> WorkflowResult<Json<Value>> {
    let records = state.store.current().await?;
    let rows: Vec<SubmissionView> = records
        .iter()
        .filter(|r| ensure_visible(&actor, r).is_ok())
        .map(SubmissionView::from)
        .collect();
    Ok(Json(json!({ "records": rows })))
}

pub async fn select(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(filename): Path<String>,
) -> WorkflowResult<Json<Value>> {
    visible_record(&state, &actor, &filename).await?;
    let record = state.engine.select(&filename).await?;
    Ok(Json(json!({ "record": SubmissionView::from(&record) })))
}

async fn visible_record(
    state: &AppState,
    actor: &Actor,
    filename: &str,
) -> WorkflowResult<Submission> {
    let records = state.store.load().await?;
    let idx = current_index(&records, filename)
        .ok_or_else(|| WorkflowError::NotFound(filename.to_string()))?;
    let record = records[idx].clone();
    ensure_visible(actor, &record)?;
    Ok(record)
}

pub async fn download(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(filename): Path<String>,
) -> WorkflowResult<Response> {
    let record = visible_record(&state, &actor, &filename).await?;
    let Some(payload) = record.payload else {
        return Err(WorkflowError::NotFound(format!("{} has no file", filename)));
    };

    Ok(attachment(
        "application/pdf",
        &record.filename,
        Body::from(payload.to_vec()),
    ))
}

pub async fn calendar(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(filename): Path<String>,
) -> WorkflowResult<Response> {
    let record = visible_record(&state, &actor, &filename).await?;
    let event = deadline_event(&record)
        .ok_or_else(|| WorkflowError::BadRequest(format!("{} has no deadline", filename)))?;

    Ok(attachment(
        "text/calendar",
        &event.file_name(),
        Body::from(generate_ics(&event)),
    ))
}

fn attachment(content_type: &str, download_name: &str, body: Body) -> Response {
    Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", download_name.replace('"', "")),
        )
        .body(body)
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "Could not build download response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })
}

#[derive(Debug, Deserialize)]
pub struct DeadlineBody {
    pub deadline: Option<NaiveDate>,
}

pub async fn set_deadline(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(filename): Path<String>,
    Json(body): Json<DeadlineBody>,
) -> WorkflowResult<Json<Value>> {
    let record = state
        .engine
        .set_deadline(&actor, &filename, body.deadline)
        .await?;
    Ok(Json(json!({ "record": SubmissionView::from(&record) })))
}

#[derive(Debug, Deserialize)]
pub struct NotesBody {
    #[serde(default)]
    pub notes: String,
}

pub async fn set_notes(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(filename): Path<String>,
    Json(body): Json<NotesBody>,
) -> WorkflowResult<Json<Value>> {
    let record = state.engine.annotate(&actor, &filename, &body.notes).await?;
    Ok(Json(json!({ "record": SubmissionView::from(&record) })))
}
