mod api;
mod sessions;
mod uploads;
mod workflow;

use axum::{
    async_trait,
    extract::{DefaultBodyLimit, FromRequestParts},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::ser::Error as _;
use serde::{Serialize, Serializer};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::db::{Actor, Role, Submission};
use crate::error::{WorkflowError, WorkflowResult};
use crate::state::AppState;
use crate::workflow::identity::{normalize_name, owner_of};
use crate::workflow::Outcome;

pub const ACTOR_HEADER: &str = "x-actor";
pub const ROLE_HEADER: &str = "x-role";

pub fn router(state: Arc<AppState>) -> Router {
    // Room for the multipart framing; the size check itself happens on upload.
    let body_limit = (state.config.max_upload_mb as usize + 1) * 2 * 1024 * 1024;

    Router::new()
        .route(
            "/sessions",
            get(sessions::current).post(sessions::login).delete(sessions::logout),
        )
        .route(
            "/preferences",
            get(sessions::get_preferences).put(sessions::put_preferences),
        )
        .route("/views/:tab", get(workflow::view))
        .route("/counts", get(workflow::counts))
        .route("/submissions", get(api::list).post(uploads::submit))
        .route("/submissions/:filename", get(api::select))
        .route("/submissions/:filename/download", get(api::download))
        .route("/submissions/:filename/calendar", get(api::calendar))
        .route("/submissions/:filename/deadline", put(api::set_deadline))
        .route("/submissions/:filename/notes", put(api::set_notes))
        .route("/uploads", post(uploads::replace))
        .route("/transitions/:action", post(workflow::transition))
        .route("/history/clear", post(workflow::clear_history))
        .route("/notifications", get(workflow::notifications))
        .route("/notifications/counts", get(workflow::notification_counts))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// The acting session, taken from the `x-actor` and `x-role` headers.
#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = WorkflowError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let name = header(parts, ACTOR_HEADER)
            .ok_or_else(|| WorkflowError::Unauthenticated(format!("{} header is required", ACTOR_HEADER)))?;
        let role = header(parts, ROLE_HEADER)
            .ok_or_else(|| WorkflowError::Unauthenticated(format!("{} header is required", ROLE_HEADER)))?
            .parse::<Role>()
            .map_err(WorkflowError::Unauthenticated)?;
        Ok(Actor::new(name, role))
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Record as shown to clients: persisted fields plus derived state.
///
/// The derived keys win over unknown persisted fields of the same name, so
/// the rendered object never carries a key twice.
#[derive(Debug)]
pub struct SubmissionView<'a> {
    pub record: &'a Submission,
    pub state: &'static str,
    pub owner_name: String,
    pub size: usize,
}

impl Serialize for SubmissionView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut fields = match serde_json::to_value(self.record).map_err(S::Error::custom)? {
            Value::Object(fields) => fields,
            _ => return Err(S::Error::custom("submission did not serialize to an object")),
        };
        fields.insert("state".into(), Value::from(self.state));
        fields.insert("ownerName".into(), Value::from(self.owner_name.as_str()));
        fields.insert("size".into(), Value::from(self.size));
        fields.serialize(serializer)
    }
}

impl<'a> From<&'a Submission> for SubmissionView<'a> {
    fn from(record: &'a Submission) -> Self {
        Self {
            state: record.state().label(),
            owner_name: owner_of(record),
            size: record.payload_len(),
            record,
        }
    }
}

/// Students only see their own documents.
fn ensure_visible(actor: &Actor, record: &Submission) -> WorkflowResult<()> {
    if actor.role == Role::Student && owner_of(record) != normalize_name(&actor.name) {
        return Err(WorkflowError::NotFound(record.filename.clone()));
    }
    Ok(())
}

fn require_staff(actor: &Actor, action: &'static str) -> WorkflowResult<()> {
    if actor.role == Role::Student {
        return Err(WorkflowError::Forbidden {
            role: actor.role,
            action,
        });
    }
    Ok(())
}

/// `428 Precondition Required` carries the prompt to show before retrying.
fn outcome_response<T, F>(outcome: Outcome<T>, render: F) -> Response
where
    F: FnOnce(T) -> serde_json::Value,
{
    match outcome {
        Outcome::Applied(value) => Json(render(value)).into_response(),
        Outcome::ConfirmationRequired { prompt } => (
            StatusCode::PRECONDITION_REQUIRED,
            Json(json!({ "prompt": prompt, "code": "CONFIRMATION_REQUIRED" })),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Stage;

    #[test]
    fn derived_fields_replace_persisted_namesakes() {
        let mut record = Submission::new("alice_lee_Stage1.pdf", Stage::Stage1, 3);
        record.extra.insert("state".into(), Value::from("bogus"));
        record.extra.insert("size".into(), Value::from(99));
        record.extra.insert("first".into(), Value::from("Alice"));

        let text = serde_json::to_string(&SubmissionView::from(&record)).unwrap();
        assert_eq!(text.matches("\"state\"").count(), 1);
        assert_eq!(text.matches("\"size\"").count(), 1);

        let rendered: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(rendered["state"], record.state().label());
        assert_eq!(rendered["size"], 0);
        assert_eq!(rendered["first"], "Alice");
        assert_eq!(rendered["filename"], "alice_lee_Stage1.pdf");
    }
}
