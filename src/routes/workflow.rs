use axum::{
    extract::{Path, Query, State},
    response::Response,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{outcome_response, require_staff, SubmissionView};
use crate::db::{Actor, NotificationEvent, Role};
use crate::error::{WorkflowError, WorkflowResult};
use crate::state::AppState;
use crate::workflow::identity::normalize_name;
use crate::workflow::{project, tab_counts, Action, Tab, TabCounts, TransitionRequest, ViewFilter};

pub async fn view(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(tab): Path<String>,
    Query(query): Query<ViewFilter>,
) -> WorkflowResult<Json<Value>> {
    require_staff(&actor, "open review tabs")?;
    let tab: Tab = tab.parse().map_err(WorkflowError::BadRequest)?;

    let filter = if query.is_empty() {
        state.prefs.get(&actor.name).await?.filter
    } else {
        query
    };
    let records = state.store.load().await?;
    let rows = project(&records, &actor.name, tab, &filter);
    let rows: Vec<SubmissionView> = rows.iter().map(SubmissionView::from).collect();

    Ok(Json(json!({
        "tab": tab,
        "readOnly": tab.is_read_only(),
        "filter": filter,
        "records": rows,
    })))
}

pub async fn counts(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> WorkflowResult<Json<TabCounts>> {
    require_staff(&actor, "open review tabs")?;
    let records = state.store.load().await?;
    Ok(Json(tab_counts(&records, &actor.name)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionBody {
    pub filename: Option<String>,
    #[serde(default)]
    pub confirmed: bool,
    pub expected_version: Option<i64>,
}

pub async fn transition(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(action): Path<Action>,
    Json(body): Json<TransitionBody>,
) -> WorkflowResult<Response> {
    let prefs = state.prefs.get(&actor.name).await?;
    let request = TransitionRequest {
        filename: body.filename,
        transition: action.into(),
        confirmed: body.confirmed,
        expected_version: body.expected_version,
    };
    let outcome = state.engine.apply(&actor, &prefs, request).await?;
    Ok(outcome_response(outcome, |applied| {
        json!({
            "record": SubmissionView::from(&applied.record),
            "notification": applied.notification,
        })
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct ClearBody {
    #[serde(default)]
    pub confirmed: bool,
}

pub async fn clear_history(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(body): Json<ClearBody>,
) -> WorkflowResult<Response> {
    let outcome = state.engine.clear_history(&actor, body.confirmed).await?;
    Ok(outcome_response(outcome, |removed| {
        let names: Vec<_> = removed.into_iter().map(|r| r.filename).collect();
        json!({ "removed": names })
    }))
}

pub async fn notifications(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> WorkflowResult<Json<Vec<NotificationEvent>>> {
    let user = match actor.role {
        Role::Student => normalize_name(&actor.name),
        _ => actor.name.clone(),
    };
    Ok(Json(state.engine.notifier().for_user(&user).await?))
}

/// Counts for every recipient, so staff only.
pub async fn notification_counts(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> WorkflowResult<Json<BTreeMap<String, usize>>> {
    require_staff(&actor, "view notification counts")?;
    Ok(Json(state.engine.notifier().counts().await?))
}
