use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use super::require_staff;
use crate::db::{Actor, Role};
use crate::error::{WorkflowError, WorkflowResult};
use crate::prefs::ActorPreferences;
use crate::state::AppState;
use crate::sync::Snapshot;
use crate::workflow::tab_counts;

fn summary(actor: &Actor, snapshot: &Snapshot, version: u64) -> Value {
    let counts = match actor.role {
        Role::Student => None,
        _ => Some(tab_counts(snapshot, &actor.name)),
    };
    json!({
        "actor": actor.name,
        "role": actor.role,
        "version": version,
        "counts": counts,
    })
}

/// Starts the actor's sync poller.
pub async fn login(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> WorkflowResult<Json<Value>> {
    let (snapshot, version) = state.sessions.login(&actor.name).await?;
    Ok(Json(summary(&actor, &snapshot, version)))
}

pub async fn logout(State(state): State<Arc<AppState>>, actor: Actor) -> Json<Value> {
    let ended = state.sessions.logout(&actor.name).await;
    Json(json!({ "loggedOut": ended }))
}

/// Latest snapshot the poller has seen. `version` counts the snapshots the
/// poller has published, so clients refetch whenever it differs from theirs.
pub async fn current(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> WorkflowResult<Json<Value>> {
    let (snapshot, version) = state
        .sessions
        .current(&actor.name)
        .await
        .ok_or_else(|| WorkflowError::Unauthenticated(format!("{} has no session", actor.name)))?;
    Ok(Json(summary(&actor, &snapshot, version)))
}

pub async fn get_preferences(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> WorkflowResult<Json<ActorPreferences>> {
    Ok(Json(state.prefs.get(&actor.name).await?))
}

pub async fn put_preferences(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(prefs): Json<ActorPreferences>,
) -> WorkflowResult<Json<ActorPreferences>> {
    require_staff(&actor, "change review preferences")?;
    state.prefs.save(&actor.name, &prefs).await?;
    tracing::info!(actor = %actor.name, confirm = prefs.confirm_actions, "Preferences saved");
    Ok(Json(prefs))
}
