//! Read-only views of the registry.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use crate::error::{ApiError, ApiResult};
use crate::live::record::AgentRecord;
use crate::live::registry::Snapshot;
use crate::state::AppState;

/// GET /api/agents - Current snapshot: agents, stats, machines.
pub async fn list_agents(State(state): State<Arc<AppState>>) -> Json<Snapshot> {
    Json(state.registry.snapshot().await)
}

/// GET /api/agents/{id}
pub async fn get_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<AgentRecord>> {
    state
        .registry
        .get(&id)
        .await
        .map(Json)
        .ok_or(ApiError::SessionNotFound(id))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/agents", get(list_agents))
        .route("/agents/{id}", get(get_agent))
}
