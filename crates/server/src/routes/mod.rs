//! API route handlers.

pub mod agents;
pub mod events;
pub mod health;
pub mod metrics;
pub mod ws;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined router.
///
/// Routes:
/// - GET  /api/health - Health check
/// - GET  /api/agents - Current snapshot (agents, stats, machines)
/// - GET  /api/agents/{id} - One agent record
/// - GET  /api/ws - WebSocket subscription (events, snapshots, heartbeats)
/// - POST /api/events - Push ingress (rate limited, optional bearer token)
/// - GET  /metrics - Prometheus metrics
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", health::router())
        .nest("/api", agents::router())
        .nest("/api", ws::router())
        .nest("/api", events::router(&state))
        .merge(metrics::router())
        .with_state(state)
}
