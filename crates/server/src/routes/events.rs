//! Push ingress endpoint.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header::AUTHORIZATION, HeaderMap},
    routing::post,
    Json, Router,
};

use crate::error::{ApiError, ApiResult};
use crate::ingest::{apply_push, IngestResponse, PushPayload};
use crate::rate_limit::RateLimitLayer;
use crate::state::AppState;

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// POST /api/events - Accept one push event from an external producer.
///
/// Authorization: `Authorization: Bearer <token>` or the payload's `token`
/// field, checked only when a token is configured.
pub async fn push_event(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<PushPayload>, JsonRejection>,
) -> ApiResult<Json<IngestResponse>> {
    let Json(payload) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let presented = bearer_token(&headers).or(payload.token.as_deref());
    if !state.ingress_authorized(presented) {
        return Err(ApiError::Unauthorized);
    }

    let event = payload.sanitize()?;
    let response = apply_push(event, &state.registry, &state.hub).await?;
    Ok(Json(response))
}

/// Rate limiting wraps only this route.
pub fn router(state: &AppState) -> Router<Arc<AppState>> {
    Router::new()
        .route("/events", post(push_event))
        .route_layer(RateLimitLayer::new(state.ingress_limiter.clone()))
}
