// crates/server/src/lib.rs
//! Agent office server library.
//!
//! Watches coding-agent session logs, folds them into a live model of
//! sessions, and streams that model to WebSocket subscribers. External
//! producers can push events over HTTP.

pub mod config;
pub mod connections;
pub mod error;
pub mod ingest;
pub mod live;
pub mod metrics;
pub mod rate_limit;
pub mod routes;
pub mod state;

pub use config::{ConfigError, OfficeConfig};
pub use error::*;
pub use live::OfficeRuntime;
pub use metrics::{init_metrics, render_metrics};
pub use routes::api_routes;
pub use state::AppState;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the Axum application with all routes and middleware.
///
/// This sets up:
/// - API routes (health, agents, ws, events) and `/metrics`
/// - CORS (allows any origin; the server binds to loopback by default)
/// - Request tracing
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api_routes(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}


// ============================================================================
// Integration Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_state, test_state_with};
    use agent_office_core::{DomainEvent, EventMeta};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use chrono::Utc;
    use tower::ServiceExt;

    /// Helper to make a GET request to the app.
    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    async fn post_json(app: Router, body: &str, headers: &[(&str, &str)]) -> (StatusCode, String) {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/events")
            .header("content-type", "application/json");
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        let response = app
            .oneshot(builder.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    // ========================================================================
    // Health / agents
    // ========================================================================

    #[tokio::test]
    async fn test_health_endpoint() {
        let (status, body) = get(create_app(test_state()), "/api/health").await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert!(json["version"].is_string());
        assert_eq!(json["live_sessions"], 0);
    }

    #[tokio::test]
    async fn test_agents_snapshot_and_lookup() {
        let state = test_state();
        state
            .registry
            .apply(&DomainEvent::session_started(
                EventMeta::for_session("abc123", Utc::now()),
                None,
                Some("proj".into()),
            ))
            .await;

        let (status, body) = get(create_app(state.clone()), "/api/agents").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["agents"][0]["id"], "abc123");
        assert_eq!(json["agents"][0]["state"], "entering");
        assert_eq!(json["stats"]["totalSessions"], 1);
        assert!(json["machines"].is_array());

        let (status, body) = get(create_app(state.clone()), "/api/agents/abc123").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("\"project\":\"proj\""));

        let (status, body) = get(create_app(state), "/api/agents/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("Session not found"));
    }

    // ========================================================================
    // Push ingress
    // ========================================================================

    #[tokio::test]
    async fn test_push_start_then_status() {
        let state = test_state();
        let (status, body) = post_json(
            create_app(state.clone()),
            r#"{"source_id":"ext-1","event":"start","source_name":"Cursor"}"#,
            &[],
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert!(body.contains("\"sessionId\":\"ext-1\""));

        let (status, _) = post_json(
            create_app(state.clone()),
            r#"{"source_id":"ext-1","event":"status","state":"thinking"}"#,
            &[],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let record = state.registry.get("ext-1").await.unwrap();
        assert_eq!(record.name, "Cursor");
        assert_eq!(record.state, crate::live::record::AgentState::Thinking);
    }

    #[tokio::test]
    async fn test_push_unknown_session_is_404() {
        let (status, _) = post_json(
            create_app(test_state()),
            r#"{"source_id":"nobody","event":"heartbeat"}"#,
            &[],
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_push_invalid_payloads_are_400() {
        let state = test_state();
        for body in [
            r#"{"source_id":"bad id","event":"start"}"#,
            r#"{"source_id":"a","event":"dance"}"#,
            r#"{"source_id":"a","event":"start","url":"javascript:alert(1)"}"#,
            r#"{"event":"start"}"#,
            "not json",
        ] {
            let (status, resp) = post_json(create_app(state.clone()), body, &[]).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{body} -> {resp}");
        }
        assert!(state.registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_push_token_required_when_configured() {
        let state = test_state_with(OfficeConfig {
            ingress_token: Some("tok".into()),
            ..Default::default()
        });
        let start = r#"{"source_id":"a","event":"start"}"#;

        let (status, _) = post_json(create_app(state.clone()), start, &[]).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = post_json(
            create_app(state.clone()),
            start,
            &[("authorization", "Bearer wrong")],
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = post_json(
            create_app(state.clone()),
            start,
            &[("authorization", "Bearer tok")],
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = post_json(
            create_app(state),
            r#"{"source_id":"b","event":"start","token":"tok"}"#,
            &[],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_push_rate_limited_per_address() {
        let state = test_state_with(OfficeConfig {
            rate_limit_requests: 2,
            ..Default::default()
        });
        let body = r#"{"source_id":"a","event":"start"}"#;
        let from_a = [("x-forwarded-for", "10.0.0.1")];
        let from_b = [("x-forwarded-for", "10.0.0.2")];

        for _ in 0..2 {
            let (status, _) = post_json(create_app(state.clone()), body, &from_a).await;
            assert_eq!(status, StatusCode::OK);
        }
        let (status, resp) = post_json(create_app(state.clone()), body, &from_a).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert!(resp.contains("Rate limit exceeded"));

        let (status, _) = post_json(create_app(state), body, &from_b).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_rate_limit_does_not_cover_reads() {
        let state = test_state_with(OfficeConfig {
            rate_limit_requests: 1,
            ..Default::default()
        });
        for _ in 0..5 {
            let (status, _) = get(create_app(state.clone()), "/api/health").await;
            assert_eq!(status, StatusCode::OK);
        }
    }

    // ========================================================================
    // WebSocket admission
    // ========================================================================

    #[tokio::test]
    async fn test_ws_without_upgrade_headers_is_rejected() {
        let (status, _) = get(create_app(test_state()), "/api/ws").await;
        assert!(status.is_client_error(), "got {status}");
    }

    // ========================================================================
    // CORS
    // ========================================================================

    #[tokio::test]
    async fn test_cors_allows_any_origin() {
        let response = create_app(test_state())
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .header("Origin", "http://example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let allow_origin = response.headers().get("access-control-allow-origin");
        assert_eq!(allow_origin.unwrap(), "*");
    }

    #[tokio::test]
    async fn test_unknown_route_404() {
        let (status, _) = get(create_app(test_state()), "/api/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
