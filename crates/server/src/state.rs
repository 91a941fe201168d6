// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use subtle::ConstantTimeEq;

use crate::config::OfficeConfig;
use crate::connections::ConnectionLimiter;
use crate::live::hub::BroadcastHub;
use crate::live::registry::SessionRegistry;
use crate::rate_limit::{RateLimitConfig, RateLimiter};

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    pub config: OfficeConfig,
    pub registry: Arc<SessionRegistry>,
    pub hub: Arc<BroadcastHub>,
    /// Subscriber admission (global and per-address caps).
    pub connections: Arc<ConnectionLimiter>,
    /// Sliding-window limiter guarding push ingress.
    pub ingress_limiter: RateLimiter,
}

impl AppState {
    pub fn new(config: OfficeConfig, registry: Arc<SessionRegistry>, hub: Arc<BroadcastHub>) -> Arc<Self> {
        let connections = Arc::new(ConnectionLimiter::new(
            config.max_connections,
            config.max_connections_per_ip,
        ));
        let ingress_limiter = RateLimiter::new(RateLimitConfig::new(
            config.rate_limit_requests,
            config.rate_limit_window(),
        ));
        Arc::new(Self {
            start_time: Instant::now(),
            config,
            registry,
            hub,
            connections,
            ingress_limiter,
        })
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Whether `presented` matches the configured ingress token. Always true
    /// when no token is configured.
    pub fn ingress_authorized(&self, presented: Option<&str>) -> bool {
        match self.config.ingress_token.as_deref() {
            None => true,
            Some(expected) => presented.is_some_and(|p| p.as_bytes().ct_eq(expected.as_bytes()).into()),
        }
    }
}
