//! Sliding-window rate limiting for push ingress, keyed by client address.
//!
//! Each address keeps the instants of its accepted requests inside the
//! window; a request is allowed while fewer than `max_requests` remain.
//!
//! ```ignore
//! let limiter = RateLimiter::new(RateLimitConfig::new(120, Duration::from_secs(60)));
//! let app = Router::new()
//!     .route("/api/events", post(push_event))
//!     .route_layer(RateLimitLayer::new(limiter));
//! ```

use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Extensions, HeaderMap, Request, Response},
    response::IntoResponse,
};
use futures_util::future::BoxFuture;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tower::{Layer, Service};

use crate::error::ApiError;

#[derive(Clone, Copy, Debug)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window: Duration,
}

impl RateLimitConfig {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self { max_requests, window }
    }
}

/// Shared limiter state. Cloning shares the same counters.
#[derive(Clone)]
pub struct RateLimiter {
    hits: Arc<Mutex<HashMap<IpAddr, VecDeque<Instant>>>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            hits: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    /// Record a request from `ip`; `false` if it exceeds the window ceiling.
    pub async fn check(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut hits = self.hits.lock().await;
        let window = hits.entry(ip).or_default();

        while window
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.config.window)
        {
            window.pop_front();
        }

        if window.len() >= self.config.max_requests {
            return false;
        }
        window.push_back(now);
        true
    }

    /// Drop expired instants and addresses with nothing left in the window.
    pub async fn prune(&self) {
        let now = Instant::now();
        let mut hits = self.hits.lock().await;
        hits.retain(|_, window| {
            window.retain(|t| now.duration_since(*t) < self.config.window);
            !window.is_empty()
        });
    }

    pub async fn tracked_addresses(&self) -> usize {
        self.hits.lock().await.len()
    }

    /// Prune every `period` until `cancel` fires.
    pub fn spawn_pruner(&self, period: Duration, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => limiter.prune().await,
                }
            }
        })
    }
}

#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: RateLimiter,
}

impl RateLimitLayer {
    pub fn new(limiter: RateLimiter) -> Self {
        Self { limiter }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: self.limiter.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: RateLimiter,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let limiter = self.limiter.clone();
        let inner = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, inner);

        Box::pin(async move {
            let ip = client_ip(&req);
            if !limiter.check(ip).await {
                tracing::warn!(ip = %ip, "Push ingress rate limit exceeded");
                crate::metrics::record_rate_limited();
                return Ok(ApiError::RateLimited.into_response());
            }
            inner.call(req).await
        })
    }
}

/// Peer address from `ConnectInfo`, then `X-Forwarded-For`, then loopback.
pub fn client_ip<B>(req: &Request<B>) -> IpAddr {
    peer_ip(req.extensions(), req.headers())
}

pub fn peer_ip(extensions: &Extensions, headers: &HeaderMap) -> IpAddr {
    if let Some(ConnectInfo(addr)) = extensions.get::<ConnectInfo<SocketAddr>>() {
        return addr.ip();
    }
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|first| first.trim().parse().ok())
        .unwrap_or(IpAddr::from([127, 0, 0, 1]))
}
