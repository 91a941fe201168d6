//! Fan-out of domain events and coalesced snapshots to subscribers.
//!
//! Each subscriber owns a bounded channel drained by its socket task. The
//! hub only ever `try_send`s: a full channel skips that subscriber for this
//! frame, a closed one is dropped from the table. Frames are serialized
//! once and shared between subscribers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use agent_office_core::DomainEvent;
use axum::extract::ws::Utf8Bytes;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::registry::{SessionRegistry, Snapshot};
use super::throttle::{SnapshotDecision, SnapshotThrottle};

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum HubMessage<'a> {
    Event { event: &'a DomainEvent },
    Snapshot(&'a Snapshot),
    Heartbeat,
    Pong,
}

#[derive(Debug, Clone)]
pub struct HubConfig {
    pub snapshot_cooldown: Duration,
    pub heartbeat: Duration,
    /// Frames buffered per subscriber before it is skipped.
    pub client_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            snapshot_cooldown: Duration::from_millis(200),
            heartbeat: Duration::from_secs(15),
            client_buffer: 64,
        }
    }
}

struct Throttled {
    throttle: SnapshotThrottle,
    pending: Option<JoinHandle<()>>,
}

pub struct BroadcastHub {
    registry: Arc<SessionRegistry>,
    config: HubConfig,
    clients: Mutex<HashMap<u64, mpsc::Sender<Utf8Bytes>>>,
    next_id: AtomicU64,
    snapshots: Mutex<Throttled>,
}

impl BroadcastHub {
    pub fn new(registry: Arc<SessionRegistry>, config: HubConfig) -> Self {
        Self {
            registry,
            snapshots: Mutex::new(Throttled {
                throttle: SnapshotThrottle::new(config.snapshot_cooldown),
                pending: None,
            }),
            config,
            clients: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Add a subscriber. Frames arrive on the returned receiver until
    /// [`unsubscribe`](Self::unsubscribe) or hub shutdown.
    pub async fn subscribe(&self) -> (u64, mpsc::Receiver<Utf8Bytes>) {
        let (tx, rx) = mpsc::channel(self.config.client_buffer);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.clients.lock().await.insert(id, tx);
        (id, rx)
    }

    pub async fn unsubscribe(&self, id: u64) {
        self.clients.lock().await.remove(&id);
    }

    pub async fn subscriber_count(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub async fn publish_event(&self, event: &DomainEvent) {
        if let Some(frame) = encode(&HubMessage::Event { event }) {
            self.broadcast(frame).await;
        }
    }

    /// Full snapshot frame, for a subscriber that just connected.
    pub async fn snapshot_frame(&self) -> Option<Utf8Bytes> {
        let snapshot = self.registry.snapshot().await;
        encode(&HubMessage::Snapshot(&snapshot))
    }

    pub fn pong_frame() -> Option<Utf8Bytes> {
        encode(&HubMessage::Pong)
    }

    /// Ask for a snapshot broadcast, subject to the cool-down.
    pub async fn request_snapshot(self: &Arc<Self>) {
        let mut state = self.snapshots.lock().await;
        match state.throttle.on_request(Instant::now()) {
            SnapshotDecision::SendNow => {
                drop(state);
                self.send_snapshot().await;
            }
            SnapshotDecision::ScheduleAt(at) => {
                let hub = Arc::clone(self);
                state.pending = Some(tokio::spawn(async move {
                    tokio::time::sleep_until(at).await;
                    hub.fire_trailing().await;
                }));
            }
            SnapshotDecision::Coalesced => crate::metrics::record_snapshot_coalesced(),
        }
    }

    async fn fire_trailing(&self) {
        {
            let mut state = self.snapshots.lock().await;
            state.throttle.on_trailing_fire(Instant::now());
            state.pending = None;
        }
        self.send_snapshot().await;
    }

    async fn send_snapshot(&self) {
        if let Some(frame) = self.snapshot_frame().await {
            self.broadcast(frame).await;
            crate::metrics::record_snapshot_sent();
        }
    }

    async fn broadcast(&self, frame: Utf8Bytes) {
        let mut clients = self.clients.lock().await;
        clients.retain(|id, tx| match tx.try_send(frame.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!(subscriber = id, "Subscriber lagging, frame skipped");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    /// Start the heartbeat loop and the registry listener that turns
    /// registry changes into snapshot requests.
    pub fn spawn(self: &Arc<Self>, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        let heartbeat = {
            let hub = Arc::clone(self);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let Some(frame) = encode(&HubMessage::Heartbeat) else {
                    return;
                };
                let mut interval = tokio::time::interval(hub.config.heartbeat);
                interval.tick().await;
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = interval.tick() => hub.broadcast(frame.clone()).await,
                    }
                }
            })
        };

        let listener = {
            let hub = Arc::clone(self);
            let mut updates = self.registry.subscribe();
            tokio::spawn(async move {
                loop {
                    let update = tokio::select! {
                        _ = cancel.cancelled() => break,
                        update = updates.recv() => update,
                    };
                    match update {
                        Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                            hub.request_snapshot().await;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            })
        };

        vec![heartbeat, listener]
    }

    /// Close every subscriber and cancel a scheduled trailing snapshot.
    pub async fn shutdown(&self) {
        let mut state = self.snapshots.lock().await;
        if let Some(handle) = state.pending.take() {
            handle.abort();
        }
        state.throttle.reset_pending();
        drop(state);

        let mut clients = self.clients.lock().await;
        tracing::info!(subscribers = clients.len(), "Closing subscribers");
        clients.clear();
    }
}

fn encode(message: &HubMessage<'_>) -> Option<Utf8Bytes> {
    match serde_json::to_string(message) {
        Ok(json) => Some(Utf8Bytes::from(json)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize hub message");
            None
        }
    }
}
