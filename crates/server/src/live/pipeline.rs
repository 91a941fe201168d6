//! Tail → normalize → registry → hub.
//!
//! One task owns the tailer and the normalizer, so lines from a file are
//! applied in file order. Ordering across files is not preserved.

use std::sync::Arc;
use std::time::SystemTime;

use agent_office_core::{DomainEvent, EventMeta, EventNormalizer, LineContext};
use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::hub::BroadcastHub;
use super::registry::{ApplyOutcome, SessionRegistry};
use super::tailer::{SessionTailer, TailEvent};
use super::watcher::FileEvent;

/// Apply one event and, if the registry accepted it, fan it out.
pub async fn deliver(
    registry: &Arc<SessionRegistry>,
    hub: &BroadcastHub,
    event: &DomainEvent,
) -> ApplyOutcome {
    let outcome = registry.apply(event).await;
    if outcome != ApplyOutcome::Ignored {
        crate::metrics::record_event(event.label());
        hub.publish_event(event).await;
    }
    outcome
}

pub struct Pipeline {
    tailer: SessionTailer,
    normalizer: EventNormalizer,
    registry: Arc<SessionRegistry>,
    hub: Arc<BroadcastHub>,
}

impl Pipeline {
    pub fn new(tailer: SessionTailer, registry: Arc<SessionRegistry>, hub: Arc<BroadcastHub>) -> Self {
        Self {
            tailer,
            normalizer: EventNormalizer::new(),
            registry,
            hub,
        }
    }

    pub async fn initial_scan(&mut self) {
        let events = self.tailer.initial_scan(SystemTime::now()).await;
        self.process(events).await;
    }

    pub async fn handle_file_event(&mut self, event: FileEvent) {
        let tail_events = match &event {
            FileEvent::Modified(path) => self.tailer.handle_change(path, SystemTime::now()).await,
            FileEvent::Removed(path) => self.tailer.handle_remove(path),
        };
        self.process(tail_events).await;
    }

    async fn process(&mut self, events: Vec<TailEvent>) {
        for event in events {
            match event {
                TailEvent::Discovered { session, path } => {
                    tracing::debug!(session_id = %session.session_id, path = %path.display(), "Session log discovered");
                    let meta = EventMeta::new(&session.session_id, session.agent_id(), Utc::now());
                    let started = DomainEvent::session_started(
                        meta,
                        session.parent_session_id.clone(),
                        Some(session.project.clone()),
                    );
                    deliver(&self.registry, &self.hub, &started).await;
                }
                TailEvent::Line(line) => {
                    let ctx = LineContext {
                        session_id: &line.session_id,
                        agent_id: &line.agent_id,
                    };
                    let events = self.normalizer.normalize(&line.text, &ctx);
                    if events.is_empty() {
                        crate::metrics::record_line_dropped();
                        continue;
                    }
                    for event in &events {
                        deliver(&self.registry, &self.hub, event).await;
                    }
                }
                TailEvent::Removed { session_id, path } => {
                    tracing::debug!(session_id = %session_id, path = %path.display(), "Session log removed");
                    let ended = DomainEvent::session_ended(EventMeta::for_session(&session_id, Utc::now()));
                    deliver(&self.registry, &self.hub, &ended).await;
                }
                TailEvent::Error(e) => {
                    crate::metrics::record_tail_error();
                    tracing::warn!(error = %e, "Session log read failed");
                }
            }
        }
    }

    /// Scan, then apply file events until the channel closes or `cancel`
    /// fires.
    pub async fn run(mut self, mut rx: mpsc::Receiver<FileEvent>, cancel: CancellationToken) {
        self.initial_scan().await;
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = rx.recv() => event,
            };
            match event {
                Some(event) => self.handle_file_event(event).await,
                None => break,
            }
        }
        self.tailer.clear();
        self.normalizer.clear();
        tracing::debug!("Tail pipeline stopped");
    }
}
