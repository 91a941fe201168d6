//! Push ingress: sanitization of external payloads and their mapping onto
//! domain events and registry calls.

use std::sync::Arc;

use agent_office_core::{ActivityKind, DomainEvent, EventMeta, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use crate::error::{ApiError, ApiResult};
use crate::live::hub::BroadcastHub;
use crate::live::pipeline::deliver;
use crate::live::record::{AgentSource, AgentState};
use crate::live::registry::{Registration, SessionRegistry};

const MAX_SOURCE_ID: usize = 128;
const MAX_NAME: usize = 64;
const MAX_PROJECT: usize = 128;
const MAX_ACTIVITY: usize = 200;
const MAX_MACHINE: usize = 64;
const MAX_URL: usize = 2048;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IngestError {
    #[error("source_id must be 1-128 characters of [A-Za-z0-9._:-]")]
    InvalidSourceId,

    #[error("unknown event {0:?}, expected start, stop, status, error or heartbeat")]
    UnknownEvent(String),

    #[error("state {0:?} is not an allowed state")]
    InvalidState(String),

    #[error("url must be an absolute http or https URL")]
    InvalidUrl,
}

/// Raw push payload as posted by an external producer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushPayload {
    pub source_id: String,
    pub event: String,
    #[serde(default)]
    pub source_name: Option<String>,
    #[serde(default)]
    pub source_type: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub machine: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub activity: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushKind {
    Start,
    Stop,
    Status,
    Error,
    Heartbeat,
}

impl PushKind {
    fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "start" => Self::Start,
            "stop" => Self::Stop,
            "status" => Self::Status,
            "error" => Self::Error,
            "heartbeat" => Self::Heartbeat,
            _ => return None,
        })
    }
}

/// A payload that passed sanitization.
#[derive(Debug, Clone, PartialEq)]
pub struct PushEvent {
    pub source_id: String,
    pub kind: PushKind,
    pub name: Option<String>,
    pub source_type: Option<String>,
    pub project: Option<String>,
    pub machine: Option<String>,
    pub state: Option<AgentState>,
    pub activity: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Serialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub ok: bool,
    pub session_id: String,
}

impl PushPayload {
    pub fn sanitize(self) -> Result<PushEvent, IngestError> {
        let source_id = self.source_id.trim();
        if !is_valid_source_id(source_id) {
            return Err(IngestError::InvalidSourceId);
        }
        let kind = PushKind::parse(self.event.trim())
            .ok_or_else(|| IngestError::UnknownEvent(truncate(&self.event, 32)))?;
        let state = match text(self.state, MAX_NAME) {
            Some(raw) => Some(
                AgentState::parse_reported(&raw).ok_or(IngestError::InvalidState(raw))?,
            ),
            None => None,
        };
        let url = match text(self.url, MAX_URL) {
            Some(url) if is_http_url(&url) => Some(url),
            Some(_) => return Err(IngestError::InvalidUrl),
            None => None,
        };

        Ok(PushEvent {
            source_id: source_id.to_string(),
            kind,
            name: text(self.source_name, MAX_NAME),
            source_type: text(self.source_type, MAX_NAME),
            project: text(self.project, MAX_PROJECT),
            machine: text(self.machine, MAX_MACHINE),
            state,
            activity: text(self.activity, MAX_ACTIVITY),
            url,
        })
    }
}

fn is_valid_source_id(id: &str) -> bool {
    !id.is_empty()
        && id.chars().count() <= MAX_SOURCE_ID
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '-'))
}

fn is_http_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    let rest = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"));
    matches!(rest, Some(host) if !host.is_empty() && !host.starts_with('/'))
        && !url.chars().any(char::is_whitespace)
}

/// Trimmed, truncated, `None` when blank.
fn text(value: Option<String>, max_chars: usize) -> Option<String> {
    let value = value?;
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| truncate(trimmed, max_chars))
}

fn truncate(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

impl PushEvent {
    /// Domain events this push maps onto. Heartbeats map to none.
    pub fn domain_events(&self, at: DateTime<Utc>) -> Vec<DomainEvent> {
        let meta = EventMeta::for_session(&self.source_id, at);
        match self.kind {
            PushKind::Start => vec![DomainEvent::session_started(meta, None, self.project.clone())],
            PushKind::Stop => vec![DomainEvent::activity(ActivityKind::Waiting, meta)],
            PushKind::Status => vec![DomainEvent::Activity {
                kind: self.state.map(activity_for_state).unwrap_or(ActivityKind::Responding),
                meta,
                detail: self.activity.clone(),
            }],
            PushKind::Error => vec![DomainEvent::Error {
                kind: Severity::Error,
                meta,
                message: self
                    .activity
                    .clone()
                    .unwrap_or_else(|| "Agent reported an error".to_string()),
            }],
            PushKind::Heartbeat => Vec::new(),
        }
    }

    fn registration(&self) -> Registration {
        let mut reg = Registration::new(&self.source_id, AgentSource::Push);
        reg.name.clone_from(&self.name);
        reg.project.clone_from(&self.project);
        reg.source_type.clone_from(&self.source_type);
        reg.machine.clone_from(&self.machine);
        reg.url.clone_from(&self.url);
        reg
    }
}

fn activity_for_state(state: AgentState) -> ActivityKind {
    match state {
        AgentState::Thinking => ActivityKind::Thinking,
        AgentState::Waiting => ActivityKind::Waiting,
        _ => ActivityKind::Responding,
    }
}

/// Apply a sanitized push to the registry and fan it out.
pub async fn apply_push(
    event: PushEvent,
    registry: &Arc<SessionRegistry>,
    hub: &BroadcastHub,
) -> ApiResult<IngestResponse> {
    let now = Utc::now();
    let id = event.source_id.clone();

    if event.kind != PushKind::Start && !registry.contains(&id).await {
        return Err(ApiError::SessionNotFound(id));
    }
    if let Some(machine) = &event.machine {
        registry.add_machine(machine).await;
    }

    match event.kind {
        PushKind::Start => {
            registry.register(event.registration(), now).await;
            for domain in event.domain_events(now) {
                crate::metrics::record_event(domain.label());
                hub.publish_event(&domain).await;
            }
            tracing::info!(session_id = %id, source_type = ?event.source_type, "Push session started");
        }
        PushKind::Heartbeat => {
            registry.touch(&id, now).await;
        }
        PushKind::Stop => {
            for domain in event.domain_events(now) {
                deliver(registry, hub, &domain).await;
            }
            registry.mark_waiting_now(&id).await;
        }
        PushKind::Status => {
            for domain in event.domain_events(now) {
                deliver(registry, hub, &domain).await;
            }
            if let Some(state) = event.state {
                registry
                    .set_reported_state(&id, state, event.activity.as_deref(), now)
                    .await;
            }
        }
        PushKind::Error => {
            for domain in event.domain_events(now) {
                deliver(registry, hub, &domain).await;
            }
        }
    }

    Ok(IngestResponse {
        ok: true,
        session_id: id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::hub::HubConfig;
    use crate::live::registry::RegistryConfig;
    use pretty_assertions::assert_eq;

    fn payload(source_id: &str, event: &str) -> PushPayload {
        PushPayload {
            source_id: source_id.into(),
            event: event.into(),
            ..Default::default()
        }
    }

    fn runtime() -> (Arc<SessionRegistry>, Arc<BroadcastHub>) {
        let registry = Arc::new(SessionRegistry::new(RegistryConfig::default()));
        let hub = Arc::new(BroadcastHub::new(Arc::clone(&registry), HubConfig::default()));
        (registry, hub)
    }

    #[test]
    fn test_source_id_rules() {
        assert!(payload("cursor:abc-1.2_x", "start").sanitize().is_ok());
        assert_eq!(payload("", "start").sanitize(), Err(IngestError::InvalidSourceId));
        assert_eq!(payload("has space", "start").sanitize(), Err(IngestError::InvalidSourceId));
        assert_eq!(payload("a/b", "start").sanitize(), Err(IngestError::InvalidSourceId));
        assert_eq!(
            payload(&"x".repeat(129), "start").sanitize(),
            Err(IngestError::InvalidSourceId)
        );
        assert!(payload(&"x".repeat(128), "start").sanitize().is_ok());
    }

    #[test]
    fn test_unknown_event_and_state_rejected() {
        assert!(matches!(
            payload("a", "explode").sanitize(),
            Err(IngestError::UnknownEvent(_))
        ));
        let mut p = payload("a", "status");
        p.state = Some("leaving".into());
        assert_eq!(p.sanitize(), Err(IngestError::InvalidState("leaving".into())));
    }

    #[test]
    fn test_url_scheme_validation() {
        for (url, ok) in [
            ("https://example.com/x", true),
            ("HTTP://host:8080", true),
            ("javascript:alert(1)", false),
            ("file:///etc/passwd", false),
            ("https://", false),
            ("http://exa mple.com", false),
        ] {
            let mut p = payload("a", "start");
            p.url = Some(url.into());
            assert_eq!(p.sanitize().is_ok(), ok, "{url}");
        }
    }

    #[test]
    fn test_free_text_truncated_and_blank_dropped() {
        let mut p = payload("a", "start");
        p.source_name = Some("n".repeat(100));
        p.project = Some("p".repeat(300));
        p.activity = Some("a".repeat(500));
        p.machine = Some("   ".into());
        let ev = p.sanitize().unwrap();
        assert_eq!(ev.name.unwrap().chars().count(), 64);
        assert_eq!(ev.project.unwrap().chars().count(), 128);
        assert_eq!(ev.activity.unwrap().chars().count(), 200);
        assert_eq!(ev.machine, None);
    }

    #[test]
    fn test_domain_event_mapping() {
        let at = Utc::now();
        let start = payload("a", "start").sanitize().unwrap();
        assert!(start.domain_events(at)[0].is_session_started());

        let stop = payload("a", "stop").sanitize().unwrap();
        assert!(stop.domain_events(at)[0].is_waiting_signal());

        let hb = payload("a", "heartbeat").sanitize().unwrap();
        assert!(hb.domain_events(at).is_empty());

        let mut err = payload("a", "error");
        err.activity = Some("quota exceeded".into());
        match &err.sanitize().unwrap().domain_events(at)[0] {
            DomainEvent::Error { kind, message, .. } => {
                assert_eq!(*kind, Severity::Error);
                assert_eq!(message, "quota exceeded");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_start_for_unknown_session_is_not_found() {
        let (registry, hub) = runtime();
        let ev = payload("ghost", "status").sanitize().unwrap();
        let err = apply_push(ev, &registry, &hub).await.unwrap_err();
        assert!(matches!(err, ApiError::SessionNotFound(id) if id == "ghost"));
    }

    #[tokio::test]
    async fn test_start_status_stop_flow() {
        let (registry, hub) = runtime();
        let mut start = payload("ext-1", "start");
        start.source_name = Some("Cursor".into());
        start.machine = Some("laptop".into());
        apply_push(start.sanitize().unwrap(), &registry, &hub).await.unwrap();

        let record = registry.get("ext-1").await.unwrap();
        assert_eq!(record.name, "Cursor");
        assert_eq!(record.source, AgentSource::Push);

        let mut status = payload("ext-1", "status");
        status.state = Some("working".into());
        status.activity = Some("Refactoring".into());
        apply_push(status.sanitize().unwrap(), &registry, &hub).await.unwrap();
        let record = registry.get("ext-1").await.unwrap();
        assert_eq!(record.state, AgentState::Working);
        assert_eq!(record.activity, "Refactoring");

        apply_push(payload("ext-1", "stop").sanitize().unwrap(), &registry, &hub)
            .await
            .unwrap();
        let record = registry.get("ext-1").await.unwrap();
        assert_eq!(record.state, AgentState::Waiting);
        assert!(record.waiting_for_human);

        // Heartbeat keeps the flag.
        apply_push(payload("ext-1", "heartbeat").sanitize().unwrap(), &registry, &hub)
            .await
            .unwrap();
        assert!(registry.get("ext-1").await.unwrap().waiting_for_human);

        assert!(registry.snapshot().await.machines.contains(&"laptop".to_string()));
    }

    #[tokio::test]
    async fn test_error_push_moves_to_error() {
        let (registry, hub) = runtime();
        apply_push(payload("e", "start").sanitize().unwrap(), &registry, &hub)
            .await
            .unwrap();
        apply_push(payload("e", "error").sanitize().unwrap(), &registry, &hub)
            .await
            .unwrap();
        let record = registry.get("e").await.unwrap();
        assert_eq!(record.state, AgentState::Error);
        assert_eq!(record.activity, "Agent reported an error");
    }
}
