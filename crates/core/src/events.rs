// crates/core/src/events.rs
//! Domain events: the closed vocabulary every producer (log normalizer,
//! push ingress) emits and every consumer (registry, hub) matches on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Identity and time shared by every event variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct EventMeta {
    pub session_id: String,
    pub agent_id: String,
    #[ts(type = "string")]
    pub timestamp: DateTime<Utc>,
}

impl EventMeta {
    pub fn new(session_id: impl Into<String>, agent_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.into(),
            agent_id: agent_id.into(),
            timestamp,
        }
    }

    /// Meta for a session whose agent id is the session id itself.
    pub fn for_session(session_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        let session_id = session_id.into();
        Self {
            agent_id: session_id.clone(),
            session_id,
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Started,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Thinking,
    Responding,
    Waiting,
    UserPrompt,
    #[serde(rename = "needsApproval")]
    NeedsApproval,
    Compacting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Started,
    Completed,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Spawned,
    Completed,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

/// A normalized unit of agent activity.
///
/// Serialized tagged by `type` with a `kind` discriminant inside each
/// variant, e.g. `{"type":"tool","kind":"started","sessionId":..}`.
/// Events are immutable once emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Session {
        kind: SessionKind,
        #[serde(flatten)]
        meta: EventMeta,
        #[serde(rename = "parentSessionId", default, skip_serializing_if = "Option::is_none")]
        parent_session_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        project: Option<String>,
    },
    Activity {
        kind: ActivityKind,
        #[serde(flatten)]
        meta: EventMeta,
        /// Short sanitized text supplied by push producers.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    Tool {
        kind: ToolKind,
        #[serde(flatten)]
        meta: EventMeta,
        tool: String,
        #[serde(rename = "toolUseId")]
        tool_use_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<String>,
    },
    Agent {
        kind: AgentKind,
        #[serde(flatten)]
        meta: EventMeta,
        name: String,
        #[serde(rename = "toolUseId")]
        tool_use_id: String,
    },
    Error {
        kind: Severity,
        #[serde(flatten)]
        meta: EventMeta,
        message: String,
    },
    Summary {
        #[serde(flatten)]
        meta: EventMeta,
        summary: String,
    },
}

impl DomainEvent {
    pub fn meta(&self) -> &EventMeta {
        match self {
            Self::Session { meta, .. }
            | Self::Activity { meta, .. }
            | Self::Tool { meta, .. }
            | Self::Agent { meta, .. }
            | Self::Error { meta, .. }
            | Self::Summary { meta, .. } => meta,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.meta().session_id
    }

    pub fn agent_id(&self) -> &str {
        &self.meta().agent_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.meta().timestamp
    }

    /// True for the activity signals that arm the waiting-for-human detector.
    pub fn is_waiting_signal(&self) -> bool {
        matches!(
            self,
            Self::Activity {
                kind: ActivityKind::Waiting | ActivityKind::NeedsApproval,
                ..
            }
        )
    }

    pub fn is_session_started(&self) -> bool {
        matches!(self, Self::Session { kind: SessionKind::Started, .. })
    }

    /// Stable `type.kind` label, used for metrics and log fields.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Session { kind: SessionKind::Started, .. } => "session.started",
            Self::Session { kind: SessionKind::Ended, .. } => "session.ended",
            Self::Activity { kind, .. } => match kind {
                ActivityKind::Thinking => "activity.thinking",
                ActivityKind::Responding => "activity.responding",
                ActivityKind::Waiting => "activity.waiting",
                ActivityKind::UserPrompt => "activity.user_prompt",
                ActivityKind::NeedsApproval => "activity.needs_approval",
                ActivityKind::Compacting => "activity.compacting",
            },
            Self::Tool { kind: ToolKind::Started, .. } => "tool.started",
            Self::Tool { kind: ToolKind::Completed, .. } => "tool.completed",
            Self::Tool { kind: ToolKind::Error, .. } => "tool.error",
            Self::Agent { kind: AgentKind::Spawned, .. } => "agent.spawned",
            Self::Agent { kind: AgentKind::Completed, .. } => "agent.completed",
            Self::Agent { kind: AgentKind::Error, .. } => "agent.error",
            Self::Error { kind: Severity::Warning, .. } => "error.warning",
            Self::Error { kind: Severity::Error, .. } => "error.error",
            Self::Summary { .. } => "summary",
        }
    }

    pub fn session_started(meta: EventMeta, parent_session_id: Option<String>, project: Option<String>) -> Self {
        Self::Session {
            kind: SessionKind::Started,
            meta,
            parent_session_id,
            project,
        }
    }

    pub fn session_ended(meta: EventMeta) -> Self {
        Self::Session {
            kind: SessionKind::Ended,
            meta,
            parent_session_id: None,
            project: None,
        }
    }

    pub fn activity(kind: ActivityKind, meta: EventMeta) -> Self {
        Self::Activity {
            kind,
            meta,
            detail: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn meta() -> EventMeta {
        EventMeta::for_session("s1", Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap())
    }

    #[test]
    fn test_tool_event_wire_shape() {
        let event = DomainEvent::Tool {
            kind: ToolKind::Started,
            meta: meta(),
            tool: "Bash".into(),
            tool_use_id: "t1".into(),
            context: Some("Run tests".into()),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "tool",
                "kind": "started",
                "sessionId": "s1",
                "agentId": "s1",
                "timestamp": "2026-03-01T12:00:00Z",
                "tool": "Bash",
                "toolUseId": "t1",
                "context": "Run tests",
            })
        );
    }

    #[test]
    fn test_activity_kinds_serialize() {
        let json = serde_json::to_value(DomainEvent::activity(ActivityKind::UserPrompt, meta())).unwrap();
        assert_eq!(json["type"], "activity");
        assert_eq!(json["kind"], "user_prompt");
        assert!(json.get("detail").is_none());

        let json = serde_json::to_value(DomainEvent::activity(ActivityKind::NeedsApproval, meta())).unwrap();
        assert_eq!(json["kind"], "needsApproval");
    }

    #[test]
    fn test_session_event_deserializes() {
        let raw = r#"{"type":"session","kind":"started","sessionId":"c","agentId":"c",
            "timestamp":"2026-03-01T12:00:00Z","parentSessionId":"p"}"#;
        let event: DomainEvent = serde_json::from_str(raw).unwrap();
        assert!(event.is_session_started());
        assert_eq!(event.session_id(), "c");
        match event {
            DomainEvent::Session { parent_session_id, project, .. } => {
                assert_eq!(parent_session_id.as_deref(), Some("p"));
                assert_eq!(project, None);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_waiting_signal() {
        assert!(DomainEvent::activity(ActivityKind::Waiting, meta()).is_waiting_signal());
        assert!(DomainEvent::activity(ActivityKind::NeedsApproval, meta()).is_waiting_signal());
        assert!(!DomainEvent::activity(ActivityKind::Thinking, meta()).is_waiting_signal());
        assert!(!DomainEvent::session_ended(meta()).is_waiting_signal());
    }

    #[test]
    fn test_labels() {
        assert_eq!(DomainEvent::session_ended(meta()).label(), "session.ended");
        let err = DomainEvent::Error {
            kind: Severity::Warning,
            meta: meta(),
            message: "rate limited".into(),
        };
        assert_eq!(err.label(), "error.warning");
    }
}
