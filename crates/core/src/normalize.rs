// crates/core/src/normalize.rs
//! Raw log line -> domain events.
//!
//! Lines are best-effort telemetry: anything unparsable yields no events.
//! Tool names are correlated across the invocation and its result through a
//! [`ToolUseCache`] owned by the normalizer instance.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::events::{ActivityKind, AgentKind, DomainEvent, EventMeta, Severity, ToolKind};
use crate::tools::{classify_tool, clip, delegate_name, extract_context, ToolCategory};

/// Label used when a result arrives for an invocation we never saw.
pub const UNKNOWN_TOOL: &str = "unknown_tool";

const MAX_MESSAGE_CHARS: usize = 200;
const MAX_SUMMARY_CHARS: usize = 200;

/// Owning session/agent for a raw line.
#[derive(Debug, Clone, Copy)]
pub struct LineContext<'a> {
    pub session_id: &'a str,
    pub agent_id: &'a str,
}

#[derive(Debug, Clone)]
struct CachedTool {
    name: String,
    /// Set for delegation tools so the result can close the sub-agent.
    agent_name: Option<String>,
}

/// tool_use id -> tool name, written on invocation, taken on result.
#[derive(Debug, Default)]
pub struct ToolUseCache {
    entries: HashMap<String, CachedTool>,
}

impl ToolUseCache {
    fn insert(&mut self, tool_use_id: &str, tool: CachedTool) {
        self.entries.insert(tool_use_id.to_string(), tool);
    }

    fn take(&mut self, tool_use_id: &str) -> Option<CachedTool> {
        self.entries.remove(tool_use_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Debug, Default)]
pub struct EventNormalizer {
    cache: ToolUseCache,
}

impl EventNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache(&self) -> &ToolUseCache {
        &self.cache
    }

    /// Drop every pending correlation. Called on shutdown.
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    /// Parse one raw line into zero or more domain events.
    pub fn normalize(&mut self, line: &str, ctx: &LineContext<'_>) -> Vec<DomainEvent> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }
        let record: Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(e) => {
                tracing::trace!(session_id = ctx.session_id, error = %e, "dropping unparsable line");
                return Vec::new();
            }
        };

        let meta = EventMeta::new(ctx.session_id, ctx.agent_id, record_timestamp(&record));
        let record_type = record.get("type").and_then(Value::as_str).unwrap_or("");
        let role = record
            .get("message")
            .and_then(|m| m.get("role"))
            .and_then(Value::as_str)
            .unwrap_or(record_type);

        match (record_type, role) {
            ("summary", _) => summary_events(&record, meta),
            ("system", _) => system_events(&record, meta),
            (_, "assistant") => self.assistant_events(&record, meta),
            (_, "user") => self.user_events(&record, meta),
            _ => Vec::new(),
        }
    }

    fn assistant_events(&mut self, record: &Value, meta: EventMeta) -> Vec<DomainEvent> {
        let message = record.get("message");
        let mut events = Vec::new();

        if record.get("isApiErrorMessage").and_then(Value::as_bool) == Some(true) {
            let text = message
                .and_then(|m| m.get("content"))
                .map(first_text)
                .unwrap_or_default();
            events.push(DomainEvent::Error {
                kind: Severity::Error,
                meta,
                message: clip(&text, MAX_MESSAGE_CHARS),
            });
            return events;
        }

        match message.and_then(|m| m.get("content")) {
            Some(Value::String(s)) if !s.trim().is_empty() => {
                events.push(DomainEvent::activity(ActivityKind::Responding, meta.clone()));
            }
            Some(Value::Array(blocks)) => {
                for block in blocks {
                    self.assistant_block(block, &meta, &mut events);
                }
            }
            _ => {}
        }

        let stop_reason = message
            .and_then(|m| m.get("stop_reason"))
            .and_then(Value::as_str);
        if stop_reason == Some("end_turn") {
            events.push(DomainEvent::activity(ActivityKind::Waiting, meta));
        }
        events
    }

    fn assistant_block(&mut self, block: &Value, meta: &EventMeta, events: &mut Vec<DomainEvent>) {
        match block.get("type").and_then(Value::as_str) {
            Some("thinking") | Some("redacted_thinking") => {
                events.push(DomainEvent::activity(ActivityKind::Thinking, meta.clone()));
            }
            Some("text") => {
                events.push(DomainEvent::activity(ActivityKind::Responding, meta.clone()));
            }
            Some("tool_use") => {
                let Some(id) = block.get("id").and_then(Value::as_str) else {
                    return;
                };
                let name = block
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or(UNKNOWN_TOOL)
                    .to_string();
                let input = block.get("input").cloned().unwrap_or(Value::Null);
                let agent_name = (classify_tool(&name) == ToolCategory::Delegating)
                    .then(|| delegate_name(&input));

                events.push(DomainEvent::Tool {
                    kind: ToolKind::Started,
                    meta: meta.clone(),
                    context: extract_context(&name, &input),
                    tool: name.clone(),
                    tool_use_id: id.to_string(),
                });
                if let Some(agent) = &agent_name {
                    events.push(DomainEvent::Agent {
                        kind: AgentKind::Spawned,
                        meta: meta.clone(),
                        name: agent.clone(),
                        tool_use_id: id.to_string(),
                    });
                }
                self.cache.insert(id, CachedTool { name, agent_name });
            }
            _ => {}
        }
    }

    fn user_events(&mut self, record: &Value, meta: EventMeta) -> Vec<DomainEvent> {
        if record.get("isMeta").and_then(Value::as_bool) == Some(true) {
            return Vec::new();
        }
        let content = record.get("message").and_then(|m| m.get("content"));

        let results: Vec<&Value> = match content {
            Some(Value::Array(blocks)) => blocks
                .iter()
                .filter(|b| b.get("type").and_then(Value::as_str) == Some("tool_result"))
                .collect(),
            _ => Vec::new(),
        };

        if results.is_empty() {
            return match content {
                Some(Value::String(s)) if s.trim().is_empty() => Vec::new(),
                Some(Value::Array(blocks)) if blocks.is_empty() => Vec::new(),
                Some(_) => vec![DomainEvent::activity(ActivityKind::UserPrompt, meta)],
                None => Vec::new(),
            };
        }

        let mut events = Vec::with_capacity(results.len());
        for block in results {
            let id = block
                .get("tool_use_id")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let is_error = block.get("is_error").and_then(Value::as_bool) == Some(true);
            let cached = self.cache.take(id);
            let (tool, agent_name) = match cached {
                Some(c) => (c.name, c.agent_name),
                None => (UNKNOWN_TOOL.to_string(), None),
            };

            events.push(DomainEvent::Tool {
                kind: if is_error { ToolKind::Error } else { ToolKind::Completed },
                meta: meta.clone(),
                tool,
                tool_use_id: id.to_string(),
                context: None,
            });
            if let Some(name) = agent_name {
                events.push(DomainEvent::Agent {
                    kind: if is_error { AgentKind::Error } else { AgentKind::Completed },
                    meta: meta.clone(),
                    name,
                    tool_use_id: id.to_string(),
                });
            }
        }
        events
    }
}

fn summary_events(record: &Value, meta: EventMeta) -> Vec<DomainEvent> {
    let summary = record
        .get("summary")
        .and_then(Value::as_str)
        .map(|s| clip(s, MAX_SUMMARY_CHARS))
        .unwrap_or_default();
    vec![DomainEvent::Summary { meta, summary }]
}

fn system_events(record: &Value, meta: EventMeta) -> Vec<DomainEvent> {
    if record.get("subtype").and_then(Value::as_str) == Some("compact_boundary") {
        return vec![DomainEvent::activity(ActivityKind::Compacting, meta)];
    }
    let kind = match record.get("level").and_then(Value::as_str) {
        Some("error") => Severity::Error,
        Some("warning") => Severity::Warning,
        _ => return Vec::new(),
    };
    let message = record
        .get("content")
        .map(first_text)
        .unwrap_or_default();
    vec![DomainEvent::Error {
        kind,
        meta,
        message: clip(&message, MAX_MESSAGE_CHARS),
    }]
}

/// First text found in a string or an array of text blocks.
fn first_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(blocks) => blocks
            .iter()
            .find_map(|b| b.get("text").and_then(Value::as_str))
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    }
}

fn record_timestamp(record: &Value) -> DateTime<Utc> {
    record
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}
