//! Agent record types exposed to subscribers.

use agent_office_core::ToolCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Discrete agent state. `Working` is the provider-specific state used by
/// push-driven agents that report no finer detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Entering,
    Coding,
    Reading,
    Thinking,
    Terminal,
    Searching,
    Cooling,
    Delegating,
    Waiting,
    Error,
    Idle,
    Leaving,
    Working,
}

impl AgentState {
    pub fn from_tool(category: ToolCategory) -> Self {
        match category {
            ToolCategory::Terminal => Self::Terminal,
            ToolCategory::Searching => Self::Searching,
            ToolCategory::Reading => Self::Reading,
            ToolCategory::Delegating => Self::Delegating,
            ToolCategory::Thinking => Self::Thinking,
            ToolCategory::Coding => Self::Coding,
        }
    }

    /// States a push producer may report explicitly.
    pub fn parse_reported(raw: &str) -> Option<Self> {
        Some(match raw {
            "working" => Self::Working,
            "coding" => Self::Coding,
            "reading" => Self::Reading,
            "thinking" => Self::Thinking,
            "terminal" => Self::Terminal,
            "searching" => Self::Searching,
            "delegating" => Self::Delegating,
            "waiting" => Self::Waiting,
            "error" => Self::Error,
            "idle" => Self::Idle,
            _ => return None,
        })
    }

    pub fn location(self) -> Location {
        match self {
            Self::Entering | Self::Leaving => Location::Door,
            Self::Thinking => Location::Whiteboard,
            Self::Terminal => Location::Terminal,
            Self::Reading | Self::Searching => Location::Library,
            Self::Cooling | Self::Idle => Location::CoffeeStation,
            Self::Coding | Self::Delegating | Self::Waiting | Self::Error | Self::Working => Location::Desk,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "snake_case")]
pub enum Location {
    Desk,
    CommonArea,
    Whiteboard,
    Terminal,
    Library,
    CoffeeStation,
    Door,
}

/// Tile coordinates in the office floor plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

const DESKS_PER_ROW: usize = 4;

impl Position {
    /// Where an agent stands for `location`. A desk location without a slot
    /// resolves to the common area.
    pub fn of(location: Location, desk: Option<usize>) -> Self {
        match (location, desk) {
            (Location::Desk, Some(slot)) => Self {
                x: 2 + 3 * (slot % DESKS_PER_ROW) as i32,
                y: 3 + 3 * (slot / DESKS_PER_ROW) as i32,
            },
            (Location::Desk, None) | (Location::CommonArea, _) => Self { x: 9, y: 11 },
            (Location::Whiteboard, _) => Self { x: 1, y: 1 },
            (Location::Terminal, _) => Self { x: 15, y: 2 },
            (Location::Library, _) => Self { x: 15, y: 8 },
            (Location::CoffeeStation, _) => Self { x: 6, y: 13 },
            (Location::Door, _) => Self { x: 0, y: 13 },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "snake_case")]
pub enum AgentSource {
    File,
    Push,
}

/// One tracked session, as seen by subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    pub id: String,
    pub name: String,
    pub state: AgentState,
    pub location: Location,
    pub position: Position,
    pub target: Position,
    pub desk: Option<usize>,
    pub activity: String,
    pub project: Option<String>,
    pub waiting_for_human: bool,
    pub parent_id: Option<String>,
    pub child_ids: Vec<String>,
    pub source: AgentSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub last_event_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub state_changed_at: DateTime<Utc>,
    /// Whether the most recent event was a waiting signal.
    #[serde(skip)]
    #[ts(skip)]
    pub(crate) last_event_waiting: bool,
}

impl AgentRecord {
    pub fn new(id: &str, source: AgentSource, desk: Option<usize>, at: DateTime<Utc>) -> Self {
        let state = AgentState::Entering;
        let location = state.location();
        let door = Position::of(location, desk);
        Self {
            id: id.to_string(),
            name: short_name(id),
            state,
            location,
            position: door,
            target: door,
            desk,
            activity: "Arriving".to_string(),
            project: None,
            waiting_for_human: false,
            parent_id: None,
            child_ids: Vec::new(),
            source,
            source_type: None,
            machine: None,
            url: None,
            summary: None,
            created_at: at,
            last_event_at: at,
            state_changed_at: at,
            last_event_waiting: false,
        }
    }

    /// Move to `state`, retargeting the walk destination.
    pub fn transition(&mut self, state: AgentState, at: DateTime<Utc>) {
        if self.state != state {
            self.state = state;
            self.state_changed_at = at;
        }
        let location = match (state.location(), self.desk) {
            (Location::Desk, None) => Location::CommonArea,
            (loc, _) => loc,
        };
        self.location = location;
        self.position = self.target;
        self.target = Position::of(location, self.desk);
    }

    /// Record that an event arrived. Any event clears the waiting flag.
    pub fn touch(&mut self, at: DateTime<Utc>, waiting_signal: bool) {
        self.last_event_at = self.last_event_at.max(at);
        self.last_event_waiting = waiting_signal;
        self.waiting_for_human = false;
    }

    pub fn is_departing(&self) -> bool {
        self.state == AgentState::Leaving
    }
}

/// Display name derived from a session id: the first 8 chars.
pub fn short_name(id: &str) -> String {
    id.chars().take(8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_new_record_is_entering_at_door() {
        let r = AgentRecord::new("0123456789abcdef", AgentSource::File, Some(2), Utc::now());
        assert_eq!(r.state, AgentState::Entering);
        assert_eq!(r.location, Location::Door);
        assert_eq!(r.name, "01234567");
        assert!(!r.waiting_for_human);
    }

    #[test]
    fn test_transition_targets_own_desk() {
        let mut r = AgentRecord::new("s", AgentSource::File, Some(5), Utc::now());
        r.transition(AgentState::Terminal, Utc::now());
        assert_eq!(r.location, Location::Terminal);
        r.transition(AgentState::Coding, Utc::now());
        assert_eq!(r.location, Location::Desk);
        assert_eq!(r.target, Position::of(Location::Desk, Some(5)));
        assert_eq!(r.position, Position::of(Location::Terminal, None));
    }

    #[test]
    fn test_deskless_agent_uses_common_area() {
        let mut r = AgentRecord::new("s", AgentSource::File, None, Utc::now());
        r.transition(AgentState::Coding, Utc::now());
        assert_eq!(r.location, Location::CommonArea);
    }

    #[test]
    fn test_state_changed_at_only_moves_on_change() {
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::seconds(5);
        let mut r = AgentRecord::new("s", AgentSource::File, None, t0);
        r.transition(AgentState::Entering, t1);
        assert_eq!(r.state_changed_at, t0);
        r.transition(AgentState::Thinking, t1);
        assert_eq!(r.state_changed_at, t1);
    }

    #[test]
    fn test_touch_clears_waiting_and_is_monotonic() {
        let t0 = Utc::now();
        let mut r = AgentRecord::new("s", AgentSource::Push, None, t0);
        r.waiting_for_human = true;
        r.touch(t0 - chrono::Duration::seconds(30), false);
        assert!(!r.waiting_for_human);
        assert_eq!(r.last_event_at, t0);
    }

    #[test]
    fn test_reported_state_allow_list() {
        assert_eq!(AgentState::parse_reported("working"), Some(AgentState::Working));
        assert_eq!(AgentState::parse_reported("leaving"), None);
        assert_eq!(AgentState::parse_reported("WORKING"), None);
        assert_eq!(AgentState::parse_reported("<script>"), None);
    }

    #[test]
    fn test_record_serializes_camel_case_without_internal_flag() {
        let r = AgentRecord::new("s", AgentSource::File, Some(0), Utc::now());
        let json = serde_json::to_value(&r).unwrap();
        assert!(json.get("waitingForHuman").is_some());
        assert!(json.get("childIds").is_some());
        assert!(json.get("lastEventWaiting").is_none());
        assert_eq!(json["state"], "entering");
        assert_eq!(json["source"], "file");
    }
}
