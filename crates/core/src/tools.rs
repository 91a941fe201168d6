// crates/core/src/tools.rs
//! Tool-name classification and the context allow-list.
//!
//! Context is a hard allow-list: each tool family may surface exactly one
//! kind of field, and unknown tools surface nothing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Max chars kept for a context string.
pub const MAX_CONTEXT_CHARS: usize = 60;

/// Where a tool invocation sends the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Terminal,
    Searching,
    Reading,
    Delegating,
    Thinking,
    Coding,
}

impl ToolCategory {
    /// Human-readable activity line built from the sanitized context only.
    pub fn activity_text(self, context: Option<&str>) -> String {
        match (self, context) {
            (Self::Terminal, Some(c)) => format!("Running: {c}"),
            (Self::Terminal, None) => "Running a command".to_string(),
            (Self::Searching, Some(c)) => format!("Searching for {c}"),
            (Self::Searching, None) => "Searching".to_string(),
            (Self::Reading, Some(c)) => format!("Reading {c}"),
            (Self::Reading, None) => "Reading files".to_string(),
            (Self::Delegating, Some(c)) => format!("Delegating: {c}"),
            (Self::Delegating, None) => "Delegating to a sub-agent".to_string(),
            (Self::Thinking, _) => "Planning".to_string(),
            (Self::Coding, Some(c)) => format!("Editing {c}"),
            (Self::Coding, None) => "Writing code".to_string(),
        }
    }
}

/// Classify a tool name. Unknown tools are `Coding`.
pub fn classify_tool(name: &str) -> ToolCategory {
    let lower = name.to_ascii_lowercase();
    let lower = lower.as_str();

    if matches!(lower, "task" | "agent") || lower.contains("subagent") || lower.starts_with("delegate") {
        return ToolCategory::Delegating;
    }
    if lower.contains("todo") || lower.contains("planmode") || lower.starts_with("task") || lower == "think" {
        return ToolCategory::Thinking;
    }
    if lower == "bash"
        || lower.contains("shell")
        || lower.contains("terminal")
        || lower.contains("command")
        || lower.starts_with("bash")
    {
        return ToolCategory::Terminal;
    }
    if matches!(lower, "grep" | "glob" | "ls")
        || lower.contains("search")
        || lower.contains("grep")
        || lower.contains("glob")
        || lower.contains("fetch")
    {
        return ToolCategory::Searching;
    }
    if lower.contains("read") || lower == "view" {
        return ToolCategory::Reading;
    }
    ToolCategory::Coding
}

/// Which single input field family a tool may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContextRule {
    FileName,
    Description,
    Pattern,
    Delegate,
    Nothing,
}

fn context_rule(name: &str) -> ContextRule {
    let lower = name.to_ascii_lowercase();
    match classify_tool(name) {
        ToolCategory::Terminal => ContextRule::Description,
        ToolCategory::Searching => ContextRule::Pattern,
        ToolCategory::Delegating => ContextRule::Delegate,
        ToolCategory::Thinking => ContextRule::Nothing,
        ToolCategory::Reading | ToolCategory::Coding
            if lower.contains("read") || lower.contains("write") || lower.contains("edit") =>
        {
            ContextRule::FileName
        }
        _ => ContextRule::Nothing,
    }
}

fn str_field<'a>(input: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| input.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
}

/// Basename of a path, accepting either separator.
pub fn base_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).find(|s| !s.is_empty()).unwrap_or(path)
}

/// Collapse whitespace and cap at [`MAX_CONTEXT_CHARS`] chars.
pub fn clip(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let mut out: String = collapsed.chars().take(max_chars.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

/// Extract the allow-listed context sliver for a tool invocation.
pub fn extract_context(tool: &str, input: &Value) -> Option<String> {
    let raw = match context_rule(tool) {
        ContextRule::FileName => {
            str_field(input, &["file_path", "notebook_path", "path"]).map(base_name)
        }
        ContextRule::Description => str_field(input, &["description"]),
        ContextRule::Pattern => str_field(input, &["pattern", "query"]),
        ContextRule::Delegate => str_field(input, &["description", "name", "subagent_type"]),
        ContextRule::Nothing => None,
    }?;
    Some(clip(raw, MAX_CONTEXT_CHARS))
}

/// Display name for a sub-agent spawned by a delegation tool.
pub fn delegate_name(input: &Value) -> String {
    str_field(input, &["subagent_type", "name", "description"])
        .map(|s| clip(s, MAX_CONTEXT_CHARS))
        .unwrap_or_else(|| "sub-agent".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_known_tools() {
        assert_eq!(classify_tool("Bash"), ToolCategory::Terminal);
        assert_eq!(classify_tool("BashOutput"), ToolCategory::Terminal);
        assert_eq!(classify_tool("Grep"), ToolCategory::Searching);
        assert_eq!(classify_tool("Glob"), ToolCategory::Searching);
        assert_eq!(classify_tool("WebSearch"), ToolCategory::Searching);
        assert_eq!(classify_tool("WebFetch"), ToolCategory::Searching);
        assert_eq!(classify_tool("Read"), ToolCategory::Reading);
        assert_eq!(classify_tool("NotebookRead"), ToolCategory::Reading);
        assert_eq!(classify_tool("Task"), ToolCategory::Delegating);
        assert_eq!(classify_tool("Agent"), ToolCategory::Delegating);
        assert_eq!(classify_tool("TodoWrite"), ToolCategory::Thinking);
        assert_eq!(classify_tool("ExitPlanMode"), ToolCategory::Thinking);
        assert_eq!(classify_tool("TaskCreate"), ToolCategory::Thinking);
        assert_eq!(classify_tool("Edit"), ToolCategory::Coding);
        assert_eq!(classify_tool("Write"), ToolCategory::Coding);
        assert_eq!(classify_tool("mcp__custom__frobnicate"), ToolCategory::Coding);
    }

    #[test]
    fn test_file_tools_yield_basename_only() {
        let input = json!({"file_path": "/home/dev/secret/project/src/lib.rs", "content": "fn x() {}"});
        assert_eq!(extract_context("Write", &input).as_deref(), Some("lib.rs"));
        assert_eq!(extract_context("Read", &input).as_deref(), Some("lib.rs"));
        let input = json!({"file_path": r"C:\repo\main.rs", "old_string": "a", "new_string": "b"});
        assert_eq!(extract_context("Edit", &input).as_deref(), Some("main.rs"));
    }

    #[test]
    fn test_shell_yields_description_never_command() {
        let input = json!({"command": "curl -H 'Authorization: secret' x", "description": "Fetch status"});
        assert_eq!(extract_context("Bash", &input).as_deref(), Some("Fetch status"));

        let input = json!({"command": "rm -rf /tmp/x"});
        assert_eq!(extract_context("Bash", &input), None);
    }

    #[test]
    fn test_search_yields_pattern() {
        let input = json!({"pattern": "fn main", "path": "/secret/dir"});
        assert_eq!(extract_context("Grep", &input).as_deref(), Some("fn main"));
        let input = json!({"query": "tokio select", "allowed_domains": ["x"]});
        assert_eq!(extract_context("WebSearch", &input).as_deref(), Some("tokio select"));
        let input = json!({"url": "https://internal.example/token=abc", "prompt": "summarize"});
        assert_eq!(extract_context("WebFetch", &input), None);
    }

    #[test]
    fn test_delegation_yields_agent_fields() {
        let input = json!({"description": "Explore auth flow", "prompt": "long private prompt", "subagent_type": "Explore"});
        assert_eq!(extract_context("Task", &input).as_deref(), Some("Explore auth flow"));
        assert_eq!(delegate_name(&input), "Explore");
        assert_eq!(delegate_name(&json!({"prompt": "x"})), "sub-agent");
    }

    #[test]
    fn test_unknown_tools_leak_nothing() {
        let input = json!({"file_path": "/a/b.rs", "description": "d", "pattern": "p", "api_key": "k"});
        assert_eq!(extract_context("mcp__db__query_rows", &input), None);
        assert_eq!(extract_context("TodoWrite", &json!({"todos": [{"content": "secret"}]})), None);
    }

    #[test]
    fn test_context_is_clipped() {
        let long = "x".repeat(200);
        let ctx = extract_context("Grep", &json!({"pattern": long})).unwrap();
        assert_eq!(ctx.chars().count(), MAX_CONTEXT_CHARS);
        assert!(ctx.ends_with("..."));
        assert_eq!(clip("a\n  b\tc", 60), "a b c");
    }

    #[test]
    fn test_activity_text() {
        assert_eq!(ToolCategory::Reading.activity_text(Some("lib.rs")), "Reading lib.rs");
        assert_eq!(ToolCategory::Terminal.activity_text(None), "Running a command");
        assert_eq!(ToolCategory::Thinking.activity_text(Some("ignored")), "Planning");
    }
}
