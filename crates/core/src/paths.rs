// crates/core/src/paths.rs
//! Session log path classification.
//!
//! Two shapes are accepted relative to the watch root:
//! `<project>/<sessionId>.<ext>` and
//! `<project>/<parentId>/subagents/<childId>.<ext>`.

use std::path::{Path, PathBuf};

const SUBAGENTS_DIR: &str = "subagents";

/// Default watch root: `~/.claude/projects`.
pub fn default_projects_root() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".claude").join("projects"))
}

/// Identity derived from a session log's location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPath {
    pub session_id: String,
    pub project: String,
    pub parent_session_id: Option<String>,
}

impl SessionPath {
    pub fn is_subagent(&self) -> bool {
        self.parent_session_id.is_some()
    }

    /// Agent id for lines from this file. Same as the session id.
    pub fn agent_id(&self) -> &str {
        &self.session_id
    }
}

/// Unify separators so Windows-style paths classify the same way.
fn normalize(path: &str) -> String {
    path.replace('\\', "/")
}

/// Classify `path` as a session log under `root`, or `None` if it is not one.
///
/// `extension` is compared without the leading dot. Files whose stem equals
/// `history_stem` are always rejected.
pub fn classify_session_path(
    root: &Path,
    path: &Path,
    extension: &str,
    history_stem: &str,
) -> Option<SessionPath> {
    let root = normalize(&root.to_string_lossy());
    let path = normalize(&path.to_string_lossy());
    let root = root.trim_end_matches('/');

    let relative = path.strip_prefix(root)?.strip_prefix('/')?;
    let parts: Vec<&str> = relative.split('/').filter(|p| !p.is_empty()).collect();

    let (project, parent, file) = match parts.as_slice() {
        [project, file] => (*project, None, *file),
        [project, parent, dir, file] if *dir == SUBAGENTS_DIR => (*project, Some(*parent), *file),
        _ => return None,
    };

    let (stem, ext) = file.rsplit_once('.')?;
    if ext != extension || stem.is_empty() || stem == history_stem {
        return None;
    }

    Some(SessionPath {
        session_id: stem.to_string(),
        project: project.to_string(),
        parent_session_id: parent.map(str::to_string),
    })
}
