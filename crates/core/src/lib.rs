// crates/core/src/lib.rs
pub mod error;
pub mod events;
pub mod normalize;
pub mod paths;
pub mod tools;

pub use error::*;
pub use events::*;
pub use normalize::{EventNormalizer, LineContext, ToolUseCache, UNKNOWN_TOOL};
pub use paths::{classify_session_path, default_projects_root, SessionPath};
pub use tools::{classify_tool, extract_context, ToolCategory};
