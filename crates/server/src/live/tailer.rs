//! Incremental session log tailer.
//!
//! Tracks a byte offset per session log and turns filesystem change
//! notifications into complete raw lines. A trailing partial line is held
//! back (offset not advanced) until its terminator arrives. If a file
//! shrinks below the recorded offset it is treated as truncated and re-read
//! from the start.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use agent_office_core::{classify_session_path, SessionPath, TailError};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use walkdir::WalkDir;

/// One complete line from a session log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    pub session_id: String,
    pub agent_id: String,
    pub path: PathBuf,
    pub text: String,
}

#[derive(Debug)]
pub enum TailEvent {
    /// First sighting of a live session log. Emitted once per file.
    Discovered { session: SessionPath, path: PathBuf },
    Line(RawLine),
    /// The file disappeared from disk.
    Removed { session_id: String, path: PathBuf },
    /// Non-fatal; the next change notification retries.
    Error(TailError),
}

#[derive(Debug, Clone)]
pub struct TailerConfig {
    pub root: PathBuf,
    pub extension: String,
    pub history_stem: String,
    /// Initial-scan files older than this are tracked silently.
    pub initial_recency: Duration,
    /// Changed files older than this are not announced.
    pub live_recency: Duration,
}

#[derive(Debug)]
struct TrackedFile {
    session: SessionPath,
    offset: u64,
    announced: bool,
}

pub struct SessionTailer {
    config: TailerConfig,
    files: HashMap<PathBuf, TrackedFile>,
}

impl SessionTailer {
    pub fn new(config: TailerConfig) -> Self {
        Self {
            config,
            files: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    pub fn classify(&self, path: &Path) -> Option<SessionPath> {
        classify_session_path(
            &self.config.root,
            path,
            &self.config.extension,
            &self.config.history_stem,
        )
    }

    /// Recorded offset for `path`, if tracked.
    pub fn offset(&self, path: &Path) -> Option<u64> {
        self.files.get(path).map(|f| f.offset)
    }

    pub fn tracked(&self) -> usize {
        self.files.len()
    }

    /// Register every session log already on disk at end-of-file.
    ///
    /// Nothing is replayed. Only files modified within the initial recency
    /// window are announced.
    pub async fn initial_scan(&mut self, now: SystemTime) -> Vec<TailEvent> {
        let root = self.config.root.clone();
        if !root.exists() {
            return vec![TailEvent::Error(TailError::RootNotFound { path: root })];
        }

        let mut events = Vec::new();
        for entry in WalkDir::new(&root).min_depth(2).max_depth(4) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                    let source = e
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("directory walk loop"));
                    events.push(TailEvent::Error(TailError::io(path, source)));
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path().to_path_buf();
            let Some(session) = self.classify(&path) else {
                continue;
            };
            let metadata = match tokio::fs::metadata(&path).await {
                Ok(m) => m,
                Err(e) => {
                    events.push(TailEvent::Error(TailError::io(&path, e)));
                    continue;
                }
            };

            let recent = is_recent(metadata.modified().ok(), now, self.config.initial_recency);
            if recent {
                events.push(TailEvent::Discovered {
                    session: session.clone(),
                    path: path.clone(),
                });
            }
            self.files.insert(
                path,
                TrackedFile {
                    session,
                    offset: metadata.len(),
                    announced: recent,
                },
            );
        }

        tracing::info!(
            root = %root.display(),
            tracked = self.files.len(),
            announced = events.iter().filter(|e| matches!(e, TailEvent::Discovered { .. })).count(),
            "Initial scan complete"
        );
        events
    }

    /// Read whatever complete lines were appended to `path`.
    pub async fn handle_change(&mut self, path: &Path, now: SystemTime) -> Vec<TailEvent> {
        let Some(session) = self.classify(path) else {
            return Vec::new();
        };

        let mut events = Vec::new();
        let (len, modified) = match tokio::fs::metadata(path).await {
            Ok(m) => (m.len(), m.modified().ok()),
            Err(e) => return vec![TailEvent::Error(TailError::io(path, e))],
        };

        let tracked = self.files.entry(path.to_path_buf()).or_insert_with(|| TrackedFile {
            session,
            offset: 0,
            announced: false,
        });

        if !tracked.announced && is_recent(modified, now, self.config.live_recency) {
            tracked.announced = true;
            events.push(TailEvent::Discovered {
                session: tracked.session.clone(),
                path: path.to_path_buf(),
            });
        }

        if len < tracked.offset {
            tracing::debug!(path = %path.display(), old = tracked.offset, new = len, "Session log truncated");
            tracked.offset = 0;
        }
        if len == tracked.offset {
            return events;
        }

        let chunk = match read_range(path, tracked.offset, len).await {
            Ok(buf) => buf,
            Err(e) => {
                events.push(TailEvent::Error(TailError::io(path, e)));
                return events;
            }
        };

        let (consumed, lines) = split_complete_lines(&chunk);
        tracked.offset += consumed as u64;
        for text in lines {
            events.push(TailEvent::Line(RawLine {
                session_id: tracked.session.session_id.clone(),
                agent_id: tracked.session.agent_id().to_string(),
                path: path.to_path_buf(),
                text,
            }));
        }
        events
    }

    pub fn handle_remove(&mut self, path: &Path) -> Vec<TailEvent> {
        match self.files.remove(path) {
            Some(tracked) if tracked.announced => vec![TailEvent::Removed {
                session_id: tracked.session.session_id,
                path: path.to_path_buf(),
            }],
            _ => Vec::new(),
        }
    }

    /// Forget every tracked file.
    pub fn clear(&mut self) {
        self.files.clear();
    }
}

fn is_recent(modified: Option<SystemTime>, now: SystemTime, window: Duration) -> bool {
    match modified {
        Some(m) => now.duration_since(m).map(|age| age <= window).unwrap_or(true),
        None => false,
    }
}

async fn read_range(path: &Path, start: u64, end: u64) -> std::io::Result<Vec<u8>> {
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(std::io::SeekFrom::Start(start)).await?;
    let mut buf = Vec::with_capacity((end - start) as usize);
    file.take(end - start).read_to_end(&mut buf).await?;
    Ok(buf)
}

/// Split off every `\n`-terminated line. Returns bytes consumed and the
/// non-empty lines; bytes after the last terminator are not consumed.
fn split_complete_lines(bytes: &[u8]) -> (usize, Vec<String>) {
    let Some(last) = memchr::memrchr(b'\n', bytes) else {
        return (0, Vec::new());
    };
    let complete = &bytes[..=last];

    let mut lines = Vec::new();
    let mut start = 0;
    for end in memchr::memchr_iter(b'\n', complete) {
        let mut line = &complete[start..end];
        if line.last() == Some(&b'\r') {
            line = &line[..line.len() - 1];
        }
        if !line.is_empty() {
            lines.push(String::from_utf8_lossy(line).into_owned());
        }
        start = end + 1;
    }
    (complete.len(), lines)
}
