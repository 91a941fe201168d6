//! Recursive filesystem watcher over the session log root.
//!
//! The notify callback runs on notify's own thread, so it only filters by
//! extension and forwards with `try_send`; path-shape classification happens
//! in the tailer. A full channel drops the event and bumps a counter. The
//! next write to the same file produces another notification, so nothing is
//! lost beyond latency.

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use agent_office_core::TailError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    Modified(PathBuf),
    Removed(PathBuf),
}

/// Start watching `root`. Dropping the returned watcher stops the watch.
pub fn start_watcher(
    root: &Path,
    extension: &str,
    tx: mpsc::Sender<FileEvent>,
) -> Result<(RecommendedWatcher, Arc<AtomicU64>), TailError> {
    if !root.exists() {
        return Err(TailError::RootNotFound {
            path: root.to_path_buf(),
        });
    }

    let dropped_events = Arc::new(AtomicU64::new(0));
    let dropped_counter = dropped_events.clone();
    let extension = extension.to_string();

    let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
        let event = match res {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(error = %e, "File watcher error");
                return;
            }
        };
        for path in event.paths {
            if path.extension().and_then(|e| e.to_str()) != Some(extension.as_str()) {
                continue;
            }
            let file_event = match event.kind {
                EventKind::Remove(_) => FileEvent::Removed(path),
                EventKind::Modify(_) | EventKind::Create(_) => FileEvent::Modified(path),
                _ => continue,
            };
            if tx.try_send(file_event).is_err() {
                let count = dropped_counter.fetch_add(1, Ordering::Relaxed) + 1;
                if count == 1 || count % 100 == 0 {
                    tracing::warn!(dropped_total = count, "File watcher channel full, event dropped");
                }
            }
        }
    })
    .map_err(|e| TailError::Watcher(e.to_string()))?;

    watcher
        .watch(root, RecursiveMode::Recursive)
        .map_err(|e| TailError::Watcher(e.to_string()))?;
    tracing::info!(root = %root.display(), "Watching for session log changes");

    Ok((watcher, dropped_events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_missing_root_is_error() {
        let (tx, _rx) = mpsc::channel(4);
        let err = start_watcher(Path::new("/definitely/not/here"), "jsonl", tx).err().unwrap();
        assert!(matches!(err, TailError::RootNotFound { .. }));
    }

    #[tokio::test]
    async fn test_forwards_matching_writes() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("proj");
        std::fs::create_dir_all(&project).unwrap();

        let (tx, mut rx) = mpsc::channel(64);
        let (_watcher, _dropped) = start_watcher(dir.path(), "jsonl", tx).unwrap();

        std::fs::write(project.join("ignored.txt"), "x\n").unwrap();
        let target = project.join("s.jsonl");
        std::fs::write(&target, "x\n").unwrap();

        let got = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match rx.recv().await {
                    Some(FileEvent::Modified(p)) if p.ends_with("s.jsonl") => return p,
                    Some(FileEvent::Modified(p)) => assert!(!p.ends_with("ignored.txt")),
                    Some(FileEvent::Removed(_)) => {}
                    None => panic!("watcher channel closed"),
                }
            }
        })
        .await
        .expect("watcher event within timeout");
        assert!(got.ends_with("s.jsonl"));
    }
}
