//! Live office runtime.
//!
//! `OfficeRuntime::start` wires the watcher, tail pipeline, registry timers
//! and hub loops under one cancellation token. `shutdown` tears them down in
//! reverse order and closes every subscriber.

pub mod desks;
pub mod hub;
pub mod pipeline;
pub mod record;
pub mod registry;
pub mod tailer;
pub mod throttle;
pub mod watcher;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use notify::RecommendedWatcher;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::OfficeConfig;
use hub::{BroadcastHub, HubConfig};
use pipeline::Pipeline;
use registry::{RegistryConfig, SessionRegistry};
use tailer::{SessionTailer, TailerConfig};

/// Capacity of the watcher → pipeline channel.
const FILE_EVENT_BUFFER: usize = 1024;

impl RegistryConfig {
    pub fn from_office(config: &OfficeConfig) -> Self {
        Self {
            idle_after: config.idle_after(),
            evict_after: config.evict_after(),
            waiting_after: config.waiting_after(),
            leave_grace: config.leave_grace(),
            desk_count: config.desk_count,
            top_tools: config.top_tools,
            machine_id: local_machine_id(),
        }
    }
}

fn local_machine_id() -> String {
    gethostname::gethostname().to_string_lossy().into_owned()
}

pub struct OfficeRuntime {
    pub registry: Arc<SessionRegistry>,
    pub hub: Arc<BroadcastHub>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    watcher: Option<(RecommendedWatcher, Arc<AtomicU64>)>,
}

impl OfficeRuntime {
    /// Start every background task. A missing or unwatchable root is logged
    /// and the runtime continues with push ingress only.
    pub fn start(config: &OfficeConfig) -> Self {
        let cancel = CancellationToken::new();
        let registry = Arc::new(SessionRegistry::new(RegistryConfig::from_office(config)));
        let hub = Arc::new(BroadcastHub::new(
            Arc::clone(&registry),
            HubConfig {
                snapshot_cooldown: config.snapshot_cooldown(),
                heartbeat: config.heartbeat(),
                ..Default::default()
            },
        ));

        let mut tasks = registry.spawn_timers(config.sweep_interval(), config.waiting_check(), cancel.clone());
        tasks.extend(hub.spawn(cancel.clone()));

        let mut watcher = None;
        match config.resolved_root() {
            Ok(root) => {
                let (tx, rx) = mpsc::channel(FILE_EVENT_BUFFER);
                match watcher::start_watcher(&root, &config.extension, tx) {
                    Ok(handle) => watcher = Some(handle),
                    Err(e) => {
                        crate::metrics::record_tail_error();
                        tracing::warn!(error = %e, "File watching disabled");
                    }
                }
                let tailer = SessionTailer::new(TailerConfig {
                    root,
                    extension: config.extension.clone(),
                    history_stem: config.history_stem.clone(),
                    initial_recency: config.initial_recency(),
                    live_recency: config.live_recency(),
                });
                let pipeline = Pipeline::new(tailer, Arc::clone(&registry), Arc::clone(&hub));
                tasks.push(tokio::spawn(pipeline.run(rx, cancel.clone())));
            }
            Err(e) => tracing::warn!(error = %e, "No session log root, file tailing disabled"),
        }

        Self {
            registry,
            hub,
            cancel,
            tasks,
            watcher,
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Watcher events dropped because the pipeline fell behind.
    pub fn dropped_file_events(&self) -> u64 {
        self.watcher
            .as_ref()
            .map(|(_, dropped)| dropped.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub async fn shutdown(mut self) {
        // Dropping the watcher closes the channel feeding the pipeline.
        self.watcher.take();
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Background task ended abnormally");
            }
        }
        self.hub.shutdown().await;
        self.registry.shutdown().await;
        tracing::info!("Office runtime stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_and_shutdown_with_missing_root() {
        let config = OfficeConfig {
            root: Some("/definitely/not/a/real/root".into()),
            ..Default::default()
        };
        let runtime = OfficeRuntime::start(&config);
        assert_eq!(runtime.dropped_file_events(), 0);
        assert!(runtime.registry.is_empty().await);
        runtime.shutdown().await;
    }

    #[test]
    fn test_registry_config_from_office() {
        let config = OfficeConfig {
            desk_count: 3,
            waiting_after_secs: 10,
            ..Default::default()
        };
        let rc = RegistryConfig::from_office(&config);
        assert_eq!(rc.desk_count, 3);
        assert_eq!(rc.waiting_after, std::time::Duration::from_secs(10));
        assert!(!rc.machine_id.is_empty());
    }
}
