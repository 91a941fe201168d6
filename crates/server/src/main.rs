// crates/server/src/main.rs
//! Agent office server binary.
//!
//! Loads configuration, starts the live runtime (watcher, pipeline, timers,
//! hub), then serves HTTP and WebSocket until Ctrl-C.

use std::net::SocketAddr;
use std::path::PathBuf;

use agent_office_server::{create_app, init_metrics, AppState, OfficeConfig, OfficeRuntime};
use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "agent-office", version, about = "Live office view of coding-agent sessions")]
struct Args {
    /// TOML config file. Overrides AGENT_OFFICE_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen port.
    #[arg(long)]
    port: Option<u16>,

    /// Session log root to watch.
    #[arg(long)]
    root: Option<PathBuf>,

    /// Bearer token required on POST /api/events.
    #[arg(long)]
    token: Option<String>,
}

fn load_config(args: Args) -> Result<OfficeConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let mut config = OfficeConfig::from_file(path)?;
            config.apply_env(|key| std::env::var(key).ok())?;
            config
        }
        None => OfficeConfig::load()?,
    };
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(root) = args.root {
        config.root = Some(root);
    }
    if let Some(token) = args.token {
        config.ingress_token = Some(token);
    }
    config.validate()?;
    Ok(config)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
    }
    tracing::info!("Shutdown requested");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,agent_office_server=info")),
        )
        .compact()
        .init();

    init_metrics();

    let config = load_config(Args::parse())?;
    tracing::info!(
        root = ?config.resolved_root().ok(),
        desks = config.desk_count,
        token = config.ingress_token.is_some(),
        "Configuration loaded"
    );

    let runtime = OfficeRuntime::start(&config);
    let cancel = runtime.cancel_token();
    let hub = runtime.hub.clone();
    let state = AppState::new(config.clone(), runtime.registry.clone(), runtime.hub.clone());
    let pruner = state
        .ingress_limiter
        .spawn_pruner(config.rate_limit_prune(), cancel.clone());
    let shutdown_cancel = cancel.clone();

    let app = create_app(state);
    let addr = SocketAddr::new(config.bind, config.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    eprintln!("\n\u{1f3e2} agent-office v{} on http://{addr}\n", env!("CARGO_PKG_VERSION"));

    let serve = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Open sockets would hold graceful shutdown forever.
            hub.shutdown().await;
            shutdown_cancel.cancel();
        });
    let served = serve.await;

    runtime.shutdown().await;
    if let Err(e) = pruner.await {
        tracing::warn!(error = %e, "Rate limit pruner ended abnormally");
    }
    served.context("server error")?;
    Ok(())
}
