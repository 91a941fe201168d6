// crates/server/src/config.rs
//! Runtime configuration.
//!
//! Precedence, lowest first: built-in defaults, optional TOML file
//! (`AGENT_OFFICE_CONFIG`), environment variables, CLI flags (applied by
//! `main`).

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 47900;

pub const CONFIG_ENV: &str = "AGENT_OFFICE_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("Home directory not found and no watch root configured")]
    NoRoot,

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OfficeConfig {
    /// Directory tree holding `<project>/<session>.<ext>` logs.
    pub root: Option<PathBuf>,
    pub extension: String,
    pub history_stem: String,

    pub initial_recency_secs: u64,
    pub live_recency_secs: u64,

    pub idle_after_secs: u64,
    pub evict_after_secs: u64,
    pub sweep_interval_secs: u64,
    pub waiting_after_secs: u64,
    pub waiting_check_secs: u64,
    pub leave_grace_ms: u64,
    pub desk_count: usize,

    pub snapshot_cooldown_ms: u64,
    pub heartbeat_secs: u64,
    pub max_connections: usize,
    pub max_connections_per_ip: usize,
    pub top_tools: usize,

    pub rate_limit_requests: usize,
    pub rate_limit_window_secs: u64,
    pub rate_limit_prune_secs: u64,
    pub ingress_token: Option<String>,

    pub bind: IpAddr,
    pub port: u16,
}

impl Default for OfficeConfig {
    fn default() -> Self {
        Self {
            root: None,
            extension: "jsonl".into(),
            history_stem: "history".into(),
            initial_recency_secs: 120,
            live_recency_secs: 600,
            idle_after_secs: 300,
            evict_after_secs: 900,
            sweep_interval_secs: 30,
            waiting_after_secs: 60,
            waiting_check_secs: 5,
            leave_grace_ms: 2_000,
            desk_count: 8,
            snapshot_cooldown_ms: 200,
            heartbeat_secs: 15,
            max_connections: 64,
            max_connections_per_ip: 8,
            top_tools: 5,
            rate_limit_requests: 120,
            rate_limit_window_secs: 60,
            rate_limit_prune_secs: 60,
            ingress_token: None,
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
        }
    }
}

impl OfficeConfig {
    /// Defaults, then the optional TOML file, then environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Apply `AGENT_OFFICE_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = lookup("AGENT_OFFICE_PORT")
            .map(|v| ("AGENT_OFFICE_PORT", v))
            .or_else(|| lookup("PORT").map(|v| ("PORT", v)));
        if let Some((var, value)) = port {
            self.port = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { var, value })?;
        }
        if let Some(root) = lookup("AGENT_OFFICE_ROOT").filter(|v| !v.trim().is_empty()) {
            self.root = Some(PathBuf::from(root));
        }
        if let Some(token) = lookup("AGENT_OFFICE_TOKEN").filter(|v| !v.trim().is_empty()) {
            self.ingress_token = Some(token);
        }
        Ok(())
    }

    /// Configured root, or `~/.claude/projects`.
    pub fn resolved_root(&self) -> Result<PathBuf, ConfigError> {
        self.root
            .clone()
            .or_else(agent_office_core::default_projects_root)
            .ok_or(ConfigError::NoRoot)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.extension.is_empty() || self.extension.starts_with('.') {
            return Err(ConfigError::Invalid(
                "extension must be non-empty and given without a leading dot".into(),
            ));
        }
        if self.evict_after_secs < self.idle_after_secs {
            return Err(ConfigError::Invalid(
                "evict_after_secs must be >= idle_after_secs".into(),
            ));
        }
        if self.max_connections == 0 || self.max_connections_per_ip == 0 {
            return Err(ConfigError::Invalid("connection caps must be positive".into()));
        }
        if self.rate_limit_requests == 0 || self.rate_limit_window_secs == 0 {
            return Err(ConfigError::Invalid("rate limit must be positive".into()));
        }
        if self.sweep_interval_secs == 0 || self.waiting_check_secs == 0 || self.heartbeat_secs == 0 {
            return Err(ConfigError::Invalid("timer periods must be positive".into()));
        }
        Ok(())
    }

    pub fn initial_recency(&self) -> Duration {
        Duration::from_secs(self.initial_recency_secs)
    }

    pub fn live_recency(&self) -> Duration {
        Duration::from_secs(self.live_recency_secs)
    }

    pub fn idle_after(&self) -> Duration {
        Duration::from_secs(self.idle_after_secs)
    }

    pub fn evict_after(&self) -> Duration {
        Duration::from_secs(self.evict_after_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn waiting_after(&self) -> Duration {
        Duration::from_secs(self.waiting_after_secs)
    }

    pub fn waiting_check(&self) -> Duration {
        Duration::from_secs(self.waiting_check_secs)
    }

    pub fn leave_grace(&self) -> Duration {
        Duration::from_millis(self.leave_grace_ms)
    }

    pub fn snapshot_cooldown(&self) -> Duration {
        Duration::from_millis(self.snapshot_cooldown_ms)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn rate_limit_prune(&self) -> Duration {
        Duration::from_secs(self.rate_limit_prune_secs)
    }
}
