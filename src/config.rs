//! Engine configuration
//!
//! Loaded from a JSON file; every field but `schema_path` has a default.
//! The remote credential is never stored in the file, only the name of the
//! environment variable holding it.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use croner::Cron;
use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, EngineResult};
use crate::observability::LogFormat;
use crate::remote::{DEFAULT_API_BASE, DEFAULT_API_VERSION};
use crate::writer::WritePolicy;

/// Configuration file structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Schema definition file (required)
    pub schema_path: String,

    /// Directory for cache, change log, backups and run state
    #[serde(default = "default_state_dir")]
    pub state_dir: String,

    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Bound on every remote call
    #[serde(default = "default_remote_timeout_secs")]
    pub remote_timeout_secs: u64,

    #[serde(default)]
    pub write_policy: WritePolicy,

    /// Consecutive failed scans tolerated before scans pause
    #[serde(default = "default_max_failed_attempts")]
    pub max_failed_attempts: u32,

    #[serde(default = "default_notion_api_base")]
    pub notion_api_base: String,

    #[serde(default = "default_notion_version")]
    pub notion_version: String,

    /// Environment variable holding the API token
    #[serde(default = "default_token_env")]
    pub token_env: String,

    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Five-field cron pattern for `watch`, evaluated in UTC
    #[serde(default = "default_watch_cron")]
    pub watch_cron: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_state_dir() -> String {
    "./state".to_string()
}
fn default_cache_ttl_secs() -> u64 {
    3600
}
fn default_remote_timeout_secs() -> u64 {
    30
}
fn default_max_failed_attempts() -> u32 {
    crate::drift::DEFAULT_MAX_FAILED_ATTEMPTS
}
fn default_notion_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}
fn default_notion_version() -> String {
    DEFAULT_API_VERSION.to_string()
}
fn default_token_env() -> String {
    "NOTION_TOKEN".to_string()
}
fn default_watch_cron() -> String {
    "0 9 * * *".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Minimal configuration with defaults for everything else
    pub fn new(schema_path: impl Into<String>, state_dir: impl Into<String>) -> Self {
        Self {
            schema_path: schema_path.into(),
            state_dir: state_dir.into(),
            cache_ttl_secs: default_cache_ttl_secs(),
            remote_timeout_secs: default_remote_timeout_secs(),
            write_policy: WritePolicy::default(),
            max_failed_attempts: default_max_failed_attempts(),
            notion_api_base: default_notion_api_base(),
            notion_version: default_notion_version(),
            token_env: default_token_env(),
            webhook_url: None,
            watch_cron: default_watch_cron(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }

    /// Load and validate configuration from file
    pub fn load(path: &Path) -> EngineResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            EngineError::Configuration(format!("failed to read config {}: {}", path.display(), e))
        })?;

        let config: Config = serde_json::from_str(&content)
            .map_err(|e| EngineError::Configuration(format!("invalid config JSON: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.schema_path.trim().is_empty() {
            return Err(EngineError::Configuration("schema_path must be set".into()));
        }
        if self.state_dir.trim().is_empty() {
            return Err(EngineError::Configuration("state_dir must be set".into()));
        }
        if self.cache_ttl_secs == 0 {
            return Err(EngineError::Configuration("cache_ttl_secs must be > 0".into()));
        }
        if self.remote_timeout_secs == 0 {
            return Err(EngineError::Configuration(
                "remote_timeout_secs must be > 0".into(),
            ));
        }
        if self.token_env.trim().is_empty() {
            return Err(EngineError::Configuration("token_env must be set".into()));
        }
        if let Some(url) = &self.webhook_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(EngineError::Configuration(format!(
                    "webhook_url must be an http(s) URL, got '{}'",
                    url
                )));
            }
        }
        self.watch_schedule()?;
        Ok(())
    }

    /// Parsed `watch_cron`
    pub fn watch_schedule(&self) -> EngineResult<Cron> {
        Cron::new(&self.watch_cron).parse().map_err(|e| {
            EngineError::Configuration(format!("invalid watch_cron '{}': {}", self.watch_cron, e))
        })
    }

    /// Remote API token from the configured environment variable
    pub fn credential(&self) -> EngineResult<String> {
        match std::env::var(&self.token_env) {
            Ok(token) if !token.trim().is_empty() => Ok(token),
            _ => Err(EngineError::Configuration(format!(
                "environment variable {} is not set",
                self.token_env
            ))),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }

    pub fn paths(&self) -> StatePaths {
        StatePaths::new(&self.state_dir)
    }
}

/// Locations of persisted local state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    pub root: PathBuf,
    /// `cache/<collection_id>.json`
    pub cache_dir: PathBuf,
    pub changes: PathBuf,
    pub backups_dir: PathBuf,
    pub migration_stub: PathBuf,
    pub run_state: PathBuf,
}

impl StatePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            cache_dir: root.join("cache"),
            changes: root.join("changes.jsonl"),
            backups_dir: root.join("backups"),
            migration_stub: root.join("migration_stub.txt"),
            run_state: root.join("run_state.json"),
            root,
        }
    }
}
