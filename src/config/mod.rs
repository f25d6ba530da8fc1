//! Runtime configuration for modrun
//!
//! Configuration is read from a JSON file (by default
//! `<config dir>/modrun/config.json`) and then overridden from the
//! environment:
//!
//! - `MODRUN_MAX_CONCURRENT_MODULES`: worker pool size
//! - `MODRUN_LOG_FORMAT`: `pretty` or `json`
//!
//! ```json
//! {
//!     "max_concurrent_modules": 4,
//!     "event_capacity": 512,
//!     "plugins": {
//!         "blocked": ["demo.Experimental"]
//!     },
//!     "log_format": "json"
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, RuntimeError};
use crate::events::DEFAULT_EVENT_CAPACITY;
use crate::utils::logging::LogFormat;

pub const ENV_MAX_CONCURRENT_MODULES: &str = "MODRUN_MAX_CONCURRENT_MODULES";
pub const ENV_LOG_FORMAT: &str = "MODRUN_LOG_FORMAT";

/// Allow/block lists applied to discovered plugins by identity.
///
/// A plugin is permitted if it is not blocked and either the allow list is
/// empty or it names the plugin. The block list takes precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginFilterConfig {
    pub allowed: Vec<String>,
    pub blocked: Vec<String>,
}

impl PluginFilterConfig {
    pub fn is_permitted(&self, identity: &str) -> bool {
        if self.blocked.iter().any(|b| b == identity) {
            return false;
        }
        self.allowed.is_empty() || self.allowed.iter().any(|a| a == identity)
    }
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Upper bound on modules executing at once.
    pub max_concurrent_modules: usize,
    /// Per-subscriber buffer of the default event bus.
    pub event_capacity: usize,
    pub plugins: PluginFilterConfig,
    pub log_format: LogFormat,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_concurrent_modules: default_parallelism(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            plugins: PluginFilterConfig::default(),
            log_format: LogFormat::default(),
        }
    }
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl RuntimeConfig {
    /// `<config dir>/modrun/config.json`, when the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("modrun").join("config.json"))
    }

    /// Read and validate a config file. Environment overrides are not applied.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RuntimeConfig = serde_json::from_str(&content).map_err(|e| {
            RuntimeError::Config(format!("Invalid config file {}: {}", path.display(), e))
        })?;
        config.validate()?;
        debug!(path = %path.display(), "Loaded runtime config");
        Ok(config)
    }

    /// Load `path` (or the default path) if it exists, fall back to defaults
    /// otherwise, then apply environment overrides.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);
        let mut config = match path {
            Some(path) if path.exists() => Self::load(&path)?,
            Some(path) => {
                debug!(path = %path.display(), "No config file, using defaults");
                Self::default()
            }
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply `MODRUN_*` environment variables.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_MAX_CONCURRENT_MODULES) {
            self.max_concurrent_modules = raw.trim().parse().map_err(|_| {
                RuntimeError::Config(format!(
                    "{} must be a positive integer, got '{}'",
                    ENV_MAX_CONCURRENT_MODULES, raw
                ))
            })?;
        }
        if let Some(raw) = lookup(ENV_LOG_FORMAT) {
            match raw.parse() {
                Ok(format) => self.log_format = format,
                Err(e) => warn!(error = %e, "Ignoring {}", ENV_LOG_FORMAT),
            }
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_modules == 0 {
            return Err(RuntimeError::Config(
                "max_concurrent_modules must be > 0".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(RuntimeError::Config("event_capacity must be > 0".to_string()));
        }
        Ok(())
    }
}
