//! Configuration types for routing, the event bus, and sessions.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};

/// Strategy used by the router to pick a provider per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategy {
    /// Cyclic index over available providers.
    RoundRobin,
    /// Minimum in-flight request count.
    LeastBusy,
    /// Classify the task and prefer the matching model size class.
    #[default]
    TaskOptimized,
    /// Minimize estimated cost weighted by success rate.
    CostOptimized,
    /// Maximize success rate per unit of response time.
    PerformanceOptimized,
    /// Balance load, latency, and success rate.
    LoadBalanced,
}

/// Complete conductor configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConductorConfig {
    /// Router configuration.
    pub router: RouterConfig,
    /// Event bus configuration.
    pub events: EventBusConfig,
    /// Session configuration.
    pub session: SessionConfig,
}

/// Router and circuit breaker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Default routing strategy.
    pub strategy: RoutingStrategy,
    /// Maximum distinct providers tried per request.
    pub max_retries: usize,
    /// Minimum seconds between provider health check passes.
    pub health_check_interval_secs: u64,
    /// Error rate at or above which a provider's circuit breaker opens.
    pub circuit_breaker_threshold: f64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            strategy: RoutingStrategy::TaskOptimized,
            max_retries: 3,
            health_check_interval_secs: 300,
            circuit_breaker_threshold: 0.8,
        }
    }
}

/// Event bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventBusConfig {
    /// Capacity of each per-priority queue.
    pub queue_capacity: usize,
    /// Number of worker tasks processing events.
    pub worker_count: usize,
    /// Timeout in seconds for a single handler invocation.
    pub handler_timeout_secs: u64,
    /// Maximum retained dead-letter entries (oldest evicted).
    pub max_dead_letters: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            worker_count: 3,
            handler_timeout_secs: 30,
            max_dead_letters: 1_000,
        }
    }
}

/// Session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum conversation history entries retained per session.
    ///
    /// Oldest entries are evicted once the limit is reached.
    pub max_history_entries: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_history_entries: 200,
        }
    }
}

impl ConductorConfig {
    /// Path of the per-user configuration file.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("conductor").join("config.toml"))
    }

    /// Loads configuration from the default location, falling back to
    /// defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from_path(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Loads configuration from a specific TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Serializes the configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|error| Error::Config(error.to_string()))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }
}
