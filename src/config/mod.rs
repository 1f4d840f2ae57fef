//! # Configuration
//!
//! YAML-backed configuration for the engines, the tag store, the scheduler
//! and the machines database. Every section has working defaults so the
//! runtime can start without a file; a file only needs the keys it changes.
//!
//! ```yaml
//! engine:
//!   submit_timeout_ms: 5000
//! tags:
//!   observer_queue_capacity: 1024
//! scheduler:
//!   default_interval_ms: 1000
//!
//! production:
//!   database:
//!     url: "sqlite:///var/lib/automation/app.db"
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::defaults;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring automation-config.yaml
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AutomationConfig {
    /// Environment the configuration was resolved for
    pub environment: String,
    pub engine: EngineConfig,
    pub tags: TagStoreConfig,
    pub scheduler: SchedulerConfig,
    pub database: DatabaseConfig,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            engine: EngineConfig::default(),
            tags: TagStoreConfig::default(),
            scheduler: SchedulerConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl AutomationConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.tags.observer_queue_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "tags.observer_queue_capacity",
                "must be greater than zero",
            ));
        }
        if self.scheduler.machine_inbox_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "scheduler.machine_inbox_capacity",
                "must be greater than zero",
            ));
        }
        if self.scheduler.min_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "scheduler.min_interval_ms",
                "must be greater than zero",
            ));
        }
        if self.scheduler.default_interval_ms < self.scheduler.min_interval_ms {
            return Err(ConfigurationError::invalid_value(
                "scheduler.default_interval_ms",
                format!(
                    "{} is below scheduler.min_interval_ms ({})",
                    self.scheduler.default_interval_ms, self.scheduler.min_interval_ms
                ),
            ));
        }
        if self.database.url.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "database.url",
                "must not be empty",
            ));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigurationError::invalid_value(
                "database.max_connections",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Action engine settings shared by every engine instance
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How long callers wait for a queued action; unset or zero waits forever
    pub submit_timeout_ms: Option<u64>,
}

impl EngineConfig {
    pub fn submit_timeout(&self) -> Option<Duration> {
        self.submit_timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TagStoreConfig {
    pub observer_queue_capacity: usize,
}

impl Default for TagStoreConfig {
    fn default() -> Self {
        Self {
            observer_queue_capacity: defaults::OBSERVER_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub default_interval_ms: u64,
    pub min_interval_ms: u64,
    pub machine_inbox_capacity: usize,
    pub sync_idle_poll_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_interval_ms: defaults::MACHINE_INTERVAL_MS,
            min_interval_ms: defaults::MIN_MACHINE_INTERVAL_MS,
            machine_inbox_capacity: defaults::MACHINE_INBOX_CAPACITY,
            sync_idle_poll_ms: defaults::SYNC_IDLE_POLL_MS,
        }
    }
}

impl SchedulerConfig {
    pub fn default_interval(&self) -> Duration {
        Duration::from_millis(self.default_interval_ms)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn sync_idle_poll(&self) -> Duration {
        Duration::from_millis(self.sync_idle_poll_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: defaults::DATABASE_URL.to_string(),
            max_connections: defaults::DATABASE_MAX_CONNECTIONS,
        }
    }
}
