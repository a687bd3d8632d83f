// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! YAML configuration of the pool manager daemon.
//!
//! # Example
//!
//! ```yaml
//! pool_manager:
//!   poll_timeout_secs: 30
//!   poll_retry_interval_secs: 15
//!   poll_max_retries: 10
//!   poll_delay_secs: 5
//!   transport: udp
//! cache:
//!   driver: file
//!   path: /var/lib/zonepool/cache.json
//! metrics:
//!   bind_address: 0.0.0.0:9090
//! pools:
//!   - id: 7c9e6679-7425-40de-944b-e07fc1f90ae7
//!     name: default
//!     nameservers:
//!       - { id: 16fd2706-8baf-433b-82eb-8c7fada847da, host: 192.0.2.1 }
//!     targets:
//!       - id: 886313e1-3b8a-5372-9b90-0c9aee199e5d
//!         type: bind9
//!         options: { api_endpoint: "10.0.0.5:8080", host: "10.0.0.5" }
//!         masters: [{ host: 192.0.2.10, port: 5354 }]
//! ```

use crate::backend::{BackendRegistry, BackendSettings};
use crate::constants::{
    DEFAULT_MAX_CONCURRENT_CYCLES, DEFAULT_POLL_DELAY_SECS, DEFAULT_POLL_MAX_RETRIES,
    DEFAULT_POLL_RETRY_INTERVAL_SECS, DEFAULT_POLL_TIMEOUT_SECS, DEFAULT_RECOVERY_INTERVAL_SECS,
    DEFAULT_RECOVERY_THRESHOLD_SECS, DEFAULT_SYNC_INTERVAL_SECS,
};
use crate::dns::Transport;
use crate::engine::PoolManagerSettings;
use crate::errors::ConfigError;
use crate::model::Pool;
use crate::periodic::PeriodicSettings;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// Root of the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Engine and recovery loop tuning
    #[serde(default)]
    pub pool_manager: PoolManagerConfig,
    /// Convergence cache driver
    #[serde(default)]
    pub cache: CacheConfig,
    /// Prometheus endpoint
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Pools served by this instance
    #[serde(default)]
    pub pools: Vec<Pool>,
    /// Zones created at startup
    #[serde(default)]
    pub zones: Vec<ZoneSeed>,
}

/// Engine and recovery loop tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolManagerConfig {
    /// Timeout of one SOA query
    pub poll_timeout_secs: u64,
    /// Wait between two polls of the same nameserver
    pub poll_retry_interval_secs: u64,
    /// Poll attempts per nameserver per cycle
    pub poll_max_retries: u32,
    /// Wait after dispatch before the first poll
    pub poll_delay_secs: u64,
    /// Upper bound on concurrently running cycles
    pub max_concurrent_cycles: usize,
    /// DNS transport for polls, NOTIFY and agent messages
    pub transport: Transport,
    /// Interval of the stale-PENDING sweep
    pub periodic_recovery_interval_secs: u64,
    /// Age after which a PENDING domain is re-polled
    pub periodic_recovery_threshold_secs: u64,
    /// Interval of the full re-poll, 0 disables it
    pub periodic_sync_interval_secs: u64,
}

impl Default for PoolManagerConfig {
    fn default() -> Self {
        Self {
            poll_timeout_secs: DEFAULT_POLL_TIMEOUT_SECS,
            poll_retry_interval_secs: DEFAULT_POLL_RETRY_INTERVAL_SECS,
            poll_max_retries: DEFAULT_POLL_MAX_RETRIES,
            poll_delay_secs: DEFAULT_POLL_DELAY_SECS,
            max_concurrent_cycles: DEFAULT_MAX_CONCURRENT_CYCLES,
            transport: Transport::Udp,
            periodic_recovery_interval_secs: DEFAULT_RECOVERY_INTERVAL_SECS,
            periodic_recovery_threshold_secs: DEFAULT_RECOVERY_THRESHOLD_SECS,
            periodic_sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
        }
    }
}

impl PoolManagerConfig {
    /// Engine settings derived from this section.
    #[must_use]
    pub fn engine_settings(&self) -> PoolManagerSettings {
        PoolManagerSettings {
            poll_timeout: Duration::from_secs(self.poll_timeout_secs),
            poll_retry_interval: Duration::from_secs(self.poll_retry_interval_secs),
            poll_max_retries: self.poll_max_retries,
            poll_delay: Duration::from_secs(self.poll_delay_secs),
            max_concurrent_cycles: self.max_concurrent_cycles,
        }
    }

    /// Recovery loop settings derived from this section.
    #[must_use]
    pub fn periodic_settings(&self) -> PeriodicSettings {
        PeriodicSettings {
            recovery_interval: Duration::from_secs(self.periodic_recovery_interval_secs),
            recovery_threshold: Duration::from_secs(self.periodic_recovery_threshold_secs),
            sync_interval: (self.periodic_sync_interval_secs > 0)
                .then(|| Duration::from_secs(self.periodic_sync_interval_secs)),
        }
    }

    /// Driver settings derived from this section.
    #[must_use]
    pub fn backend_settings(&self) -> BackendSettings {
        BackendSettings {
            transport: self.transport,
            dns_timeout: Duration::from_secs(self.poll_timeout_secs),
            ..BackendSettings::default()
        }
    }
}

/// Convergence cache driver selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheDriver {
    /// Process memory, lost on restart
    #[default]
    Memory,
    /// JSON file rewritten after every change
    File,
}

/// `cache` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Driver
    pub driver: CacheDriver,
    /// File of the `file` driver
    pub path: Option<PathBuf>,
}

/// `metrics` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Listen address of `/metrics` and `/healthz`; no server when absent
    pub bind_address: Option<SocketAddr>,
}

/// A zone the daemon creates at startup if it does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneSeed {
    /// Zone name with trailing dot
    pub name: String,
    /// Owning tenant
    #[serde(default = "default_tenant")]
    pub tenant_id: String,
    /// Serving pool; the first configured pool when absent
    #[serde(default)]
    pub pool_id: Option<Uuid>,
    /// Hostmaster email
    #[serde(default)]
    pub email: Option<String>,
}

fn default_tenant() -> String {
    "default".to_string()
}

impl Config {
    /// Read and parse a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read or
    /// [`ConfigError::Parse`] if it is not valid YAML for this layout.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    /// Parse YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed input.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Check constraints serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first violated constraint.
    pub fn validate(&self, registry: &BackendRegistry) -> Result<(), ConfigError> {
        let pm = &self.pool_manager;
        if pm.poll_max_retries < 1 {
            return Err(ConfigError::Invalid(
                "pool_manager.poll_max_retries must be at least 1".to_string(),
            ));
        }
        if pm.poll_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "pool_manager.poll_timeout_secs must be positive".to_string(),
            ));
        }
        if pm.max_concurrent_cycles == 0 {
            return Err(ConfigError::Invalid(
                "pool_manager.max_concurrent_cycles must be at least 1".to_string(),
            ));
        }
        if pm.periodic_recovery_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "pool_manager.periodic_recovery_interval_secs must be positive".to_string(),
            ));
        }
        if self.cache.driver == CacheDriver::File && self.cache.path.is_none() {
            return Err(ConfigError::Invalid(
                "cache.path is required for the file driver".to_string(),
            ));
        }
        if self.pools.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one pool must be configured".to_string(),
            ));
        }

        let mut pool_ids = HashSet::new();
        for pool in &self.pools {
            if !pool_ids.insert(pool.id) {
                return Err(ConfigError::Invalid(format!("duplicate pool id {}", pool.id)));
            }
            if pool.nameservers.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "pool '{}' has no nameservers",
                    pool.name
                )));
            }
            for ns in &pool.nameservers {
                ns.socket_addr().map_err(|e| {
                    ConfigError::Invalid(format!("pool '{}' nameserver: {e}", pool.name))
                })?;
            }
            for target in &pool.targets {
                if !registry.contains(&target.backend_type) {
                    return Err(ConfigError::Invalid(format!(
                        "pool '{}' target {} has unknown type '{}' (known: {})",
                        pool.name,
                        target.id,
                        target.backend_type,
                        registry.types().join(", ")
                    )));
                }
                for master in &target.masters {
                    master.socket_addr().map_err(|e| {
                        ConfigError::Invalid(format!("pool '{}' master: {e}", pool.name))
                    })?;
                }
            }
        }

        for zone in &self.zones {
            if !zone.name.ends_with('.') {
                return Err(ConfigError::Invalid(format!(
                    "zone '{}' must be fully qualified (trailing dot)",
                    zone.name
                )));
            }
            if let Some(pool_id) = zone.pool_id {
                if !pool_ids.contains(&pool_id) {
                    return Err(ConfigError::Invalid(format!(
                        "zone '{}' references unknown pool {pool_id}",
                        zone.name
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
