// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Registry mapping a target's `type` tag to a driver constructor.
//!
//! The registry is consulted once at startup to build one driver instance per
//! pool target. Unknown tags fail configuration validation, not a cycle.

use super::agent::AgentBackend;
use super::bind9::Bind9Backend;
use super::fake::FakeBackend;
use super::Backend;
use crate::constants::DEFAULT_POLL_TIMEOUT_SECS;
use crate::dns::Transport;
use crate::errors::BackendError;
use crate::model::{Pool, PoolTarget};
use crate::retry::HTTP_MAX_ELAPSED_TIME_SECS;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Settings shared by every driver instance.
#[derive(Debug, Clone)]
pub struct BackendSettings {
    /// Transport for NOTIFY and agent messages
    pub transport: Transport,
    /// Timeout of one DNS exchange with a target
    pub dns_timeout: Duration,
    /// Shared HTTP client for API-driven targets
    pub http_client: reqwest::Client,
    /// Upper bound on retrying a transient HTTP failure
    pub http_retry_max_elapsed: Duration,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            transport: Transport::Udp,
            dns_timeout: Duration::from_secs(DEFAULT_POLL_TIMEOUT_SECS),
            http_client: reqwest::Client::new(),
            http_retry_max_elapsed: Duration::from_secs(HTTP_MAX_ELAPSED_TIME_SECS),
        }
    }
}

/// Constructor of a driver for one target.
pub type BackendFactory =
    fn(&PoolTarget, &BackendSettings) -> Result<Arc<dyn Backend>, BackendError>;

/// Known driver types.
#[derive(Clone)]
pub struct BackendRegistry {
    factories: BTreeMap<&'static str, BackendFactory>,
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("types", &self.types())
            .finish()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl BackendRegistry {
    /// Registry without any driver.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry with the `bind9`, `agent` and `fake` drivers.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Bind9Backend::TYPE, build_bind9);
        registry.register(AgentBackend::TYPE, build_agent);
        registry.register(FakeBackend::TYPE, build_fake);
        registry
    }

    /// Add or replace a driver.
    pub fn register(&mut self, backend_type: &'static str, factory: BackendFactory) {
        self.factories.insert(backend_type, factory);
    }

    /// `true` if `backend_type` has a driver.
    #[must_use]
    pub fn contains(&self, backend_type: &str) -> bool {
        self.factories.contains_key(backend_type)
    }

    /// Registered type tags, sorted.
    #[must_use]
    pub fn types(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }

    /// Build the driver for one target.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::UnknownBackendType`] for an unregistered tag, or
    /// [`BackendError::InvalidConfiguration`] if the target's options are invalid.
    pub fn build(
        &self,
        target: &PoolTarget,
        settings: &BackendSettings,
    ) -> Result<Arc<dyn Backend>, BackendError> {
        let factory = self.factories.get(target.backend_type.as_str()).ok_or_else(|| {
            BackendError::UnknownBackendType {
                backend_type: target.backend_type.clone(),
            }
        })?;
        factory(target, settings)
    }

    /// Build a driver for every target of every pool, keyed by target id.
    ///
    /// # Errors
    ///
    /// Returns the first error from [`Self::build`].
    pub fn build_all(
        &self,
        pools: &[Pool],
        settings: &BackendSettings,
    ) -> Result<HashMap<Uuid, Arc<dyn Backend>>, BackendError> {
        let mut backends = HashMap::new();
        for target in pools.iter().flat_map(|pool| pool.targets.iter()) {
            backends.insert(target.id, self.build(target, settings)?);
        }
        Ok(backends)
    }
}

fn build_bind9(
    target: &PoolTarget,
    settings: &BackendSettings,
) -> Result<Arc<dyn Backend>, BackendError> {
    Ok(Arc::new(Bind9Backend::from_target(target, settings)?))
}

fn build_agent(
    target: &PoolTarget,
    settings: &BackendSettings,
) -> Result<Arc<dyn Backend>, BackendError> {
    Ok(Arc::new(AgentBackend::from_target(target, settings)?))
}

fn build_fake(
    target: &PoolTarget,
    _settings: &BackendSettings,
) -> Result<Arc<dyn Backend>, BackendError> {
    Ok(Arc::new(FakeBackend::from_target(target)))
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod registry_tests;
