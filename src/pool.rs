// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Pool topology lookup.
//!
//! A pool names the nameservers polled for convergence and the backend
//! targets dispatched to. The engine takes one snapshot per cycle, so a pool
//! edited mid-cycle only affects the next cycle.

use crate::errors::{StorageError, TopologyError};
use crate::model::Pool;
use crate::storage::Storage;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::warn;
use uuid::Uuid;

/// Read-only pool lookup.
#[async_trait]
pub trait PoolTopology: Send + Sync + std::fmt::Debug {
    /// Snapshot of one pool.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::PoolNotFound`] if the pool is unknown.
    async fn get_pool(&self, pool_id: Uuid) -> Result<Pool, TopologyError>;
}

/// Pools taken from the configuration file.
#[derive(Debug, Default)]
pub struct ConfigTopology {
    pools: RwLock<HashMap<Uuid, Pool>>,
}

impl ConfigTopology {
    /// Topology serving `pools`.
    #[must_use]
    pub fn new(pools: impl IntoIterator<Item = Pool>) -> Self {
        Self {
            pools: RwLock::new(pools.into_iter().map(|p| (p.id, p)).collect()),
        }
    }

    /// Insert or replace a pool. Running cycles keep their snapshot.
    pub fn put(&self, pool: Pool) {
        self.pools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pool.id, pool);
    }

    /// Known pool ids.
    #[must_use]
    pub fn pool_ids(&self) -> Vec<Uuid> {
        self.pools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }
}

#[async_trait]
impl PoolTopology for ConfigTopology {
    async fn get_pool(&self, pool_id: Uuid) -> Result<Pool, TopologyError> {
        self.pools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&pool_id)
            .cloned()
            .ok_or(TopologyError::PoolNotFound { pool_id })
    }
}

/// Pools read from storage on every lookup.
#[derive(Debug, Clone)]
pub struct StorageTopology {
    storage: Arc<dyn Storage>,
}

impl StorageTopology {
    /// Topology backed by `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl PoolTopology for StorageTopology {
    async fn get_pool(&self, pool_id: Uuid) -> Result<Pool, TopologyError> {
        match self.storage.get_pool(pool_id).await {
            Ok(pool) => Ok(pool),
            Err(StorageError::NotFound { .. }) => Err(TopologyError::PoolNotFound { pool_id }),
            Err(e) => {
                warn!(pool_id = %pool_id, error = %e, "Pool lookup failed");
                Err(TopologyError::PoolNotFound { pool_id })
            }
        }
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod pool_tests;
