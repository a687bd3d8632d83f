// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Convergence cache.
//!
//! One [`PoolManagerStatus`] per (nameserver, zone, action) records the last
//! serial seen on that nameserver and whether it has confirmed the action.
//!
//! A miss on [`PoolManagerCache::retrieve`] is normal: the first poll of a new
//! zone has no baseline. Writes are versioned. An entry read at version `n`
//! can only be stored while the cache still holds version `n`; a new entry is
//! stored with version 0. Anything else is a [`CacheError::Conflict`] and the
//! writer must re-read before trying again.

use crate::config::{CacheConfig, CacheDriver};
use crate::context::RequestContext;
use crate::errors::CacheError;
use crate::model::{CacheKey, PoolManagerStatus};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, trace};
use uuid::Uuid;

/// Keyed store of per-nameserver convergence state.
#[async_trait]
pub trait PoolManagerCache: Send + Sync + std::fmt::Debug {
    /// Write `entry` and return the stored copy with its new version.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Conflict`] if `entry.version` is not the stored
    /// version (0 for an entry that does not exist yet).
    async fn store(
        &self,
        ctx: &RequestContext,
        entry: &PoolManagerStatus,
    ) -> Result<PoolManagerStatus, CacheError>;

    /// Read one entry.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NotFound`] if the key was never stored.
    async fn retrieve(
        &self,
        ctx: &RequestContext,
        key: CacheKey,
    ) -> Result<PoolManagerStatus, CacheError>;

    /// Drop every entry of a zone, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Persistence`] if the durable copy cannot be written.
    async fn clear(&self, ctx: &RequestContext, zone_id: Uuid) -> Result<usize, CacheError>;
}

#[derive(Debug, Clone, Default)]
struct CacheTable {
    entries: BTreeMap<CacheKey, PoolManagerStatus>,
}

impl CacheTable {
    fn get(&self, key: CacheKey) -> Result<PoolManagerStatus, CacheError> {
        self.entries
            .get(&key)
            .cloned()
            .ok_or_else(|| CacheError::NotFound {
                key: key.to_string(),
            })
    }

    fn store(&mut self, entry: &PoolManagerStatus) -> Result<PoolManagerStatus, CacheError> {
        let key = entry.key();
        let now = Utc::now();
        let current = self.entries.get(&key);
        let actual = current.map_or(0, |c| c.version);
        if actual != entry.version {
            return Err(CacheError::Conflict {
                key: key.to_string(),
                expected: entry.version,
                actual,
            });
        }

        let mut stored = entry.clone();
        stored.version = actual + 1;
        stored.created_at = current.map_or(now, |c| c.created_at);
        stored.updated_at = now;
        self.entries.insert(key, stored.clone());
        Ok(stored)
    }

    fn clear(&mut self, zone_id: Uuid) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.zone_id != zone_id);
        before - self.entries.len()
    }
}

/// Cache held in process memory.
#[derive(Debug, Default)]
pub struct MemoryCache {
    table: Mutex<CacheTable>,
}

impl MemoryCache {
    /// Empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    /// `true` when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PoolManagerCache for MemoryCache {
    async fn store(
        &self,
        ctx: &RequestContext,
        entry: &PoolManagerStatus,
    ) -> Result<PoolManagerStatus, CacheError> {
        let stored = self
            .table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .store(entry)?;
        trace!(request_id = %ctx.request_id, key = %stored.key(), version = stored.version, "Stored pool manager status");
        Ok(stored)
    }

    async fn retrieve(
        &self,
        _ctx: &RequestContext,
        key: CacheKey,
    ) -> Result<PoolManagerStatus, CacheError> {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
    }

    async fn clear(&self, ctx: &RequestContext, zone_id: Uuid) -> Result<usize, CacheError> {
        let removed = self
            .table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear(zone_id);
        debug!(request_id = %ctx.request_id, zone_id = %zone_id, removed, "Cleared pool manager status");
        Ok(removed)
    }
}

/// On-disk layout of [`FileCache`].
#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    entries: Vec<PoolManagerStatus>,
}

/// Cache persisted as a JSON file after every write.
///
/// Writes go to a temporary file that is renamed over the previous copy. The
/// in-memory table only changes once the file is written, so a failed write
/// leaves both copies at the previous state.
#[derive(Debug)]
pub struct FileCache {
    path: PathBuf,
    table: tokio::sync::Mutex<CacheTable>,
}

impl FileCache {
    /// Load the cache from `path`, starting empty if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Persistence`] if the file exists but cannot be
    /// read or parsed.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let path = path.into();
        let table = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let file: CacheFile = serde_json::from_slice(&bytes).map_err(|e| {
                    CacheError::Persistence(format!("{}: {e}", path.display()))
                })?;
                CacheTable {
                    entries: file.entries.into_iter().map(|e| (e.key(), e)).collect(),
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CacheTable::default(),
            Err(e) => {
                return Err(CacheError::Persistence(format!("{}: {e}", path.display())));
            }
        };

        info!(path = %path.display(), entries = table.entries.len(), "Loaded pool manager cache");
        Ok(Self {
            path,
            table: tokio::sync::Mutex::new(table),
        })
    }

    /// File backing this cache.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, table: &CacheTable) -> Result<(), CacheError> {
        let file = CacheFile {
            entries: table.entries.values().cloned().collect(),
        };
        let body = serde_json::to_vec_pretty(&file)
            .map_err(|e| CacheError::Persistence(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CacheError::Persistence(format!("{}: {e}", parent.display())))?;
        }

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| CacheError::Persistence(format!("{}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| CacheError::Persistence(format!("{}: {e}", self.path.display())))
    }
}

#[async_trait]
impl PoolManagerCache for FileCache {
    async fn store(
        &self,
        ctx: &RequestContext,
        entry: &PoolManagerStatus,
    ) -> Result<PoolManagerStatus, CacheError> {
        let mut table = self.table.lock().await;
        let mut staged = table.clone();
        let stored = staged.store(entry)?;
        self.persist(&staged).await?;
        *table = staged;
        trace!(request_id = %ctx.request_id, key = %stored.key(), version = stored.version, "Stored pool manager status");
        Ok(stored)
    }

    async fn retrieve(
        &self,
        _ctx: &RequestContext,
        key: CacheKey,
    ) -> Result<PoolManagerStatus, CacheError> {
        self.table.lock().await.get(key)
    }

    async fn clear(&self, ctx: &RequestContext, zone_id: Uuid) -> Result<usize, CacheError> {
        let mut table = self.table.lock().await;
        let mut staged = table.clone();
        let removed = staged.clear(zone_id);
        if removed > 0 {
            self.persist(&staged).await?;
            *table = staged;
        }
        debug!(request_id = %ctx.request_id, zone_id = %zone_id, removed, "Cleared pool manager status");
        Ok(removed)
    }
}

/// Build the cache selected by `config`.
///
/// # Errors
///
/// Returns [`CacheError::Persistence`] if the file driver has no path or its
/// file cannot be loaded.
pub async fn open_cache(config: &CacheConfig) -> Result<Arc<dyn PoolManagerCache>, CacheError> {
    match config.driver {
        CacheDriver::Memory => Ok(Arc::new(MemoryCache::new())),
        CacheDriver::File => {
            let path = config.path.as_ref().ok_or_else(|| {
                CacheError::Persistence("file cache requires 'path'".to_string())
            })?;
            Ok(Arc::new(FileCache::open(path.clone()).await?))
        }
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod cache_tests;
