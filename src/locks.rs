// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Keyed per-domain locks.
//!
//! One async mutex per domain id, created on first use. Holding the guard
//! serializes work on that domain; different domains never contend.
//! Locks are not reentrant: a task that already holds the guard for a domain
//! and asks for it again waits forever, so callers acquire once per unit of work.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;
use tracing::trace;
use uuid::Uuid;

/// Guard returned by [`DomainLocks::lock`]. Dropping it releases the domain.
pub type DomainGuard = OwnedMutexGuard<()>;

/// Lock manager keyed by domain id.
#[derive(Debug, Default)]
pub struct DomainLocks {
    locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl DomainLocks {
    /// Empty lock manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, domain_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        // Drop entries nobody holds or waits on
        locks.retain(|id, lock| *id == domain_id || Arc::strong_count(lock) > 1);

        Arc::clone(locks.entry(domain_id).or_default())
    }

    /// Wait for exclusive access to `domain_id`.
    pub async fn lock(&self, domain_id: Uuid) -> DomainGuard {
        let lock = self.entry(domain_id);
        trace!(domain_id = %domain_id, "Waiting for domain lock");
        lock.lock_owned().await
    }

    /// Take the lock only if it is free.
    #[must_use]
    pub fn try_lock(&self, domain_id: Uuid) -> Option<DomainGuard> {
        self.entry(domain_id).try_lock_owned().ok()
    }

    /// Number of domains with a live lock entry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// `true` when no lock entry is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "locks_tests.rs"]
mod locks_tests;
