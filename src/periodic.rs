// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Periodic recovery and audit loop.
//!
//! Two timers drive poll-only cycles through the [`PoolManager`]:
//!
//! - **recovery**: domains stuck in PENDING longer than the threshold are
//!   re-polled. The backend call is assumed to have happened already.
//! - **sync**: optionally, every domain is re-polled regardless of status.
//!
//! Neither timer ever re-issues a backend control call.

use crate::constants::{
    DEFAULT_RECOVERY_INTERVAL_SECS, DEFAULT_RECOVERY_THRESHOLD_SECS, DEFAULT_SYNC_INTERVAL_SECS,
};
use crate::context::RequestContext;
use crate::engine::{CycleReport, PoolManager};
use crate::errors::EngineError;
use crate::model::Status;
use crate::storage::DomainCriteria;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info};

/// Timer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodicSettings {
    /// How often the PENDING sweep runs
    pub recovery_interval: Duration,
    /// How long a domain must have been PENDING before it is re-polled
    pub recovery_threshold: Duration,
    /// How often every domain is re-polled; `None` disables the full sync
    pub sync_interval: Option<Duration>,
}

impl Default for PeriodicSettings {
    fn default() -> Self {
        Self {
            recovery_interval: Duration::from_secs(DEFAULT_RECOVERY_INTERVAL_SECS),
            recovery_threshold: Duration::from_secs(DEFAULT_RECOVERY_THRESHOLD_SECS),
            sync_interval: Some(Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS)),
        }
    }
}

/// Background task re-driving polling for stale domains.
#[derive(Debug)]
pub struct RecoveryLoop {
    manager: Arc<PoolManager>,
    settings: PeriodicSettings,
}

/// Interval whose first tick is one period away, skipping missed ticks.
fn timer(period: Duration) -> Interval {
    let period = period.max(Duration::from_millis(1));
    let mut timer = interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    timer
}

impl RecoveryLoop {
    /// Build the loop. Nothing is polled until [`RecoveryLoop::run`] or a `*_once` call.
    #[must_use]
    pub fn new(manager: Arc<PoolManager>, settings: PeriodicSettings) -> Self {
        Self { manager, settings }
    }

    /// Re-poll every domain that has been PENDING for longer than the threshold.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Central`] if the domains cannot be listed.
    pub async fn sweep_once(&self) -> Result<Vec<CycleReport>, EngineError> {
        let ctx = RequestContext::admin();
        let threshold = chrono::Duration::from_std(self.settings.recovery_threshold)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let criteria = DomainCriteria::all()
            .with_status(Status::Pending)
            .updated_before(Utc::now() - threshold);

        let stale = self
            .manager
            .central()
            .find_domains(&ctx, &criteria)
            .await?;
        if stale.is_empty() {
            debug!("Recovery sweep found no stale domains");
            return Ok(Vec::new());
        }

        info!(
            domains = stale.len(),
            threshold_secs = self.settings.recovery_threshold.as_secs(),
            "Recovery sweep re-polling stale domains"
        );
        Ok(self.manager.repoll(&ctx, stale, "recovery").await)
    }

    /// Re-poll every domain.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Central`] if the domains cannot be listed.
    pub async fn sync_once(&self) -> Result<Vec<CycleReport>, EngineError> {
        self.manager.sync_domains(&RequestContext::admin()).await
    }

    /// Run both timers until `shutdown` turns `true` or its sender is dropped.
    ///
    /// A sweep in progress finishes before the loop checks for shutdown again.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut recovery = timer(self.settings.recovery_interval);
        let mut sync = self.settings.sync_interval.map(timer);

        info!(
            recovery_interval_secs = self.settings.recovery_interval.as_secs(),
            sync_interval_secs = self.settings.sync_interval.map(|d| d.as_secs()),
            "Periodic recovery loop started"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = recovery.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        error!(error = %e, "Recovery sweep failed");
                    }
                }
                _ = async { sync.as_mut()?.tick().await; Some(()) }, if sync.is_some() => {
                    match self.sync_once().await {
                        Ok(reports) => debug!(domains = reports.len(), "Periodic sync finished"),
                        Err(e) => error!(error = %e, "Periodic sync failed"),
                    }
                }
            }
        }

        info!("Periodic recovery loop stopped");
    }
}

#[cfg(test)]
#[path = "periodic_tests.rs"]
mod periodic_tests;
