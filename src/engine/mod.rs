// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Pool manager engine.
//!
//! The engine turns a domain change into a propagation cycle:
//!
//! 1. take a worker-pool permit, then the per-domain lock
//! 2. snapshot the domain's pool
//! 3. dispatch the control call to every backend target concurrently
//! 4. wait `poll_delay`, then poll every nameserver concurrently for the SOA serial
//! 5. report SUCCESS or ERROR to the authority
//!
//! A failing backend never stops the others and never stops polling. Only the
//! aggregate outcome reaches the authority. Poll-only cycles (sync, recovery)
//! skip steps 3 and 4's delay.
//!
//! # Example
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # async fn example(manager: Arc<zonepool::engine::PoolManager>,
//! #                  events: tokio::sync::mpsc::Receiver<zonepool::engine::ZoneEvent>) {
//! let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! let engine = tokio::spawn(manager.run(events, shutdown_rx));
//! // ...
//! shutdown_tx.send(true).ok();
//! engine.await.ok();
//! # }
//! ```

pub mod cycle;
mod poll;

pub use cycle::{CycleReport, CycleState, NameserverOutcome, TargetResult};

use crate::backend::{self, Backend};
use crate::cache::PoolManagerCache;
use crate::central::CentralApi;
use crate::constants::{
    DEFAULT_MAX_CONCURRENT_CYCLES, DEFAULT_POLL_DELAY_SECS, DEFAULT_POLL_MAX_RETRIES,
    DEFAULT_POLL_RETRY_INTERVAL_SECS, DEFAULT_POLL_TIMEOUT_SECS,
};
use crate::context::RequestContext;
use crate::dns::{DnsQuerier, SoaAnswer};
use crate::errors::{BackendError, CentralError, EngineError, StorageError};
use crate::locks::DomainLocks;
use crate::metrics;
use crate::model::{Action, Domain, Pool, Record, ZoneAction, ZoneType};
use crate::pool::PoolTopology;
use crate::serial::serial_gte;
use crate::storage::DomainCriteria;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Engine tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolManagerSettings {
    /// Timeout of one SOA query
    pub poll_timeout: Duration,
    /// Wait between two polls of the same nameserver
    pub poll_retry_interval: Duration,
    /// Poll attempts per nameserver per cycle
    pub poll_max_retries: u32,
    /// Wait after dispatch before the first poll
    pub poll_delay: Duration,
    /// Upper bound on concurrently running cycles
    pub max_concurrent_cycles: usize,
}

impl Default for PoolManagerSettings {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(DEFAULT_POLL_TIMEOUT_SECS),
            poll_retry_interval: Duration::from_secs(DEFAULT_POLL_RETRY_INTERVAL_SECS),
            poll_max_retries: DEFAULT_POLL_MAX_RETRIES,
            poll_delay: Duration::from_secs(DEFAULT_POLL_DELAY_SECS),
            max_concurrent_cycles: DEFAULT_MAX_CONCURRENT_CYCLES,
        }
    }
}

/// Work handed to the engine by the authority.
#[derive(Debug, Clone)]
pub enum ZoneEvent {
    /// A domain was created, updated or marked for deletion
    Domain {
        /// Caller context
        ctx: RequestContext,
        /// Cycle to run
        action: ZoneAction,
        /// Domain as committed
        domain: Domain,
    },
    /// A record changed; the domain's serial was bumped with it
    Record {
        /// Caller context
        ctx: RequestContext,
        /// What happened to the record
        action: ZoneAction,
        /// Parent domain as committed
        domain: Domain,
        /// Record as committed
        record: Record,
    },
    /// Re-poll without touching backends
    Sync {
        /// Caller context
        ctx: RequestContext,
        /// Domain to confirm
        domain: Domain,
    },
    /// Pull a secondary zone from its masters
    TriggerXfr {
        /// Caller context
        ctx: RequestContext,
        /// Secondary domain
        domain_id: Uuid,
    },
}

impl ZoneEvent {
    /// Context the event was raised with.
    #[must_use]
    pub fn ctx(&self) -> &RequestContext {
        match self {
            Self::Domain { ctx, .. }
            | Self::Record { ctx, .. }
            | Self::Sync { ctx, .. }
            | Self::TriggerXfr { ctx, .. } => ctx,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleMode {
    Dispatch,
    PollOnly,
}

/// Orchestrator of propagation cycles.
#[derive(Debug)]
pub struct PoolManager {
    settings: PoolManagerSettings,
    topology: Arc<dyn PoolTopology>,
    backends: HashMap<Uuid, Arc<dyn Backend>>,
    querier: Arc<dyn DnsQuerier>,
    cache: Arc<dyn PoolManagerCache>,
    central: Arc<dyn CentralApi>,
    locks: DomainLocks,
    permits: Semaphore,
}

impl PoolManager {
    /// Assemble an engine. `backends` maps pool target ids to their drivers.
    #[must_use]
    pub fn new(
        settings: PoolManagerSettings,
        topology: Arc<dyn PoolTopology>,
        backends: HashMap<Uuid, Arc<dyn Backend>>,
        querier: Arc<dyn DnsQuerier>,
        cache: Arc<dyn PoolManagerCache>,
        central: Arc<dyn CentralApi>,
    ) -> Self {
        let permits = Semaphore::new(settings.max_concurrent_cycles.max(1));
        Self {
            settings,
            topology,
            backends,
            querier,
            cache,
            central,
            locks: DomainLocks::new(),
            permits,
        }
    }

    /// Engine tuning.
    #[must_use]
    pub fn settings(&self) -> &PoolManagerSettings {
        &self.settings
    }

    /// Authority the engine reports to.
    #[must_use]
    pub fn central(&self) -> &Arc<dyn CentralApi> {
        &self.central
    }

    /// Propagate a new domain.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] only when a cycle cannot start (unknown pool,
    /// authority unreachable). Backend and nameserver failures end up in the
    /// [`CycleReport`].
    pub async fn create_domain(
        &self,
        ctx: &RequestContext,
        domain: &Domain,
    ) -> Result<CycleReport, EngineError> {
        self.run_cycle(ctx, domain, ZoneAction::Create, CycleMode::Dispatch)
            .await
    }

    /// Propagate a changed domain.
    ///
    /// # Errors
    ///
    /// See [`Self::create_domain`].
    pub async fn update_domain(
        &self,
        ctx: &RequestContext,
        domain: &Domain,
    ) -> Result<CycleReport, EngineError> {
        self.run_cycle(ctx, domain, ZoneAction::Update, CycleMode::Dispatch)
            .await
    }

    /// Remove a domain from every backend and confirm it is gone.
    ///
    /// # Errors
    ///
    /// See [`Self::create_domain`].
    pub async fn delete_domain(
        &self,
        ctx: &RequestContext,
        domain: &Domain,
    ) -> Result<CycleReport, EngineError> {
        self.run_cycle(ctx, domain, ZoneAction::Delete, CycleMode::Dispatch)
            .await
    }

    /// Propagate a new record. The record travels with its zone.
    ///
    /// # Errors
    ///
    /// See [`Self::create_domain`].
    pub async fn create_record(
        &self,
        ctx: &RequestContext,
        domain: &Domain,
        record: &Record,
    ) -> Result<CycleReport, EngineError> {
        self.record_cycle(ctx, domain, record, ZoneAction::Create)
            .await
    }

    /// Propagate a changed record.
    ///
    /// # Errors
    ///
    /// See [`Self::create_domain`].
    pub async fn update_record(
        &self,
        ctx: &RequestContext,
        domain: &Domain,
        record: &Record,
    ) -> Result<CycleReport, EngineError> {
        self.record_cycle(ctx, domain, record, ZoneAction::Update)
            .await
    }

    /// Propagate a record removal.
    ///
    /// # Errors
    ///
    /// See [`Self::create_domain`].
    pub async fn delete_record(
        &self,
        ctx: &RequestContext,
        domain: &Domain,
        record: &Record,
    ) -> Result<CycleReport, EngineError> {
        self.record_cycle(ctx, domain, record, ZoneAction::Delete)
            .await
    }

    async fn record_cycle(
        &self,
        ctx: &RequestContext,
        domain: &Domain,
        record: &Record,
        record_action: ZoneAction,
    ) -> Result<CycleReport, EngineError> {
        debug!(
            zone = %domain.name,
            record_id = %record.id,
            record_action = %record_action,
            serial = domain.serial,
            "Record change propagates as a zone update"
        );
        self.update_domain(ctx, domain).await
    }

    /// Re-poll a domain without backend calls, using the action stored on it.
    ///
    /// # Errors
    ///
    /// See [`Self::create_domain`].
    pub async fn sync_domain(
        &self,
        ctx: &RequestContext,
        domain: &Domain,
    ) -> Result<CycleReport, EngineError> {
        let action = ZoneAction::from_action(domain.action);
        self.run_cycle(ctx, domain, action, CycleMode::PollOnly)
            .await
    }

    /// Re-poll every domain regardless of status.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Central`] if the domains cannot be listed.
    /// Individual cycle failures are logged and left out of the result.
    pub async fn sync_domains(&self, ctx: &RequestContext) -> Result<Vec<CycleReport>, EngineError> {
        let domains = self
            .central
            .find_domains(&ctx.elevated(), &DomainCriteria::all())
            .await?;
        info!(domains = domains.len(), "Syncing all domains");
        Ok(self.repoll(ctx, domains, "sync").await)
    }

    /// Poll-only cycles for `domains`, run concurrently within the worker-pool bound.
    pub async fn repoll(
        &self,
        ctx: &RequestContext,
        domains: Vec<Domain>,
        kind: &str,
    ) -> Vec<CycleReport> {
        metrics::record_recovery(kind, domains.len());
        join_all(domains.iter().map(|domain| async move {
            match self.sync_domain(ctx, domain).await {
                Ok(report) => Some(report),
                Err(e) => {
                    error!(zone = %domain.name, kind, error = %e, "Re-poll failed");
                    None
                }
            }
        }))
        .await
        .into_iter()
        .flatten()
        .collect()
    }

    /// Refresh a secondary zone from its masters, then run an update cycle.
    ///
    /// Every master is asked for its SOA serial. The highest answer (RFC 1982)
    /// is adopted when it is newer than the domain's serial.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidOperation`] for a primary zone or a
    /// secondary without masters, and [`EngineError::Central`] if the
    /// authority cannot be reached.
    pub async fn trigger_xfr(
        &self,
        ctx: &RequestContext,
        domain_id: Uuid,
    ) -> Result<CycleReport, EngineError> {
        let admin = ctx.elevated();
        let domain = self.central.get_domain(&admin, domain_id).await?;
        if domain.zone_type != ZoneType::Secondary {
            return Err(EngineError::InvalidOperation(format!(
                "zone '{}' is not a secondary zone",
                domain.name
            )));
        }
        if domain.masters.is_empty() {
            return Err(EngineError::InvalidOperation(format!(
                "secondary zone '{}' has no masters",
                domain.name
            )));
        }

        let zone = &domain.name;
        let answers = join_all(domain.masters.iter().map(|master| async move {
            let addr = match master.socket_addr() {
                Ok(addr) => addr,
                Err(e) => {
                    warn!(zone = %zone, master = %master, error = %e, "Skipping master");
                    return None;
                }
            };
            match self
                .querier
                .query_soa(addr, zone, self.settings.poll_timeout)
                .await
            {
                Ok(SoaAnswer::Serial(serial)) => Some(serial),
                Ok(SoaAnswer::Absent) => {
                    warn!(zone = %zone, master = %addr, "Master does not serve the zone");
                    None
                }
                Err(e) => {
                    warn!(zone = %zone, master = %addr, error = %e, "Master SOA query failed");
                    None
                }
            }
        }))
        .await;

        let newest = answers
            .into_iter()
            .flatten()
            .reduce(|a, b| if serial_gte(b, a) { b } else { a });

        let domain = match newest {
            Some(serial) if serial != domain.serial && serial_gte(serial, domain.serial) => {
                info!(zone = %domain.name, from = domain.serial, to = serial, "Adopting newer serial from masters");
                self.central.record_transfer(&admin, domain.id, serial).await?
            }
            Some(serial) => {
                info!(zone = %domain.name, serial, "Masters have no newer serial");
                domain
            }
            None => {
                warn!(zone = %domain.name, "No master answered the SOA query");
                domain
            }
        };

        self.update_domain(ctx, &domain).await
    }

    /// Run the cycle an event asks for.
    ///
    /// # Errors
    ///
    /// See [`Self::create_domain`] and [`Self::trigger_xfr`].
    pub async fn handle_event(&self, event: ZoneEvent) -> Result<CycleReport, EngineError> {
        match event {
            ZoneEvent::Domain {
                ctx,
                action,
                domain,
            } => match action {
                ZoneAction::Create => self.create_domain(&ctx, &domain).await,
                ZoneAction::Update => self.update_domain(&ctx, &domain).await,
                ZoneAction::Delete => self.delete_domain(&ctx, &domain).await,
            },
            ZoneEvent::Record {
                ctx,
                action,
                domain,
                record,
            } => match action {
                ZoneAction::Create => self.create_record(&ctx, &domain, &record).await,
                ZoneAction::Update => self.update_record(&ctx, &domain, &record).await,
                ZoneAction::Delete => self.delete_record(&ctx, &domain, &record).await,
            },
            ZoneEvent::Sync { ctx, domain } => self.sync_domain(&ctx, &domain).await,
            ZoneEvent::TriggerXfr { ctx, domain_id } => self.trigger_xfr(&ctx, domain_id).await,
        }
    }

    /// Consume events until the channel closes or `shutdown` turns `true`,
    /// one cycle task per event.
    ///
    /// Cycles still running at that point are awaited before returning.
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::Receiver<ZoneEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(
            max_concurrent_cycles = self.settings.max_concurrent_cycles,
            "Pool manager event loop started"
        );
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                event = events.recv() => {
                    let Some(event) = event else { break };
                    let manager = Arc::clone(&self);
                    tasks.spawn(async move {
                        let request_id = event.ctx().request_id.clone();
                        (request_id, manager.handle_event(event).await)
                    });
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => log_task(joined),
            }
        }

        while let Some(joined) = tasks.join_next().await {
            log_task(joined);
        }
        info!("Pool manager event loop stopped");
    }

    async fn run_cycle(
        &self,
        ctx: &RequestContext,
        domain: &Domain,
        action: ZoneAction,
        mode: CycleMode,
    ) -> Result<CycleReport, EngineError> {
        // Lock first: cycles queued behind a busy domain must not hold a worker slot
        let _guard = self.locks.lock(domain.id).await;
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| EngineError::InvalidOperation(format!("worker pool closed: {e}")))?;

        metrics::cycle_started();
        let started = Instant::now();
        let result = self.cycle_locked(ctx, domain, action, mode, started).await;
        metrics::cycle_finished();

        if let Ok(report) = &result {
            metrics::record_cycle(action, report.state.as_str(), report.duration);
        }
        result
    }

    async fn cycle_locked(
        &self,
        ctx: &RequestContext,
        domain: &Domain,
        action: ZoneAction,
        mode: CycleMode,
        started: Instant,
    ) -> Result<CycleReport, EngineError> {
        let admin = ctx.elevated();
        let pool = self.topology.get_pool(domain.pool_id).await?;

        // The event may be older than the row; always confirm the latest serial
        let Some(current) = self.current_domain(&admin, domain.id).await? else {
            return Ok(abandon(CycleReport::new(domain, action), "domain no longer exists", started));
        };
        let mut report = CycleReport::new(&current, action);
        if is_superseded(action, &current) {
            return Ok(abandon(report, "domain is being deleted", started));
        }
        let target = current.serial;

        info!(
            request_id = %ctx.request_id,
            zone = %current.name,
            action = %action,
            serial = target,
            nameservers = pool.nameservers.len(),
            targets = pool.targets.len(),
            poll_only = mode == CycleMode::PollOnly,
            "Starting propagation cycle"
        );

        if mode == CycleMode::Dispatch {
            report.targets = self.dispatch_all(ctx, &pool, action, &current).await;
            report.state = CycleState::Dispatched;
            debug!(
                zone = %current.name,
                succeeded = report.targets.iter().filter(|t| t.is_success()).count(),
                failed = report.targets.iter().filter(|t| !t.is_success()).count(),
                "Backends dispatched"
            );

            if let Some(reason) = self.abandon_reason(&admin, &current, action).await? {
                return Ok(abandon(report, reason, started));
            }
            if !self.settings.poll_delay.is_zero() {
                tokio::time::sleep(self.settings.poll_delay).await;
            }
        }

        report.state = CycleState::Polling;
        report.nameservers = join_all(
            pool.nameservers
                .iter()
                .map(|ns| self.poll_nameserver(ctx, ns, &current, action, target)),
        )
        .await;

        if let Some(reason) = self.abandon_reason(&admin, &current, action).await? {
            return Ok(abandon(report, reason, started));
        }

        let verdict = cycle::aggregate(&report.nameservers, target);
        report.state = verdict.state;
        match self
            .central
            .update_status(&admin, current.id, verdict.status, verdict.serial)
            .await
        {
            Ok(()) => report.reported = Some(verdict.status),
            Err(e) => error!(
                zone = %current.name,
                status = %verdict.status,
                error = %e,
                "Failed to report cycle outcome"
            ),
        }

        if report.is_converged() && action == ZoneAction::Delete {
            if let Err(e) = self.cache.clear(ctx, current.id).await {
                warn!(zone = %current.name, error = %e, "Failed to clear pool manager status");
            }
        }

        report.duration = started.elapsed();
        info!(
            request_id = %ctx.request_id,
            zone = %current.name,
            action = %action,
            serial = target,
            outcome = %report.state,
            duration_ms = u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX),
            "Propagation cycle finished"
        );
        Ok(report)
    }

    async fn dispatch_all(
        &self,
        ctx: &RequestContext,
        pool: &Pool,
        action: ZoneAction,
        zone: &Domain,
    ) -> Vec<TargetResult> {
        join_all(pool.targets.iter().map(|target| async move {
            match self.backends.get(&target.id) {
                Some(driver) => TargetResult {
                    target_id: target.id,
                    backend: driver.describe(),
                    error: backend::dispatch(driver.as_ref(), ctx, action, zone)
                        .await
                        .err(),
                },
                None => {
                    error!(target_id = %target.id, zone = %zone.name, "No driver built for pool target");
                    TargetResult {
                        target_id: target.id,
                        backend: target.backend_type.clone(),
                        error: Some(BackendError::UnknownBackendType {
                            backend_type: target.backend_type.clone(),
                        }),
                    }
                }
            }
        }))
        .await
    }

    async fn current_domain(
        &self,
        ctx: &RequestContext,
        domain_id: Uuid,
    ) -> Result<Option<Domain>, EngineError> {
        match self.central.get_domain(ctx, domain_id).await {
            Ok(domain) => Ok(Some(domain)),
            Err(CentralError::Storage(StorageError::NotFound { .. })) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn abandon_reason(
        &self,
        ctx: &RequestContext,
        domain: &Domain,
        action: ZoneAction,
    ) -> Result<Option<&'static str>, EngineError> {
        Ok(match self.current_domain(ctx, domain.id).await? {
            None => Some("domain no longer exists"),
            Some(current) if is_superseded(action, &current) => Some("domain is being deleted"),
            Some(_) => None,
        })
    }
}

fn abandon(mut report: CycleReport, reason: &str, started: Instant) -> CycleReport {
    report.state = CycleState::Abandoned;
    report.duration = started.elapsed();
    info!(zone = %report.zone, action = %report.action, reason, "Propagation cycle abandoned");
    report
}

fn is_superseded(action: ZoneAction, current: &Domain) -> bool {
    action != ZoneAction::Delete && current.action == Action::Delete
}

fn log_task(
    joined: Result<(String, Result<CycleReport, EngineError>), tokio::task::JoinError>,
) {
    match joined {
        Ok((request_id, Ok(report))) => debug!(
            request_id = %request_id,
            zone = %report.zone,
            outcome = %report.state,
            "Event handled"
        ),
        Ok((request_id, Err(e))) => {
            error!(request_id = %request_id, error = %e, "Event could not be handled");
        }
        Err(e) => error!(error = %e, "Cycle task panicked or was cancelled"),
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
