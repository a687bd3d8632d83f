// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Per-nameserver polling.
//!
//! Each nameserver is polled on its own, so a slow one never holds back the
//! others. Every answer is written to the convergence cache. A missing entry
//! is normal for the first poll of a zone and starts at serial 0; a version
//! conflict is resolved by re-reading the entry and writing again.

use super::cycle::{evaluate, NameserverOutcome};
use super::PoolManager;
use crate::constants::CACHE_CONFLICT_RETRIES;
use crate::context::RequestContext;
use crate::errors::CacheError;
use crate::metrics;
use crate::model::{CacheKey, Domain, PollStatus, PoolManagerStatus, PoolServer, ZoneAction};
use tracing::{debug, error, info, warn};

impl PoolManager {
    /// Poll one nameserver until it confirms `target` or the retry budget runs out.
    pub(super) async fn poll_nameserver(
        &self,
        ctx: &RequestContext,
        nameserver: &PoolServer,
        zone: &Domain,
        action: ZoneAction,
        target: u32,
    ) -> NameserverOutcome {
        let key = CacheKey {
            nameserver_id: nameserver.id,
            zone_id: zone.id,
            action,
        };
        let mut outcome = NameserverOutcome::new(nameserver);

        let addr = match nameserver.socket_addr() {
            Ok(addr) => addr,
            Err(e) => {
                error!(nameserver = %nameserver, zone = %zone.name, error = %e, "Nameserver address is invalid");
                outcome.status = PollStatus::Error;
                outcome.last_error = Some(e.to_string());
                self.record_poll(ctx, key, PollStatus::Error, None).await;
                return outcome;
            }
        };

        let max_retries = self.settings.poll_max_retries.max(1);
        for attempt in 1..=max_retries {
            outcome.attempts = attempt;

            match self
                .querier
                .query_soa(addr, &zone.name, self.settings.poll_timeout)
                .await
            {
                Ok(answer) => {
                    outcome.answered = true;
                    outcome.last_error = None;
                    let eval = evaluate(action, answer, target);
                    metrics::record_poll(eval.label);
                    if let Some(serial) = eval.serial {
                        outcome.observed_serial = serial;
                    }

                    if eval.converged {
                        debug!(
                            nameserver = %addr,
                            zone = %zone.name,
                            action = %action,
                            serial = target,
                            attempt,
                            "Nameserver confirmed"
                        );
                        outcome.status = PollStatus::Success;
                        self.record_poll(ctx, key, PollStatus::Success, eval.serial)
                            .await;
                        return outcome;
                    }

                    debug!(
                        nameserver = %addr,
                        zone = %zone.name,
                        action = %action,
                        observed = ?eval.serial,
                        target,
                        attempt,
                        "Nameserver has not caught up"
                    );
                    self.record_poll(ctx, key, PollStatus::Pending, eval.serial)
                        .await;
                }
                Err(e) => {
                    if e.is_timeout() {
                        metrics::record_poll("timeout");
                        warn!(nameserver = %addr, zone = %zone.name, attempt, error = %e, "SOA query timed out");
                    } else {
                        metrics::record_poll("bad_response");
                        info!(
                            nameserver = %addr,
                            zone = %zone.name,
                            attempt,
                            reason = e.reason(),
                            error = %e,
                            "Discarding SOA response"
                        );
                    }
                    outcome.last_error = Some(e.to_string());
                    self.record_poll(ctx, key, PollStatus::Pending, None).await;
                }
            }

            if attempt < max_retries {
                tokio::time::sleep(self.settings.poll_retry_interval).await;
            }
        }

        warn!(
            nameserver = %addr,
            zone = %zone.name,
            action = %action,
            target,
            attempts = outcome.attempts,
            "Nameserver did not confirm within the retry budget"
        );
        outcome.status = PollStatus::Error;
        self.record_poll(ctx, key, PollStatus::Error, None).await;
        outcome
    }

    /// Write one poll result, re-reading on version conflicts.
    ///
    /// Cache failures are logged and never fail the cycle.
    pub(super) async fn record_poll(
        &self,
        ctx: &RequestContext,
        key: CacheKey,
        status: PollStatus,
        serial: Option<u32>,
    ) {
        for _ in 0..=CACHE_CONFLICT_RETRIES {
            let mut entry = match self.cache.retrieve(ctx, key).await {
                Ok(entry) => entry,
                Err(CacheError::NotFound { .. }) => {
                    debug!(key = %key, "First poll result for this key");
                    PoolManagerStatus::new(key)
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Cache read failed, poll result not recorded");
                    return;
                }
            };
            entry.status = status;
            if let Some(serial) = serial {
                entry.serial_number = serial;
            }

            match self.cache.store(ctx, &entry).await {
                Ok(_) => return,
                Err(e @ CacheError::Conflict { .. }) => {
                    metrics::record_cache_conflict();
                    debug!(key = %key, error = %e, "Cache conflict, re-reading");
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Cache write failed, poll result not recorded");
                    return;
                }
            }
        }
        warn!(key = %key, retries = CACHE_CONFLICT_RETRIES, "Gave up recording poll result after repeated conflicts");
    }
}
