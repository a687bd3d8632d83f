// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Central authority.
//!
//! Owns the canonical domain and record rows. Every mutation:
//!
//! 1. takes the authority's per-domain lock
//! 2. applies the action/status state machine to the rows it touches
//! 3. commits one [`ChangeSet`]
//! 4. emits the notifications queued during the work
//! 5. hands the domain to the pool manager through the event channel
//!
//! The pool manager reports back through [`CentralApi::update_status`], which
//! is the only way a domain leaves PENDING.

use crate::constants::{
    EVENT_DOMAIN_CREATE, EVENT_DOMAIN_DELETE, EVENT_DOMAIN_TOUCH, EVENT_DOMAIN_UPDATE,
    EVENT_RECORD_CREATE, EVENT_RECORD_DELETE, EVENT_RECORD_UPDATE, SERIAL_UNKNOWN,
};
use crate::context::RequestContext;
use crate::engine::ZoneEvent;
use crate::errors::{CentralError, StorageError};
use crate::locks::DomainLocks;
use crate::metrics;
use crate::model::{
    Action, Domain, Record, RecordSet, ReportedStatus, Status, ZoneAction, ZoneType,
};
use crate::notifier::{Notifier, PendingEvents};
use crate::pool::PoolTopology;
use crate::serial::{self, serial_gte};
use crate::status::{transition, RowEvent, RowState, Transition};
use crate::storage::{ChangeSet, DomainCriteria, RecordCriteria, Storage};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Maximum length of a zone name in presentation format
const MAX_ZONE_NAME_LEN: usize = 255;

/// Maximum length of one label
const MAX_LABEL_LEN: usize = 63;

/// What the pool manager needs from the authority.
#[async_trait]
pub trait CentralApi: Send + Sync + std::fmt::Debug {
    /// Fetch one domain.
    ///
    /// # Errors
    ///
    /// Returns [`CentralError::Storage`] wrapping [`StorageError::NotFound`]
    /// if the domain does not exist or is not visible to `ctx`.
    async fn get_domain(&self, ctx: &RequestContext, domain_id: Uuid)
        -> Result<Domain, CentralError>;

    /// Domains matching `criteria` visible to `ctx`.
    ///
    /// # Errors
    ///
    /// Returns [`CentralError::Storage`] if storage fails.
    async fn find_domains(
        &self,
        ctx: &RequestContext,
        criteria: &DomainCriteria,
    ) -> Result<Vec<Domain>, CentralError>;

    /// Apply the outcome of a propagation cycle to a domain and its records.
    ///
    /// A SUCCESS for at least the stored serial settles the rows (or removes
    /// them for a delete). An ERROR only lands on a PENDING row and only when
    /// `serial` is 0 or at least the stored serial, so a late report from a
    /// superseded cycle cannot clobber newer state. Unknown domains are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`CentralError`] if the rows cannot be read or written.
    async fn update_status(
        &self,
        ctx: &RequestContext,
        domain_id: Uuid,
        status: ReportedStatus,
        serial: u32,
    ) -> Result<(), CentralError>;

    /// Record that a secondary zone was transferred from its masters at `serial`.
    ///
    /// A serial newer than the stored one is adopted and the domain goes back
    /// to PENDING.
    ///
    /// # Errors
    ///
    /// Returns [`CentralError`] if the domain is missing or being deleted.
    async fn record_transfer(
        &self,
        ctx: &RequestContext,
        domain_id: Uuid,
        serial: u32,
    ) -> Result<Domain, CentralError>;
}

/// In-process authority backed by [`Storage`].
#[derive(Debug)]
pub struct Central {
    storage: Arc<dyn Storage>,
    topology: Arc<dyn PoolTopology>,
    notifier: Arc<dyn Notifier>,
    events: mpsc::Sender<ZoneEvent>,
    locks: DomainLocks,
}

fn row_state_of_domain(domain: &Domain) -> RowState {
    RowState::new(domain.action, domain.status)
}

fn row_state_of_record(record: &Record) -> RowState {
    RowState::new(record.action, record.status)
}

fn apply(
    kind: &'static str,
    id: Uuid,
    from: RowState,
    row_serial: u32,
    event: RowEvent,
) -> Result<Transition, CentralError> {
    transition(from, row_serial, event).map_err(|e| CentralError::InvalidTransition {
        kind,
        id,
        reason: e.to_string(),
    })
}

/// Resulting state of a mutation or delete, which always lands on a state.
fn applied_state(
    kind: &'static str,
    id: Uuid,
    from: RowState,
    row_serial: u32,
    event: RowEvent,
) -> Result<RowState, CentralError> {
    match apply(kind, id, from, row_serial, event)? {
        Transition::Applied(state) => Ok(state),
        other => Err(CentralError::InvalidTransition {
            kind,
            id,
            reason: format!("unexpected outcome {other:?} for {from}"),
        }),
    }
}

fn not_found(kind: &'static str, id: Uuid) -> CentralError {
    CentralError::Storage(StorageError::NotFound {
        kind,
        id: id.to_string(),
    })
}

fn validate_zone_name(name: &str) -> Result<(), CentralError> {
    if !name.ends_with('.') || name.len() < 2 {
        return Err(CentralError::BadRequest(format!(
            "zone name '{name}' must be fully qualified with a trailing dot"
        )));
    }
    if name.len() > MAX_ZONE_NAME_LEN {
        return Err(CentralError::BadRequest(format!(
            "zone name '{name}' is longer than {MAX_ZONE_NAME_LEN} characters"
        )));
    }
    let labels = name.trim_end_matches('.').split('.');
    for label in labels {
        if label.is_empty() || label.len() > MAX_LABEL_LEN {
            return Err(CentralError::BadRequest(format!(
                "zone name '{name}' has an empty or oversized label"
            )));
        }
    }
    Ok(())
}

fn in_zone(record_name: &str, zone: &str) -> bool {
    record_name == zone || record_name.ends_with(&format!(".{zone}"))
}

impl Central {
    /// Authority writing to `storage` and feeding `events` to the pool manager.
    #[must_use]
    pub fn new(
        storage: Arc<dyn Storage>,
        topology: Arc<dyn PoolTopology>,
        notifier: Arc<dyn Notifier>,
        events: mpsc::Sender<ZoneEvent>,
    ) -> Self {
        Self {
            storage,
            topology,
            notifier,
            events,
            locks: DomainLocks::new(),
        }
    }

    async fn load_domain(
        &self,
        ctx: &RequestContext,
        domain_id: Uuid,
    ) -> Result<Domain, CentralError> {
        let domain = self.storage.get_domain(domain_id).await?;
        if ctx.can_access(&domain.tenant_id) {
            Ok(domain)
        } else {
            Err(not_found("Domain", domain_id))
        }
    }

    async fn commit(
        &self,
        ctx: &RequestContext,
        changes: ChangeSet,
        pending: PendingEvents,
    ) -> Result<(), CentralError> {
        if !changes.is_empty() {
            self.storage.commit(changes).await?;
        }
        pending.emit(self.notifier.as_ref(), ctx).await;
        Ok(())
    }

    async fn send(&self, event: ZoneEvent) -> Result<(), CentralError> {
        self.events
            .send(event)
            .await
            .map_err(|e| CentralError::Dispatch(e.to_string()))
    }

    /// Move a domain to its next mutation state and bump its serial.
    ///
    /// Secondary zones keep the serial of their masters.
    fn bumped(domain: &Domain) -> Result<Domain, CentralError> {
        let state = applied_state(
            "Domain",
            domain.id,
            row_state_of_domain(domain),
            domain.serial,
            RowEvent::Mutate,
        )?;
        let mut updated = domain.clone();
        updated.action = state.action;
        updated.status = state.status;
        if updated.zone_type == ZoneType::Primary {
            updated.serial = serial::increment(domain.serial);
        }
        Ok(updated)
    }

    /// Create a domain and start its CREATE cycle.
    ///
    /// # Errors
    ///
    /// Returns [`CentralError::NoNameservers`] if the pool cannot confirm
    /// propagation, [`CentralError::BadRequest`] for an invalid name or a
    /// secondary without masters, and [`CentralError::Storage`] for a
    /// duplicate name.
    pub async fn create_domain(
        &self,
        ctx: &RequestContext,
        mut domain: Domain,
    ) -> Result<Domain, CentralError> {
        validate_zone_name(&domain.name)?;
        if !ctx.can_access(&domain.tenant_id) {
            return Err(CentralError::BadRequest(format!(
                "cannot create a domain for tenant '{}'",
                domain.tenant_id
            )));
        }
        if domain.zone_type == ZoneType::Secondary && domain.masters.is_empty() {
            return Err(CentralError::BadRequest(format!(
                "secondary zone '{}' needs at least one master",
                domain.name
            )));
        }

        let pool = self.topology.get_pool(domain.pool_id).await?;
        if pool.nameservers.is_empty() {
            return Err(CentralError::NoNameservers { pool_id: pool.id });
        }

        let domain = {
            let _guard = self.locks.lock(domain.id).await;
            let state = RowState::CREATED;
            domain.action = state.action;
            domain.status = state.status;
            domain.serial = match domain.zone_type {
                ZoneType::Primary => serial::increment(SERIAL_UNKNOWN),
                ZoneType::Secondary => 1,
            };

            let mut changes = ChangeSet::new();
            changes.create_domain(domain.clone());
            let mut pending = PendingEvents::new();
            pending.push(EVENT_DOMAIN_CREATE, &domain);
            self.commit(ctx, changes, pending).await?;
            self.storage.get_domain(domain.id).await?
        };

        info!(zone = %domain.name, domain_id = %domain.id, serial = domain.serial, pool_id = %domain.pool_id, "Domain created");
        self.send(ZoneEvent::Domain {
            ctx: ctx.clone(),
            action: ZoneAction::Create,
            domain: domain.clone(),
        })
        .await?;
        Ok(domain)
    }

    /// Apply edits to a domain and start an UPDATE cycle (CREATE while the
    /// create is unconfirmed).
    ///
    /// Only `email`, `ttl` and `masters` may change. `domain.version` must be
    /// the version the caller read.
    ///
    /// # Errors
    ///
    /// Returns [`CentralError::InvalidTransition`] if the domain is being
    /// deleted, [`CentralError::BadRequest`] if an immutable field changed,
    /// and [`CentralError::Storage`] on a stale version.
    pub async fn update_domain(
        &self,
        ctx: &RequestContext,
        domain: Domain,
    ) -> Result<Domain, CentralError> {
        let updated = {
            let _guard = self.locks.lock(domain.id).await;
            let stored = self.load_domain(ctx, domain.id).await?;
            if stored.name != domain.name
                || stored.pool_id != domain.pool_id
                || stored.tenant_id != domain.tenant_id
                || stored.zone_type != domain.zone_type
            {
                return Err(CentralError::BadRequest(
                    "name, pool, tenant and zone type cannot be changed".to_string(),
                ));
            }

            let mut updated = Self::bumped(&stored)?;
            updated.email = domain.email;
            updated.ttl = domain.ttl;
            updated.masters = domain.masters;
            updated.version = domain.version;

            let mut changes = ChangeSet::new();
            changes.update_domain(updated.clone());
            let mut pending = PendingEvents::new();
            pending.push(EVENT_DOMAIN_UPDATE, &updated);
            self.commit(ctx, changes, pending).await?;
            self.storage.get_domain(domain.id).await?
        };

        info!(zone = %updated.name, serial = updated.serial, action = %updated.action, "Domain updated");
        self.send(ZoneEvent::Domain {
            ctx: ctx.clone(),
            action: ZoneAction::from_action(updated.action),
            domain: updated.clone(),
        })
        .await?;
        Ok(updated)
    }

    /// Mark a domain and all of its records for deletion and start a DELETE cycle.
    ///
    /// # Errors
    ///
    /// Returns [`CentralError::Storage`] if the domain is unknown.
    pub async fn delete_domain(
        &self,
        ctx: &RequestContext,
        domain_id: Uuid,
    ) -> Result<Domain, CentralError> {
        let deleted = {
            let _guard = self.locks.lock(domain_id).await;
            let stored = self.load_domain(ctx, domain_id).await?;
            let state = applied_state(
                "Domain",
                stored.id,
                row_state_of_domain(&stored),
                stored.serial,
                RowEvent::Delete,
            )?;
            let mut deleted = stored.clone();
            deleted.action = state.action;
            deleted.status = state.status;

            let mut changes = ChangeSet::new();
            changes.update_domain(deleted.clone());
            let records = self
                .storage
                .find_records(&RecordCriteria::for_domain(domain_id))
                .await?;
            for record in records {
                let from = row_state_of_record(&record);
                if from == RowState::new(Action::Delete, Status::Pending) {
                    continue;
                }
                let state = applied_state("Record", record.id, from, record.serial, RowEvent::Delete)?;
                let mut record = record;
                record.action = state.action;
                record.status = state.status;
                record.serial = stored.serial;
                changes.update_record(record);
            }

            let mut pending = PendingEvents::new();
            pending.push(EVENT_DOMAIN_DELETE, &deleted);
            self.commit(ctx, changes, pending).await?;
            self.storage.get_domain(domain_id).await?
        };

        info!(zone = %deleted.name, domain_id = %deleted.id, "Domain marked for deletion");
        self.send(ZoneEvent::Domain {
            ctx: ctx.clone(),
            action: ZoneAction::Delete,
            domain: deleted.clone(),
        })
        .await?;
        Ok(deleted)
    }

    /// Bump a domain's serial without changing content and propagate it.
    ///
    /// # Errors
    ///
    /// Returns [`CentralError::InvalidTransition`] if the domain is being deleted.
    pub async fn touch_domain(
        &self,
        ctx: &RequestContext,
        domain_id: Uuid,
    ) -> Result<Domain, CentralError> {
        let touched = {
            let _guard = self.locks.lock(domain_id).await;
            let stored = self.load_domain(ctx, domain_id).await?;
            let touched = Self::bumped(&stored)?;

            let mut changes = ChangeSet::new();
            changes.update_domain(touched.clone());
            let mut pending = PendingEvents::new();
            pending.push(EVENT_DOMAIN_TOUCH, &touched);
            self.commit(ctx, changes, pending).await?;
            self.storage.get_domain(domain_id).await?
        };

        debug!(zone = %touched.name, serial = touched.serial, "Domain touched");
        self.send(ZoneEvent::Domain {
            ctx: ctx.clone(),
            action: ZoneAction::from_action(touched.action),
            domain: touched.clone(),
        })
        .await?;
        Ok(touched)
    }

    /// Add a record, creating its recordset on first use.
    ///
    /// # Errors
    ///
    /// Returns [`CentralError::BadRequest`] if the name is outside the zone and
    /// [`CentralError::InvalidTransition`] if the domain is being deleted.
    pub async fn create_record(
        &self,
        ctx: &RequestContext,
        domain_id: Uuid,
        name: &str,
        rtype: &str,
        data: &str,
    ) -> Result<Record, CentralError> {
        let (domain, record) = {
            let _guard = self.locks.lock(domain_id).await;
            let stored = self.load_domain(ctx, domain_id).await?;
            if !in_zone(name, &stored.name) {
                return Err(CentralError::BadRequest(format!(
                    "record '{name}' is outside zone '{}'",
                    stored.name
                )));
            }
            if rtype.is_empty() || data.is_empty() {
                return Err(CentralError::BadRequest(
                    "record type and data are required".to_string(),
                ));
            }
            let domain = Self::bumped(&stored)?;

            let mut changes = ChangeSet::new();
            let recordset = match self
                .storage
                .find_recordsets(domain_id)
                .await?
                .into_iter()
                .find(|rs| rs.name == name && rs.rtype.eq_ignore_ascii_case(rtype))
            {
                Some(existing) => existing,
                None => {
                    let rs = RecordSet::new(domain_id, name, rtype.to_ascii_uppercase());
                    changes.create_recordset(rs.clone());
                    rs
                }
            };

            let mut record = Record::new(&recordset, data);
            record.serial = domain.serial;
            changes.update_domain(domain.clone());
            changes.create_record(record.clone());

            let mut pending = PendingEvents::new();
            pending.push(EVENT_RECORD_CREATE, &record);
            pending.push(EVENT_DOMAIN_UPDATE, &domain);
            self.commit(ctx, changes, pending).await?;
            (
                self.storage.get_domain(domain_id).await?,
                self.storage.get_record(record.id).await?,
            )
        };

        debug!(zone = %domain.name, record_id = %record.id, serial = domain.serial, "Record created");
        self.send(ZoneEvent::Record {
            ctx: ctx.clone(),
            action: ZoneAction::Create,
            domain,
            record: record.clone(),
        })
        .await?;
        Ok(record)
    }

    /// Change a record's data.
    ///
    /// # Errors
    ///
    /// Returns [`CentralError::InvalidTransition`] if the record or its domain
    /// is being deleted.
    pub async fn update_record(
        &self,
        ctx: &RequestContext,
        record_id: Uuid,
        data: &str,
    ) -> Result<Record, CentralError> {
        self.mutate_record(ctx, record_id, RecordChange::Update(data))
            .await
    }

    /// Mark a record for deletion.
    ///
    /// # Errors
    ///
    /// Returns [`CentralError::InvalidTransition`] if the domain is being deleted.
    pub async fn delete_record(
        &self,
        ctx: &RequestContext,
        record_id: Uuid,
    ) -> Result<Record, CentralError> {
        self.mutate_record(ctx, record_id, RecordChange::Delete)
            .await
    }

    async fn mutate_record(
        &self,
        ctx: &RequestContext,
        record_id: Uuid,
        change: RecordChange<'_>,
    ) -> Result<Record, CentralError> {
        let domain_id = self.storage.get_record(record_id).await?.domain_id;
        let (domain, record, action) = {
            let _guard = self.locks.lock(domain_id).await;
            let stored = self.load_domain(ctx, domain_id).await?;
            let mut record = self.storage.get_record(record_id).await?;
            let domain = Self::bumped(&stored)?;

            let (event, action, event_type) = match change {
                RecordChange::Update(data) => {
                    if data.is_empty() {
                        return Err(CentralError::BadRequest("record data is required".to_string()));
                    }
                    record.data = data.to_string();
                    (RowEvent::Mutate, ZoneAction::Update, EVENT_RECORD_UPDATE)
                }
                RecordChange::Delete => (RowEvent::Delete, ZoneAction::Delete, EVENT_RECORD_DELETE),
            };
            let state = applied_state(
                "Record",
                record.id,
                row_state_of_record(&record),
                record.serial,
                event,
            )?;
            record.action = state.action;
            record.status = state.status;
            record.serial = domain.serial;

            let mut changes = ChangeSet::new();
            changes.update_domain(domain.clone());
            changes.update_record(record.clone());
            let mut pending = PendingEvents::new();
            pending.push(event_type, &record);
            pending.push(EVENT_DOMAIN_UPDATE, &domain);
            self.commit(ctx, changes, pending).await?;
            (
                self.storage.get_domain(domain_id).await?,
                self.storage.get_record(record_id).await?,
                action,
            )
        };

        debug!(zone = %domain.name, record_id = %record.id, action = %action, serial = domain.serial, "Record changed");
        self.send(ZoneEvent::Record {
            ctx: ctx.clone(),
            action,
            domain,
            record: record.clone(),
        })
        .await?;
        Ok(record)
    }

    /// Re-poll every domain. Admin only. Returns how many domains were queued.
    ///
    /// # Errors
    ///
    /// Returns [`CentralError::BadRequest`] for a non-admin caller.
    pub async fn sync_domains(&self, ctx: &RequestContext) -> Result<usize, CentralError> {
        if !ctx.is_admin {
            return Err(CentralError::BadRequest(
                "syncing all domains requires admin".to_string(),
            ));
        }
        let domains = self.storage.find_domains(&DomainCriteria::all()).await?;
        let count = domains.len();
        for domain in domains {
            self.send(ZoneEvent::Sync {
                ctx: ctx.clone(),
                domain,
            })
            .await?;
        }
        info!(domains = count, "Queued sync of all domains");
        Ok(count)
    }

    /// Re-poll one domain.
    ///
    /// # Errors
    ///
    /// Returns [`CentralError::Storage`] if the domain is unknown.
    pub async fn sync_domain(
        &self,
        ctx: &RequestContext,
        domain_id: Uuid,
    ) -> Result<Domain, CentralError> {
        let domain = self.load_domain(ctx, domain_id).await?;
        self.send(ZoneEvent::Sync {
            ctx: ctx.clone(),
            domain: domain.clone(),
        })
        .await?;
        Ok(domain)
    }

    /// Re-poll the domain of one record.
    ///
    /// # Errors
    ///
    /// Returns [`CentralError::Storage`] if the record or domain is unknown.
    pub async fn sync_record(
        &self,
        ctx: &RequestContext,
        record_id: Uuid,
    ) -> Result<Record, CentralError> {
        let record = self.storage.get_record(record_id).await?;
        self.sync_domain(ctx, record.domain_id).await?;
        Ok(record)
    }

    /// Ask the pool manager to refresh a secondary zone from its masters.
    ///
    /// # Errors
    ///
    /// Returns [`CentralError::BadRequest`] for a primary zone.
    pub async fn xfr_domain(&self, ctx: &RequestContext, domain_id: Uuid) -> Result<(), CentralError> {
        let domain = self.load_domain(ctx, domain_id).await?;
        if domain.zone_type != ZoneType::Secondary {
            return Err(CentralError::BadRequest(format!(
                "zone '{}' is not a secondary zone",
                domain.name
            )));
        }
        self.send(ZoneEvent::TriggerXfr {
            ctx: ctx.clone(),
            domain_id,
        })
        .await
    }

    /// Records matching `criteria` that belong to domains visible to `ctx`.
    ///
    /// # Errors
    ///
    /// Returns [`CentralError::Storage`] if storage fails.
    pub async fn find_records(
        &self,
        ctx: &RequestContext,
        criteria: &RecordCriteria,
    ) -> Result<Vec<Record>, CentralError> {
        let records = self.storage.find_records(criteria).await?;
        if ctx.all_tenants {
            return Ok(records);
        }
        let visible: HashSet<Uuid> = self
            .find_domains(ctx, &DomainCriteria::all())
            .await?
            .into_iter()
            .map(|d| d.id)
            .collect();
        Ok(records
            .into_iter()
            .filter(|r| visible.contains(&r.domain_id))
            .collect())
    }
}

#[derive(Debug, Clone, Copy)]
enum RecordChange<'a> {
    Update(&'a str),
    Delete,
}

#[async_trait]
impl CentralApi for Central {
    async fn get_domain(
        &self,
        ctx: &RequestContext,
        domain_id: Uuid,
    ) -> Result<Domain, CentralError> {
        self.load_domain(ctx, domain_id).await
    }

    async fn find_domains(
        &self,
        ctx: &RequestContext,
        criteria: &DomainCriteria,
    ) -> Result<Vec<Domain>, CentralError> {
        if ctx.all_tenants {
            return Ok(self.storage.find_domains(criteria).await?);
        }
        let Some(tenant_id) = ctx.tenant_id.clone() else {
            return Ok(Vec::new());
        };
        let scoped = DomainCriteria {
            tenant_id: Some(tenant_id),
            ..criteria.clone()
        };
        Ok(self.storage.find_domains(&scoped).await?)
    }

    async fn update_status(
        &self,
        ctx: &RequestContext,
        domain_id: Uuid,
        status: ReportedStatus,
        serial: u32,
    ) -> Result<(), CentralError> {
        let _guard = self.locks.lock(domain_id).await;
        let domain = match self.storage.get_domain(domain_id).await {
            Ok(domain) => domain,
            Err(StorageError::NotFound { .. }) => {
                debug!(domain_id = %domain_id, status = %status, serial, "Status for unknown domain ignored");
                metrics::record_status_update(status, false);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let event = match status {
            ReportedStatus::Success => RowEvent::Success { serial },
            ReportedStatus::Error => RowEvent::Error { serial },
        };
        let records = self
            .storage
            .find_records(&RecordCriteria::for_domain(domain_id))
            .await?;

        let mut changes = ChangeSet::new();
        let mut pending = PendingEvents::new();

        let outcome = apply(
            "Domain",
            domain.id,
            row_state_of_domain(&domain),
            domain.serial,
            event,
        )?;
        let domain_applied = match outcome {
            Transition::Applied(state) => {
                let mut updated = domain.clone();
                updated.action = state.action;
                updated.status = state.status;
                pending.push(EVENT_DOMAIN_UPDATE, &updated);
                changes.update_domain(updated);
                info!(zone = %domain.name, from = %row_state_of_domain(&domain), to = %state, serial, "Domain status changed");
                true
            }
            Transition::Removed => {
                for record in &records {
                    changes.delete_record(record);
                }
                for recordset in self.storage.find_recordsets(domain_id).await? {
                    changes.delete_recordset(recordset.id);
                }
                changes.delete_domain(&domain);

                let mut gone = domain.clone();
                gone.action = Action::None;
                gone.status = Status::Deleted;
                pending.push(EVENT_DOMAIN_UPDATE, &gone);
                info!(zone = %domain.name, domain_id = %domain.id, "Domain deletion confirmed, removed");
                metrics::record_status_update(status, true);
                self.commit(ctx, changes, pending).await?;
                return Ok(());
            }
            Transition::Ignored(reason) => {
                debug!(
                    zone = %domain.name,
                    status = %status,
                    serial,
                    domain_serial = domain.serial,
                    state = %row_state_of_domain(&domain),
                    reason,
                    "Domain status update suppressed"
                );
                false
            }
        };

        let mut per_recordset: HashMap<Uuid, usize> = HashMap::new();
        for record in &records {
            *per_recordset.entry(record.recordset_id).or_default() += 1;
        }
        let mut removed_per_recordset: HashMap<Uuid, usize> = HashMap::new();
        let mut records_applied = false;

        for record in records.iter().filter(|r| r.action != Action::None) {
            match apply(
                "Record",
                record.id,
                row_state_of_record(record),
                record.serial,
                event,
            ) {
                Ok(Transition::Applied(state)) => {
                    let mut updated = record.clone();
                    updated.action = state.action;
                    updated.status = state.status;
                    changes.update_record(updated);
                    records_applied = true;
                }
                Ok(Transition::Removed) => {
                    changes.delete_record(record);
                    *removed_per_recordset.entry(record.recordset_id).or_default() += 1;
                    records_applied = true;
                }
                Ok(Transition::Ignored(reason)) => {
                    debug!(record_id = %record.id, reason, "Record status update suppressed");
                }
                Err(e) => warn!(record_id = %record.id, error = %e, "Record status update rejected"),
            }
        }

        for (recordset_id, removed) in removed_per_recordset {
            if per_recordset.get(&recordset_id) == Some(&removed) {
                debug!(recordset_id = %recordset_id, "Recordset is empty, removing");
                changes.delete_recordset(recordset_id);
            }
        }

        metrics::record_status_update(status, domain_applied || records_applied);
        self.commit(ctx, changes, pending).await
    }

    async fn record_transfer(
        &self,
        ctx: &RequestContext,
        domain_id: Uuid,
        serial: u32,
    ) -> Result<Domain, CentralError> {
        let _guard = self.locks.lock(domain_id).await;
        let stored = self.load_domain(ctx, domain_id).await?;

        let mut updated = stored.clone();
        updated.transferred_at = Some(Utc::now());
        if serial != stored.serial && serial_gte(serial, stored.serial) {
            let state = applied_state(
                "Domain",
                stored.id,
                row_state_of_domain(&stored),
                stored.serial,
                RowEvent::Mutate,
            )?;
            updated.action = state.action;
            updated.status = state.status;
            updated.serial = serial;
            info!(zone = %stored.name, from = stored.serial, to = serial, "Secondary zone transferred");
        }

        let mut changes = ChangeSet::new();
        changes.update_domain(updated.clone());
        let mut pending = PendingEvents::new();
        pending.push(EVENT_DOMAIN_UPDATE, &updated);
        self.commit(ctx, changes, pending).await?;
        Ok(self.storage.get_domain(domain_id).await?)
    }
}

#[cfg(test)]
#[path = "central_tests.rs"]
mod central_tests;
