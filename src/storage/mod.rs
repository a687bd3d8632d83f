// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Persistence collaborator.
//!
//! Reads go straight to the [`Storage`] trait. Writes are collected into a
//! [`ChangeSet`] and applied by [`Storage::commit`], which checks the
//! optimistic version of every row it touches and applies everything or
//! nothing. Building a change set is "begin", committing it is "commit", and
//! dropping it unapplied is "rollback".

pub mod memory;

pub use memory::MemoryStorage;

use crate::errors::StorageError;
use crate::model::{Action, Domain, Pool, Record, RecordSet, Status};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Filter for [`Storage::find_domains`]. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainCriteria {
    /// Owning tenant
    pub tenant_id: Option<String>,
    /// Serving pool
    pub pool_id: Option<Uuid>,
    /// Exact zone name
    pub name: Option<String>,
    /// Propagation status
    pub status: Option<Status>,
    /// Last modified strictly before this instant
    pub updated_before: Option<DateTime<Utc>>,
}

impl DomainCriteria {
    /// Match every domain.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to one status.
    #[must_use]
    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    /// Restrict to rows not modified since `instant`.
    #[must_use]
    pub fn updated_before(mut self, instant: DateTime<Utc>) -> Self {
        self.updated_before = Some(instant);
        self
    }

    /// Restrict to one tenant.
    #[must_use]
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Restrict to one zone name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Restrict to one pool.
    #[must_use]
    pub fn with_pool(mut self, pool_id: Uuid) -> Self {
        self.pool_id = Some(pool_id);
        self
    }

    /// `true` if `domain` satisfies every set field.
    #[must_use]
    pub fn matches(&self, domain: &Domain) -> bool {
        self.tenant_id
            .as_deref()
            .is_none_or(|tenant| domain.tenant_id == tenant)
            && self.pool_id.is_none_or(|pool| domain.pool_id == pool)
            && self.name.as_deref().is_none_or(|name| domain.name == name)
            && self.status.is_none_or(|status| domain.status == status)
            && self
                .updated_before
                .is_none_or(|instant| domain.updated_at < instant)
    }
}

/// Filter for [`Storage::find_records`]. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordCriteria {
    /// Parent domain
    pub domain_id: Option<Uuid>,
    /// Parent recordset
    pub recordset_id: Option<Uuid>,
    /// Pending action
    pub action: Option<Action>,
    /// Propagation status
    pub status: Option<Status>,
}

impl RecordCriteria {
    /// Every record of one domain.
    #[must_use]
    pub fn for_domain(domain_id: Uuid) -> Self {
        Self {
            domain_id: Some(domain_id),
            ..Self::default()
        }
    }

    /// Every record of one recordset.
    #[must_use]
    pub fn for_recordset(recordset_id: Uuid) -> Self {
        Self {
            recordset_id: Some(recordset_id),
            ..Self::default()
        }
    }

    /// `true` if `record` satisfies every set field.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        self.domain_id.is_none_or(|id| record.domain_id == id)
            && self.recordset_id.is_none_or(|id| record.recordset_id == id)
            && self.action.is_none_or(|action| record.action == action)
            && self.status.is_none_or(|status| record.status == status)
    }
}

/// One write inside a [`ChangeSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Insert a pool or replace it wholesale
    PutPool(Pool),
    /// Insert a new domain
    CreateDomain(Domain),
    /// Replace a domain; `version` must match the stored row
    UpdateDomain(Domain),
    /// Remove a domain
    DeleteDomain {
        /// Row id
        id: Uuid,
        /// Version the caller read
        version: u64,
    },
    /// Insert a new recordset
    CreateRecordSet(RecordSet),
    /// Remove a recordset
    DeleteRecordSet {
        /// Row id
        id: Uuid,
    },
    /// Insert a new record
    CreateRecord(Record),
    /// Replace a record; `version` must match the stored row
    UpdateRecord(Record),
    /// Remove a record
    DeleteRecord {
        /// Row id
        id: Uuid,
        /// Version the caller read
        version: u64,
    },
}

/// Ordered batch of writes applied atomically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    /// Start an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw change.
    pub fn push(&mut self, change: Change) {
        self.changes.push(change);
    }

    /// Insert or replace a pool.
    pub fn put_pool(&mut self, pool: Pool) {
        self.push(Change::PutPool(pool));
    }

    /// Insert a domain.
    pub fn create_domain(&mut self, domain: Domain) {
        self.push(Change::CreateDomain(domain));
    }

    /// Replace a domain.
    pub fn update_domain(&mut self, domain: Domain) {
        self.push(Change::UpdateDomain(domain));
    }

    /// Remove a domain at the version the caller read.
    pub fn delete_domain(&mut self, domain: &Domain) {
        self.push(Change::DeleteDomain {
            id: domain.id,
            version: domain.version,
        });
    }

    /// Insert a recordset.
    pub fn create_recordset(&mut self, recordset: RecordSet) {
        self.push(Change::CreateRecordSet(recordset));
    }

    /// Remove a recordset.
    pub fn delete_recordset(&mut self, id: Uuid) {
        self.push(Change::DeleteRecordSet { id });
    }

    /// Insert a record.
    pub fn create_record(&mut self, record: Record) {
        self.push(Change::CreateRecord(record));
    }

    /// Replace a record.
    pub fn update_record(&mut self, record: Record) {
        self.push(Change::UpdateRecord(record));
    }

    /// Remove a record at the version the caller read.
    pub fn delete_record(&mut self, record: &Record) {
        self.push(Change::DeleteRecord {
            id: record.id,
            version: record.version,
        });
    }

    /// Number of writes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// `true` when nothing was queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Consume the batch.
    #[must_use]
    pub fn into_changes(self) -> Vec<Change> {
        self.changes
    }
}

/// Generic persistence interface over domains, recordsets, records and pools.
#[async_trait]
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// Fetch one domain.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the id is unknown.
    async fn get_domain(&self, id: Uuid) -> Result<Domain, StorageError>;

    /// Domains matching `criteria`, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the backing store fails.
    async fn find_domains(&self, criteria: &DomainCriteria) -> Result<Vec<Domain>, StorageError>;

    /// Fetch one recordset.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the id is unknown.
    async fn get_recordset(&self, id: Uuid) -> Result<RecordSet, StorageError>;

    /// Recordsets of a domain, ordered by name then type.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the backing store fails.
    async fn find_recordsets(&self, domain_id: Uuid) -> Result<Vec<RecordSet>, StorageError>;

    /// Fetch one record.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the id is unknown.
    async fn get_record(&self, id: Uuid) -> Result<Record, StorageError>;

    /// Records matching `criteria`, in creation order.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the backing store fails.
    async fn find_records(&self, criteria: &RecordCriteria) -> Result<Vec<Record>, StorageError>;

    /// Fetch one pool.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the id is unknown.
    async fn get_pool(&self, id: Uuid) -> Result<Pool, StorageError>;

    /// Every pool.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the backing store fails.
    async fn find_pools(&self) -> Result<Vec<Pool>, StorageError>;

    /// Apply every change or none of them.
    ///
    /// Created rows get version 1; every update or delete must carry the
    /// version currently stored and bumps it by one.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Conflict`] on a stale version,
    /// [`StorageError::NotFound`] when a referenced row is missing, or
    /// [`StorageError::Duplicate`] when a unique key collides. Nothing is
    /// applied in any of these cases.
    async fn commit(&self, changes: ChangeSet) -> Result<(), StorageError>;
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
