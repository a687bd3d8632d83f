// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-process [`Storage`] implementation.
//!
//! Commits are applied to a copy of the tables and swapped in only when every
//! change succeeded.

use super::{Change, ChangeSet, DomainCriteria, RecordCriteria, Storage};
use crate::errors::StorageError;
use crate::model::{Domain, Pool, Record, RecordSet, Status};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
struct Tables {
    pools: HashMap<Uuid, Pool>,
    domains: HashMap<Uuid, Domain>,
    recordsets: HashMap<Uuid, RecordSet>,
    records: HashMap<Uuid, Record>,
}

/// Storage kept in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tables: Mutex<Tables>,
}

impl MemoryStorage {
    /// Empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage seeded with `pools`.
    #[must_use]
    pub fn with_pools(pools: impl IntoIterator<Item = Pool>) -> Self {
        let mut tables = Tables::default();
        for pool in pools {
            tables.pools.insert(pool.id, pool);
        }
        Self {
            tables: Mutex::new(tables),
        }
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn not_found(kind: &'static str, id: Uuid) -> StorageError {
    StorageError::NotFound {
        kind,
        id: id.to_string(),
    }
}

fn check_version(
    kind: &'static str,
    id: Uuid,
    expected: u64,
    actual: u64,
) -> Result<(), StorageError> {
    if expected == actual {
        Ok(())
    } else {
        Err(StorageError::Conflict {
            kind,
            id: id.to_string(),
            expected,
            actual,
        })
    }
}

impl Tables {
    fn apply(&mut self, change: Change) -> Result<(), StorageError> {
        let now = Utc::now();
        match change {
            Change::PutPool(pool) => {
                self.pools.insert(pool.id, pool);
            }
            Change::CreateDomain(mut domain) => {
                if self.domains.contains_key(&domain.id)
                    || self
                        .domains
                        .values()
                        .any(|d| d.name == domain.name && d.status != Status::Deleted)
                {
                    return Err(StorageError::Duplicate {
                        kind: "Domain",
                        name: domain.name,
                    });
                }
                domain.version = 1;
                domain.created_at = now;
                domain.updated_at = now;
                self.domains.insert(domain.id, domain);
            }
            Change::UpdateDomain(mut domain) => {
                let stored = self
                    .domains
                    .get(&domain.id)
                    .ok_or_else(|| not_found("Domain", domain.id))?;
                check_version("Domain", domain.id, domain.version, stored.version)?;
                domain.version += 1;
                domain.created_at = stored.created_at;
                domain.updated_at = now;
                self.domains.insert(domain.id, domain);
            }
            Change::DeleteDomain { id, version } => {
                let stored = self.domains.get(&id).ok_or_else(|| not_found("Domain", id))?;
                check_version("Domain", id, version, stored.version)?;
                self.domains.remove(&id);
            }
            Change::CreateRecordSet(mut recordset) => {
                if !self.domains.contains_key(&recordset.domain_id) {
                    return Err(not_found("Domain", recordset.domain_id));
                }
                if self.recordsets.contains_key(&recordset.id)
                    || self.recordsets.values().any(|rs| {
                        rs.domain_id == recordset.domain_id
                            && rs.name == recordset.name
                            && rs.rtype == recordset.rtype
                    })
                {
                    return Err(StorageError::Duplicate {
                        kind: "RecordSet",
                        name: format!("{} {}", recordset.name, recordset.rtype),
                    });
                }
                recordset.version = 1;
                recordset.created_at = now;
                self.recordsets.insert(recordset.id, recordset);
            }
            Change::DeleteRecordSet { id } => {
                self.recordsets
                    .remove(&id)
                    .ok_or_else(|| not_found("RecordSet", id))?;
            }
            Change::CreateRecord(mut record) => {
                if !self.recordsets.contains_key(&record.recordset_id) {
                    return Err(not_found("RecordSet", record.recordset_id));
                }
                if self.records.contains_key(&record.id) {
                    return Err(StorageError::Duplicate {
                        kind: "Record",
                        name: record.id.to_string(),
                    });
                }
                record.version = 1;
                record.created_at = now;
                record.updated_at = now;
                self.records.insert(record.id, record);
            }
            Change::UpdateRecord(mut record) => {
                let stored = self
                    .records
                    .get(&record.id)
                    .ok_or_else(|| not_found("Record", record.id))?;
                check_version("Record", record.id, record.version, stored.version)?;
                record.version += 1;
                record.created_at = stored.created_at;
                record.updated_at = now;
                self.records.insert(record.id, record);
            }
            Change::DeleteRecord { id, version } => {
                let stored = self.records.get(&id).ok_or_else(|| not_found("Record", id))?;
                check_version("Record", id, version, stored.version)?;
                self.records.remove(&id);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get_domain(&self, id: Uuid) -> Result<Domain, StorageError> {
        self.tables()
            .domains
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("Domain", id))
    }

    async fn find_domains(&self, criteria: &DomainCriteria) -> Result<Vec<Domain>, StorageError> {
        let mut domains: Vec<Domain> = self
            .tables()
            .domains
            .values()
            .filter(|d| criteria.matches(d))
            .cloned()
            .collect();
        domains.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(domains)
    }

    async fn get_recordset(&self, id: Uuid) -> Result<RecordSet, StorageError> {
        self.tables()
            .recordsets
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("RecordSet", id))
    }

    async fn find_recordsets(&self, domain_id: Uuid) -> Result<Vec<RecordSet>, StorageError> {
        let mut recordsets: Vec<RecordSet> = self
            .tables()
            .recordsets
            .values()
            .filter(|rs| rs.domain_id == domain_id)
            .cloned()
            .collect();
        recordsets.sort_by(|a, b| (&a.name, &a.rtype).cmp(&(&b.name, &b.rtype)));
        Ok(recordsets)
    }

    async fn get_record(&self, id: Uuid) -> Result<Record, StorageError> {
        self.tables()
            .records
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("Record", id))
    }

    async fn find_records(&self, criteria: &RecordCriteria) -> Result<Vec<Record>, StorageError> {
        let mut records: Vec<Record> = self
            .tables()
            .records
            .values()
            .filter(|r| criteria.matches(r))
            .cloned()
            .collect();
        records.sort_by_key(|r| (r.created_at, r.id));
        Ok(records)
    }

    async fn get_pool(&self, id: Uuid) -> Result<Pool, StorageError> {
        self.tables()
            .pools
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("Pool", id))
    }

    async fn find_pools(&self) -> Result<Vec<Pool>, StorageError> {
        let mut pools: Vec<Pool> = self.tables().pools.values().cloned().collect();
        pools.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(pools)
    }

    async fn commit(&self, changes: ChangeSet) -> Result<(), StorageError> {
        let count = changes.len();
        let mut tables = self.tables();
        let mut staged = tables.clone();
        for change in changes.into_changes() {
            staged.apply(change)?;
        }
        *tables = staged;
        debug!(changes = count, "Committed change set");
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod memory_tests;
