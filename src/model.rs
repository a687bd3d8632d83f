// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Data model shared by the pool manager, the authority and storage.
//!
//! # Overview
//!
//! - [`Domain`], [`RecordSet`], [`Record`]: desired state owned by the authority.
//!   Each mutable row carries an [`Action`] and a [`Status`] which together
//!   describe propagation progress.
//! - [`Pool`], [`PoolServer`], [`PoolTarget`]: the fan-out description of a
//!   group of nameservers and the backends that write to them.
//! - [`PoolManagerStatus`]: one convergence cache entry per
//!   (nameserver, zone, action).

use crate::constants::{DNS_PORT, SERIAL_UNKNOWN};
use crate::errors::TopologyError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use uuid::Uuid;

/// Pending change on a domain or record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    /// Nothing to propagate
    #[default]
    None,
    /// The row was created and is being pushed out
    Create,
    /// The row changed and the change is being pushed out
    Update,
    /// The row is being removed from every backend
    Delete,
}

impl Action {
    /// Upper-case wire form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Propagation status of a domain or record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    /// Waiting for nameservers to confirm the pending action
    #[default]
    Pending,
    /// Every nameserver serves the current serial
    Active,
    /// The last propagation cycle failed
    Error,
    /// Removed from every nameserver
    Deleted,
}

impl Status {
    /// Upper-case wire form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Active => "ACTIVE",
            Self::Error => "ERROR",
            Self::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action of a propagation cycle. Unlike [`Action`] it cannot be `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ZoneAction {
    /// Zone creation
    Create,
    /// Zone content change
    Update,
    /// Zone removal
    Delete,
}

impl ZoneAction {
    /// Upper-case wire form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }

    /// Cycle action for a stored action. A settled row (`NONE`) is re-polled as an update.
    #[must_use]
    pub fn from_action(action: Action) -> Self {
        match action {
            Action::Create => Self::Create,
            Action::Delete => Self::Delete,
            Action::Update | Action::None => Self::Update,
        }
    }
}

impl From<ZoneAction> for Action {
    fn from(action: ZoneAction) -> Self {
        match action {
            ZoneAction::Create => Action::Create,
            ZoneAction::Update => Action::Update,
            ZoneAction::Delete => Action::Delete,
        }
    }
}

impl fmt::Display for ZoneAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome reported back to the authority at the end of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReportedStatus {
    /// All nameservers converged
    Success,
    /// At least one nameserver exhausted its retry budget
    Error,
}

impl ReportedStatus {
    /// Upper-case wire form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for ReportedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-nameserver status stored in the convergence cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum PollStatus {
    /// Nameserver confirmed the target serial (or absence on delete)
    Success,
    /// Retry budget exhausted without confirmation
    Error,
    /// Polling in progress
    #[default]
    Pending,
}

impl PollStatus {
    /// Upper-case wire form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Error => "ERROR",
            Self::Pending => "PENDING",
        }
    }
}

impl fmt::Display for PollStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the zone content is managed here or transferred from an external master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ZoneType {
    /// Content owned by the authority
    #[default]
    Primary,
    /// Content pulled from `Domain::masters`
    Secondary,
}

/// A zone-transfer master (`host:port`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Master {
    /// IP address of the master
    pub host: String,
    /// Port the master answers AXFR/SOA on
    #[serde(default = "default_dns_port")]
    pub port: u16,
}

impl Master {
    /// Build a master entry.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Resolve to a socket address. Only IP literals are accepted.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::InvalidAddress`] if `host` is not an IP address.
    pub fn socket_addr(&self) -> Result<SocketAddr, TopologyError> {
        parse_socket_addr(&self.host, self.port)
    }
}

impl fmt::Display for Master {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

fn default_dns_port() -> u16 {
    DNS_PORT
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, TopologyError> {
    host.parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, port))
        .map_err(|e| TopologyError::InvalidAddress {
            host: host.to_string(),
            port,
            reason: e.to_string(),
        })
}

/// A DNS zone under management.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    /// Identifier
    pub id: Uuid,
    /// Fully qualified name with trailing dot
    pub name: String,
    /// Owning tenant
    pub tenant_id: String,
    /// Pool that serves the zone
    pub pool_id: Uuid,
    /// Hostmaster email (SOA RNAME)
    pub email: String,
    /// Default TTL
    pub ttl: u32,
    /// Target SOA serial
    pub serial: u32,
    /// Primary or secondary
    #[serde(default)]
    pub zone_type: ZoneType,
    /// External masters of a secondary zone
    #[serde(default)]
    pub masters: Vec<Master>,
    /// Last time content was transferred from `masters`
    #[serde(default)]
    pub transferred_at: Option<DateTime<Utc>>,
    /// Pending change
    pub action: Action,
    /// Propagation status
    pub status: Status,
    /// Optimistic concurrency counter maintained by storage
    pub version: u64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

impl Domain {
    /// New domain awaiting creation, with a fresh id and `CREATE`/`PENDING`.
    #[must_use]
    pub fn new(name: impl Into<String>, tenant_id: impl Into<String>, pool_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            tenant_id: tenant_id.into(),
            pool_id,
            email: String::new(),
            ttl: 3600,
            serial: SERIAL_UNKNOWN,
            zone_type: ZoneType::Primary,
            masters: Vec::new(),
            transferred_at: None,
            action: Action::Create,
            status: Status::Pending,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// `true` while a propagation cycle is outstanding.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == Status::Pending
    }
}

/// Group of records sharing a name and type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSet {
    /// Identifier
    pub id: Uuid,
    /// Parent domain
    pub domain_id: Uuid,
    /// Owner name (FQDN)
    pub name: String,
    /// Record type (A, AAAA, MX, ...)
    #[serde(rename = "type")]
    pub rtype: String,
    /// Optional TTL override
    pub ttl: Option<u32>,
    /// Optimistic concurrency counter
    pub version: u64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl RecordSet {
    /// New recordset with a fresh id.
    #[must_use]
    pub fn new(domain_id: Uuid, name: impl Into<String>, rtype: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            domain_id,
            name: name.into(),
            rtype: rtype.into(),
            ttl: None,
            version: 0,
            created_at: Utc::now(),
        }
    }
}

/// A single resource record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Identifier
    pub id: Uuid,
    /// Parent recordset
    pub recordset_id: Uuid,
    /// Parent domain
    pub domain_id: Uuid,
    /// RDATA in presentation format
    pub data: String,
    /// Pending change
    pub action: Action,
    /// Propagation status
    pub status: Status,
    /// Domain serial at the time of the last mutation
    pub serial: u32,
    /// Optimistic concurrency counter
    pub version: u64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

impl Record {
    /// New record awaiting creation.
    #[must_use]
    pub fn new(recordset: &RecordSet, data: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            recordset_id: recordset.id,
            domain_id: recordset.domain_id,
            data: data.into(),
            action: Action::Create,
            status: Status::Pending,
            serial: SERIAL_UNKNOWN,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// An authoritative nameserver whose SOA serial is polled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolServer {
    /// Identifier used in convergence cache keys
    pub id: Uuid,
    /// IP address
    pub host: String,
    /// DNS port
    #[serde(default = "default_dns_port")]
    pub port: u16,
}

impl PoolServer {
    /// Socket address to send SOA queries to.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::InvalidAddress`] if `host` is not an IP address.
    pub fn socket_addr(&self) -> Result<SocketAddr, TopologyError> {
        parse_socket_addr(&self.host, self.port)
    }
}

impl fmt::Display for PoolServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A backend integration that writes zones to one or more nameservers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolTarget {
    /// Identifier
    pub id: Uuid,
    /// Registry tag of the driver (`bind9`, `agent`, `fake`)
    #[serde(rename = "type")]
    pub backend_type: String,
    /// Free-form description
    #[serde(default)]
    pub description: Option<String>,
    /// Driver-specific options
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    /// Masters the target's servers transfer zones from
    #[serde(default)]
    pub masters: Vec<Master>,
}

impl PoolTarget {
    /// Look up a driver option.
    #[must_use]
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }
}

/// A set of nameservers and backend targets serving a group of zones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    /// Identifier
    pub id: Uuid,
    /// Human readable name
    pub name: String,
    /// Free-form description
    #[serde(default)]
    pub description: Option<String>,
    /// Servers polled for convergence, in order
    #[serde(default)]
    pub nameservers: Vec<PoolServer>,
    /// Backends dispatched to on every cycle
    #[serde(default)]
    pub targets: Vec<PoolTarget>,
}

/// Composite key of a convergence cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    /// Polled nameserver
    pub nameserver_id: Uuid,
    /// Zone
    pub zone_id: Uuid,
    /// Cycle action
    pub action: ZoneAction,
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.nameserver_id, self.zone_id, self.action)
    }
}

/// Convergence cache entry: last observed state of one zone on one nameserver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolManagerStatus {
    /// Polled nameserver
    pub nameserver_id: Uuid,
    /// Zone
    pub zone_id: Uuid,
    /// Cycle action
    pub action: ZoneAction,
    /// Outcome of the latest poll
    pub status: PollStatus,
    /// Last serial observed (0 when never answered)
    pub serial_number: u32,
    /// Optimistic concurrency counter. 0 means "not yet stored".
    pub version: u64,
    /// First store
    pub created_at: DateTime<Utc>,
    /// Last store
    pub updated_at: DateTime<Utc>,
}

impl PoolManagerStatus {
    /// Fresh entry for a key that has never been polled.
    #[must_use]
    pub fn new(key: CacheKey) -> Self {
        let now = Utc::now();
        Self {
            nameserver_id: key.nameserver_id,
            zone_id: key.zone_id,
            action: key.action,
            status: PollStatus::Pending,
            serial_number: SERIAL_UNKNOWN,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Composite key of this entry.
    #[must_use]
    pub fn key(&self) -> CacheKey {
        CacheKey {
            nameserver_id: self.nameserver_id,
            zone_id: self.zone_id,
            action: self.action,
        }
    }
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod model_tests;
