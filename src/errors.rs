// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for the pool manager.
//!
//! This module provides specialized error types for:
//! - DNS protocol exchanges with pool nameservers (SOA polls, NOTIFY, agent opcodes)
//! - Backend driver control calls (create/update/delete zone)
//! - The convergence cache and its optimistic versioning
//! - The persistence and authority collaborators
//! - Configuration loading
//!
//! Every enum exposes `is_transient()` so callers can tell retryable conditions
//! from permanent ones, and `reason()` returning a stable code used in logs and
//! metric labels.

use thiserror::Error;
use uuid::Uuid;

/// Errors from a single DNS exchange with a nameserver or agent.
///
/// A timeout is kept distinct from a protocol-level failure: both are retryable
/// but they are logged at different severities.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// No response arrived within the per-query timeout
    #[error("Query for '{zone}' to {server} timed out after {timeout_ms}ms")]
    Timeout {
        /// Nameserver address (IP:port)
        server: String,
        /// Zone that was queried
        zone: String,
        /// Timeout in milliseconds
        timeout_ms: u64,
    },

    /// The response could not be parsed or did not answer the question
    #[error("Bad response for '{zone}' from {server}: {reason}")]
    BadResponse {
        /// Nameserver address (IP:port)
        server: String,
        /// Zone that was queried
        zone: String,
        /// What was wrong with the response
        reason: String,
    },

    /// The response lacked the AA flag or carried a non-NOERROR rcode
    #[error("Non-authoritative answer for '{zone}' from {server} (rcode {rcode}, aa={authoritative})")]
    NotAuthoritative {
        /// Nameserver address (IP:port)
        server: String,
        /// Zone that was queried
        zone: String,
        /// Response code returned
        rcode: String,
        /// Whether the AA flag was set
        authoritative: bool,
    },

    /// The socket could not be opened or the send failed
    #[error("Connection to {server} failed: {reason}")]
    Connection {
        /// Nameserver address (IP:port)
        server: String,
        /// Underlying I/O reason
        reason: String,
    },

    /// The zone name is not a valid DNS name
    #[error("Invalid zone name '{name}': {reason}")]
    InvalidName {
        /// The rejected name
        name: String,
        /// Parser message
        reason: String,
    },
}

impl QueryError {
    /// Returns true if the exchange may succeed when retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::InvalidName { .. })
    }

    /// `true` for timeouts, which are logged at a higher severity than bad answers.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Stable reason code.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "QueryTimeout",
            Self::BadResponse { .. } => "BadResponse",
            Self::NotAuthoritative { .. } => "NotAuthoritative",
            Self::Connection { .. } => "ConnectionFailed",
            Self::InvalidName { .. } => "InvalidZoneName",
        }
    }
}

/// Errors raised by backend drivers at the control step.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The zone is already present on the target
    ///
    /// Expected when a create event is retried. Callers treat it as success.
    #[error("Zone '{zone}' already exists on target {target}")]
    ZoneAlreadyExists {
        /// Zone name
        zone: String,
        /// Target description (type and endpoint)
        target: String,
    },

    /// The zone is not present on the target
    ///
    /// Expected when a delete event is retried. Callers treat it as success on delete.
    #[error("Zone '{zone}' not found on target {target}")]
    ZoneNotFound {
        /// Zone name
        zone: String,
        /// Target description (type and endpoint)
        target: String,
    },

    /// The target refused the connection or answered with a server error
    #[error("Backend target {target} unavailable: {reason}")]
    Unavailable {
        /// Target description (type and endpoint)
        target: String,
        /// Underlying reason
        reason: String,
    },

    /// The control call did not complete in time
    #[error("Backend target {target} timed out after {timeout_ms}ms")]
    Timeout {
        /// Target description (type and endpoint)
        target: String,
        /// Timeout in milliseconds
        timeout_ms: u64,
    },

    /// The target explicitly rejected the operation
    #[error("Backend target {target} rejected operation on '{zone}': {reason}")]
    Rejected {
        /// Target description (type and endpoint)
        target: String,
        /// Zone name
        zone: String,
        /// Reason given by the target
        reason: String,
    },

    /// The target's options are missing or malformed
    #[error("Invalid configuration for backend target {target}: {reason}")]
    InvalidConfiguration {
        /// Target description
        target: String,
        /// What is wrong
        reason: String,
    },

    /// No driver is registered for the configured type tag
    #[error("Unknown backend type '{backend_type}'")]
    UnknownBackendType {
        /// The unresolved type tag
        backend_type: String,
    },
}

impl BackendError {
    /// Returns true if the control call may succeed when retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Unavailable { .. } | Self::Timeout { .. } | Self::Rejected { .. }
        )
    }

    /// Stable reason code.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::ZoneAlreadyExists { .. } => "ZoneAlreadyExists",
            Self::ZoneNotFound { .. } => "ZoneNotFound",
            Self::Unavailable { .. } => "BackendUnavailable",
            Self::Timeout { .. } => "BackendTimeout",
            Self::Rejected { .. } => "BackendRejected",
            Self::InvalidConfiguration { .. } => "InvalidBackendConfiguration",
            Self::UnknownBackendType { .. } => "UnknownBackendType",
        }
    }
}

/// Errors from the convergence cache.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// No entry exists for the key
    ///
    /// A normal condition on the first poll of a new zone.
    #[error("No pool manager status for {key}")]
    NotFound {
        /// Display form of the composite key
        key: String,
    },

    /// The entry changed since it was read
    #[error("Version conflict on {key}: expected version {expected}, found {actual}")]
    Conflict {
        /// Display form of the composite key
        key: String,
        /// Version the writer based its update on
        expected: u64,
        /// Version currently stored
        actual: u64,
    },

    /// The durable copy could not be read or written
    #[error("Pool manager cache persistence failed: {0}")]
    Persistence(String),
}

impl CacheError {
    /// Returns true if re-reading and retrying may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Persistence(_))
    }

    /// Stable reason code.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "CacheMiss",
            Self::Conflict { .. } => "CacheConflict",
            Self::Persistence(_) => "CachePersistenceFailed",
        }
    }
}

/// Errors from the persistence collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The row does not exist
    #[error("{kind} {id} not found")]
    NotFound {
        /// Row kind (Domain, Record, ...)
        kind: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// The row was modified by someone else since it was read
    #[error("{kind} {id} was modified concurrently (expected version {expected}, found {actual})")]
    Conflict {
        /// Row kind
        kind: &'static str,
        /// Row identifier
        id: String,
        /// Version the writer read
        expected: u64,
        /// Version currently stored
        actual: u64,
    },

    /// A row with the same unique key already exists
    #[error("{kind} '{name}' already exists")]
    Duplicate {
        /// Row kind
        kind: &'static str,
        /// Unique name that collided
        name: String,
    },
}

impl StorageError {
    /// Returns true if the operation may succeed when retried after a re-read.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Stable reason code.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NotFound",
            Self::Conflict { .. } => "VersionConflict",
            Self::Duplicate { .. } => "Duplicate",
        }
    }
}

/// Errors from pool topology lookups.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    /// The pool id is unknown
    #[error("Pool {pool_id} not found")]
    PoolNotFound {
        /// Requested pool id
        pool_id: Uuid,
    },

    /// A nameserver or master address cannot be turned into a socket address
    #[error("Invalid address {host}:{port}: {reason}")]
    InvalidAddress {
        /// Configured host
        host: String,
        /// Configured port
        port: u16,
        /// Parser message
        reason: String,
    },
}

/// Errors from the central authority collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CentralError {
    /// Storage failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Pool lookup failure
    #[error(transparent)]
    Topology(#[from] TopologyError),

    /// The pool has no nameservers to confirm propagation against
    #[error("Pool {pool_id} has no nameservers configured")]
    NoNameservers {
        /// Offending pool
        pool_id: Uuid,
    },

    /// The requested change is not a legal action/status transition
    #[error("Invalid transition for {kind} {id}: {reason}")]
    InvalidTransition {
        /// Domain or Record
        kind: &'static str,
        /// Row identifier
        id: Uuid,
        /// Explanation
        reason: String,
    },

    /// The request is malformed
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The engine's event channel is closed
    #[error("Pool manager is not accepting events: {0}")]
    Dispatch(String),
}

impl CentralError {
    /// Stable reason code.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Storage(e) => e.reason(),
            Self::Topology(_) => "PoolLookupFailed",
            Self::NoNameservers { .. } => "NoNameservers",
            Self::InvalidTransition { .. } => "InvalidTransition",
            Self::BadRequest(_) => "BadRequest",
            Self::Dispatch(_) => "DispatchFailed",
        }
    }
}

/// Errors that abort a pool manager operation before a cycle can start.
///
/// Failures inside a cycle are never surfaced this way; they become per-target
/// or per-nameserver results and, in aggregate, an ERROR status callback.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Pool lookup failure
    #[error(transparent)]
    Topology(#[from] TopologyError),

    /// Authority failure
    #[error(transparent)]
    Central(#[from] CentralError),

    /// The operation does not apply to this zone
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

/// Errors from loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Read {
        /// File path
        path: String,
        /// I/O error
        #[source]
        source: std::io::Error,
    },

    /// The YAML could not be parsed
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A value violates a constraint
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
