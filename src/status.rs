// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Action/status state machine for domains and records.
//!
//! Every row carries an `(action, status)` pair. All changes go through
//! [`transition`], which is a single table of `(action, status) x event`.
//! Callers never assign `action` or `status` directly.
//!
//! ```text
//!                 Mutate                     Success(serial >= row)
//!  (NONE,ACTIVE) ───────▶ (UPDATE,PENDING) ─────────────────────────▶ (NONE,ACTIVE)
//!                              │   ▲
//!        Error(serial >= row   │   │ Mutate
//!           or serial == 0)    ▼   │
//!                         (UPDATE,ERROR)
//!
//!  (any but DELETE) ──Delete──▶ (DELETE,PENDING) ──Success──▶ removed (DELETED)
//! ```

use crate::constants::SERIAL_UNKNOWN;
use crate::model::{Action, Status};
use crate::serial::serial_gte;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// `(action, status)` of a domain or record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowState {
    /// Pending change
    pub action: Action,
    /// Propagation status
    pub status: Status,
}

impl RowState {
    /// State of a freshly created row.
    pub const CREATED: Self = Self {
        action: Action::Create,
        status: Status::Pending,
    };

    /// Build a state.
    #[must_use]
    pub const fn new(action: Action, status: Status) -> Self {
        Self { action, status }
    }
}

impl fmt::Display for RowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.action, self.status)
    }
}

/// Input to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowEvent {
    /// Content changed; serial was bumped
    Mutate,
    /// Marked for removal
    Delete,
    /// A cycle reported every nameserver at `serial` or beyond
    Success {
        /// Serial the cycle targeted
        serial: u32,
    },
    /// A cycle exhausted its retry budget
    Error {
        /// Serial the cycle targeted, 0 when no nameserver ever answered
        serial: u32,
    },
}

impl RowEvent {
    fn name(self) -> &'static str {
        match self {
            Self::Mutate => "mutate",
            Self::Delete => "delete",
            Self::Success { .. } => "success",
            Self::Error { .. } => "error",
        }
    }
}

/// Result of applying an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The row moves to a new state
    Applied(RowState),
    /// Deletion confirmed; the row must be removed from storage
    Removed,
    /// The event does not apply (stale serial, nothing pending)
    Ignored(&'static str),
}

/// An event that is not allowed in the current state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot apply '{event}' to a row in state {from}")]
pub struct InvalidTransition {
    /// State the row was in
    pub from: RowState,
    /// Event name
    pub event: &'static str,
}

/// Apply `event` to a row currently in `from` whose stored serial is `row_serial`.
///
/// # Errors
///
/// Returns [`InvalidTransition`] when a mutation targets a row that is being
/// deleted or is already deleted.
pub fn transition(
    from: RowState,
    row_serial: u32,
    event: RowEvent,
) -> Result<Transition, InvalidTransition> {
    use Action as A;
    use Status as S;

    let invalid = || InvalidTransition {
        from,
        event: event.name(),
    };

    let next = match (from.action, from.status, event) {
        (_, S::Deleted, _) => return Err(invalid()),

        // Mutations
        (A::Delete, _, RowEvent::Mutate) => return Err(invalid()),
        // An unconfirmed create is still a create for the backends
        (A::Create, S::Pending | S::Error, RowEvent::Mutate) => {
            Transition::Applied(RowState::new(A::Create, S::Pending))
        }
        (_, _, RowEvent::Mutate) => Transition::Applied(RowState::new(A::Update, S::Pending)),
        (_, _, RowEvent::Delete) => Transition::Applied(RowState::new(A::Delete, S::Pending)),

        // Cycle outcomes
        (A::None, _, RowEvent::Success { .. } | RowEvent::Error { .. }) => {
            Transition::Ignored("no pending action")
        }
        (action, S::Pending | S::Error, RowEvent::Success { serial }) => {
            if !serial_gte(serial, row_serial) {
                Transition::Ignored("reported serial is older than the row serial")
            } else if action == A::Delete {
                Transition::Removed
            } else {
                Transition::Applied(RowState::new(A::None, S::Active))
            }
        }
        (action, S::Pending, RowEvent::Error { serial }) => {
            if serial == SERIAL_UNKNOWN || serial_gte(serial, row_serial) {
                Transition::Applied(RowState::new(action, S::Error))
            } else {
                Transition::Ignored("reported serial is older than the row serial")
            }
        }
        (_, S::Error, RowEvent::Error { .. }) => Transition::Ignored("already in error"),
        (_, S::Active, RowEvent::Success { .. } | RowEvent::Error { .. }) => {
            Transition::Ignored("row is not awaiting confirmation")
        }
    };

    Ok(next)
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod status_tests;
