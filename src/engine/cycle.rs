// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! States and results of one propagation cycle.
//!
//! ```text
//!  DISPATCHED ──▶ POLLING ──▶ CONVERGED   every nameserver confirmed
//!       │            │   └──▶ FAILED      a nameserver exhausted its retries
//!       └────────────┴──────▶ ABANDONED   domain removed or superseded by a delete
//! ```

use crate::constants::SERIAL_UNKNOWN;
use crate::dns::SoaAnswer;
use crate::errors::BackendError;
use crate::model::{Domain, PollStatus, PoolServer, ReportedStatus, ZoneAction};
use crate::serial::has_converged;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Where a cycle is, or how it ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CycleState {
    /// Backends have been told to act
    Dispatched,
    /// Nameservers are being polled
    Polling,
    /// Every nameserver confirmed the action
    Converged,
    /// At least one nameserver exhausted its retry budget
    Failed,
    /// The domain disappeared or was marked for deletion mid-cycle
    Abandoned,
}

impl CycleState {
    /// Lower-case form used in logs and metric labels.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dispatched => "dispatched",
            Self::Polling => "polling",
            Self::Converged => "converged",
            Self::Failed => "failed",
            Self::Abandoned => "abandoned",
        }
    }

    /// `true` for the three end states.
    #[must_use]
    pub fn is_final(self) -> bool {
        matches!(self, Self::Converged | Self::Failed | Self::Abandoned)
    }
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Control-step result of one backend target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetResult {
    /// Pool target id
    pub target_id: Uuid,
    /// Driver description
    pub backend: String,
    /// Failure, if the control step did not succeed
    pub error: Option<BackendError>,
}

impl TargetResult {
    /// `true` when the control step succeeded (idempotent outcomes included).
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Polling result of one nameserver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameserverOutcome {
    /// Pool server id
    pub nameserver_id: Uuid,
    /// `host:port`
    pub address: String,
    /// SUCCESS, or ERROR once the retry budget is spent
    pub status: PollStatus,
    /// Last serial seen, 0 if the zone was never seen
    pub observed_serial: u32,
    /// The nameserver gave at least one usable answer
    pub answered: bool,
    /// Queries sent
    pub attempts: u32,
    /// Last query failure
    pub last_error: Option<String>,
}

impl NameserverOutcome {
    pub(crate) fn new(nameserver: &PoolServer) -> Self {
        Self {
            nameserver_id: nameserver.id,
            address: nameserver.to_string(),
            status: PollStatus::Pending,
            observed_serial: SERIAL_UNKNOWN,
            answered: false,
            attempts: 0,
            last_error: None,
        }
    }
}

/// Everything that happened in one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Domain id
    pub domain_id: Uuid,
    /// Zone name
    pub zone: String,
    /// Cycle action
    pub action: ZoneAction,
    /// Serial the cycle tried to confirm
    pub serial: u32,
    /// Final state
    pub state: CycleState,
    /// Per-target control results (empty for poll-only cycles)
    pub targets: Vec<TargetResult>,
    /// Per-nameserver polling results
    pub nameservers: Vec<NameserverOutcome>,
    /// Status sent to the authority, if any
    pub reported: Option<ReportedStatus>,
    /// Wall time
    pub duration: Duration,
}

impl CycleReport {
    pub(crate) fn new(domain: &Domain, action: ZoneAction) -> Self {
        Self {
            domain_id: domain.id,
            zone: domain.name.clone(),
            action,
            serial: domain.serial,
            state: CycleState::Dispatched,
            targets: Vec::new(),
            nameservers: Vec::new(),
            reported: None,
            duration: Duration::ZERO,
        }
    }

    /// `true` if the cycle converged.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.state == CycleState::Converged
    }

    /// Outcome for a nameserver, if it was polled.
    #[must_use]
    pub fn nameserver(&self, nameserver_id: Uuid) -> Option<&NameserverOutcome> {
        self.nameservers
            .iter()
            .find(|n| n.nameserver_id == nameserver_id)
    }
}

/// One SOA answer judged against the cycle's goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Evaluation {
    /// The answer satisfies the cycle
    pub converged: bool,
    /// Serial carried by the answer
    pub serial: Option<u32>,
    /// Metric label
    pub label: &'static str,
}

/// Judge an answer. A delete is satisfied by absence; everything else by a
/// serial at or past `target` (RFC 1982).
pub(crate) fn evaluate(action: ZoneAction, answer: SoaAnswer, target: u32) -> Evaluation {
    match (action, answer) {
        (ZoneAction::Delete, SoaAnswer::Absent) => Evaluation {
            converged: true,
            serial: None,
            label: "absent",
        },
        (ZoneAction::Delete, SoaAnswer::Serial(serial)) => Evaluation {
            converged: false,
            serial: Some(serial),
            label: "behind",
        },
        (_, SoaAnswer::Absent) => Evaluation {
            converged: false,
            serial: None,
            label: "absent",
        },
        (_, SoaAnswer::Serial(serial)) => {
            let converged = has_converged(serial, target);
            Evaluation {
                converged,
                serial: Some(serial),
                label: if converged { "converged" } else { "behind" },
            }
        }
    }
}

/// Aggregate decision of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Verdict {
    pub state: CycleState,
    pub status: ReportedStatus,
    pub serial: u32,
}

/// SUCCESS only when every nameserver succeeded. An ERROR carries the target
/// serial, or 0 when no nameserver ever answered.
pub(crate) fn aggregate(outcomes: &[NameserverOutcome], target: u32) -> Verdict {
    let all_converged =
        !outcomes.is_empty() && outcomes.iter().all(|o| o.status == PollStatus::Success);
    if all_converged {
        return Verdict {
            state: CycleState::Converged,
            status: ReportedStatus::Success,
            serial: target,
        };
    }

    let any_answered = outcomes.iter().any(|o| o.answered);
    Verdict {
        state: CycleState::Failed,
        status: ReportedStatus::Error,
        serial: if any_answered { target } else { SERIAL_UNKNOWN },
    }
}

#[cfg(test)]
#[path = "cycle_tests.rs"]
mod cycle_tests;
