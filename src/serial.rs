// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! SOA serial number arithmetic (RFC 1982).
//!
//! Serials are 32-bit values that wrap. `s1` is at or ahead of `s2` when
//! `(s1 - s2) mod 2^32 < 2^31`, so `5` is ahead of `4294967290`.
//!
//! # Example
//!
//! ```rust
//! use zonepool::serial::{has_converged, serial_gte};
//!
//! assert!(serial_gte(5, 4_294_967_290));
//! assert!(!has_converged(0, 0));
//! ```

use crate::constants::{SERIAL_HALF_RANGE, SERIAL_UNKNOWN};
use chrono::Utc;
use std::cmp::Ordering;

/// Compare two serials using RFC 1982 sequence space arithmetic.
///
/// Returns `None` when the serials are exactly half the space apart, where
/// RFC 1982 leaves the comparison undefined.
#[must_use]
pub fn compare(s1: u32, s2: u32) -> Option<Ordering> {
    let forward = s1.wrapping_sub(s2);
    if forward == 0 {
        Some(Ordering::Equal)
    } else if forward < SERIAL_HALF_RANGE {
        Some(Ordering::Greater)
    } else if forward > SERIAL_HALF_RANGE {
        Some(Ordering::Less)
    } else {
        None
    }
}

/// `true` when `s1` is equal to or ahead of `s2` (wraparound aware).
#[must_use]
pub fn serial_gte(s1: u32, s2: u32) -> bool {
    s1.wrapping_sub(s2) < SERIAL_HALF_RANGE
}

/// `true` when an observed serial satisfies the target serial.
///
/// An observed serial of 0 means no authoritative answer was obtained and
/// never counts as converged.
#[must_use]
pub fn has_converged(observed: u32, target: u32) -> bool {
    observed != SERIAL_UNKNOWN && serial_gte(observed, target)
}

/// Compute the next serial for a mutated zone.
///
/// The result is the current Unix time when that is ahead of `current`,
/// otherwise `current + 1`. Zero is skipped because it is reserved.
#[must_use]
pub fn increment(current: u32) -> u32 {
    let now = u32::try_from(Utc::now().timestamp()).unwrap_or(u32::MAX);
    increment_at(current, now)
}

/// Deterministic form of [`increment`] for a given clock value.
#[must_use]
pub fn increment_at(current: u32, now: u32) -> u32 {
    let next = if current != SERIAL_UNKNOWN && serial_gte(current, now) {
        current.wrapping_add(1)
    } else {
        now
    };

    if next == SERIAL_UNKNOWN {
        1
    } else {
        next
    }
}

#[cfg(test)]
#[path = "serial_tests.rs"]
mod serial_tests;
