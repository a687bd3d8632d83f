// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `serial.rs`

#[cfg(test)]
mod tests {
    use super::super::{compare, has_converged, increment, increment_at, serial_gte};
    use std::cmp::Ordering;

    #[test]
    fn test_equal_serials_are_gte() {
        assert!(serial_gte(10, 10));
        assert_eq!(compare(10, 10), Some(Ordering::Equal));
    }

    #[test]
    fn test_plain_ordering() {
        assert!(serial_gte(11, 10));
        assert!(!serial_gte(9, 10));
        assert_eq!(compare(9, 10), Some(Ordering::Less));
    }

    #[test]
    fn test_wraparound_forward_counts_as_ahead() {
        let target = 4_294_967_290;
        let observed = 5;

        assert!(
            serial_gte(observed, target),
            "5 is 11 steps ahead of 4294967290 in serial space"
        );
        assert!(has_converged(observed, target));
        // A naive comparator gets this wrong
        assert!(observed < target);
    }

    #[test]
    fn test_wraparound_behind() {
        assert!(!serial_gte(4_294_967_290, 5));
        assert_eq!(compare(4_294_967_290, 5), Some(Ordering::Less));
    }

    #[test]
    fn test_half_range_is_undefined() {
        assert_eq!(compare(1 << 31, 0), None);
        assert!(!serial_gte(1 << 31, 0));
    }

    #[test]
    fn test_zero_observed_never_converges() {
        assert!(!has_converged(0, 0));
        assert!(!has_converged(0, 4_294_967_295));
    }

    #[test]
    fn test_increment_uses_clock_when_ahead() {
        assert_eq!(increment_at(100, 1_700_000_000), 1_700_000_000);
    }

    #[test]
    fn test_increment_bumps_when_serial_ahead_of_clock() {
        assert_eq!(increment_at(1_700_000_005, 1_700_000_000), 1_700_000_006);
    }

    #[test]
    fn test_increment_from_unknown_uses_clock() {
        assert_eq!(increment_at(0, 1_700_000_000), 1_700_000_000);
    }

    #[test]
    fn test_increment_skips_zero_on_wrap() {
        assert_eq!(increment_at(u32::MAX, u32::MAX), 1);
    }

    #[test]
    fn test_increment_is_monotonic() {
        let first = increment(0);
        let second = increment(first);
        assert!(serial_gte(second, first));
        assert_ne!(first, second);
    }
}
