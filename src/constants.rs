// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the zonepool pool manager.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// DNS Protocol Constants
// ============================================================================

/// Standard DNS port for queries and zone transfers
pub const DNS_PORT: u16 = 53;

/// Default port of a custom zone agent
pub const DEFAULT_AGENT_PORT: u16 = 5358;

/// Serial value meaning "no authoritative answer was ever obtained"
pub const SERIAL_UNKNOWN: u32 = 0;

/// Half of the 32-bit serial space (RFC 1982 comparison window)
pub const SERIAL_HALF_RANGE: u32 = 1 << 31;

// ============================================================================
// Private OPCODEs for the agent backend
// ============================================================================

/// Command-and-control OPCODE
pub const PRIVATE_OPCODE_CC: u8 = 14;

/// Command-and-control QCLASS
pub const PRIVATE_CLASS_CC: u16 = 65280;

/// Private QTYPE signalling "create zone"
pub const PRIVATE_TYPE_CREATE: u16 = 65282;

/// Private QTYPE signalling "delete zone"
pub const PRIVATE_TYPE_DELETE: u16 = 65283;

// ============================================================================
// Pool Manager Defaults
// ============================================================================

/// Per-query timeout when polling a nameserver (seconds)
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30;

/// Delay between two polls of the same nameserver (seconds)
pub const DEFAULT_POLL_RETRY_INTERVAL_SECS: u64 = 15;

/// Number of poll attempts per nameserver per cycle
pub const DEFAULT_POLL_MAX_RETRIES: u32 = 10;

/// Wait between backend dispatch and the first poll (seconds)
pub const DEFAULT_POLL_DELAY_SECS: u64 = 5;

/// Upper bound on concurrently running propagation cycles
pub const DEFAULT_MAX_CONCURRENT_CYCLES: usize = 32;

/// Interval of the periodic recovery sweep (seconds)
pub const DEFAULT_RECOVERY_INTERVAL_SECS: u64 = 120;

/// Age after which a PENDING domain is considered stuck (seconds)
pub const DEFAULT_RECOVERY_THRESHOLD_SECS: u64 = 300;

/// Interval of the full re-poll of every domain (seconds)
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 1800;

/// Capacity of the engine's inbound event channel
pub const ZONE_EVENT_CHANNEL_CAPACITY: usize = 1024;

/// How many times a convergence-cache write is re-read and retried on conflict
pub const CACHE_CONFLICT_RETRIES: u32 = 5;

// ============================================================================
// Metrics Server Constants
// ============================================================================

/// Path of the Prometheus scrape endpoint
pub const METRICS_SERVER_PATH: &str = "/metrics";

/// Path of the liveness endpoint
pub const HEALTH_SERVER_PATH: &str = "/healthz";

// ============================================================================
// Notification Event Types
// ============================================================================

/// Emitted after a domain is created
pub const EVENT_DOMAIN_CREATE: &str = "dns.domain.create";

/// Emitted after a domain is updated (including status changes)
pub const EVENT_DOMAIN_UPDATE: &str = "dns.domain.update";

/// Emitted after a domain is marked for deletion
pub const EVENT_DOMAIN_DELETE: &str = "dns.domain.delete";

/// Emitted after a domain serial is bumped without content change
pub const EVENT_DOMAIN_TOUCH: &str = "dns.domain.touch";

/// Emitted after a record is created
pub const EVENT_RECORD_CREATE: &str = "dns.record.create";

/// Emitted after a record is updated
pub const EVENT_RECORD_UPDATE: &str = "dns.record.update";

/// Emitted after a record is marked for deletion
pub const EVENT_RECORD_DELETE: &str = "dns.record.delete";
