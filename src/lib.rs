// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#![allow(unexpected_cfgs)]

//! # Zonepool - DNS pool manager
//!
//! Zonepool propagates zone changes from a central authority to a pool of
//! authoritative DNS servers and confirms that every nameserver in the pool
//! serves the new SOA serial before the change is marked ACTIVE.
//!
//! ## Overview
//!
//! A change flows through the crate like this:
//!
//! - The [`central`] authority validates the change, moves the row through the
//!   action/status state machine in [`status`], commits it to [`storage`] and
//!   queues a [`engine::ZoneEvent`]
//! - The [`engine`] takes the per-domain lock, calls every [`backend`] target of
//!   the domain's [`pool`], then polls every nameserver over [`dns`] until the
//!   serial converges or the retry budget is spent
//! - Per-nameserver results land in the versioned convergence [`cache`]
//! - The engine reports SUCCESS or ERROR back to the authority
//! - The [`periodic`] loop re-polls domains left PENDING
//!
//! ## Modules
//!
//! - [`backend`] - Backend drivers (BIND9 via the bindcar HTTP API, agent via DNS opcodes) and the type registry
//! - [`cache`] - Convergence cache with optimistic versioning
//! - [`central`] - Authority owning domain and record rows
//! - [`config`] - YAML configuration
//! - [`dns`] - SOA polling and NOTIFY client
//! - [`engine`] - Propagation cycles
//! - [`periodic`] - Recovery and sync timers
//! - [`serial`] - RFC 1982 serial arithmetic
//! - [`status`] - Row state machine
//!
//! ## Example
//!
//! ```rust,no_run
//! use zonepool::serial::{has_converged, serial_gte};
//!
//! // A nameserver that wrapped past 2^32 is still ahead
//! assert!(serial_gte(5, 4_294_967_290));
//! assert!(has_converged(5, 4_294_967_290));
//!
//! // Serial 0 means "no answer" and never converges
//! assert!(!has_converged(0, 1));
//! ```

pub mod backend;
pub mod cache;
pub mod central;
pub mod config;
pub mod constants;
pub mod context;
pub mod dns;
pub mod engine;
pub mod errors;
pub mod locks;
pub mod metrics;
pub mod model;
pub mod notifier;
pub mod periodic;
pub mod pool;
pub mod retry;
pub mod serial;
pub mod status;
pub mod storage;
