// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Backend drivers: the control step of a propagation cycle.
//!
//! A driver makes one pool target create, update or delete a zone. It only
//! confirms the control step (a zone stanza added, a NOTIFY sent); whether
//! the data actually reached the nameservers is learned later by polling.
//!
//! # Drivers
//!
//! - [`bind9`] - BIND9 via the bindcar HTTP API, secondary zones pulled from masters
//! - [`agent`] - zone agents driven by private-OPCODE DNS messages
//! - [`fake`] - accepts everything, for development and tests
//!
//! Drivers are resolved from a target's `type` tag by the [`registry`] at startup.

pub mod agent;
pub mod bind9;
pub mod fake;
pub mod registry;

pub use registry::{BackendRegistry, BackendSettings};

use crate::context::RequestContext;
use crate::errors::BackendError;
use crate::metrics;
use crate::model::{Domain, ZoneAction};
use async_trait::async_trait;
use tracing::{error, info};

/// Uniform contract of a pool target.
#[async_trait]
pub trait Backend: Send + Sync + std::fmt::Debug {
    /// Registry tag of the driver.
    fn backend_type(&self) -> &'static str;

    /// Target description used in logs and errors, e.g. `bind9(10.0.0.5:8080)`.
    fn describe(&self) -> String;

    /// Make the target serve `zone`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::ZoneAlreadyExists`] if the zone is already
    /// present, or another [`BackendError`] if the control step failed.
    async fn create_zone(&self, ctx: &RequestContext, zone: &Domain) -> Result<(), BackendError>;

    /// Tell the target the zone content changed.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] if the control step failed.
    async fn update_zone(&self, ctx: &RequestContext, zone: &Domain) -> Result<(), BackendError>;

    /// Make the target stop serving `zone`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::ZoneNotFound`] if the zone is already gone, or
    /// another [`BackendError`] if the control step failed.
    async fn delete_zone(&self, ctx: &RequestContext, zone: &Domain) -> Result<(), BackendError>;
}

/// Run the control call matching `action` and fold idempotent outcomes into success.
///
/// "Already exists" on create and "not found" on delete are expected when an
/// event is retried and count as success.
///
/// # Errors
///
/// Returns the driver's [`BackendError`] for every other failure.
pub async fn dispatch(
    backend: &dyn Backend,
    ctx: &RequestContext,
    action: ZoneAction,
    zone: &Domain,
) -> Result<(), BackendError> {
    let result = match action {
        ZoneAction::Create => backend.create_zone(ctx, zone).await,
        ZoneAction::Update => backend.update_zone(ctx, zone).await,
        ZoneAction::Delete => backend.delete_zone(ctx, zone).await,
    };

    let result = match result {
        Err(BackendError::ZoneAlreadyExists { .. }) if action == ZoneAction::Create => {
            info!(
                zone = %zone.name,
                target = %backend.describe(),
                "Zone already exists on target, treating create as success"
            );
            Ok(())
        }
        Err(BackendError::ZoneNotFound { .. }) if action == ZoneAction::Delete => {
            info!(
                zone = %zone.name,
                target = %backend.describe(),
                "Zone already absent from target, treating delete as success"
            );
            Ok(())
        }
        other => other,
    };

    match &result {
        Ok(()) => metrics::record_backend_call(backend.backend_type(), action, "success"),
        Err(e) => {
            error!(
                zone = %zone.name,
                target = %backend.describe(),
                action = %action,
                request_id = %ctx.request_id,
                reason = e.reason(),
                error = %e,
                "Backend control call failed"
            );
            metrics::record_backend_call(backend.backend_type(), action, e.reason());
        }
    }

    result
}
