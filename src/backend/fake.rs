// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory driver that accepts every call.
//!
//! It keeps the set of zones it was asked to serve so duplicate creates and
//! deletes of unknown zones report the same conditions a real server would.

use super::Backend;
use crate::context::RequestContext;
use crate::errors::BackendError;
use crate::model::{Domain, PoolTarget, ZoneAction};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Mutex;
use tracing::info;
use uuid::Uuid;

/// Driver without side effects outside the process.
#[derive(Debug, Default)]
pub struct FakeBackend {
    target_id: Uuid,
    zones: Mutex<BTreeSet<String>>,
    calls: Mutex<Vec<(ZoneAction, String)>>,
}

impl FakeBackend {
    /// Registry tag.
    pub const TYPE: &'static str = "fake";

    /// Driver for `target`. The fake driver takes no options.
    #[must_use]
    pub fn from_target(target: &PoolTarget) -> Self {
        Self {
            target_id: target.id,
            ..Self::default()
        }
    }

    /// Zones currently served.
    #[must_use]
    pub fn zones(&self) -> Vec<String> {
        lock(&self.zones).iter().cloned().collect()
    }

    /// Every call received, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<(ZoneAction, String)> {
        lock(&self.calls).clone()
    }

    fn record(&self, action: ZoneAction, zone: &Domain) {
        info!(target_id = %self.target_id, zone = %zone.name, action = %action, "Fake backend call");
        lock(&self.calls).push((action, zone.name.clone()));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[async_trait]
impl Backend for FakeBackend {
    fn backend_type(&self) -> &'static str {
        Self::TYPE
    }

    fn describe(&self) -> String {
        format!("fake({})", self.target_id)
    }

    async fn create_zone(&self, _ctx: &RequestContext, zone: &Domain) -> Result<(), BackendError> {
        self.record(ZoneAction::Create, zone);
        if lock(&self.zones).insert(zone.name.clone()) {
            Ok(())
        } else {
            Err(BackendError::ZoneAlreadyExists {
                zone: zone.name.clone(),
                target: self.describe(),
            })
        }
    }

    async fn update_zone(&self, _ctx: &RequestContext, zone: &Domain) -> Result<(), BackendError> {
        self.record(ZoneAction::Update, zone);
        Ok(())
    }

    async fn delete_zone(&self, _ctx: &RequestContext, zone: &Domain) -> Result<(), BackendError> {
        self.record(ZoneAction::Delete, zone);
        if lock(&self.zones).remove(&zone.name) {
            Ok(())
        } else {
            Err(BackendError::ZoneNotFound {
                zone: zone.name.clone(),
                target: self.describe(),
            })
        }
    }
}
