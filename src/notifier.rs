// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Best-effort notification sink.
//!
//! Events produced during one unit of work are collected in a
//! [`PendingEvents`] batch and emitted only after the unit of work's change
//! set has been committed. A failed commit drops the batch unsent.

use crate::context::RequestContext;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Mutex, PoisonError};
use tracing::{info, warn};

/// A notification: event type plus JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    /// Topic, e.g. `dns.domain.create`
    pub event_type: &'static str,
    /// Serialized row
    pub payload: serde_json::Value,
}

/// Fire-and-forget event sink. Delivery failures are the sink's problem.
#[async_trait]
pub trait Notifier: Send + Sync + std::fmt::Debug {
    /// Publish one event.
    async fn notify(&self, ctx: &RequestContext, event: &Event);
}

/// Sink that writes events to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, ctx: &RequestContext, event: &Event) {
        info!(
            request_id = %ctx.request_id,
            event_type = event.event_type,
            payload = %event.payload,
            "Notification"
        );
    }
}

/// Sink that keeps every event, for inspection.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    events: Mutex<Vec<Event>>,
}

impl MemoryNotifier {
    /// Empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events received so far.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Event types received so far, in order.
    #[must_use]
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events().iter().map(|e| e.event_type).collect()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn notify(&self, _ctx: &RequestContext, event: &Event) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

/// Events waiting for their unit of work to commit.
#[derive(Debug, Default)]
#[must_use = "pending events are lost unless emitted"]
pub struct PendingEvents {
    events: Vec<Event>,
}

impl PendingEvents {
    /// Empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an event. A payload that fails to serialize is logged and skipped.
    pub fn push(&mut self, event_type: &'static str, payload: &impl Serialize) {
        match serde_json::to_value(payload) {
            Ok(payload) => self.events.push(Event {
                event_type,
                payload,
            }),
            Err(e) => warn!(event_type, error = %e, "Dropping unserializable notification"),
        }
    }

    /// Number of queued events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// `true` when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Send every queued event, in order.
    pub async fn emit(self, notifier: &dyn Notifier, ctx: &RequestContext) {
        for event in &self.events {
            notifier.notify(ctx, event).await;
        }
    }
}

#[cfg(test)]
#[path = "notifier_tests.rs"]
mod notifier_tests;
