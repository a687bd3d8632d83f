// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Request context carried through every authority and pool manager call.
//!
//! The pool manager never inspects the context beyond logging; it passes it
//! through to backends and back to the authority. Background work (recovery
//! sweeps, the event loop) runs with an elevated copy so it can see every
//! tenant's domains.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Caller identity and scope of one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Correlation id, logged with every span of work done for the request
    pub request_id: String,
    /// Tenant the caller acts for
    pub tenant_id: Option<String>,
    /// Authenticated user
    pub user_id: Option<String>,
    /// Caller holds the admin role
    pub is_admin: bool,
    /// Queries span every tenant
    pub all_tenants: bool,
}

impl RequestContext {
    /// Context for a tenant-scoped request.
    #[must_use]
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            request_id: new_request_id(),
            tenant_id: Some(tenant_id.into()),
            user_id: None,
            is_admin: false,
            all_tenants: false,
        }
    }

    /// Admin context spanning every tenant, used by background tasks.
    #[must_use]
    pub fn admin() -> Self {
        Self {
            request_id: new_request_id(),
            tenant_id: None,
            user_id: None,
            is_admin: true,
            all_tenants: true,
        }
    }

    /// Copy of this context with admin rights over every tenant.
    ///
    /// The request id is kept so log lines still correlate.
    #[must_use]
    pub fn elevated(&self) -> Self {
        Self {
            is_admin: true,
            all_tenants: true,
            ..self.clone()
        }
    }

    /// `true` if the caller may act on rows owned by `tenant_id`.
    #[must_use]
    pub fn can_access(&self, tenant_id: &str) -> bool {
        self.all_tenants || self.tenant_id.as_deref() == Some(tenant_id)
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::admin()
    }
}

fn new_request_id() -> String {
    format!("req-{}", Uuid::new_v4())
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
