// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNS protocol client used to confirm propagation.
//!
//! # Modules
//!
//! - [`client`] - hickory-based SOA queries and NOTIFY over UDP or TCP
//! - [`opcode`] - private-OPCODE control messages understood by zone agents
//!
//! The pool manager only depends on the [`DnsQuerier`] trait so tests can
//! script nameserver behaviour without sockets.

pub mod client;
pub mod opcode;

pub use client::HickoryDnsClient;

use crate::errors::QueryError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Transport used for every exchange with nameservers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// UDP datagrams
    #[default]
    Udp,
    /// TCP with a two-byte length prefix (all-TCP deployments)
    Tcp,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Udp => f.write_str("udp"),
            Self::Tcp => f.write_str("tcp"),
        }
    }
}

/// What a nameserver said about a zone's SOA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoaAnswer {
    /// Authoritative NOERROR answer carrying this serial
    Serial(u32),
    /// The nameserver does not serve the zone (NXDOMAIN, REFUSED, NOTAUTH, SERVFAIL)
    Absent,
}

/// SOA polling and NOTIFY.
#[async_trait]
pub trait DnsQuerier: Send + Sync + std::fmt::Debug {
    /// Ask `server` for the SOA of `zone`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Timeout`] when no reply arrives within `timeout`,
    /// and another [`QueryError`] variant when the reply is unusable.
    async fn query_soa(
        &self,
        server: SocketAddr,
        zone: &str,
        timeout: Duration,
    ) -> Result<SoaAnswer, QueryError>;

    /// Send a NOTIFY for `zone` to `server`.
    ///
    /// # Errors
    ///
    /// Returns a [`QueryError`] if the NOTIFY is not acknowledged with NOERROR.
    async fn send_notify(
        &self,
        server: SocketAddr,
        zone: &str,
        timeout: Duration,
    ) -> Result<(), QueryError>;
}
