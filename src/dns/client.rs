// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! hickory-based implementation of [`DnsQuerier`].
//!
//! Each exchange opens a fresh connection and runs the synchronous hickory
//! client on the blocking pool, so a slow nameserver only ties up its own
//! thread. An outer tokio timeout bounds the whole exchange.

use super::{DnsQuerier, SoaAnswer, Transport};
use crate::errors::QueryError;
use async_trait::async_trait;
use hickory_client::client::{Client, SyncClient};
use hickory_client::error::ClientError;
use hickory_client::op::{Message, ResponseCode};
use hickory_client::proto::xfer::DnsResponse;
use hickory_client::rr::{DNSClass, Name, RData, RecordSet, RecordType};
use hickory_client::tcp::TcpClientConnection;
use hickory_client::udp::UdpClientConnection;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Extra time granted to the blocking task beyond the socket timeout.
const TASK_GRACE: Duration = Duration::from_secs(1);

/// DNS client that talks to real nameservers.
#[derive(Debug, Clone, Copy, Default)]
pub struct HickoryDnsClient {
    transport: Transport,
}

#[derive(Debug, Clone)]
enum Exchange {
    Soa(Name),
    Notify(Name),
}

impl HickoryDnsClient {
    /// Client using `transport` for every exchange.
    #[must_use]
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    /// Configured transport.
    #[must_use]
    pub fn transport(&self) -> Transport {
        self.transport
    }

    async fn exchange(
        &self,
        server: SocketAddr,
        zone: &str,
        timeout: Duration,
        exchange: Exchange,
    ) -> Result<DnsResponse, QueryError> {
        let transport = self.transport;
        let timeout_error = || QueryError::Timeout {
            server: server.to_string(),
            zone: zone.to_string(),
            timeout_ms: duration_millis(timeout),
        };

        let task = tokio::task::spawn_blocking(move || -> Result<DnsResponse, ClientError> {
            match transport {
                Transport::Udp => {
                    let conn = UdpClientConnection::with_timeout(server, timeout)?;
                    run(&mut SyncClient::new(conn), &exchange)
                }
                Transport::Tcp => {
                    let conn = TcpClientConnection::with_timeout(server, timeout)?;
                    run(&mut SyncClient::new(conn), &exchange)
                }
            }
        });

        let joined = tokio::time::timeout(timeout + TASK_GRACE, task)
            .await
            .map_err(|_| timeout_error())?
            .map_err(|e| QueryError::Connection {
                server: server.to_string(),
                reason: format!("DNS query task failed: {e}"),
            })?;

        joined.map_err(|e| classify_client_error(&e, server, zone, timeout))
    }
}

fn run<C: Client>(client: &mut C, exchange: &Exchange) -> Result<DnsResponse, ClientError> {
    match exchange {
        Exchange::Soa(name) => client.query(name, DNSClass::IN, RecordType::SOA),
        Exchange::Notify(name) => {
            client.notify(name.clone(), DNSClass::IN, RecordType::SOA, None::<RecordSet>)
        }
    }
}

#[async_trait]
impl DnsQuerier for HickoryDnsClient {
    async fn query_soa(
        &self,
        server: SocketAddr,
        zone: &str,
        timeout: Duration,
    ) -> Result<SoaAnswer, QueryError> {
        let name = parse_zone_name(zone)?;
        let response = self
            .exchange(server, zone, timeout, Exchange::Soa(name))
            .await?;
        let answer = interpret_soa_response(&response, server, zone)?;
        debug!(zone = %zone, nameserver = %server, answer = ?answer, "SOA query answered");
        Ok(answer)
    }

    async fn send_notify(
        &self,
        server: SocketAddr,
        zone: &str,
        timeout: Duration,
    ) -> Result<(), QueryError> {
        let name = parse_zone_name(zone)?;
        let response = self
            .exchange(server, zone, timeout, Exchange::Notify(name))
            .await?;

        if response.response_code() != ResponseCode::NoError {
            return Err(QueryError::NotAuthoritative {
                server: server.to_string(),
                zone: zone.to_string(),
                rcode: response.response_code().to_string(),
                authoritative: response.header().authoritative(),
            });
        }

        debug!(zone = %zone, nameserver = %server, "NOTIFY acknowledged");
        Ok(())
    }
}

/// Parse a zone name, accepting names with or without the trailing dot.
///
/// # Errors
///
/// Returns [`QueryError::InvalidName`] if the name is not a valid DNS name.
pub fn parse_zone_name(zone: &str) -> Result<Name, QueryError> {
    let fqdn = if zone.ends_with('.') {
        zone.to_string()
    } else {
        format!("{zone}.")
    };

    Name::from_str(&fqdn).map_err(|e| QueryError::InvalidName {
        name: zone.to_string(),
        reason: e.to_string(),
    })
}

/// Turn an SOA response into an answer.
///
/// - NOERROR with AA and an SOA in the answer section yields the serial.
/// - NXDOMAIN, REFUSED, NOTAUTH and SERVFAIL mean the server does not serve the zone.
/// - Anything else, including NOERROR without AA, is a failure.
///
/// # Errors
///
/// Returns [`QueryError::NotAuthoritative`] or [`QueryError::BadResponse`].
pub fn interpret_soa_response(
    message: &Message,
    server: SocketAddr,
    zone: &str,
) -> Result<SoaAnswer, QueryError> {
    let rcode = message.response_code();
    let authoritative = message.header().authoritative();

    match rcode {
        ResponseCode::NoError => {}
        ResponseCode::NXDomain
        | ResponseCode::Refused
        | ResponseCode::NotAuth
        | ResponseCode::ServFail => return Ok(SoaAnswer::Absent),
        other => {
            return Err(QueryError::NotAuthoritative {
                server: server.to_string(),
                zone: zone.to_string(),
                rcode: other.to_string(),
                authoritative,
            })
        }
    }

    if !authoritative {
        return Err(QueryError::NotAuthoritative {
            server: server.to_string(),
            zone: zone.to_string(),
            rcode: rcode.to_string(),
            authoritative,
        });
    }

    message
        .answers()
        .iter()
        .find_map(|record| match record.data() {
            Some(RData::SOA(soa)) => Some(soa.serial()),
            _ => None,
        })
        .map(SoaAnswer::Serial)
        .ok_or_else(|| QueryError::BadResponse {
            server: server.to_string(),
            zone: zone.to_string(),
            reason: "no SOA record in answer section".to_string(),
        })
}

fn classify_client_error(
    error: &ClientError,
    server: SocketAddr,
    zone: &str,
    timeout: Duration,
) -> QueryError {
    let message = error.to_string();
    let lower = message.to_lowercase();

    if lower.contains("timed out") || lower.contains("timeout") {
        QueryError::Timeout {
            server: server.to_string(),
            zone: zone.to_string(),
            timeout_ms: duration_millis(timeout),
        }
    } else if lower.contains("io error")
        || lower.contains("connection")
        || lower.contains("refused")
        || lower.contains("unreachable")
    {
        QueryError::Connection {
            server: server.to_string(),
            reason: message,
        }
    } else {
        QueryError::BadResponse {
            server: server.to_string(),
            zone: zone.to_string(),
            reason: message,
        }
    }
}

pub(crate) fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod client_tests;
