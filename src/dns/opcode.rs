// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Private-OPCODE control messages for zone agents.
//!
//! Agents accept a DNS message whose header carries OPCODE 14 and whose
//! single question uses the private class 65280 with type 65282 (create) or
//! 65283 (delete). hickory cannot represent these opcodes, so the message is
//! encoded here directly. The agent acknowledges with AA set and NOERROR.
//!
//! ```text
//!  0  1  2  3  4  5  6  7  8  9 10 11 12 13 14 15
//! |                      ID                       |
//! |QR|  OPCODE   |AA|TC|RD|RA|   Z    |   RCODE   |
//! |      QDCOUNT = 1      |  AN/NS/ARCOUNT = 0    |
//! | QNAME ... | QTYPE | QCLASS |
//! ```

use super::client::{duration_millis, parse_zone_name};
use super::Transport;
use crate::constants::{
    PRIVATE_CLASS_CC, PRIVATE_OPCODE_CC, PRIVATE_TYPE_CREATE, PRIVATE_TYPE_DELETE,
};
use crate::errors::QueryError;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tracing::debug;

const HEADER_LEN: usize = 12;
const MAX_UDP_RESPONSE: usize = 4096;
const RCODE_NOERROR: u8 = 0;

/// Agent command carried in the question type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentCommand {
    /// Create the zone and pull it from the masters
    Create,
    /// Remove the zone
    Delete,
}

impl AgentCommand {
    /// Private QTYPE for this command.
    #[must_use]
    pub fn qtype(self) -> u16 {
        match self {
            Self::Create => PRIVATE_TYPE_CREATE,
            Self::Delete => PRIVATE_TYPE_DELETE,
        }
    }
}

/// Header fields an agent reply is judged on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyHeader {
    /// Message id
    pub id: u16,
    /// QR bit
    pub is_response: bool,
    /// AA bit
    pub authoritative: bool,
    /// Low four bits of the rcode
    pub rcode: u8,
}

/// Encode a private-opcode query for `zone`.
///
/// # Errors
///
/// Returns [`QueryError::InvalidName`] if `zone` is not a valid name.
pub fn encode_query(id: u16, zone: &str, command: AgentCommand) -> Result<Vec<u8>, QueryError> {
    let name = parse_zone_name(zone)?;

    let mut buf = Vec::with_capacity(HEADER_LEN + zone.len() + 6);
    buf.extend_from_slice(&id.to_be_bytes());
    buf.push((PRIVATE_OPCODE_CC & 0x0F) << 3);
    buf.push(0);
    buf.extend_from_slice(&1u16.to_be_bytes());
    buf.extend_from_slice(&[0; 6]);

    for label in name.iter() {
        // Labels are at most 63 bytes once parsed
        buf.push(label.len() as u8);
        buf.extend_from_slice(label);
    }
    buf.push(0);

    buf.extend_from_slice(&command.qtype().to_be_bytes());
    buf.extend_from_slice(&PRIVATE_CLASS_CC.to_be_bytes());
    Ok(buf)
}

/// Decode the header of an agent reply.
///
/// Returns `None` when the buffer is shorter than a DNS header.
#[must_use]
pub fn decode_reply_header(buf: &[u8]) -> Option<ReplyHeader> {
    if buf.len() < HEADER_LEN {
        return None;
    }
    Some(ReplyHeader {
        id: u16::from_be_bytes([buf[0], buf[1]]),
        is_response: buf[2] & 0x80 != 0,
        authoritative: buf[2] & 0x04 != 0,
        rcode: buf[3] & 0x0F,
    })
}

/// Send `command` for `zone` to the agent at `server` and wait for an acknowledgement.
///
/// # Errors
///
/// Returns [`QueryError::Timeout`] when the agent stays silent,
/// [`QueryError::NotAuthoritative`] when it answers without AA or with a
/// non-NOERROR rcode, and [`QueryError::Connection`] on socket failures.
pub async fn send_agent_command(
    transport: Transport,
    server: SocketAddr,
    zone: &str,
    command: AgentCommand,
    timeout: Duration,
) -> Result<(), QueryError> {
    let id: u16 = rand::random();
    let query = encode_query(id, zone, command)?;

    let exchange = async {
        match transport {
            Transport::Udp => exchange_udp(server, &query, id).await,
            Transport::Tcp => exchange_tcp(server, &query).await,
        }
    };

    let reply = tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| QueryError::Timeout {
            server: server.to_string(),
            zone: zone.to_string(),
            timeout_ms: duration_millis(timeout),
        })?
        .map_err(|e| QueryError::Connection {
            server: server.to_string(),
            reason: e.to_string(),
        })?;

    let header = decode_reply_header(&reply)
        .filter(|h| h.id == id && h.is_response)
        .ok_or_else(|| QueryError::BadResponse {
            server: server.to_string(),
            zone: zone.to_string(),
            reason: "reply does not match the query".to_string(),
        })?;

    if !header.authoritative || header.rcode != RCODE_NOERROR {
        return Err(QueryError::NotAuthoritative {
            server: server.to_string(),
            zone: zone.to_string(),
            rcode: header.rcode.to_string(),
            authoritative: header.authoritative,
        });
    }

    debug!(zone = %zone, agent = %server, command = ?command, "Agent acknowledged command");
    Ok(())
}

async fn exchange_udp(server: SocketAddr, query: &[u8], id: u16) -> std::io::Result<Vec<u8>> {
    let bind_addr: SocketAddr = if server.is_ipv4() {
        ([0, 0, 0, 0], 0).into()
    } else {
        ([0u16; 8], 0).into()
    };
    let socket = UdpSocket::bind(bind_addr).await?;
    socket.connect(server).await?;
    socket.send(query).await?;

    let mut buf = vec![0u8; MAX_UDP_RESPONSE];
    loop {
        let len = socket.recv(&mut buf).await?;
        // Ignore stray datagrams for other ids
        if decode_reply_header(&buf[..len]).is_some_and(|h| h.id == id) {
            buf.truncate(len);
            return Ok(buf);
        }
    }
}

async fn exchange_tcp(server: SocketAddr, query: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut stream = TcpStream::connect(server).await?;
    let len = u16::try_from(query.len())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(query).await?;

    let reply_len = stream.read_u16().await?;
    let mut buf = vec![0u8; usize::from(reply_len)];
    stream.read_exact(&mut buf).await?;
    Ok(buf)
}

#[cfg(test)]
#[path = "opcode_tests.rs"]
mod opcode_tests;
