// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common test utilities for integration tests

#![allow(dead_code)]

use hickory_client::op::{Message, MessageType, ResponseCode};
use hickory_client::rr::rdata::SOA;
use hickory_client::rr::{Name, RData, Record};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::UdpSocket;
use uuid::Uuid;
use zonepool::model::{Pool, PoolServer, PoolTarget};

/// How a [`SoaResponder`] answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Authoritative NOERROR with this SOA serial
    Serial(u32),
    /// NXDOMAIN
    Absent,
    /// Never reply
    Silent,
}

/// Loopback UDP nameserver answering SOA queries for any zone.
#[derive(Debug, Clone)]
pub struct SoaResponder {
    addr: SocketAddr,
    mode: Arc<Mutex<Mode>>,
    queries: Arc<AtomicUsize>,
}

impl SoaResponder {
    pub async fn spawn(mode: Mode) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let responder = Self {
            addr,
            mode: Arc::new(Mutex::new(mode)),
            queries: Arc::new(AtomicUsize::new(0)),
        };

        let state = responder.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            while let Ok((len, peer)) = socket.recv_from(&mut buf).await {
                state.queries.fetch_add(1, Ordering::SeqCst);
                let Ok(query) = Message::from_vec(&buf[..len]) else {
                    continue;
                };
                let mode = *state.mode.lock().unwrap();
                if let Some(reply) = answer(&query, mode) {
                    let _ = socket.send_to(&reply, peer).await;
                }
            }
        });

        responder
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn set(&self, mode: Mode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn server(&self) -> PoolServer {
        PoolServer {
            id: Uuid::new_v4(),
            host: self.addr.ip().to_string(),
            port: self.addr.port(),
        }
    }
}

fn answer(query: &Message, mode: Mode) -> Option<Vec<u8>> {
    let mut response = Message::new();
    response
        .set_id(query.id())
        .set_message_type(MessageType::Response)
        .set_op_code(query.op_code())
        .set_authoritative(true)
        .set_recursion_desired(query.recursion_desired());
    response.add_queries(query.queries().to_vec());

    match mode {
        Mode::Silent => return None,
        Mode::Absent => {
            response.set_response_code(ResponseCode::NXDomain);
        }
        Mode::Serial(serial) => {
            let zone = query
                .queries()
                .first()
                .map_or_else(Name::root, |q| q.name().clone());
            let soa = SOA::new(
                Name::from_str("ns1.example.net.").unwrap(),
                Name::from_str("hostmaster.example.net.").unwrap(),
                serial,
                3600,
                600,
                604_800,
                300,
            );
            response.set_response_code(ResponseCode::NoError);
            response.add_answer(Record::from_rdata(zone, 300, RData::SOA(soa)));
        }
    }
    response.to_vec().ok()
}

/// Pool over `responders` with one in-process fake target.
pub fn pool_for(responders: &[&SoaResponder]) -> Pool {
    Pool {
        id: Uuid::new_v4(),
        name: "integration".to_string(),
        description: Some("loopback nameservers".to_string()),
        nameservers: responders.iter().map(|r| r.server()).collect(),
        targets: vec![PoolTarget {
            id: Uuid::new_v4(),
            backend_type: "fake".to_string(),
            description: None,
            options: BTreeMap::new(),
            masters: Vec::new(),
        }],
    }
}

/// Poll `check` every 20ms until it returns `true` or `limit` elapses.
pub async fn eventually<F, Fut>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check().await
}
