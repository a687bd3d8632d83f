// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `backend/agent.rs`

#[cfg(test)]
mod tests {
    use super::super::AgentBackend;
    use crate::backend::{dispatch, Backend, BackendSettings};
    use crate::context::RequestContext;
    use crate::dns::{DnsQuerier, SoaAnswer};
    use crate::errors::{BackendError, QueryError};
    use crate::model::{Domain, PoolTarget, ZoneAction};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::UdpSocket;
    use uuid::Uuid;

    #[derive(Debug, Default)]
    struct CountingQuerier {
        notifies: AtomicUsize,
    }

    #[async_trait]
    impl DnsQuerier for CountingQuerier {
        async fn query_soa(
            &self,
            _server: SocketAddr,
            _zone: &str,
            _timeout: Duration,
        ) -> Result<SoaAnswer, QueryError> {
            Ok(SoaAnswer::Absent)
        }

        async fn send_notify(
            &self,
            _server: SocketAddr,
            _zone: &str,
            _timeout: Duration,
        ) -> Result<(), QueryError> {
            self.notifies.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Loopback agent answering every query with AA and the given rcode.
    async fn spawn_agent(rcode: u8) -> (SocketAddr, tokio::sync::mpsc::UnboundedReceiver<u16>) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 512];
            while let Ok((len, peer)) = socket.recv_from(&mut buf).await {
                let mut reply = buf[..len].to_vec();
                let qtype = u16::from_be_bytes([reply[len - 4], reply[len - 3]]);
                reply[2] |= 0x84;
                reply[3] = rcode;
                let _ = socket.send_to(&reply, peer).await;
                let _ = tx.send(qtype);
            }
        });
        (addr, rx)
    }

    fn target(addr: SocketAddr) -> PoolTarget {
        let mut options = BTreeMap::new();
        options.insert("host".to_string(), addr.ip().to_string());
        options.insert("port".to_string(), addr.port().to_string());
        PoolTarget {
            id: Uuid::new_v4(),
            backend_type: "agent".to_string(),
            description: None,
            options,
            masters: vec![],
        }
    }

    fn backend(addr: SocketAddr, querier: Arc<CountingQuerier>) -> AgentBackend {
        let settings = BackendSettings {
            dns_timeout: Duration::from_secs(2),
            ..BackendSettings::default()
        };
        AgentBackend::from_target(&target(addr), &settings)
            .unwrap()
            .with_querier(querier)
    }

    fn zone() -> Domain {
        Domain::new("example.com.", "tenant-a", Uuid::new_v4())
    }

    #[test]
    fn test_default_port() {
        let mut target = target("127.0.0.1:1".parse().unwrap());
        target.options.remove("port");
        let backend = AgentBackend::from_target(&target, &BackendSettings::default()).unwrap();
        assert_eq!(backend.describe(), "agent(127.0.0.1:5358)");
    }

    #[test]
    fn test_missing_host_is_invalid() {
        let mut target = target("127.0.0.1:1".parse().unwrap());
        target.options.clear();
        let err = AgentBackend::from_target(&target, &BackendSettings::default()).unwrap_err();
        assert!(matches!(err, BackendError::InvalidConfiguration { .. }));
    }

    #[tokio::test]
    async fn test_create_sends_private_create_then_notify() {
        let (addr, mut seen) = spawn_agent(0).await;
        let querier = Arc::new(CountingQuerier::default());
        let backend = backend(addr, Arc::clone(&querier));

        backend
            .create_zone(&RequestContext::admin(), &zone())
            .await
            .unwrap();

        assert_eq!(seen.recv().await, Some(65282));
        assert_eq!(querier.notifies.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_delete_sends_private_delete() {
        let (addr, mut seen) = spawn_agent(0).await;
        let backend = backend(addr, Arc::new(CountingQuerier::default()));

        backend
            .delete_zone(&RequestContext::admin(), &zone())
            .await
            .unwrap();

        assert_eq!(seen.recv().await, Some(65283));
    }

    #[tokio::test]
    async fn test_update_only_notifies() {
        let (addr, mut seen) = spawn_agent(0).await;
        let querier = Arc::new(CountingQuerier::default());
        let backend = backend(addr, Arc::clone(&querier));

        backend
            .update_zone(&RequestContext::admin(), &zone())
            .await
            .unwrap();

        assert_eq!(querier.notifies.load(Ordering::SeqCst), 1);
        assert!(seen.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_duplicate_create_is_idempotent() {
        let (addr, _seen) = spawn_agent(6).await;
        let backend = backend(addr, Arc::new(CountingQuerier::default()));
        let ctx = RequestContext::admin();

        let err = backend.create_zone(&ctx, &zone()).await.unwrap_err();
        assert!(matches!(err, BackendError::ZoneAlreadyExists { .. }));
        dispatch(&backend, &ctx, ZoneAction::Create, &zone())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_of_unknown_zone_is_idempotent() {
        let (addr, _seen) = spawn_agent(3).await;
        let backend = backend(addr, Arc::new(CountingQuerier::default()));

        dispatch(&backend, &RequestContext::admin(), ZoneAction::Delete, &zone())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_refused_create_is_rejected() {
        let (addr, _seen) = spawn_agent(5).await;
        let backend = backend(addr, Arc::new(CountingQuerier::default()));

        let err = backend
            .create_zone(&RequestContext::admin(), &zone())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Rejected { .. }));
    }
}
