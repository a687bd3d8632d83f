// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the pool manager engine

#[cfg(test)]
mod tests {
    use super::super::{CycleState, PoolManager, PoolManagerSettings, ZoneEvent};
    use crate::backend::fake::FakeBackend;
    use crate::backend::Backend;
    use crate::cache::{MemoryCache, PoolManagerCache};
    use crate::central::CentralApi;
    use crate::context::RequestContext;
    use crate::dns::{DnsQuerier, SoaAnswer};
    use crate::errors::{BackendError, CacheError, CentralError, EngineError, QueryError, StorageError};
    use crate::model::{
        Action, CacheKey, Domain, Master, PollStatus, Pool, PoolServer, PoolTarget, Record,
        RecordSet, ReportedStatus, ZoneAction, ZoneType,
    };
    use crate::pool::ConfigTopology;
    use crate::storage::DomainCriteria;
    use async_trait::async_trait;
    use crate::model::PoolManagerStatus;
    use std::collections::{BTreeMap, HashMap, VecDeque};
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};
    use tokio::sync::{mpsc, watch};
    use uuid::Uuid;

    type Reply = Result<SoaAnswer, QueryError>;

    /// Answers SOA queries from a per-server script. The last reply repeats.
    #[derive(Debug, Default)]
    struct ScriptedQuerier {
        scripts: Mutex<HashMap<SocketAddr, VecDeque<Reply>>>,
        calls: Mutex<HashMap<SocketAddr, usize>>,
    }

    impl ScriptedQuerier {
        fn script(&self, server: SocketAddr, replies: Vec<Reply>) {
            self.scripts
                .lock()
                .unwrap()
                .insert(server, replies.into_iter().collect());
        }

        fn calls(&self, server: SocketAddr) -> usize {
            self.calls.lock().unwrap().get(&server).copied().unwrap_or(0)
        }

        fn total_calls(&self) -> usize {
            self.calls.lock().unwrap().values().sum()
        }
    }

    fn timeout(server: SocketAddr, zone: &str) -> Reply {
        Err(QueryError::Timeout {
            server: server.to_string(),
            zone: zone.to_string(),
            timeout_ms: 50,
        })
    }

    #[async_trait]
    impl DnsQuerier for ScriptedQuerier {
        async fn query_soa(
            &self,
            server: SocketAddr,
            zone: &str,
            _timeout: Duration,
        ) -> Result<SoaAnswer, QueryError> {
            *self.calls.lock().unwrap().entry(server).or_default() += 1;
            let mut scripts = self.scripts.lock().unwrap();
            let Some(script) = scripts.get_mut(&server) else {
                return timeout(server, zone);
            };
            if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                script.front().cloned().unwrap_or_else(|| timeout(server, zone))
            }
        }

        async fn send_notify(
            &self,
            _server: SocketAddr,
            _zone: &str,
            _timeout: Duration,
        ) -> Result<(), QueryError> {
            Ok(())
        }
    }

    /// Authority stand-in holding domains in a map and recording every report.
    #[derive(Debug, Default)]
    struct RecordingCentral {
        domains: Mutex<HashMap<Uuid, Domain>>,
        statuses: Mutex<Vec<(Uuid, ReportedStatus, u32)>>,
        transfers: Mutex<Vec<(Uuid, u32)>>,
    }

    impl RecordingCentral {
        fn put(&self, domain: Domain) {
            self.domains.lock().unwrap().insert(domain.id, domain);
        }

        fn statuses(&self) -> Vec<(Uuid, ReportedStatus, u32)> {
            self.statuses.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CentralApi for RecordingCentral {
        async fn get_domain(
            &self,
            _ctx: &RequestContext,
            domain_id: Uuid,
        ) -> Result<Domain, CentralError> {
            self.domains
                .lock()
                .unwrap()
                .get(&domain_id)
                .cloned()
                .ok_or_else(|| {
                    CentralError::Storage(StorageError::NotFound {
                        kind: "Domain",
                        id: domain_id.to_string(),
                    })
                })
        }

        async fn find_domains(
            &self,
            _ctx: &RequestContext,
            criteria: &DomainCriteria,
        ) -> Result<Vec<Domain>, CentralError> {
            let mut domains: Vec<Domain> = self
                .domains
                .lock()
                .unwrap()
                .values()
                .filter(|d| criteria.matches(d))
                .cloned()
                .collect();
            domains.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(domains)
        }

        async fn update_status(
            &self,
            _ctx: &RequestContext,
            domain_id: Uuid,
            status: ReportedStatus,
            serial: u32,
        ) -> Result<(), CentralError> {
            self.statuses
                .lock()
                .unwrap()
                .push((domain_id, status, serial));
            Ok(())
        }

        async fn record_transfer(
            &self,
            _ctx: &RequestContext,
            domain_id: Uuid,
            serial: u32,
        ) -> Result<Domain, CentralError> {
            self.transfers.lock().unwrap().push((domain_id, serial));
            let mut domains = self.domains.lock().unwrap();
            let domain = domains.get_mut(&domain_id).unwrap();
            domain.serial = serial;
            domain.action = Action::Update;
            Ok(domain.clone())
        }
    }

    struct Harness {
        manager: Arc<PoolManager>,
        querier: Arc<ScriptedQuerier>,
        central: Arc<RecordingCentral>,
        cache: Arc<MemoryCache>,
        backends: Vec<Arc<FakeBackend>>,
        pool: Pool,
    }

    impl Harness {
        fn new(nameservers: u16, targets: usize) -> Self {
            let pool = Pool {
                id: Uuid::new_v4(),
                name: "default".to_string(),
                description: None,
                nameservers: (1..=nameservers)
                    .map(|n| PoolServer {
                        id: Uuid::new_v4(),
                        host: "127.0.0.1".to_string(),
                        port: 20_000 + n,
                    })
                    .collect(),
                targets: (0..targets)
                    .map(|_| PoolTarget {
                        id: Uuid::new_v4(),
                        backend_type: FakeBackend::TYPE.to_string(),
                        description: None,
                        options: BTreeMap::new(),
                        masters: Vec::new(),
                    })
                    .collect(),
            };
            Self::with_pool(pool)
        }

        fn with_pool(pool: Pool) -> Self {
            let backends: Vec<Arc<FakeBackend>> = pool
                .targets
                .iter()
                .map(|t| Arc::new(FakeBackend::from_target(t)))
                .collect();
            let drivers: HashMap<Uuid, Arc<dyn Backend>> = pool
                .targets
                .iter()
                .zip(&backends)
                .map(|(t, b)| (t.id, Arc::clone(b) as Arc<dyn Backend>))
                .collect();

            let querier = Arc::new(ScriptedQuerier::default());
            let central = Arc::new(RecordingCentral::default());
            let cache = Arc::new(MemoryCache::new());
            let settings = PoolManagerSettings {
                poll_timeout: Duration::from_millis(50),
                poll_retry_interval: Duration::from_millis(1),
                poll_max_retries: 3,
                poll_delay: Duration::ZERO,
                max_concurrent_cycles: 4,
            };
            let manager = Arc::new(PoolManager::new(
                settings,
                Arc::new(ConfigTopology::new([pool.clone()])),
                drivers,
                Arc::clone(&querier) as Arc<dyn DnsQuerier>,
                Arc::clone(&cache) as Arc<dyn PoolManagerCache>,
                Arc::clone(&central) as Arc<dyn CentralApi>,
            ));

            Self {
                manager,
                querier,
                central,
                cache,
                backends,
                pool,
            }
        }

        fn ns(&self, index: usize) -> SocketAddr {
            self.pool.nameservers[index].socket_addr().unwrap()
        }

        fn answer_all(&self, replies: &[Reply]) {
            for index in 0..self.pool.nameservers.len() {
                self.querier.script(self.ns(index), replies.to_vec());
            }
        }

        fn domain(&self, serial: u32) -> Domain {
            let mut domain = Domain::new("example.com.", "tenant-a", self.pool.id);
            domain.serial = serial;
            self.central.put(domain.clone());
            domain
        }

        async fn cached(&self, index: usize, zone_id: Uuid, action: ZoneAction) -> PollStatus {
            let key = CacheKey {
                nameserver_id: self.pool.nameservers[index].id,
                zone_id,
                action,
            };
            self.cache
                .retrieve(&RequestContext::admin(), key)
                .await
                .unwrap()
                .status
        }
    }

    /// Answers every SOA query with serial 10 after a per-zone delay and
    /// tracks how many queries run at once.
    #[derive(Debug, Default)]
    struct SlowQuerier {
        delays: Mutex<HashMap<String, Duration>>,
        in_flight: Mutex<HashMap<String, usize>>,
        zone_peaks: Mutex<HashMap<String, usize>>,
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl SlowQuerier {
        fn delay(&self, zone: &str, delay: Duration) {
            self.delays.lock().unwrap().insert(zone.to_string(), delay);
        }

        fn zone_peak(&self, zone: &str) -> usize {
            self.zone_peaks.lock().unwrap().get(zone).copied().unwrap_or(0)
        }

        fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DnsQuerier for SlowQuerier {
        async fn query_soa(
            &self,
            _server: SocketAddr,
            zone: &str,
            _timeout: Duration,
        ) -> Result<SoaAnswer, QueryError> {
            let delay = self
                .delays
                .lock()
                .unwrap()
                .get(zone)
                .copied()
                .unwrap_or(Duration::from_millis(20));
            {
                let mut in_flight = self.in_flight.lock().unwrap();
                let count = in_flight.entry(zone.to_string()).or_default();
                *count += 1;
                let mut peaks = self.zone_peaks.lock().unwrap();
                let peak = peaks.entry(zone.to_string()).or_default();
                *peak = (*peak).max(*count);
            }
            let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(running, Ordering::SeqCst);

            tokio::time::sleep(delay).await;

            self.running.fetch_sub(1, Ordering::SeqCst);
            *self
                .in_flight
                .lock()
                .unwrap()
                .get_mut(zone)
                .unwrap() -= 1;
            Ok(SoaAnswer::Serial(10))
        }

        async fn send_notify(
            &self,
            _server: SocketAddr,
            _zone: &str,
            _timeout: Duration,
        ) -> Result<(), QueryError> {
            Ok(())
        }
    }

    /// Memory cache that counts reads.
    #[derive(Debug, Default)]
    struct CountingCache {
        inner: MemoryCache,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl PoolManagerCache for CountingCache {
        async fn store(
            &self,
            ctx: &RequestContext,
            entry: &PoolManagerStatus,
        ) -> Result<PoolManagerStatus, CacheError> {
            self.inner.store(ctx, entry).await
        }

        async fn retrieve(
            &self,
            ctx: &RequestContext,
            key: CacheKey,
        ) -> Result<PoolManagerStatus, CacheError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.retrieve(ctx, key).await
        }

        async fn clear(&self, ctx: &RequestContext, zone_id: Uuid) -> Result<usize, CacheError> {
            self.inner.clear(ctx, zone_id).await
        }
    }

    /// Manager over a one-nameserver pool with no backend targets.
    fn bare_manager(
        querier: Arc<dyn DnsQuerier>,
        cache: Arc<dyn PoolManagerCache>,
        max_concurrent_cycles: usize,
    ) -> (Arc<PoolManager>, Arc<RecordingCentral>, Pool) {
        let pool = Harness::new(1, 0).pool;
        let central = Arc::new(RecordingCentral::default());
        let settings = PoolManagerSettings {
            poll_timeout: Duration::from_millis(500),
            poll_retry_interval: Duration::from_millis(1),
            poll_max_retries: 1,
            poll_delay: Duration::ZERO,
            max_concurrent_cycles,
        };
        let manager = Arc::new(PoolManager::new(
            settings,
            Arc::new(ConfigTopology::new([pool.clone()])),
            HashMap::new(),
            querier,
            cache,
            Arc::clone(&central) as Arc<dyn CentralApi>,
        ));
        (manager, central, pool)
    }

    fn put_domain(central: &RecordingCentral, pool: &Pool, name: &str) -> Domain {
        let mut domain = Domain::new(name, "tenant-a", pool.id);
        domain.serial = 10;
        central.put(domain.clone());
        domain
    }

    fn ctx() -> RequestContext {
        RequestContext::new("tenant-a")
    }

    #[tokio::test]
    async fn test_create_converges_in_one_pass() {
        let h = Harness::new(2, 1);
        h.answer_all(&[Ok(SoaAnswer::Serial(10))]);
        let domain = h.domain(10);

        let report = h.manager.create_domain(&ctx(), &domain).await.unwrap();

        assert_eq!(report.state, CycleState::Converged);
        assert_eq!(report.reported, Some(ReportedStatus::Success));
        assert_eq!(h.central.statuses(), vec![(domain.id, ReportedStatus::Success, 10)]);
        assert_eq!(h.querier.calls(h.ns(0)), 1);
        assert_eq!(h.querier.calls(h.ns(1)), 1);
        assert_eq!(h.backends[0].zones(), vec!["example.com.".to_string()]);
    }

    #[tokio::test]
    async fn test_lagging_nameserver_is_retried_until_it_catches_up() {
        let h = Harness::new(2, 1);
        h.querier.script(h.ns(0), vec![Ok(SoaAnswer::Serial(10))]);
        h.querier.script(
            h.ns(1),
            vec![Ok(SoaAnswer::Serial(9)), Ok(SoaAnswer::Absent), Ok(SoaAnswer::Serial(11))],
        );
        let domain = h.domain(10);

        let report = h.manager.update_domain(&ctx(), &domain).await.unwrap();

        assert!(report.is_converged());
        assert_eq!(h.querier.calls(h.ns(1)), 3);
        let lagging = report.nameserver(h.pool.nameservers[1].id).unwrap();
        assert_eq!(lagging.attempts, 3);
        assert_eq!(lagging.observed_serial, 11);
    }

    #[tokio::test]
    async fn test_nameserver_behind_after_budget_fails_cycle() {
        let h = Harness::new(2, 0);
        h.querier.script(h.ns(0), vec![Ok(SoaAnswer::Serial(10))]);
        h.querier.script(h.ns(1), vec![Ok(SoaAnswer::Serial(9))]);
        let domain = h.domain(10);

        let report = h.manager.update_domain(&ctx(), &domain).await.unwrap();

        assert_eq!(report.state, CycleState::Failed);
        assert_eq!(h.querier.calls(h.ns(1)), 3);
        assert_eq!(h.central.statuses(), vec![(domain.id, ReportedStatus::Error, 10)]);
    }

    #[tokio::test]
    async fn test_create_twice_is_idempotent_on_backends() {
        let h = Harness::new(1, 2);
        h.answer_all(&[Ok(SoaAnswer::Serial(1))]);
        let domain = h.domain(1);

        let first = h.manager.create_domain(&ctx(), &domain).await.unwrap();
        let second = h.manager.create_domain(&ctx(), &domain).await.unwrap();

        assert!(first.targets.iter().all(|t| t.is_success()));
        assert!(second.targets.iter().all(|t| t.is_success()));
        for backend in &h.backends {
            assert_eq!(backend.zones(), vec!["example.com.".to_string()]);
            assert_eq!(backend.calls().len(), 2);
        }
    }

    #[tokio::test]
    async fn test_timed_out_nameserver_is_isolated() {
        let h = Harness::new(3, 1);
        let zone = "example.com.";
        h.querier.script(h.ns(0), vec![Ok(SoaAnswer::Serial(10))]);
        h.querier.script(h.ns(1), vec![timeout(h.ns(1), zone)]);
        h.querier.script(h.ns(2), vec![Ok(SoaAnswer::Serial(10))]);
        let domain = h.domain(10);

        let report = h.manager.create_domain(&ctx(), &domain).await.unwrap();

        assert_eq!(report.state, CycleState::Failed);
        assert_eq!(h.cached(0, domain.id, ZoneAction::Create).await, PollStatus::Success);
        assert_eq!(h.cached(1, domain.id, ZoneAction::Create).await, PollStatus::Error);
        assert_eq!(h.cached(2, domain.id, ZoneAction::Create).await, PollStatus::Success);
        assert_eq!(h.querier.calls(h.ns(1)), 3);
        assert_eq!(h.central.statuses(), vec![(domain.id, ReportedStatus::Error, 10)]);
    }

    #[tokio::test]
    async fn test_error_serial_is_zero_when_nobody_answered() {
        let h = Harness::new(2, 0);
        let domain = h.domain(10);

        let report = h.manager.update_domain(&ctx(), &domain).await.unwrap();

        assert_eq!(report.state, CycleState::Failed);
        assert!(report.nameservers.iter().all(|ns| !ns.answered));
        assert_eq!(h.central.statuses(), vec![(domain.id, ReportedStatus::Error, 0)]);
    }

    #[tokio::test]
    async fn test_serial_wraparound_counts_as_converged() {
        let h = Harness::new(2, 0);
        h.answer_all(&[Ok(SoaAnswer::Serial(5))]);
        let domain = h.domain(4_294_967_290);

        let report = h.manager.update_domain(&ctx(), &domain).await.unwrap();

        assert_eq!(report.state, CycleState::Converged);
        assert_eq!(
            h.central.statuses(),
            vec![(domain.id, ReportedStatus::Success, 4_294_967_290)]
        );
    }

    #[tokio::test]
    async fn test_failing_backend_does_not_stop_polling() {
        let mut pool = Harness::new(1, 1).pool;
        pool.targets.push(PoolTarget {
            id: Uuid::new_v4(),
            backend_type: "unbuilt".to_string(),
            description: None,
            options: BTreeMap::new(),
            masters: Vec::new(),
        });
        let h = Harness::with_pool(pool.clone());
        h.answer_all(&[Ok(SoaAnswer::Serial(3))]);
        let domain = h.domain(3);

        let report = h.manager.create_domain(&ctx(), &domain).await.unwrap();

        assert_eq!(report.targets.len(), 2);
        let failed: Vec<_> = report.targets.iter().filter(|t| !t.is_success()).collect();
        assert_eq!(failed.len(), 1);
        assert!(matches!(
            failed[0].error,
            Some(BackendError::UnknownBackendType { .. })
        ));
        assert_eq!(report.state, CycleState::Converged);
    }

    #[tokio::test]
    async fn test_cycle_uses_latest_serial_not_event_serial() {
        let h = Harness::new(1, 0);
        h.answer_all(&[Ok(SoaAnswer::Serial(7))]);
        let stale = h.domain(5);
        let mut latest = stale.clone();
        latest.serial = 7;
        h.central.put(latest);

        let report = h.manager.update_domain(&ctx(), &stale).await.unwrap();

        assert_eq!(report.serial, 7);
        assert_eq!(h.central.statuses(), vec![(stale.id, ReportedStatus::Success, 7)]);
    }

    #[tokio::test]
    async fn test_update_of_deleting_domain_is_abandoned() {
        let h = Harness::new(1, 1);
        h.answer_all(&[Ok(SoaAnswer::Serial(2))]);
        let mut domain = h.domain(2);
        domain.action = Action::Delete;
        h.central.put(domain.clone());

        let report = h.manager.update_domain(&ctx(), &domain).await.unwrap();

        assert_eq!(report.state, CycleState::Abandoned);
        assert!(h.central.statuses().is_empty());
        assert!(h.backends[0].calls().is_empty());
        assert_eq!(h.querier.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_cycle_for_missing_domain_is_abandoned() {
        let h = Harness::new(1, 1);
        let domain = Domain::new("gone.example.", "tenant-a", h.pool.id);

        let report = h.manager.create_domain(&ctx(), &domain).await.unwrap();

        assert_eq!(report.state, CycleState::Abandoned);
        assert!(h.central.statuses().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_pool_is_an_error() {
        let h = Harness::new(1, 0);
        let domain = Domain::new("example.com.", "tenant-a", Uuid::new_v4());
        h.central.put(domain.clone());

        let err = h.manager.create_domain(&ctx(), &domain).await.unwrap_err();
        assert!(matches!(err, EngineError::Topology(_)));
    }

    #[tokio::test]
    async fn test_delete_confirms_absence_and_clears_cache() {
        let h = Harness::new(2, 1);
        h.answer_all(&[Ok(SoaAnswer::Serial(4))]);
        let mut domain = h.domain(4);
        h.manager.create_domain(&ctx(), &domain).await.unwrap();
        assert_eq!(h.cache.len(), 2);

        domain.action = Action::Delete;
        h.central.put(domain.clone());
        h.querier.script(h.ns(0), vec![Ok(SoaAnswer::Serial(4)), Ok(SoaAnswer::Absent)]);
        h.querier.script(h.ns(1), vec![Ok(SoaAnswer::Absent)]);

        let report = h.manager.delete_domain(&ctx(), &domain).await.unwrap();

        assert!(report.is_converged());
        assert_eq!(
            h.central.statuses().last(),
            Some(&(domain.id, ReportedStatus::Success, 4))
        );
        assert!(h.backends[0].zones().is_empty());
        assert!(h.cache.is_empty());
    }

    #[tokio::test]
    async fn test_sync_polls_without_backend_calls() {
        let h = Harness::new(2, 2);
        h.answer_all(&[Ok(SoaAnswer::Serial(12))]);
        let domain = h.domain(12);

        let report = h.manager.sync_domain(&ctx(), &domain).await.unwrap();

        assert_eq!(report.action, ZoneAction::Create);
        assert!(report.targets.is_empty());
        assert!(report.is_converged());
        assert!(h.backends.iter().all(|b| b.calls().is_empty()));
    }

    #[tokio::test]
    async fn test_sync_domains_repolls_everything() {
        let h = Harness::new(1, 0);
        h.answer_all(&[Ok(SoaAnswer::Serial(1))]);
        for name in ["a.example.", "b.example.", "c.example."] {
            let mut domain = Domain::new(name, "tenant-a", h.pool.id);
            domain.serial = 1;
            h.central.put(domain);
        }

        let reports = h.manager.sync_domains(&ctx()).await.unwrap();

        assert_eq!(reports.len(), 3);
        assert_eq!(h.central.statuses().len(), 3);
    }

    #[tokio::test]
    async fn test_record_change_runs_zone_update() {
        let h = Harness::new(1, 1);
        h.answer_all(&[Ok(SoaAnswer::Serial(8))]);
        let domain = h.domain(8);
        let recordset = RecordSet::new(domain.id, "www.example.com.", "A");
        let record = Record::new(&recordset, "192.0.2.1");

        let report = h
            .manager
            .create_record(&ctx(), &domain, &record)
            .await
            .unwrap();

        assert_eq!(report.action, ZoneAction::Update);
        assert_eq!(
            h.backends[0].calls(),
            vec![(ZoneAction::Update, "example.com.".to_string())]
        );
    }

    #[tokio::test]
    async fn test_trigger_xfr_adopts_newest_master_serial() {
        let h = Harness::new(1, 1);
        let master_a: SocketAddr = "127.0.0.1:21001".parse().unwrap();
        let master_b: SocketAddr = "127.0.0.1:21002".parse().unwrap();
        h.querier.script(master_a, vec![Ok(SoaAnswer::Serial(12))]);
        h.querier.script(master_b, vec![Ok(SoaAnswer::Serial(15))]);
        h.answer_all(&[Ok(SoaAnswer::Serial(15))]);

        let mut domain = h.domain(10);
        domain.zone_type = ZoneType::Secondary;
        domain.masters = vec![Master::new("127.0.0.1", 21001), Master::new("127.0.0.1", 21002)];
        h.central.put(domain.clone());

        let report = h.manager.trigger_xfr(&ctx(), domain.id).await.unwrap();

        assert_eq!(*h.central.transfers.lock().unwrap(), vec![(domain.id, 15)]);
        assert_eq!(report.serial, 15);
        assert!(report.is_converged());
    }

    #[tokio::test]
    async fn test_trigger_xfr_keeps_serial_when_masters_are_not_newer() {
        let h = Harness::new(1, 0);
        let master: SocketAddr = "127.0.0.1:21003".parse().unwrap();
        h.querier.script(master, vec![Ok(SoaAnswer::Serial(9))]);
        h.answer_all(&[Ok(SoaAnswer::Serial(10))]);
        let mut domain = h.domain(10);
        domain.zone_type = ZoneType::Secondary;
        domain.masters = vec![Master::new("127.0.0.1", 21003)];
        h.central.put(domain.clone());

        let report = h.manager.trigger_xfr(&ctx(), domain.id).await.unwrap();

        assert!(h.central.transfers.lock().unwrap().is_empty());
        assert_eq!(report.serial, 10);
    }

    #[tokio::test]
    async fn test_trigger_xfr_rejects_primary_zone() {
        let h = Harness::new(1, 0);
        let domain = h.domain(1);

        let err = h.manager.trigger_xfr(&ctx(), domain.id).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidOperation(_)));
    }

    #[tokio::test]
    async fn test_run_loop_handles_events_until_channel_closes() {
        let h = Harness::new(1, 1);
        h.answer_all(&[Ok(SoaAnswer::Serial(2))]);
        let first = h.domain(2);
        let mut second = Domain::new("example.org.", "tenant-a", h.pool.id);
        second.serial = 2;
        h.central.put(second.clone());

        let (tx, rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let runner = tokio::spawn(Arc::clone(&h.manager).run(rx, shutdown_rx));
        for domain in [first, second] {
            tx.send(ZoneEvent::Domain {
                ctx: ctx(),
                action: ZoneAction::Create,
                domain,
            })
            .await
            .unwrap();
        }
        drop(tx);
        runner.await.unwrap();

        assert_eq!(h.central.statuses().len(), 2);
        assert_eq!(h.backends[0].zones().len(), 2);
    }

    #[tokio::test]
    async fn test_run_loop_stops_on_shutdown() {
        let h = Harness::new(1, 0);
        let (_tx, rx) = mpsc::channel::<ZoneEvent>(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let runner = tokio::spawn(Arc::clone(&h.manager).run(rx, shutdown_rx));

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), runner)
            .await
            .expect("event loop should stop on shutdown")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cache_entry_is_versioned_per_poll() {
        let h = Harness::new(1, 0);
        h.querier.script(
            h.ns(0),
            vec![Ok(SoaAnswer::Serial(1)), Ok(SoaAnswer::Serial(2))],
        );
        let domain = h.domain(2);

        h.manager.update_domain(&ctx(), &domain).await.unwrap();

        let key = CacheKey {
            nameserver_id: h.pool.nameservers[0].id,
            zone_id: domain.id,
            action: ZoneAction::Update,
        };
        let entry = h.cache.retrieve(&ctx(), key).await.unwrap();
        assert_eq!(entry.status, PollStatus::Success);
        assert_eq!(entry.serial_number, 2);
        assert_eq!(entry.version, 2);
        assert!(matches!(
            h.cache
                .retrieve(
                    &ctx(),
                    CacheKey {
                        action: ZoneAction::Delete,
                        ..key
                    }
                )
                .await,
            Err(CacheError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_cycles_for_same_domain_do_not_overlap() {
        let querier = Arc::new(SlowQuerier::default());
        querier.delay("example.com.", Duration::from_millis(50));
        let (manager, central, pool) = bare_manager(
            Arc::clone(&querier) as Arc<dyn DnsQuerier>,
            Arc::new(MemoryCache::new()),
            4,
        );
        let domain = put_domain(&central, &pool, "example.com.");

        let (create_ctx, update_ctx) = (ctx(), ctx());
        let (created, updated) = tokio::join!(
            manager.create_domain(&create_ctx, &domain),
            manager.update_domain(&update_ctx, &domain)
        );

        assert!(created.unwrap().is_converged());
        assert!(updated.unwrap().is_converged());
        assert_eq!(querier.zone_peak("example.com."), 1);
        assert_eq!(central.statuses().len(), 2);
    }

    #[tokio::test]
    async fn test_worker_pool_bounds_concurrent_cycles() {
        let querier = Arc::new(SlowQuerier::default());
        let (manager, central, pool) = bare_manager(
            Arc::clone(&querier) as Arc<dyn DnsQuerier>,
            Arc::new(MemoryCache::new()),
            2,
        );
        let domains: Vec<Domain> = (0..6)
            .map(|n| put_domain(&central, &pool, &format!("zone{n}.example.")))
            .collect();

        let ctxs: Vec<RequestContext> = domains.iter().map(|_| ctx()).collect();
        let reports = futures::future::join_all(
            domains.iter().zip(&ctxs).map(|(d, c)| manager.update_domain(c, d)),
        )
        .await;

        assert!(reports.into_iter().all(|r| r.unwrap().is_converged()));
        assert!(querier.peak() <= 2, "peak was {}", querier.peak());
        assert_eq!(querier.peak(), 2);
    }

    #[tokio::test]
    async fn test_busy_domain_does_not_starve_other_domains() {
        let querier = Arc::new(SlowQuerier::default());
        querier.delay("busy.example.", Duration::from_millis(300));
        querier.delay("quiet.example.", Duration::ZERO);
        let (manager, central, pool) = bare_manager(
            Arc::clone(&querier) as Arc<dyn DnsQuerier>,
            Arc::new(MemoryCache::new()),
            2,
        );
        let busy = put_domain(&central, &pool, "busy.example.");
        let quiet = put_domain(&central, &pool, "quiet.example.");

        let queued: Vec<_> = (0..3)
            .map(|_| {
                let manager = Arc::clone(&manager);
                let busy = busy.clone();
                tokio::spawn(async move { manager.update_domain(&ctx(), &busy).await })
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let started = Instant::now();
        let report = manager.update_domain(&ctx(), &quiet).await.unwrap();
        let waited = started.elapsed();

        assert!(report.is_converged());
        assert!(
            waited < Duration::from_millis(200),
            "quiet domain waited {waited:?} behind cycles of another domain"
        );
        for handle in queued {
            assert!(handle.await.unwrap().unwrap().is_converged());
        }
    }

    #[tokio::test]
    async fn test_poll_reads_cache_once_per_write() {
        let cache = Arc::new(CountingCache::default());
        let (manager, central, pool) = bare_manager(
            Arc::new(SlowQuerier::default()),
            Arc::clone(&cache) as Arc<dyn PoolManagerCache>,
            1,
        );
        let domain = put_domain(&central, &pool, "example.com.");

        let report = manager.update_domain(&ctx(), &domain).await.unwrap();

        assert!(report.is_converged());
        assert_eq!(cache.reads.load(Ordering::SeqCst), 1);
        let entry = cache
            .inner
            .retrieve(
                &ctx(),
                CacheKey {
                    nameserver_id: pool.nameservers[0].id,
                    zone_id: domain.id,
                    action: ZoneAction::Update,
                },
            )
            .await
            .unwrap();
        assert_eq!(entry.status, PollStatus::Success);
        assert_eq!(entry.serial_number, 10);
    }
}
