// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `pool.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::model::{Pool, PoolServer};
    use crate::errors::TopologyError;
    use crate::storage::{MemoryStorage, Storage};
    use std::sync::Arc;
    use uuid::Uuid;

    fn pool_with(nameservers: usize) -> Pool {
        Pool {
            id: Uuid::new_v4(),
            name: "default".to_string(),
            description: None,
            nameservers: (0..nameservers)
                .map(|i| PoolServer {
                    id: Uuid::new_v4(),
                    host: format!("192.0.2.{}", i + 1),
                    port: 53,
                })
                .collect(),
            targets: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_config_topology_lookup() {
        let pool = pool_with(2);
        let topology = ConfigTopology::new([pool.clone()]);

        assert_eq!(topology.get_pool(pool.id).await.unwrap(), pool);

        let missing = Uuid::new_v4();
        assert_eq!(
            topology.get_pool(missing).await.unwrap_err(),
            TopologyError::PoolNotFound { pool_id: missing }
        );
    }

    #[tokio::test]
    async fn test_snapshot_is_unaffected_by_later_edits() {
        let pool = pool_with(2);
        let topology = ConfigTopology::new([pool.clone()]);
        let snapshot = topology.get_pool(pool.id).await.unwrap();

        let mut grown = pool.clone();
        grown.nameservers.push(PoolServer {
            id: Uuid::new_v4(),
            host: "192.0.2.99".to_string(),
            port: 53,
        });
        topology.put(grown);

        assert_eq!(snapshot.nameservers.len(), 2);
        assert_eq!(topology.get_pool(pool.id).await.unwrap().nameservers.len(), 3);
        assert_eq!(topology.pool_ids(), vec![pool.id]);
    }

    #[tokio::test]
    async fn test_storage_topology_lookup() {
        let pool = pool_with(1);
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::with_pools([pool.clone()]));
        let topology = StorageTopology::new(storage);

        assert_eq!(topology.get_pool(pool.id).await.unwrap(), pool);
        assert!(matches!(
            topology.get_pool(Uuid::new_v4()).await,
            Err(TopologyError::PoolNotFound { .. })
        ));
    }
}
