// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `locks.rs`

#[cfg(test)]
mod tests {
    use super::super::DomainLocks;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_same_domain_is_serialized() {
        let locks = Arc::new(DomainLocks::new());
        let domain_id = Uuid::new_v4();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let inside = Arc::clone(&inside);
            let max_inside = Arc::clone(&max_inside);
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock(domain_id).await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_domains_do_not_contend() {
        let locks = DomainLocks::new();
        let _a = locks.lock(Uuid::new_v4()).await;
        assert!(locks.try_lock(Uuid::new_v4()).is_some());
    }

    #[tokio::test]
    async fn test_lock_is_not_reentrant() {
        let locks = DomainLocks::new();
        let domain_id = Uuid::new_v4();
        let _held = locks.lock(domain_id).await;

        assert!(locks.try_lock(domain_id).is_none());
        let second = tokio::time::timeout(Duration::from_millis(20), locks.lock(domain_id)).await;
        assert!(second.is_err(), "second acquisition must wait");
    }

    #[tokio::test]
    async fn test_released_entries_are_pruned() {
        let locks = DomainLocks::new();
        for _ in 0..10 {
            let _guard = locks.lock(Uuid::new_v4()).await;
        }
        let _last = locks.lock(Uuid::new_v4()).await;
        assert_eq!(locks.len(), 1);
    }
}
