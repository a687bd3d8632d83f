// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for error types.

#[cfg(test)]
mod tests {
    use crate::errors::*;
    use uuid::Uuid;

    #[test]
    fn test_query_timeout_error() {
        let error = QueryError::Timeout {
            server: "192.0.2.1:53".to_string(),
            zone: "example.com.".to_string(),
            timeout_ms: 3000,
        };

        assert_eq!(
            error.to_string(),
            "Query for 'example.com.' to 192.0.2.1:53 timed out after 3000ms"
        );
        assert!(error.is_timeout());
        assert!(error.is_transient());
        assert_eq!(error.reason(), "QueryTimeout");
    }

    #[test]
    fn test_bad_response_is_transient_but_not_timeout() {
        let error = QueryError::BadResponse {
            server: "192.0.2.1:53".to_string(),
            zone: "example.com.".to_string(),
            reason: "no SOA record in answer section".to_string(),
        };

        assert!(error.is_transient());
        assert!(!error.is_timeout());
        assert_eq!(error.reason(), "BadResponse");
    }

    #[test]
    fn test_not_authoritative_error() {
        let error = QueryError::NotAuthoritative {
            server: "192.0.2.1:53".to_string(),
            zone: "example.com.".to_string(),
            rcode: "No Error".to_string(),
            authoritative: false,
        };

        assert!(error.to_string().contains("aa=false"));
        assert!(error.is_transient());
    }

    #[test]
    fn test_invalid_name_is_permanent() {
        let error = QueryError::InvalidName {
            name: "bad..name".to_string(),
            reason: "empty label".to_string(),
        };
        assert!(!error.is_transient());
        assert_eq!(error.reason(), "InvalidZoneName");
    }

    #[test]
    fn test_zone_already_exists_error() {
        let error = BackendError::ZoneAlreadyExists {
            zone: "example.com.".to_string(),
            target: "bind9(10.0.0.1:8080)".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "Zone 'example.com.' already exists on target bind9(10.0.0.1:8080)"
        );
        assert!(!error.is_transient());
        assert_eq!(error.reason(), "ZoneAlreadyExists");
    }

    #[test]
    fn test_backend_unavailable_is_transient() {
        let error = BackendError::Unavailable {
            target: "bind9(10.0.0.1:8080)".to_string(),
            reason: "connection refused".to_string(),
        };
        assert!(error.is_transient());
        assert_eq!(error.reason(), "BackendUnavailable");
    }

    #[test]
    fn test_unknown_backend_type() {
        let error = BackendError::UnknownBackendType {
            backend_type: "powerdns".to_string(),
        };
        assert_eq!(error.to_string(), "Unknown backend type 'powerdns'");
        assert!(!error.is_transient());
    }

    #[test]
    fn test_cache_conflict_error() {
        let error = CacheError::Conflict {
            key: "ns/zone/CREATE".to_string(),
            expected: 1,
            actual: 2,
        };

        assert_eq!(
            error.to_string(),
            "Version conflict on ns/zone/CREATE: expected version 1, found 2"
        );
        assert!(error.is_transient());
        assert_eq!(error.reason(), "CacheConflict");
    }

    #[test]
    fn test_cache_miss_is_not_transient() {
        let error = CacheError::NotFound {
            key: "ns/zone/CREATE".to_string(),
        };
        assert!(!error.is_transient());
        assert_eq!(error.reason(), "CacheMiss");
    }

    #[test]
    fn test_storage_errors() {
        let not_found = StorageError::NotFound {
            kind: "Domain",
            id: "abc".to_string(),
        };
        assert_eq!(not_found.to_string(), "Domain abc not found");
        assert!(!not_found.is_transient());

        let conflict = StorageError::Conflict {
            kind: "Domain",
            id: "abc".to_string(),
            expected: 3,
            actual: 4,
        };
        assert!(conflict.is_transient());
        assert_eq!(conflict.reason(), "VersionConflict");
    }

    #[test]
    fn test_central_error_wraps_storage_reason() {
        let error = CentralError::from(StorageError::Duplicate {
            kind: "Domain",
            name: "example.com.".to_string(),
        });
        assert_eq!(error.reason(), "Duplicate");
        assert_eq!(error.to_string(), "Domain 'example.com.' already exists");
    }

    #[test]
    fn test_no_nameservers_error() {
        let pool_id = Uuid::nil();
        let error = CentralError::NoNameservers { pool_id };
        assert_eq!(
            error.to_string(),
            format!("Pool {pool_id} has no nameservers configured")
        );
        assert_eq!(error.reason(), "NoNameservers");
    }

    #[test]
    fn test_engine_error_from_topology() {
        let pool_id = Uuid::new_v4();
        let error = EngineError::from(TopologyError::PoolNotFound { pool_id });
        assert_eq!(error.to_string(), format!("Pool {pool_id} not found"));
    }
}
