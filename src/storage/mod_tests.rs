// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `storage/mod.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::model::{Action, Domain, Record, RecordSet, Status};
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    #[test]
    fn test_empty_criteria_matches_everything() {
        let domain = Domain::new("example.com.", "tenant-a", Uuid::new_v4());
        assert!(DomainCriteria::all().matches(&domain));
    }

    #[test]
    fn test_domain_criteria_combines_fields() {
        let pool_id = Uuid::new_v4();
        let mut domain = Domain::new("example.com.", "tenant-a", pool_id);
        domain.updated_at = Utc::now() - Duration::minutes(10);

        let stale_pending = DomainCriteria::all()
            .with_status(Status::Pending)
            .updated_before(Utc::now() - Duration::minutes(5));
        assert!(stale_pending.matches(&domain));

        let fresh_only = DomainCriteria::all().updated_before(Utc::now() - Duration::hours(1));
        assert!(!fresh_only.matches(&domain));

        assert!(DomainCriteria::all().with_pool(pool_id).matches(&domain));
        assert!(!DomainCriteria::all().with_tenant("tenant-b").matches(&domain));
        assert!(DomainCriteria::all().with_name("example.com.").matches(&domain));
    }

    #[test]
    fn test_record_criteria() {
        let rs = RecordSet::new(Uuid::new_v4(), "www.example.com.", "A");
        let record = Record::new(&rs, "192.0.2.1");

        assert!(RecordCriteria::for_domain(rs.domain_id).matches(&record));
        assert!(RecordCriteria::for_recordset(rs.id).matches(&record));
        assert!(!RecordCriteria::for_domain(Uuid::new_v4()).matches(&record));

        let deletes = RecordCriteria {
            action: Some(Action::Delete),
            ..RecordCriteria::default()
        };
        assert!(!deletes.matches(&record));
    }

    #[test]
    fn test_change_set_keeps_order() {
        let domain = Domain::new("example.com.", "tenant-a", Uuid::new_v4());
        let mut changes = ChangeSet::new();
        assert!(changes.is_empty());

        changes.create_domain(domain.clone());
        changes.delete_domain(&domain);
        assert_eq!(changes.len(), 2);

        let changes = changes.into_changes();
        assert!(matches!(changes[0], Change::CreateDomain(_)));
        assert!(matches!(changes[1], Change::DeleteDomain { version: 0, .. }));
    }
}
