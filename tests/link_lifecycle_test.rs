// Integration tests for the Link aggregate's validity/recycle-bin lifecycle
// and the visit-statistics value objects, exercised through the crate's
// public `domain` API.

#[cfg(test)]
mod link_lifecycle_tests {
    use chrono::{Duration, Utc};
    use shortlink::domain::{CreateType, Link, Status, ValidDate, ValidType};

    fn sample_link() -> Link {
        Link {
            id: 1,
            gid: "default".to_string(),
            short_uri: "abc123".to_string(),
            original_url: "https://example.com/article".to_string(),
            status: Status::Active,
            create_type: CreateType::Api,
            valid_date: ValidDate::new(ValidType::Permanent, Utc::now(), None).unwrap(),
            favicon: None,
            desc: None,
            tenant_id: None,
            recycle_time: None,
        }
    }

    #[test]
    fn permanent_link_is_always_active() {
        let link = sample_link();
        assert!(link.is_active());
        assert_eq!(
            link.full_short_url("s.example.com", true),
            "https://s.example.com/abc123"
        );
    }

    #[test]
    fn temporary_link_expires_after_end_date() {
        let mut link = sample_link();
        let start = Utc::now() - Duration::days(2);
        let end = Utc::now() - Duration::hours(1);
        link.valid_date = ValidDate::new(ValidType::Temporary, start, Some(end)).unwrap();
        assert!(!link.is_active());
    }

    #[test]
    fn recycle_bin_round_trip_clears_and_restores_recycle_time() {
        let mut link = sample_link();
        assert!(link.recycle_time.is_none());

        link.save_to_recycle_bin();
        assert!(link.recycle_time.is_some());

        link.recover_from_recycle_bin();
        assert!(link.recycle_time.is_none());
    }

    #[test]
    fn apply_update_only_touches_provided_fields() {
        let mut link = sample_link();
        let original_gid = link.gid.clone();

        link.apply_update(None, Some("https://example.com/new".to_string()), None, None, None, None)
            .unwrap();

        assert_eq!(link.gid, original_gid);
        assert_eq!(link.original_url, "https://example.com/new");
    }

    #[test]
    fn invalid_temporary_window_is_rejected() {
        let start = Utc::now();
        let end = start - Duration::hours(1);
        assert!(ValidDate::new(ValidType::Temporary, start, Some(end)).is_err());
    }
}
