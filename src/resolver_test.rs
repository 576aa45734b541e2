// Unit tests for value resolution and the persisted intent store

use pretty_assertions::assert_eq;

use super::*;
use crate::locator::{FieldSpec, LocatorStrategy};
use crate::page::ControlKind;

fn site() -> SiteProfile {
    let spec = |name: &str| {
        FieldSpec::new(
            name,
            ControlKind::Text,
            vec![LocatorStrategy::id(name)],
        )
    };
    SiteProfile::new(
        "portal.example.in",
        "Example Portal",
        vec![spec("mobile"), spec("consumer_number"), spec("email")],
    )
}

#[test]
fn test_precedence_override_beats_cache_beats_profile() {
    let profile = ProfileData::from_pairs(&[
        ("mobile", "1111111111"),
        ("consumer_number", "CN-PROFILE"),
        ("email", "profile@example.in"),
    ]);
    let cache = CachedSubmission::new(
        "name_change",
        &[("mobile", "2222222222"), ("consumer_number", "CN-CACHE")],
    );
    let overrides = HashMap::from([("mobile".to_string(), "3333333333".to_string())]);

    let resolution = resolve(&site(), Some(&profile), Some(&cache), &overrides).unwrap();
    let values = &resolution.values;

    assert_eq!(values.value_of("mobile"), Some("3333333333"));
    assert_eq!(values.get("mobile").unwrap().source, ValueSource::Override);

    assert_eq!(values.value_of("consumer_number"), Some("CN-CACHE"));
    assert_eq!(
        values.get("consumer_number").unwrap().source,
        ValueSource::Cache
    );

    assert_eq!(values.value_of("email"), Some("profile@example.in"));
    assert_eq!(values.get("email").unwrap().source, ValueSource::Profile);
    assert!(!resolution.cache_purged);
}

#[test]
fn test_stale_cache_is_excluded_and_flagged() {
    let profile = ProfileData::from_pairs(&[("mobile", "1111111111")]);
    let mut cache = CachedSubmission::new("name_change", &[("mobile", "2222222222")]);
    cache.created_at = Utc::now() - chrono::Duration::minutes(6);

    let resolution = resolve(&site(), Some(&profile), Some(&cache), &HashMap::new()).unwrap();

    assert!(resolution.cache_purged);
    assert_eq!(resolution.values.value_of("mobile"), Some("1111111111"));
}

#[test]
fn test_no_sources_is_no_data_available() {
    let err = resolve(&site(), None, None, &HashMap::new()).unwrap_err();
    assert!(matches!(err, AutofillError::NoDataAvailable));
}

#[test]
fn test_stale_cache_alone_is_no_data_available() {
    let mut cache = CachedSubmission::new("name_change", &[("mobile", "2222222222")]);
    cache.created_at = Utc::now() - chrono::Duration::minutes(6);

    let err = resolve(&site(), None, Some(&cache), &HashMap::new()).unwrap_err();
    assert!(matches!(err, AutofillError::NoDataAvailable));
}

#[test]
fn test_map_is_restricted_to_declared_fields() {
    let profile = ProfileData::from_pairs(&[
        ("mobile", "1111111111"),
        ("aadhaar", "0000-0000-0000"),
        ("pan", "ABCDE1234F"),
    ]);

    let resolution = resolve(&site(), Some(&profile), None, &HashMap::new()).unwrap();

    assert_eq!(resolution.values.len(), 1);
    assert!(resolution.values.get("aadhaar").is_none());
    assert!(resolution.values.get("pan").is_none());
}

#[test]
fn test_empty_values_never_enter_the_map() {
    let profile = ProfileData::from_pairs(&[("mobile", ""), ("email", "user@example.in")]);

    let resolution = resolve(&site(), Some(&profile), None, &HashMap::new()).unwrap();

    // Absent means "skip"; an empty string would clobber the control.
    assert!(resolution.values.get("mobile").is_none());
    assert_eq!(resolution.values.len(), 1);
}

#[test]
fn test_as_form_data_flattens_sources() {
    let profile = ProfileData::from_pairs(&[("mobile", "1111111111")]);
    let resolution = resolve(&site(), Some(&profile), None, &HashMap::new()).unwrap();

    let form_data = resolution.values.as_form_data();
    assert_eq!(form_data.get("mobile").map(String::as_str), Some("1111111111"));
}

#[test]
fn test_freshness_boundary() {
    let record = CachedSubmission::new("name_change", &[("mobile", "1")]);
    let created = record.created_at;

    assert!(record.is_fresh(created + chrono::Duration::minutes(4)));
    assert!(record.is_fresh(created + freshness_window()));
    assert!(!record.is_fresh(created + freshness_window() + chrono::Duration::seconds(1)));
}

#[test]
fn test_intent_store_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = IntentStore::at(dir.path().to_path_buf()).unwrap();

    assert!(store.load("name_change").unwrap().is_none());

    let record = CachedSubmission::new("name_change", &[("mobile", "9876543210")]);
    store.save(&record).unwrap();

    let loaded = store.load_fresh("name_change").unwrap().unwrap();
    assert_eq!(loaded.values.get("mobile").map(String::as_str), Some("9876543210"));
    assert_eq!(loaded.service, "name_change");
}

#[test]
fn test_intent_store_purges_expired_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let store = IntentStore::at(dir.path().to_path_buf()).unwrap();

    let mut record = CachedSubmission::new("name_change", &[("mobile", "9876543210")]);
    record.created_at = Utc::now() - chrono::Duration::minutes(10);
    store.save(&record).unwrap();

    assert!(store.load_fresh("name_change").unwrap().is_none());
    // The expired record is gone from disk too, not just filtered.
    assert!(store.load("name_change").unwrap().is_none());
}

#[test]
fn test_record_path_sanitizes_service_names() {
    let dir = tempfile::tempdir().unwrap();
    let store = IntentStore::at(dir.path().to_path_buf()).unwrap();

    let record = CachedSubmission::new("../escape/attempt", &[("mobile", "1")]);
    store.save(&record).unwrap();

    // Exactly one file, inside the store directory.
    let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(entries.len(), 1);
    assert!(store.load("../escape/attempt").unwrap().is_some());
}
