use std::time::Duration;

use crate::error::StateError;
use crate::key::{KeyKind, StateKey};
use crate::store::{CasResult, StateStore};

fn test_key(kind: KeyKind, id: &str) -> StateKey {
    StateKey::new("test-ns", "test-tenant", kind, id)
}

/// Run the full state store conformance test suite.
///
/// Call this from your backend's test module with a fresh store instance.
///
/// # Errors
///
/// Returns an error if any conformance test fails.
pub async fn run_store_conformance_tests(store: &dyn StateStore) -> Result<(), StateError> {
    test_get_missing(store).await?;
    test_set_and_get(store).await?;
    test_check_and_set_new(store).await?;
    test_check_and_set_existing(store).await?;
    test_delete(store).await?;
    test_increment(store).await?;
    test_compare_and_swap(store).await?;
    test_cas_create_only(store).await?;
    test_versions_advance(store).await?;
    test_concurrent_cas_loses_nothing(store).await?;
    test_scan_keys(store).await?;
    test_ttl_set(store).await?;
    Ok(())
}

async fn test_get_missing(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::StorageLedger, "missing");
    assert!(store.get(&key).await?.is_none(), "get on missing key should return None");
    assert!(store.get_versioned(&key).await?.is_none());
    Ok(())
}

async fn test_set_and_get(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::StorageLedger, "set-get");
    store.set(&key, "hello", None).await?;
    let val = store.get(&key).await?;
    assert_eq!(val.as_deref(), Some("hello"));
    Ok(())
}

async fn test_check_and_set_new(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Alert, "cas-new");
    let created = store.check_and_set(&key, "v1", None).await?;
    assert!(created, "check_and_set on new key should return true");
    let val = store.get_versioned(&key).await?.expect("value present");
    assert_eq!(val.value, "v1");
    assert_eq!(val.version, 1, "inserted record starts at version 1");
    Ok(())
}

async fn test_check_and_set_existing(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Alert, "cas-existing");
    store.set(&key, "v1", None).await?;
    let created = store.check_and_set(&key, "v2", None).await?;
    assert!(
        !created,
        "check_and_set on existing key should return false"
    );
    let val = store.get(&key).await?;
    assert_eq!(val.as_deref(), Some("v1"), "original value should remain");
    Ok(())
}

async fn test_delete(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::StorageLedger, "to-delete");
    store.set(&key, "bye", None).await?;
    let existed = store.delete(&key).await?;
    assert!(existed, "delete should return true for existing key");
    let val = store.get(&key).await?;
    assert!(val.is_none(), "get after delete should return None");

    let existed = store.delete(&key).await?;
    assert!(!existed, "delete on missing key should return false");
    Ok(())
}

async fn test_increment(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Custom("counter".into()), "counter-1");
    let val = store.increment(&key, 1, None).await?;
    assert_eq!(val, 1, "first increment from zero should yield 1");

    let val = store.increment(&key, 5, None).await?;
    assert_eq!(val, 6, "second increment should accumulate");

    let val = store.increment(&key, -2, None).await?;
    assert_eq!(val, 4, "negative delta should decrement");
    Ok(())
}

async fn test_compare_and_swap(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::DailyUsage, "cas-version");

    store.set(&key, "initial", None).await?;

    let result = store.compare_and_swap(&key, 999, "updated", None).await?;
    assert!(
        matches!(result, CasResult::Conflict { current_version: 1, .. }),
        "CAS with wrong version should conflict and report the live version"
    );

    let result = store.compare_and_swap(&key, 1, "updated", None).await?;
    assert_eq!(
        result,
        CasResult::Ok,
        "CAS with correct version should succeed"
    );

    let val = store.get(&key).await?;
    assert_eq!(val.as_deref(), Some("updated"));
    Ok(())
}

async fn test_cas_create_only(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::AlertMarker, "cas-create");

    let result = store.compare_and_swap(&key, 0, "first", None).await?;
    assert_eq!(result, CasResult::Ok, "version 0 should create a missing key");

    let result = store.compare_and_swap(&key, 0, "second", None).await?;
    assert!(
        matches!(result, CasResult::Conflict { .. }),
        "version 0 should conflict once the key exists"
    );
    assert_eq!(store.get(&key).await?.as_deref(), Some("first"));
    Ok(())
}

async fn test_versions_advance(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::DailyUsage, "versions");
    store.set(&key, "a", None).await?;
    store.set(&key, "b", None).await?;
    let v = store.get_versioned(&key).await?.expect("value present");
    assert_eq!(v.version, 2);

    store.compare_and_swap(&key, 2, "c", None).await?;
    let v = store.get_versioned(&key).await?.expect("value present");
    assert_eq!((v.value.as_str(), v.version), ("c", 3));
    Ok(())
}

async fn cas_add(store: &dyn StateStore, key: &StateKey, delta: i64) -> Result<(), StateError> {
    loop {
        let (current, version) = match store.get_versioned(key).await? {
            Some(v) => (v.value.parse::<i64>().unwrap_or(0), v.version),
            None => (0, 0),
        };
        let next = (current + delta).to_string();
        if store.compare_and_swap(key, version, &next, None).await? == CasResult::Ok {
            return Ok(());
        }
        tokio::task::yield_now().await;
    }
}

async fn test_concurrent_cas_loses_nothing(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::DailyUsage, "concurrent");
    let worker = |delta: i64| {
        let key = &key;
        async move {
            for _ in 0..10 {
                cas_add(store, key, delta).await?;
            }
            Ok::<(), StateError>(())
        }
    };
    let (a, b, c, d) = tokio::join!(worker(1), worker(2), worker(3), worker(4));
    a?;
    b?;
    c?;
    d?;

    let val = store.get(&key).await?;
    assert_eq!(val.as_deref(), Some("100"), "no CAS update may be lost");
    Ok(())
}

async fn test_scan_keys(store: &dyn StateStore) -> Result<(), StateError> {
    let a = StateKey::new("scan-ns", "scan-tenant", KeyKind::Alert, "2024-03-01:a");
    let b = StateKey::new("scan-ns", "scan-tenant", KeyKind::Alert, "2024-03-02:b");
    let other_tenant = StateKey::new("scan-ns", "someone-else", KeyKind::Alert, "2024-03-01:c");
    let other_kind = StateKey::new("scan-ns", "scan-tenant", KeyKind::AlertMarker, "2024-03-01");
    for key in [&a, &b, &other_tenant, &other_kind] {
        store.set(key, key.id.as_str(), None).await?;
    }

    let mut all = store
        .scan_keys("scan-ns", "scan-tenant", KeyKind::Alert, None)
        .await?;
    all.sort();
    assert_eq!(all.len(), 2, "scan must be scoped to namespace, tenant and kind");
    assert_eq!(all[0].1, "2024-03-01:a");

    let day = store
        .scan_keys("scan-ns", "scan-tenant", KeyKind::Alert, Some("2024-03-02"))
        .await?;
    assert_eq!(day.len(), 1);
    assert_eq!(day[0].0, b.canonical());
    Ok(())
}

async fn test_ttl_set(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::DailyUsage, "ttl-test");
    store
        .set(&key, "ephemeral", Some(Duration::from_secs(3600)))
        .await?;
    let val = store.get(&key).await?;
    assert_eq!(val.as_deref(), Some("ephemeral"));
    Ok(())
}
