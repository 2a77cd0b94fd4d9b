//! Versioned JSON records with an optimistic update loop.
//!
//! Ledgers never read-modify-write directly: every mutation reads the
//! record with its version, applies a pure closure, and writes back with
//! compare-and-swap. A conflicting writer forces a retry against the fresh
//! value, so no increment is lost and a bound checked inside the closure is
//! enforced atomically.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use tally_core::MeteringError;
use tally_state::{CasResult, StateKey, StateStore};

use crate::metrics::MeterMetrics;

/// Upper bound on compare-and-swap attempts before giving up.
pub(crate) const MAX_CAS_ATTEMPTS: u32 = 64;

fn decode<T: DeserializeOwned>(key: &StateKey, raw: &str) -> Result<T, MeteringError> {
    serde_json::from_str(raw)
        .map_err(|e| MeteringError::Unexpected(format!("corrupt record at {key}: {e}")))
}

fn encode<T: Serialize>(value: &T) -> Result<String, MeteringError> {
    serde_json::to_string(value).map_err(|e| MeteringError::Unexpected(e.to_string()))
}

/// Read a record and its version.
pub(crate) async fn load<T: DeserializeOwned>(
    store: &dyn StateStore,
    key: &StateKey,
) -> Result<Option<(T, u64)>, MeteringError> {
    match store.get_versioned(key).await? {
        Some(v) => Ok(Some((decode(key, &v.value)?, v.version))),
        None => Ok(None),
    }
}

/// Return the record at `key`, inserting `init()` first if it is absent.
///
/// Concurrent callers racing to create converge on a single record.
pub(crate) async fn get_or_insert<T, F>(
    store: &dyn StateStore,
    key: &StateKey,
    init: F,
) -> Result<T, MeteringError>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> T,
{
    if let Some((record, _)) = load(store, key).await? {
        return Ok(record);
    }
    let fresh = init();
    if store.check_and_set(key, &encode(&fresh)?, None).await? {
        return Ok(fresh);
    }
    match load(store, key).await? {
        Some((record, _)) => Ok(record),
        None => Ok(fresh),
    }
}

/// Apply `mutate` to the record at `key` atomically.
///
/// A missing record starts from `init()`. If `mutate` returns an error the
/// stored record is left untouched and the error is returned.
pub(crate) async fn update<T, R, I, F>(
    store: &dyn StateStore,
    key: &StateKey,
    metrics: &MeterMetrics,
    init: I,
    mut mutate: F,
) -> Result<(T, R), MeteringError>
where
    T: Serialize + DeserializeOwned,
    I: Fn() -> T,
    F: FnMut(&mut T) -> Result<R, MeteringError>,
{
    for attempt in 0..MAX_CAS_ATTEMPTS {
        let (mut record, version) = match load::<T>(store, key).await? {
            Some(found) => found,
            None => (init(), 0),
        };
        let out = mutate(&mut record)?;
        match store
            .compare_and_swap(key, version, &encode(&record)?, None)
            .await?
        {
            CasResult::Ok => return Ok((record, out)),
            CasResult::Conflict {
                current_version, ..
            } => {
                metrics.increment_cas_retries();
                debug!(%key, attempt, expected = version, current_version, "record update conflicted, retrying");
                tokio::task::yield_now().await;
            }
        }
    }
    Err(MeteringError::Unexpected(format!(
        "update of {key} abandoned after {MAX_CAS_ATTEMPTS} conflicting attempts"
    )))
}
