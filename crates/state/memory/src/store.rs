use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use tokio::time::Instant;

use tally_state::error::StateError;
use tally_state::key::{KeyKind, StateKey};
use tally_state::store::{CasResult, StateStore, Versioned};

/// A single record in the in-memory store.
#[derive(Debug, Clone)]
struct Record {
    value: String,
    version: u64,
    expires_at: Option<Instant>,
}

impl Record {
    fn fresh(value: &str, ttl: Option<Duration>) -> Self {
        Self {
            value: value.to_owned(),
            version: 1,
            expires_at: expiry_from_ttl(ttl),
        }
    }

    /// Returns `true` if this record has passed its TTL deadline.
    fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|deadline| Instant::now() >= deadline)
    }
}

fn expiry_from_ttl(ttl: Option<Duration>) -> Option<Instant> {
    ttl.map(|d| Instant::now() + d)
}

/// In-memory [`StateStore`] backed by a [`DashMap`].
///
/// Every mutation goes through the map's entry API, which holds the shard
/// lock for the key, so each operation is atomic per key. Expired records
/// are evicted lazily when touched.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    data: DashMap<String, Record>,
}

impl MemoryStateStore {
    /// Create a new, empty in-memory state store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live records, for diagnostics and tests.
    pub fn len(&self) -> usize {
        self.data.iter().filter(|r| !r.is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a live record, evicting it if expired.
    fn live(&self, rendered: &str) -> Option<Record> {
        let record = self.data.get(rendered)?;
        if record.is_expired() {
            drop(record);
            self.data.remove_if(rendered, |_, r| r.is_expired());
            return None;
        }
        Some(record.clone())
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn check_and_set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StateError> {
        match self.data.entry(key.canonical()) {
            MapEntry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(Record::fresh(value, ttl));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(Record::fresh(value, ttl));
                Ok(true)
            }
        }
    }

    async fn get(&self, key: &StateKey) -> Result<Option<String>, StateError> {
        Ok(self.live(&key.canonical()).map(|r| r.value))
    }

    async fn get_versioned(&self, key: &StateKey) -> Result<Option<Versioned>, StateError> {
        Ok(self.live(&key.canonical()).map(|r| Versioned {
            value: r.value,
            version: r.version,
        }))
    }

    async fn set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StateError> {
        let expires_at = expiry_from_ttl(ttl);
        self.data
            .entry(key.canonical())
            .and_modify(|record| {
                if record.is_expired() {
                    record.version = 0;
                }
                value.clone_into(&mut record.value);
                record.version += 1;
                record.expires_at = expires_at;
            })
            .or_insert_with(|| Record::fresh(value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &StateKey) -> Result<bool, StateError> {
        match self.data.remove(&key.canonical()) {
            Some((_, record)) => Ok(!record.is_expired()),
            None => Ok(false),
        }
    }

    async fn increment(
        &self,
        key: &StateKey,
        delta: i64,
        ttl: Option<Duration>,
    ) -> Result<i64, StateError> {
        let mut record = self
            .data
            .entry(key.canonical())
            .or_insert_with(|| Record::fresh("0", ttl));
        if record.is_expired() {
            *record = Record::fresh("0", ttl);
        }

        let current: i64 = record
            .value
            .parse()
            .map_err(|e: std::num::ParseIntError| {
                StateError::Serialization(format!("counter value is not an integer: {e}"))
            })?;

        let next = current + delta;
        record.value = next.to_string();
        record.version += 1;
        if let Some(deadline) = expiry_from_ttl(ttl) {
            record.expires_at = Some(deadline);
        }
        Ok(next)
    }

    async fn compare_and_swap(
        &self,
        key: &StateKey,
        expected_version: u64,
        new_value: &str,
        ttl: Option<Duration>,
    ) -> Result<CasResult, StateError> {
        match self.data.entry(key.canonical()) {
            MapEntry::Occupied(mut occupied) if !occupied.get().is_expired() => {
                let record = occupied.get_mut();
                if record.version != expected_version {
                    return Ok(CasResult::Conflict {
                        current_value: Some(record.value.clone()),
                        current_version: record.version,
                    });
                }
                new_value.clone_into(&mut record.value);
                record.version += 1;
                record.expires_at = expiry_from_ttl(ttl).or(record.expires_at);
                Ok(CasResult::Ok)
            }
            // Absent or expired: only a create (version 0) may proceed.
            MapEntry::Occupied(mut occupied) => {
                if expected_version != 0 {
                    occupied.remove();
                    return Ok(CasResult::Conflict {
                        current_value: None,
                        current_version: 0,
                    });
                }
                occupied.insert(Record::fresh(new_value, ttl));
                Ok(CasResult::Ok)
            }
            MapEntry::Vacant(vacant) => {
                if expected_version != 0 {
                    return Ok(CasResult::Conflict {
                        current_value: None,
                        current_version: 0,
                    });
                }
                vacant.insert(Record::fresh(new_value, ttl));
                Ok(CasResult::Ok)
            }
        }
    }

    async fn scan_keys(
        &self,
        namespace: &str,
        tenant: &str,
        kind: KeyKind,
        prefix: Option<&str>,
    ) -> Result<Vec<(String, String)>, StateError> {
        let pattern = format!("{namespace}:{tenant}:{kind}:{}", prefix.unwrap_or(""));
        Ok(self
            .data
            .iter()
            .filter(|r| r.key().starts_with(&pattern) && !r.value().is_expired())
            .map(|r| (r.key().clone(), r.value().value.clone()))
            .collect())
    }
}
