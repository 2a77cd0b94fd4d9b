use std::sync::Arc;

use tally_state::StateStore;
use tally_state_memory::MemoryStateStore;
#[cfg(feature = "redis")]
use tally_state_redis::{RedisConfig, RedisStateStore};

use crate::config::StateConfig;
use crate::error::ServerError;

/// Construct the ledger `StateStore` from configuration.
pub fn create_state(config: &StateConfig) -> Result<Arc<dyn StateStore>, ServerError> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryStateStore::new())),
        #[cfg(feature = "redis")]
        "redis" => create_redis(config),
        other => Err(ServerError::Config(format!(
            "unsupported state backend: {other} (is the feature enabled?)"
        ))),
    }
}

#[cfg(feature = "redis")]
fn create_redis(config: &StateConfig) -> Result<Arc<dyn StateStore>, ServerError> {
    let mut redis_config = RedisConfig::new(
        config
            .url
            .as_deref()
            .unwrap_or("redis://127.0.0.1:6379"),
    );
    if let Some(prefix) = &config.prefix {
        redis_config.prefix.clone_from(prefix);
    }
    let store = RedisStateStore::new(&redis_config)
        .map_err(|e| ServerError::Config(format!("redis store: {e}")))?;
    Ok(Arc::new(store))
}
