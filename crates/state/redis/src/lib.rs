//! Redis state backend for Tally.
//!
//! Every record is a Redis hash with two fields, `v` (the value) and `ver`
//! (a version that starts at 1 and increases on every write). All mutating
//! operations run as Lua scripts, so each is atomic on the server and the
//! ledgers' compare-and-swap loops never lose an update.
//!
//! A single Redis primary is assumed. During a Sentinel or Cluster failover
//! acknowledged writes can be lost, which breaks the ledger guarantees for
//! the affected keys.
//!
//! # Example
//!
//! ```ignore
//! use tally_state_redis::{RedisConfig, RedisStateStore};
//!
//! let config = RedisConfig::new("redis://localhost:6379");
//! let store = RedisStateStore::new(&config)?;
//! ```

mod config;
mod key_render;
mod scripts;
mod store;

pub use config::RedisConfig;
pub use store::RedisStateStore;
