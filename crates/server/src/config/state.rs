use std::path::PathBuf;

use serde::Deserialize;

/// Configuration for the ledger state backend.
#[derive(Debug, Deserialize)]
pub struct StateConfig {
    /// Which backend to use: `"memory"` or `"redis"`.
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Connection URL for the backend (e.g. `redis://localhost:6379`).
    pub url: Option<String>,

    /// Key prefix for backends that support it. Defaults to `"tally"`.
    pub prefix: Option<String>,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            url: None,
            prefix: None,
        }
    }
}

/// Where file bytes live.
#[derive(Debug, Deserialize)]
pub struct BlobConfig {
    /// `"memory"` or `"filesystem"`.
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Root directory for the filesystem backend.
    pub root: Option<PathBuf>,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            root: None,
        }
    }
}

fn default_backend() -> String {
    "memory".to_owned()
}
