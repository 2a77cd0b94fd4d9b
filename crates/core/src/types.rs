use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::MeteringError;

macro_rules! newtype_string {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance from a string value.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Return the inner string as a str slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;

            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

newtype_string!(
    Namespace,
    "A logical namespace separating independent metering deployments."
);
newtype_string!(
    TenantId,
    "A tenant identifier. Storage and bandwidth are metered per tenant."
);

/// Characters that would change how a store key splits into segments or
/// widen a key scan.
const RESERVED: [char; 7] = [':', '*', '?', '[', ']', '/', '\\'];

fn check_segment(what: &str, value: &str) -> Result<(), MeteringError> {
    let bad = value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(RESERVED)
        || value.chars().any(|c| c.is_control() || c.is_whitespace());
    if bad {
        return Err(MeteringError::ValidationFailed(format!(
            "invalid {what} '{}'",
            value.escape_debug()
        )));
    }
    Ok(())
}

impl Namespace {
    /// Check that the namespace can be used as a store key segment.
    pub fn validate(&self) -> Result<(), MeteringError> {
        check_segment("namespace", &self.0)
    }
}

impl TenantId {
    /// Check that the id can be used as a store key segment and a blob path
    /// component.
    pub fn validate(&self) -> Result<(), MeteringError> {
        check_segment("tenant id", &self.0)
    }
}
