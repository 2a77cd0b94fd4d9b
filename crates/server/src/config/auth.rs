use std::collections::HashMap;

use serde::Deserialize;

/// Bearer credential verification.
///
/// With `enabled = false` the tenant is read from the `x-tenant-id` header,
/// which is only suitable behind a trusted proxy or in development.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub enabled: bool,
    /// HS256 secret for tokens whose `sub` claim is the tenant.
    pub jwt_secret: Option<String>,
    /// Static bearer tokens mapped to the tenant they authenticate.
    pub tokens: HashMap<String, String>,
}
