//! Bearer credential verification.
//!
//! Static tokens are checked first, then HS256 JWTs whose `sub` claim names
//! the tenant. The verified [`Principal`] keeps the presented token so it can
//! be forwarded to a remote admission authority.

mod middleware;

pub use middleware::{AuthLayer, AuthMiddleware, TENANT_HEADER};

use std::collections::HashMap;

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use tally_core::{Principal, TenantId};

use crate::config::AuthConfig;
use crate::error::ServerError;

/// Claims carried by tenant JWTs.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Tenant id.
    pub sub: String,
    /// Expiry (seconds since epoch).
    pub exp: usize,
}

pub struct TokenVerifier {
    decoding_key: Option<DecodingKey>,
    validation: Validation,
    tokens: HashMap<String, TenantId>,
}

impl TokenVerifier {
    pub fn new(config: &AuthConfig) -> Result<Self, ServerError> {
        let decoding_key = config
            .jwt_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| DecodingKey::from_secret(s.as_bytes()));
        if decoding_key.is_none() && config.tokens.is_empty() {
            return Err(ServerError::Config(
                "auth is enabled but neither jwt_secret nor tokens is set".into(),
            ));
        }
        let tokens = config
            .tokens
            .iter()
            .map(|(token, tenant)| (token.clone(), TenantId::new(tenant.as_str())))
            .collect();
        Ok(Self {
            decoding_key,
            validation: Validation::new(Algorithm::HS256),
            tokens,
        })
    }

    /// Resolve `token` to the tenant it authenticates.
    pub fn verify(&self, token: &str) -> Result<Principal, String> {
        if let Some(tenant) = self.tokens.get(token) {
            return Ok(Principal::new(tenant.clone()).with_credential(token));
        }
        let Some(key) = &self.decoding_key else {
            return Err("invalid token".to_owned());
        };
        let data = decode::<Claims>(token, key, &self.validation)
            .map_err(|e| format!("invalid token: {e}"))?;
        if data.claims.sub.trim().is_empty() {
            return Err("token has no subject".to_owned());
        }
        Ok(Principal::new(data.claims.sub).with_credential(token))
    }
}
