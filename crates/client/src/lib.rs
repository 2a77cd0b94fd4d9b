//! Tally HTTP Client
//!
//! A native Rust client for the Tally metering service's REST API.
//!
//! # Quick Start
//!
//! ```no_run
//! use tally_client::MeteringClient;
//! use tally_core::{AdmissionRequest, Direction};
//!
//! # async fn example() -> Result<(), tally_client::Error> {
//! let client = MeteringClient::builder("http://localhost:8080")
//!     .token("eyJhbGciOi...")
//!     .build()?;
//!
//! let grant = client
//!     .authorize(&AdmissionRequest::new(12.5, Direction::Upload))
//!     .await?;
//! println!("{} MB left today", grant.remaining_mb);
//! # Ok(())
//! # }
//! ```
//!
//! A storage node that delegates admission to a remote metering authority
//! can plug [`RemoteAdmission`] into its `MeterBuilder`.

mod error;
pub mod remote;
pub mod storage;
pub mod usage;

pub use error::{Error, ErrorBody};
pub use remote::RemoteAdmission;

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;

/// Default request timeout. Admission is a blocking round-trip, so it is short.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP client for the Tally metering service.
#[derive(Debug, Clone)]
pub struct MeteringClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

/// Builder for configuring a [`MeteringClient`].
#[derive(Debug)]
pub struct MeteringClientBuilder {
    base_url: String,
    timeout: Duration,
    token: Option<String>,
    client: Option<Client>,
}

impl MeteringClientBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: DEFAULT_TIMEOUT,
            token: None,
            client: None,
        }
    }

    /// Set the request timeout. Ignored when a custom client is supplied.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Bearer token sent with every request.
    #[must_use]
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Use a custom reqwest Client.
    #[must_use]
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn build(self) -> Result<MeteringClient, Error> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(Error::Configuration(format!(
                "base url must be http(s), got '{}'",
                self.base_url
            )));
        }
        let client = match self.client {
            Some(c) => c,
            None => Client::builder()
                .timeout(self.timeout)
                .build()
                .map_err(|e| Error::Configuration(e.to_string()))?,
        };

        Ok(MeteringClient {
            client,
            base_url: self.base_url,
            token: self.token,
        })
    }
}

impl MeteringClient {
    pub fn builder(base_url: impl Into<String>) -> MeteringClientBuilder {
        MeteringClientBuilder::new(base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Attach `token`, or the configured token when `None`.
    fn with_auth(&self, req: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        match token.or(self.token.as_deref()) {
            Some(t) => req.bearer_auth(t),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder, token: Option<&str>) -> Result<Response, Error> {
        let response = self
            .with_auth(req, token)
            .send()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;
        match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => Err(Error::Api { status, body }),
            Err(_) => Err(Error::Http {
                status,
                message: text,
            }),
        }
    }

    async fn json<T: DeserializeOwned>(response: Response) -> Result<T, Error> {
        response
            .json::<T>()
            .await
            .map_err(|e| Error::Deserialization(e.to_string()))
    }

    /// Check if the server is healthy.
    pub async fn health(&self) -> Result<bool, Error> {
        let response = self
            .client
            .get(self.url("/health"))
            .send()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;
        Ok(response.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_trims_trailing_slash() {
        let client = MeteringClient::builder("http://localhost:8080/")
            .build()
            .unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn rejects_non_http_urls() {
        let err = MeteringClient::builder("localhost:8080").build().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn builder_sets_token() {
        let client = MeteringClient::builder("http://localhost:8080")
            .token("secret")
            .build()
            .unwrap();
        assert_eq!(client.token.as_deref(), Some("secret"));
    }
}
