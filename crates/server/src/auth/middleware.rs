use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use tower::{Layer, Service};

use tally_core::Principal;

use super::TokenVerifier;
use crate::error::ServerError;

/// Header naming the tenant when bearer verification is disabled.
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Tower layer that resolves every request to a [`Principal`].
#[derive(Clone)]
pub struct AuthLayer {
    verifier: Option<Arc<TokenVerifier>>,
}

impl AuthLayer {
    /// `None` disables bearer verification; the tenant then comes from
    /// [`TENANT_HEADER`].
    pub fn new(verifier: Option<Arc<TokenVerifier>>) -> Self {
        Self { verifier }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware {
            inner,
            verifier: self.verifier.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    verifier: Option<Arc<TokenVerifier>>,
}

impl<S> Service<Request<Body>> for AuthMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let verifier = self.verifier.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let bearer = bearer_token(&req).map(str::to_owned);
            let principal = match verifier {
                Some(verifier) => match bearer {
                    Some(token) => verifier.verify(&token),
                    None => Err("missing bearer token".to_owned()),
                },
                None => header_principal(&req, bearer),
            };
            let principal = principal.map_err(ServerError::Unauthorized).and_then(|p| {
                p.tenant.validate()?;
                Ok(p)
            });
            match principal {
                Ok(principal) => {
                    req.extensions_mut().insert(principal);
                    inner.call(req).await
                }
                Err(err) => {
                    tracing::debug!(error = %err, "request rejected");
                    Ok(err.into_response())
                }
            }
        })
    }
}

fn bearer_token(req: &Request<Body>) -> Option<&str> {
    req.headers()
        .get("authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn header_principal(req: &Request<Body>, bearer: Option<String>) -> Result<Principal, String> {
    let tenant = req
        .headers()
        .get(TENANT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| format!("missing {TENANT_HEADER} header"))?;
    let principal = Principal::new(tenant);
    Ok(match bearer {
        Some(token) => principal.with_credential(token),
        None => principal,
    })
}
