//! API key authentication.
//!
//! # Security Features
//!
//! - **Hashed storage**: keys are SHA-256 digests in a [`KeyStore`]
//! - **Full-scan constant-time comparison**: every stored digest is compared
//!   on every request
//! - **Several presentation forms**, checked in order:
//!   1. `Authorization: Bearer <token>`
//!   2. `Authorization: API-Key <token>`
//!   3. `X-API-Key: <token>`
//!
//! # Usage
//!
//! ```bash
//! API_KEYS=key-one,key-two cargo run
//!
//! curl -H "Authorization: Bearer key-one" http://localhost:3000/api/stats
//! curl -H "X-API-Key: key-two" http://localhost:3000/api/stats
//! ```
//!
//! Set `AUTH_ENABLED=false` to let every request through.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{HeaderMap, Request, Response, header};
use axum::response::IntoResponse;
use tower::{Layer, Service};
use tracing::{debug, warn};

use super::ip::{request_client_ip, user_agent};
use crate::error::AppError;
use crate::keystore::KeyStore;

/// Header name for API key.
pub const API_KEY_HEADER: &str = "x-api-key";

const BEARER_PREFIX: &str = "Bearer ";
const API_KEY_PREFIX: &str = "API-Key ";

/// Why a request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// No credential in any accepted form.
    MissingCredential,
    /// A credential was presented but matches no stored key.
    InvalidCredential,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::MissingCredential => "missing_credential",
            DenyReason::InvalidCredential => "invalid_credential",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    Allowed,
    Denied(DenyReason),
}

impl AuthDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AuthDecision::Allowed)
    }
}

/// Decides whether a request carries a valid credential.
#[derive(Debug, Clone)]
pub struct AuthGate {
    enabled: bool,
    keys: KeyStore,
}

impl AuthGate {
    pub fn new(enabled: bool, keys: KeyStore) -> Self {
        if enabled && keys.is_empty() {
            warn!("Authentication is enabled but no API keys are configured");
        }
        Self { enabled, keys }
    }

    /// Build from raw secrets; they are hashed immediately.
    pub fn from_secrets<I, S>(enabled: bool, secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(enabled, KeyStore::from_secrets(secrets))
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of distinct keys configured.
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub fn authenticate(&self, headers: &HeaderMap) -> AuthDecision {
        if !self.enabled {
            return AuthDecision::Allowed;
        }

        match extract_credential(headers) {
            None => AuthDecision::Denied(DenyReason::MissingCredential),
            Some(token) if self.keys.contains(token) => AuthDecision::Allowed,
            Some(_) => AuthDecision::Denied(DenyReason::InvalidCredential),
        }
    }
}

/// Pull a credential out of the request headers.
///
/// An `Authorization` header with an unrecognized scheme does not stop the
/// lookup; `X-API-Key` is still consulted.
pub fn extract_credential(headers: &HeaderMap) -> Option<&str> {
    if let Some(value) = headers.get(header::AUTHORIZATION)
        && let Ok(value) = value.to_str()
    {
        if let Some(token) = value.strip_prefix(BEARER_PREFIX) {
            return Some(token);
        }
        if let Some(token) = value.strip_prefix(API_KEY_PREFIX) {
            return Some(token);
        }
    }

    headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// Tower layer enforcing an [`AuthGate`].
#[derive(Clone)]
pub struct AuthLayer {
    gate: Arc<AuthGate>,
}

impl AuthLayer {
    pub fn new(gate: Arc<AuthGate>) -> Self {
        Self { gate }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            inner,
            gate: self.gate.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AuthService<S> {
    inner: S,
    gate: Arc<AuthGate>,
}

impl<S> Service<Request<Body>> for AuthService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let decision = self.gate.authenticate(req.headers());

        if let AuthDecision::Denied(reason) = decision {
            let client_ip = request_client_ip(&req);
            warn!(
                client_ip = %client_ip,
                user_agent = user_agent(req.headers()).unwrap_or("-"),
                reason = reason.as_str(),
                path = req.uri().path(),
                "Authentication failed"
            );
            metrics::counter!(crate::metrics::names::AUTH_DENIED_TOTAL, "reason" => reason.as_str())
                .increment(1);
            return Box::pin(async move { Ok(AppError::Unauthorized.into_response()) });
        }

        debug!(path = req.uri().path(), "Authentication passed");
        let mut inner = self.inner.clone();
        Box::pin(async move { inner.call(req).await })
    }
}
