//! Client origin and identity extraction shared by auth, rate limiting and
//! access logging.
//!
//! # Security Warning: IP Spoofing Risk
//!
//! `X-Forwarded-For` is client-controlled unless a reverse proxy overwrites
//! it. Deploy behind a proxy that sets the header itself, and block direct
//! access to the service, otherwise callers can rotate spoofed origins to
//! dodge the per-client rate limits.
//!
//! # Client Identity
//!
//! Rate-limit buckets are keyed by `{ip}_{ua8}` where `ua8` is the first eight
//! hex characters of SHA-256 over the `User-Agent` header (or `"unknown"`).
//! The identity is only a lookup key and is never returned to clients.

use std::borrow::Cow;
use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request, header};

use crate::keystore::short_fingerprint;

/// Fallback value when no client IP can be determined.
///
/// All requests without an identifiable origin share this key.
pub const UNKNOWN_IP: &str = "unknown";

/// Hex characters of the user-agent hash kept in a client identity.
pub const USER_AGENT_HASH_LEN: usize = 8;

/// Resolve the caller's network origin.
///
/// Priority: first entry of `X-Forwarded-For`, then the transport peer, then
/// [`UNKNOWN_IP`].
#[inline]
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Cow<'static, str> {
    if let Some(forwarded) = headers.get("x-forwarded-for")
        && let Ok(value) = forwarded.to_str()
        && let Some(first) = value.split(',').next()
        && !first.trim().is_empty()
    {
        return Cow::Owned(first.trim().to_string());
    }

    match peer {
        Some(addr) => Cow::Owned(addr.ip().to_string()),
        None => Cow::Borrowed(UNKNOWN_IP),
    }
}

/// The caller's declared agent string, if it is valid visible ASCII.
pub fn user_agent(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
}

/// Derive the rate-limit key for a caller.
pub fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let ip = client_ip(headers, peer);
    let agent = user_agent(headers).unwrap_or(UNKNOWN_IP);
    format!("{ip}_{}", short_fingerprint(agent, USER_AGENT_HASH_LEN))
}

/// Transport peer recorded by `into_make_service_with_connect_info`.
pub fn peer_addr<B>(req: &Request<B>) -> Option<SocketAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

/// [`client_ip`] for a full request.
pub fn request_client_ip<B>(req: &Request<B>) -> Cow<'static, str> {
    client_ip(req.headers(), peer_addr(req))
}

/// [`client_identity`] for a full request.
pub fn request_client_identity<B>(req: &Request<B>) -> String {
    client_identity(req.headers(), peer_addr(req))
}
