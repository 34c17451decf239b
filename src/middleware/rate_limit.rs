//! Per-tier rate limiting middleware backed by [`SlidingWindowLimiter`].
//!
//! # Tiers
//!
//! - **Global** wraps the whole router: `X-RateLimit-*` headers
//! - **Api** wraps generation routes only: `X-API-RateLimit-*` headers
//!
//! A request must pass both to reach a generation handler.
//!
//! # Response Headers
//!
//! Set on allowed and rejected responses alike:
//! - `*-Limit`: configured ceiling for the window
//! - `*-Remaining`: slots left after this request
//! - `*-Reset`: epoch milliseconds at which the window next admits a request
//!
//! Rejections (429) also carry `Retry-After` in seconds and a `retryAfter`
//! body field.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request, Response};
use axum::response::IntoResponse;
use chrono::Utc;
use tower::{Layer, Service};
use tracing::{trace, warn};

use super::ip::{request_client_identity, request_client_ip};
use crate::error::AppError;
use crate::rate_limiter::{RateLimitDecision, RateLimitTier, SlidingWindowLimiter};

/// Header triple for one tier.
#[derive(Debug, Clone)]
pub struct TierHeaders {
    pub limit: HeaderName,
    pub remaining: HeaderName,
    pub reset: HeaderName,
}

impl TierHeaders {
    pub fn for_tier(tier: RateLimitTier) -> Self {
        match tier {
            RateLimitTier::Global => Self {
                limit: HeaderName::from_static("x-ratelimit-limit"),
                remaining: HeaderName::from_static("x-ratelimit-remaining"),
                reset: HeaderName::from_static("x-ratelimit-reset"),
            },
            RateLimitTier::Api => Self {
                limit: HeaderName::from_static("x-api-ratelimit-limit"),
                remaining: HeaderName::from_static("x-api-ratelimit-remaining"),
                reset: HeaderName::from_static("x-api-ratelimit-reset"),
            },
        }
    }

    fn apply(&self, headers: &mut HeaderMap, decision: &RateLimitDecision) {
        headers.insert(self.limit.clone(), HeaderValue::from(decision.limit));
        headers.insert(self.remaining.clone(), HeaderValue::from(decision.remaining));
        headers.insert(
            self.reset.clone(),
            HeaderValue::from(decision.reset_at.timestamp_millis()),
        );
    }
}

/// Tower layer that enforces one limiter tier.
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<SlidingWindowLimiter>,
}

impl RateLimitLayer {
    pub fn new(limiter: Arc<SlidingWindowLimiter>) -> Self {
        Self { limiter }
    }

    pub fn tier(&self) -> RateLimitTier {
        self.limiter.tier()
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            headers: TierHeaders::for_tier(self.limiter.tier()),
            limiter: self.limiter.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Arc<SlidingWindowLimiter>,
    headers: TierHeaders,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
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
        let tier = self.limiter.tier();
        let client_id = request_client_identity(&req);
        let now = Utc::now();
        let decision = self.limiter.check_limit_at(&client_id, now);
        let headers = self.headers.clone();

        if !decision.allowed {
            let retry_after_secs = decision.retry_after_secs(now);
            warn!(
                tier = %tier,
                client_ip = %request_client_ip(&req),
                retry_after_secs,
                "Rate limit exceeded"
            );
            metrics::counter!(crate::metrics::names::RATE_LIMITED_TOTAL, "tier" => tier.as_str())
                .increment(1);

            let mut response = AppError::RateLimited {
                tier,
                retry_after_secs,
            }
            .into_response();
            headers.apply(response.headers_mut(), &decision);
            return Box::pin(async move { Ok(response) });
        }

        trace!(tier = %tier, remaining = decision.remaining, "Rate limit check passed");

        let mut inner = self.inner.clone();
        Box::pin(async move {
            let mut response = inner.call(req).await?;
            headers.apply(response.headers_mut(), &decision);
            Ok(response)
        })
    }
}
