//! Structured access log written once per request at the pipeline exit.
//!
//! The path and query string pass through the [`LogRedactor`] first, so
//! credentials smuggled in a URL (`?api_key=...`) never reach the log.

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use tower::{Layer, Service};
use tracing::{debug, info, warn};

use super::ip::{request_client_ip, user_agent};
use super::request_id::REQUEST_ID_HEADER;
use crate::redaction::LogRedactor;

#[derive(Clone)]
pub struct AccessLogLayer {
    redactor: Arc<LogRedactor>,
}

impl AccessLogLayer {
    pub fn new(redactor: Arc<LogRedactor>) -> Self {
        Self { redactor }
    }
}

impl<S> Layer<S> for AccessLogLayer {
    type Service = AccessLogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AccessLogService {
            inner,
            redactor: self.redactor.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AccessLogService<S> {
    inner: S,
    redactor: Arc<LogRedactor>,
}

impl<S> Service<Request<Body>> for AccessLogService<S>
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
        let started = Instant::now();
        let method = req.method().clone();
        let target = req
            .uri()
            .path_and_query()
            .map_or_else(|| req.uri().path().to_string(), |pq| pq.as_str().to_string());
        let path = self.redactor.redact_str(&target);
        let client_ip = request_client_ip(&req).into_owned();
        let agent = user_agent(req.headers()).unwrap_or("-").to_string();
        let request_id = req
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string();

        debug!(%method, %path, %client_ip, %request_id, "Request received");

        let mut inner = self.inner.clone();
        Box::pin(async move {
            let response = inner.call(req).await?;
            let elapsed = started.elapsed();
            let status = response.status();
            let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

            crate::metrics::record_request_duration(
                method.as_str(),
                status.as_str(),
                elapsed.as_secs_f64(),
            );

            if status.is_server_error() {
                warn!(
                    %method, %path, status = status.as_u16(), duration_ms,
                    %client_ip, user_agent = %agent, %request_id,
                    "Request completed with server error"
                );
            } else {
                info!(
                    %method, %path, status = status.as_u16(), duration_ms,
                    %client_ip, user_agent = %agent, %request_id,
                    "Request completed"
                );
            }

            Ok(response)
        })
    }
}
