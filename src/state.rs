//! Shared application state for Axum handlers and middleware.
//!
//! Built once at startup and cloned cheaply per request; every component is
//! behind an `Arc`. The key store is read-only after construction. Limiter
//! windows live in sharded concurrent maps, so request handling never takes a
//! global lock.
//!
//! # Structured Concurrency
//!
//! One sweeper task per enabled limiter tier is spawned on a
//! `tokio_util::task::TaskTracker` and stopped through a `CancellationToken`.
//! Call `shutdown()` before exit (and at the end of tests) to stop them.

use std::sync::Arc;
use std::time::Instant;

use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::middleware::AuthGate;
use crate::rate_limiter::{RateLimitTier, SlidingWindowLimiter};
use crate::redaction::LogRedactor;
use crate::upstream::TextGenerator;
use crate::validation::InjectionGuard;

/// Shared application state.
///
/// # Lifecycle
///
/// ```rust,ignore
/// let state = AppState::new(config, Arc::new(client))?;
/// // ... serve ...
/// state.shutdown().await;
/// ```
#[derive(Clone)]
pub struct AppState {
    /// Configuration with `api_keys` emptied; the keys live only as digests.
    pub config: Arc<Config>,
    pub auth: Arc<AuthGate>,
    pub global_limiter: Arc<SlidingWindowLimiter>,
    pub api_limiter: Arc<SlidingWindowLimiter>,
    pub guard: Arc<InjectionGuard>,
    pub redactor: Arc<LogRedactor>,
    pub generator: Arc<dyn TextGenerator>,
    /// Timestamp when the application started
    pub started_at: Instant,
    task_tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

impl AppState {
    /// Build every pipeline component and start the limiter sweepers.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if a limiter rejects its settings or a
    /// built-in rule table fails to compile.
    pub fn new(mut config: Config, generator: Arc<dyn TextGenerator>) -> AppResult<Self> {
        // Plaintext keys leave the config here; only their digests are kept.
        let api_keys = std::mem::take(&mut config.api_keys);
        let auth = AuthGate::from_secrets(config.auth_enabled, &api_keys);
        drop(api_keys);
        info!(
            enabled = auth.is_enabled(),
            keys = auth.key_count(),
            "Authentication configured"
        );

        let global_limiter = build_limiter(RateLimitTier::Global, &config)?;
        let api_limiter = build_limiter(RateLimitTier::Api, &config)?;

        let guard = InjectionGuard::new()
            .map_err(|e| AppError::ConfigError(format!("Invalid injection signature: {e}")))?;
        let redactor = LogRedactor::new()
            .map_err(|e| AppError::ConfigError(format!("Invalid redaction rule: {e}")))?;

        let state = Self {
            config: Arc::new(config),
            auth: Arc::new(auth),
            global_limiter,
            api_limiter,
            guard: Arc::new(guard),
            redactor: Arc::new(redactor),
            generator,
            started_at: Instant::now(),
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        };

        state.spawn_sweeper(state.global_limiter.clone());
        state.spawn_sweeper(state.api_limiter.clone());

        Ok(state)
    }

    /// Periodically drop idle clients from a limiter.
    ///
    /// Runs every window duration. Each entry is pruned under its own shard
    /// lock, so requests are never paused for the whole sweep.
    fn spawn_sweeper(&self, limiter: Arc<SlidingWindowLimiter>) {
        if !limiter.is_enabled() {
            return;
        }

        let period = limiter.settings().window;
        let cancel = self.cancellation_token.clone();

        self.task_tracker.spawn(async move {
            let tier = limiter.tier();
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await; // Skip the first immediate tick

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!(tier = %tier, "Limiter sweeper received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        limiter.sweep();
                        metrics::set_active_clients(tier, limiter.stats().active_clients);
                    }
                }
            }

            debug!(tier = %tier, "Limiter sweeper shutting down");
        });
    }

    /// Stop the sweepers and wait for them to finish.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of background tasks");
        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;
        info!("All background tasks have completed");
    }

    /// Get the application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

fn build_limiter(tier: RateLimitTier, config: &Config) -> AppResult<Arc<SlidingWindowLimiter>> {
    let settings = match tier {
        RateLimitTier::Global => config.global_rate_limit,
        RateLimitTier::Api => config.api_rate_limit,
    };
    info!(
        tier = %tier,
        enabled = settings.enabled,
        window_ms = u64::try_from(settings.window.as_millis()).unwrap_or(u64::MAX),
        max_requests = settings.max_requests,
        "Rate limiter configured"
    );
    SlidingWindowLimiter::new(tier, settings)
        .map(Arc::new)
        .map_err(|e| AppError::ConfigError(format!("{tier} rate limiter: {e}")))
}
