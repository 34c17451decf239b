//! Per-client sliding-window request counter.
//!
//! # Algorithm
//!
//! Each client identity owns a deque of request timestamps. On every check
//! the deque is pruned to the trailing window `(now - window, now]`. Arrival
//! order is not assumed: two requests for one identity may read the clock
//! before either takes the shard lock.
//! If the remaining count has reached `max_requests` the request is denied and
//! `reset_at` is the moment the oldest retained timestamp leaves the window;
//! otherwise `now` is appended and the request is allowed.
//!
//! A window never holds more than `max_requests` timestamps: the append only
//! happens after the bound has been checked.
//!
//! # Concurrency
//!
//! Windows live in a sharded [`DashMap`]. The read-modify-write of one client
//! window happens while holding that entry's shard guard, and no guard is held
//! across an `.await`. The periodic [`SlidingWindowLimiter::sweep`] walks a
//! snapshot of the keys and prunes each entry individually, so it never
//! pauses the whole map.
//!
//! # Disabled mode
//!
//! A disabled limiter keeps no state and allows every request with
//! `remaining = max_requests`.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, trace};

/// Which of the two independently configured tiers a limiter enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitTier {
    /// Coarse limit applied to every request.
    Global,
    /// Stricter limit applied to generation endpoints.
    Api,
}

impl RateLimitTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitTier::Global => "global",
            RateLimitTier::Api => "api",
        }
    }
}

impl fmt::Display for RateLimitTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Limiter parameters for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub window: Duration,
    pub max_requests: u32,
}

/// Error type for limiter construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    #[error("rate limit window must be greater than 0")]
    ZeroWindow,
    #[error("rate limit max requests must be greater than 0")]
    ZeroMaxRequests,
    #[error("rate limit window is too large")]
    WindowTooLarge,
}

/// Outcome of a single limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Configured ceiling for the window.
    pub limit: u32,
    /// Slots left in the window after this request.
    pub remaining: u32,
    /// When the window will next admit a request.
    pub reset_at: DateTime<Utc>,
}

impl RateLimitDecision {
    /// Whole seconds until `reset_at`, never less than one.
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        let millis = (self.reset_at - now).num_milliseconds().max(0);
        let secs = u64::try_from(millis).unwrap_or(0).div_ceil(1000);
        secs.max(1)
    }
}

/// Point-in-time view of limiter occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimiterStats {
    pub active_clients: usize,
    pub total_requests: usize,
}

/// Sliding-window limiter keyed by client identity.
pub struct SlidingWindowLimiter {
    tier: RateLimitTier,
    settings: RateLimitSettings,
    window: TimeDelta,
    windows: DashMap<String, VecDeque<DateTime<Utc>>>,
}

impl SlidingWindowLimiter {
    /// Create a limiter for `tier`.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError`] when an enabled limiter is configured with a
    /// zero window or zero request ceiling.
    pub fn new(tier: RateLimitTier, settings: RateLimitSettings) -> Result<Self, RateLimitError> {
        if settings.enabled {
            if settings.window.is_zero() {
                return Err(RateLimitError::ZeroWindow);
            }
            if settings.max_requests == 0 {
                return Err(RateLimitError::ZeroMaxRequests);
            }
        }
        let window =
            TimeDelta::from_std(settings.window).map_err(|_| RateLimitError::WindowTooLarge)?;

        Ok(Self {
            tier,
            settings,
            window,
            windows: DashMap::new(),
        })
    }

    pub fn tier(&self) -> RateLimitTier {
        self.tier
    }

    pub fn settings(&self) -> RateLimitSettings {
        self.settings
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    pub fn max_requests(&self) -> u32 {
        self.settings.max_requests
    }

    /// Check and record a request for `client_id` at the current time.
    pub fn check_limit(&self, client_id: &str) -> RateLimitDecision {
        self.check_limit_at(client_id, Utc::now())
    }

    /// Check and record a request for `client_id` at `now`.
    pub fn check_limit_at(&self, client_id: &str, now: DateTime<Utc>) -> RateLimitDecision {
        let limit = self.settings.max_requests;
        if !self.settings.enabled {
            return RateLimitDecision {
                allowed: true,
                limit,
                remaining: limit,
                reset_at: now,
            };
        }

        let window_start = now - self.window;
        let mut entry = self.windows.entry(client_id.to_string()).or_default();
        let timestamps = entry.value_mut();
        // Concurrent callers or a clock step can append out of order, so
        // prune the whole window rather than just the front.
        timestamps.retain(|ts| *ts > window_start);

        let count = timestamps.len();
        if count >= limit as usize {
            // Denial only happens with a full window, so a minimum exists.
            let oldest = timestamps.iter().min().copied().unwrap_or(now);
            trace!(tier = %self.tier, client_id, count, "sliding window full");
            return RateLimitDecision {
                allowed: false,
                limit,
                remaining: 0,
                reset_at: oldest + self.window,
            };
        }

        timestamps.push_back(now);
        let used = u32::try_from(timestamps.len()).unwrap_or(limit);
        let oldest = timestamps.iter().min().copied().unwrap_or(now);

        RateLimitDecision {
            allowed: true,
            limit,
            remaining: limit.saturating_sub(used),
            reset_at: oldest + self.window,
        }
    }

    /// Remove idle clients. Returns how many entries were dropped.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    /// Prune every window against `now - 2 × window` and drop the entries
    /// that end up empty.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        if !self.settings.enabled {
            return 0;
        }

        let cutoff = now - self.window * 2;
        let keys: Vec<String> = self.windows.iter().map(|e| e.key().clone()).collect();
        let mut removed = 0;

        for key in keys {
            if let Some(mut entry) = self.windows.get_mut(&key) {
                entry.retain(|ts| *ts > cutoff);
            }
            if self.windows.remove_if(&key, |_, ts| ts.is_empty()).is_some() {
                removed += 1;
            }
        }

        if removed > 0 {
            debug!(tier = %self.tier, removed, "Rate limiter cleaned up expired entries");
        }
        removed
    }

    /// Current occupancy across all clients.
    pub fn stats(&self) -> LimiterStats {
        self.windows
            .iter()
            .fold(LimiterStats::default(), |mut stats, entry| {
                stats.active_clients += 1;
                stats.total_requests += entry.value().len();
                stats
            })
    }
}

impl fmt::Debug for SlidingWindowLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlidingWindowLimiter")
            .field("tier", &self.tier)
            .field("settings", &self.settings)
            .field("clients", &self.windows.len())
            .finish()
    }
}
