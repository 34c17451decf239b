//! Application configuration loaded from environment variables.
//!
//! # Configuration Hierarchy
//!
//! An optional `.env` file is loaded first, then environment variables are read
//! with defaults suitable for local development. Only `ANTHROPIC_API_KEY` is
//! mandatory.
//!
//! # Security Configuration
//!
//! - `API_KEYS`: Comma-separated client credentials (hashed at startup)
//! - `AUTH_ENABLED`: Any value other than `false`/`0`/`off`/`no` enables auth
//! - `ALLOWED_ORIGINS`: Comma-separated CORS origins, or `*`
//!
//! # Rate Limiting
//!
//! Two independent sliding-window tiers:
//!
//! - Global: `RATE_LIMIT_ENABLED`, `RATE_LIMIT_WINDOW_MS` (900000),
//!   `RATE_LIMIT_MAX_REQUESTS` (100)
//! - API: `API_RATE_LIMIT_ENABLED` (defaults to the global toggle),
//!   `API_RATE_LIMIT_WINDOW_MS` (60000), `API_RATE_LIMIT_MAX_REQUESTS` (10)

use std::env;
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::rate_limiter::RateLimitSettings;
use crate::upstream::UpstreamSettings;
use crate::validation::{DEFAULT_PROMPT_MAX_LENGTH, DEFAULT_PROMPT_MIN_LENGTH, ValidationOptions};

/// Default upstream endpoint root.
pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://api.anthropic.com";

/// Default model sent upstream.
pub const DEFAULT_UPSTREAM_MODEL: &str = "claude-3-opus-20240229";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Application configuration loaded from environment variables.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.server_addr());
/// ```
#[derive(Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 3000)
    pub port: u16,

    /// Maximum request body size in bytes (default: 10MB)
    pub max_request_body_size: usize,

    // =========================================================================
    // Upstream Configuration
    // =========================================================================
    /// Credential for the generation API. Required.
    pub upstream_api_key: String,

    pub upstream_base_url: String,

    pub upstream_model: String,

    /// Generation ceiling (default: 4000)
    pub upstream_max_tokens: u32,

    /// Sampling temperature (default: 0.7)
    pub upstream_temperature: f32,

    /// HTTP timeout for a single upstream call (default: 60s)
    pub upstream_timeout: Duration,

    // =========================================================================
    // Security Configuration
    // =========================================================================
    /// Raw client credentials. Hashed into a `KeyStore` at startup.
    pub api_keys: Vec<String>,

    pub auth_enabled: bool,

    /// Allowed CORS origins; a single `*` allows any origin.
    pub allowed_origins: Vec<String>,

    // =========================================================================
    // Rate Limiting Configuration
    // =========================================================================
    pub global_rate_limit: RateLimitSettings,

    pub api_rate_limit: RateLimitSettings,

    // =========================================================================
    // Validation Configuration
    // =========================================================================
    /// Minimum prompt length in characters (default: 1)
    pub prompt_min_length: usize,

    /// Maximum prompt length in characters (default: 5000)
    pub prompt_max_length: usize,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Log filter (e.g., "info", "prompt_gateway=debug")
    pub log_level: String,

    pub log_format: LogFormat,

    /// Port for Prometheus metrics endpoint (default: 9090, 0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if `ANTHROPIC_API_KEY` is missing, a
    /// value fails to parse, or the combination is inconsistent.
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let rate_limit_enabled = Self::parse_flag("RATE_LIMIT_ENABLED", true);

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 3000)?,
            // 10MB
            max_request_body_size: Self::parse_env("MAX_REQUEST_BODY_SIZE", 10 * 1024 * 1024)?,

            // Upstream
            upstream_api_key: env::var("ANTHROPIC_API_KEY")
                .ok()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .ok_or_else(|| {
                    AppError::ConfigError("ANTHROPIC_API_KEY must be set".to_string())
                })?,
            upstream_base_url: env::var("UPSTREAM_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_UPSTREAM_BASE_URL.to_string()),
            upstream_model: env::var("UPSTREAM_MODEL")
                .unwrap_or_else(|_| DEFAULT_UPSTREAM_MODEL.to_string()),
            upstream_max_tokens: Self::parse_env("UPSTREAM_MAX_TOKENS", 4000)?,
            upstream_temperature: Self::parse_env("UPSTREAM_TEMPERATURE", 0.7)?,
            upstream_timeout: Duration::from_secs(Self::parse_env("UPSTREAM_TIMEOUT_SECS", 60)?),

            // Security
            api_keys: Self::parse_list("API_KEYS", ""),
            auth_enabled: Self::parse_flag("AUTH_ENABLED", true),
            allowed_origins: Self::parse_list("ALLOWED_ORIGINS", "http://localhost:3000"),

            // Rate limiting
            global_rate_limit: RateLimitSettings {
                enabled: rate_limit_enabled,
                window: Duration::from_millis(Self::parse_env("RATE_LIMIT_WINDOW_MS", 900_000)?),
                max_requests: Self::parse_env("RATE_LIMIT_MAX_REQUESTS", 100)?,
            },
            api_rate_limit: RateLimitSettings {
                enabled: Self::parse_flag("API_RATE_LIMIT_ENABLED", rate_limit_enabled),
                window: Duration::from_millis(Self::parse_env(
                    "API_RATE_LIMIT_WINDOW_MS",
                    60_000,
                )?),
                max_requests: Self::parse_env("API_RATE_LIMIT_MAX_REQUESTS", 10)?,
            },

            // Validation
            prompt_min_length: Self::parse_env("PROMPT_MIN_LENGTH", DEFAULT_PROMPT_MIN_LENGTH)?,
            prompt_max_length: Self::parse_env("PROMPT_MAX_LENGTH", DEFAULT_PROMPT_MAX_LENGTH)?,

            // Observability
            log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            log_format: Self::parse_log_format(),
            metrics_port: Self::parse_env("METRICS_PORT", 9090)?,
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if validation fails.
    pub fn validate(&self) -> AppResult<()> {
        if self.upstream_api_key.is_empty() {
            return Err(AppError::ConfigError(
                "ANTHROPIC_API_KEY must be set".to_string(),
            ));
        }

        if self.prompt_min_length > self.prompt_max_length {
            return Err(AppError::ConfigError(format!(
                "PROMPT_MIN_LENGTH ({}) must be <= PROMPT_MAX_LENGTH ({})",
                self.prompt_min_length, self.prompt_max_length
            )));
        }

        if self.prompt_max_length == 0 {
            return Err(AppError::ConfigError(
                "PROMPT_MAX_LENGTH must be greater than 0".to_string(),
            ));
        }

        for (name, settings) in [
            ("RATE_LIMIT", &self.global_rate_limit),
            ("API_RATE_LIMIT", &self.api_rate_limit),
        ] {
            if !settings.enabled {
                continue;
            }
            if settings.window.is_zero() {
                return Err(AppError::ConfigError(format!(
                    "{name}_WINDOW_MS must be greater than 0"
                )));
            }
            if settings.max_requests == 0 {
                return Err(AppError::ConfigError(format!(
                    "{name}_MAX_REQUESTS must be greater than 0"
                )));
            }
        }

        if self.max_request_body_size == 0 {
            return Err(AppError::ConfigError(
                "MAX_REQUEST_BODY_SIZE must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.upstream_temperature) {
            return Err(AppError::ConfigError(format!(
                "UPSTREAM_TEMPERATURE ({}) must be between 0.0 and 1.0",
                self.upstream_temperature
            )));
        }

        if self.auth_enabled && self.api_keys.is_empty() {
            tracing::warn!(
                "AUTH_ENABLED is on but API_KEYS is empty; every /api request will be rejected"
            );
        }

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether any origin is allowed.
    pub fn cors_allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }

    /// Prompt bounds for the generation endpoint.
    pub fn prompt_options(&self) -> ValidationOptions {
        ValidationOptions {
            min_length: self.prompt_min_length,
            max_length: self.prompt_max_length,
            required: true,
        }
    }

    /// Parameters for the upstream client.
    pub fn upstream_settings(&self) -> UpstreamSettings {
        UpstreamSettings {
            base_url: self.upstream_base_url.clone(),
            api_key: self.upstream_api_key.clone(),
            model: self.upstream_model.clone(),
            max_tokens: self.upstream_max_tokens,
            temperature: self.upstream_temperature,
            timeout: self.upstream_timeout,
        }
    }

    /// Check if Prometheus metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        self.metrics_enabled()
            .then(|| std::net::SocketAddr::from(([0, 0, 0, 0], self.metrics_port)))
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> AppResult<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .trim()
                .parse()
                .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Read a boolean toggle. Unset uses `default`.
    fn parse_flag(name: &str, default: bool) -> bool {
        env::var(name)
            .map(|val| flag_enabled(&val))
            .unwrap_or(default)
    }

    /// Read a comma-separated list, trimming and dropping empty entries.
    fn parse_list(name: &str, default: &str) -> Vec<String> {
        split_list(&env::var(name).unwrap_or_else(|_| default.to_string()))
    }

    /// Anything other than `json` is pretty output.
    fn parse_log_format() -> LogFormat {
        match env::var("LOG_FORMAT") {
            Ok(val) if val.trim().eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// A toggle is on unless it is explicitly one of `false`, `0`, `off` or `no`.
pub fn flag_enabled(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "false" | "0" | "off" | "no"
    )
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("max_request_body_size", &self.max_request_body_size)
            .field("upstream_api_key", &"<redacted>")
            .field("upstream_base_url", &self.upstream_base_url)
            .field("upstream_model", &self.upstream_model)
            .field("upstream_max_tokens", &self.upstream_max_tokens)
            .field("upstream_temperature", &self.upstream_temperature)
            .field("upstream_timeout", &self.upstream_timeout)
            .field("api_keys", &format_args!("<{} redacted>", self.api_keys.len()))
            .field("auth_enabled", &self.auth_enabled)
            .field("allowed_origins", &self.allowed_origins)
            .field("global_rate_limit", &self.global_rate_limit)
            .field("api_rate_limit", &self.api_rate_limit)
            .field("prompt_min_length", &self.prompt_min_length)
            .field("prompt_max_length", &self.prompt_max_length)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .field("metrics_port", &self.metrics_port)
            .finish()
    }
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Server
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_request_body_size: 10 * 1024 * 1024, // 10MB
            // Upstream
            upstream_api_key: "test-upstream-key".to_string(),
            upstream_base_url: DEFAULT_UPSTREAM_BASE_URL.to_string(),
            upstream_model: DEFAULT_UPSTREAM_MODEL.to_string(),
            upstream_max_tokens: 4000,
            upstream_temperature: 0.7,
            upstream_timeout: Duration::from_secs(60),
            // Security
            api_keys: vec![],
            auth_enabled: true,
            allowed_origins: vec!["http://localhost:3000".to_string()],
            // Rate limiting
            global_rate_limit: RateLimitSettings {
                enabled: true,
                window: Duration::from_millis(900_000),
                max_requests: 100,
            },
            api_rate_limit: RateLimitSettings {
                enabled: true,
                window: Duration::from_millis(60_000),
                max_requests: 10,
            },
            // Validation
            prompt_min_length: DEFAULT_PROMPT_MIN_LENGTH,
            prompt_max_length: DEFAULT_PROMPT_MAX_LENGTH,
            // Observability
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_port: 9090,
        }
    }
}
