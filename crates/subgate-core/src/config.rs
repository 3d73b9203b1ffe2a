//! Configuration and settings management
//!
//! Settings are layered from `config/default`, `config/{RUN_MODE}` and
//! `config/local` files, then `APP__`-prefixed and plain environment
//! variables (empty values are ignored).

use crate::admission::{BusyPolicy, GateError, QueryMode, SubscriptionRequirement};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default cooldown between admitted requests, in seconds.
pub const DEFAULT_COOLDOWN_SECS: u64 = 5;
/// Default per-channel membership query timeout, in milliseconds.
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 5_000;
/// Default capacity of the positive subscription cache.
pub const DEFAULT_SUBSCRIPTION_CACHE_MAX_SIZE: u64 = 10_000;
/// Rate-limit records idle for this many cooldowns are evicted by default.
pub const DEFAULT_IDLE_TTL_COOLDOWNS: u32 = 10;
/// Default period of the rate-limit sweeper, in seconds.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Default text inference endpoint.
pub const DEFAULT_INFERENCE_URL: &str = "https://bk9.fun/ai/blackbox";
/// JSON field of the inference response holding the answer.
pub const DEFAULT_INFERENCE_RESPONSE_FIELD: &str = "BK9";
/// Default HTTP timeout for collaborator calls, in seconds.
pub const DEFAULT_INFERENCE_TIMEOUT_SECS: u64 = 10;
/// Default upper bound for a whole handler run, in seconds.
pub const DEFAULT_HANDLER_TIMEOUT_SECS: u64 = 120;

/// Build the layered configuration shared by every settings struct.
///
/// # Errors
///
/// Returns a `ConfigError` if a source cannot be read.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        // Not checked into git
        .add_source(File::with_name("config/local").required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        // Environment::default() maps UPPER_SNAKE_CASE to snake_case keys
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

/// Admission control settings.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GateSettings {
    /// Minimum seconds between admitted requests of one user
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,
    /// Comma, semicolon or space separated list of channels users must join
    #[serde(rename = "required_channels")]
    pub required_channels_str: Option<String>,
    /// Per-channel membership query timeout in milliseconds
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
    /// Query all required channels at once instead of one by one
    #[serde(default)]
    pub concurrent_subscription_checks: bool,
    /// Seconds a fully-subscribed result is cached; 0 disables the cache
    #[serde(default)]
    pub subscription_cache_ttl_secs: u64,
    /// Maximum number of cached subscription results
    #[serde(default = "default_subscription_cache_max_size")]
    pub subscription_cache_max_size: u64,
    /// Seconds after which an idle rate-limit record is evicted
    pub rate_limit_idle_ttl_secs: Option<u64>,
    /// Seconds between eviction sweeps
    #[serde(default = "default_sweep_interval_secs")]
    pub rate_limit_sweep_interval_secs: u64,
    /// Handling of requests from users with a request still running
    #[serde(default)]
    pub busy_policy: BusyPolicy,
}

const fn default_cooldown_seconds() -> u64 {
    DEFAULT_COOLDOWN_SECS
}

const fn default_query_timeout_ms() -> u64 {
    DEFAULT_QUERY_TIMEOUT_MS
}

const fn default_subscription_cache_max_size() -> u64 {
    DEFAULT_SUBSCRIPTION_CACHE_MAX_SIZE
}

const fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            cooldown_seconds: DEFAULT_COOLDOWN_SECS,
            required_channels_str: None,
            query_timeout_ms: DEFAULT_QUERY_TIMEOUT_MS,
            concurrent_subscription_checks: false,
            subscription_cache_ttl_secs: 0,
            subscription_cache_max_size: DEFAULT_SUBSCRIPTION_CACHE_MAX_SIZE,
            rate_limit_idle_ttl_secs: None,
            rate_limit_sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            busy_policy: BusyPolicy::Advisory,
        }
    }
}

impl GateSettings {
    /// Load settings from files and environment.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading or deserialization fails.
    pub fn new() -> Result<Self, ConfigError> {
        build_config()?.try_deserialize()
    }

    /// Cooldown as a `Duration`.
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds)
    }

    /// Membership query timeout as a `Duration`.
    #[must_use]
    pub const fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    /// Idle TTL for rate-limit records, defaulting to ten cooldowns.
    ///
    /// Saturates at `Duration::MAX` for absurdly long cooldowns.
    #[must_use]
    pub fn rate_limit_idle_ttl(&self) -> Duration {
        self.rate_limit_idle_ttl_secs.map_or_else(
            || {
                self.cooldown()
                    .checked_mul(DEFAULT_IDLE_TTL_COOLDOWNS)
                    .unwrap_or(Duration::MAX)
            },
            Duration::from_secs,
        )
    }

    /// Sweeper period as a `Duration`.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.rate_limit_sweep_interval_secs)
    }

    /// Subscription cache TTL, `None` when caching is disabled.
    #[must_use]
    pub const fn subscription_cache_ttl(&self) -> Option<Duration> {
        if self.subscription_cache_ttl_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.subscription_cache_ttl_secs))
        }
    }

    /// Query mode for membership lookups.
    #[must_use]
    pub const fn query_mode(&self) -> QueryMode {
        if self.concurrent_subscription_checks {
            QueryMode::Concurrent
        } else {
            QueryMode::Sequential
        }
    }

    /// Parsed required-channel list.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Config`] if no channel is configured.
    pub fn requirement(&self) -> Result<SubscriptionRequirement, GateError> {
        let raw = self.required_channels_str.as_deref().unwrap_or_default();
        SubscriptionRequirement::parse(raw).map_err(|e| match e {
            GateError::Config(_) => GateError::Config(
                "REQUIRED_CHANNELS must list at least one channel".to_string(),
            ),
            other => other,
        })
    }
}

/// Endpoints of the collaborators that do the actual work.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceSettings {
    /// Text inference endpoint, queried with `GET ?q=<prompt>`
    #[serde(default = "default_inference_url")]
    pub inference_url: String,
    /// JSON field of the inference response holding the answer
    #[serde(default = "default_inference_response_field")]
    pub inference_response_field: String,
    /// HTTP timeout for collaborator calls in seconds
    #[serde(default = "default_inference_timeout_secs")]
    pub inference_timeout_secs: u64,
    /// Object detection endpoint receiving raw image bytes
    pub vision_url: Option<String>,
    /// Speech transcription endpoint receiving raw audio bytes
    pub speech_url: Option<String>,
    /// Upper bound for a whole handler run in seconds
    #[serde(default = "default_handler_timeout_secs")]
    pub handler_timeout_secs: u64,
}

fn default_inference_url() -> String {
    DEFAULT_INFERENCE_URL.to_string()
}

fn default_inference_response_field() -> String {
    DEFAULT_INFERENCE_RESPONSE_FIELD.to_string()
}

const fn default_inference_timeout_secs() -> u64 {
    DEFAULT_INFERENCE_TIMEOUT_SECS
}

const fn default_handler_timeout_secs() -> u64 {
    DEFAULT_HANDLER_TIMEOUT_SECS
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            inference_url: default_inference_url(),
            inference_response_field: default_inference_response_field(),
            inference_timeout_secs: DEFAULT_INFERENCE_TIMEOUT_SECS,
            vision_url: None,
            speech_url: None,
            handler_timeout_secs: DEFAULT_HANDLER_TIMEOUT_SECS,
        }
    }
}

impl ServiceSettings {
    /// Load settings from files and environment.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading or deserialization fails.
    pub fn new() -> Result<Self, ConfigError> {
        build_config()?.try_deserialize()
    }

    /// HTTP timeout as a `Duration`.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.inference_timeout_secs)
    }

    /// Handler timeout as a `Duration`.
    #[must_use]
    pub const fn handler_timeout(&self) -> Duration {
        Duration::from_secs(self.handler_timeout_secs)
    }
}
