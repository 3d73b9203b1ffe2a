//! Telegram transport settings.

use config::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use subgate_core::config::{GateSettings, ServiceSettings};

/// Telegram transport settings loaded from environment variables.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct TelegramSettings {
    /// Telegram Bot API token.
    pub telegram_token: String,
    /// Comma-separated list of user IDs allowed to run `/stats`.
    #[serde(rename = "admin_users")]
    pub admin_users_str: Option<String>,
}

impl TelegramSettings {
    /// Create new settings by loading from environment and files.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        subgate_core::config::build_config()?.try_deserialize()
    }

    /// Returns the set of admin user IDs.
    #[must_use]
    pub fn admin_users(&self) -> HashSet<i64> {
        self.admin_users_str
            .as_ref()
            .map(|s| {
                s.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
                    .filter(|token| !token.is_empty())
                    .filter_map(|id| id.parse::<i64>().ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Combined settings used by the Telegram transport layer.
#[derive(Clone)]
pub struct BotSettings {
    /// Admission control settings.
    pub gate: Arc<GateSettings>,
    /// Collaborator endpoints.
    pub services: Arc<ServiceSettings>,
    /// Telegram-specific settings.
    pub telegram: Arc<TelegramSettings>,
}

impl BotSettings {
    /// Create a new combined settings bundle.
    #[must_use]
    pub fn new(gate: GateSettings, services: ServiceSettings, telegram: TelegramSettings) -> Self {
        Self {
            gate: Arc::new(gate),
            services: Arc::new(services),
            telegram: Arc::new(telegram),
        }
    }
}

/// Maximum attempts for a Telegram API call.
pub const TELEGRAM_API_MAX_RETRIES: usize = 3;
/// Initial backoff between Telegram API retries, in milliseconds.
pub const TELEGRAM_API_INITIAL_BACKOFF_MS: u64 = 200;
/// Upper bound on the backoff between retries, in milliseconds.
pub const TELEGRAM_API_MAX_BACKOFF_MS: u64 = 5_000;
