//! Configuration types, loaded from the environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default skip-token: a literal meaning "leave this field unset".
pub const DEFAULT_SKIP_TOKEN: &str = "-";

/// First day of every month at 09:00 UTC (sec min hour dom month dow).
pub const DEFAULT_ACCRUAL_SCHEDULE: &str = "0 0 9 1 * *";

/// Bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Bot name for identification in logs.
    pub name: String,
    /// Path to the libSQL database file.
    pub db_path: PathBuf,
    /// Telegram bot token. Telegram is disabled when unset.
    pub telegram_token: Option<SecretString>,
    /// Whether to run the stdin/stdout channel.
    pub cli_enabled: bool,
    /// Literal that skips the current step without setting its field.
    pub skip_token: String,
    /// Drafts untouched for longer than this are evicted.
    pub draft_idle_timeout: Duration,
    /// How often the eviction sweep runs.
    pub draft_prune_interval: Duration,
    /// Number of cities offered as suggestions.
    pub top_cities_limit: usize,
    pub accrual: AccrualConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: "devfolio-bot".to_string(),
            db_path: PathBuf::from("./data/devfolio.db"),
            telegram_token: None,
            cli_enabled: true,
            skip_token: DEFAULT_SKIP_TOKEN.to_string(),
            draft_idle_timeout: Duration::from_secs(3600), // 1 hour
            draft_prune_interval: Duration::from_secs(600), // 10 minutes
            top_cities_limit: 10,
            accrual: AccrualConfig::default(),
        }
    }
}

impl BotConfig {
    /// Build the configuration from `DEVFOLIO_*` and `TELEGRAM_BOT_TOKEN`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let db_path = std::env::var("DEVFOLIO_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let telegram_token = std::env::var("TELEGRAM_BOT_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .map(SecretString::from);

        // The CLI is the fallback surface when no Telegram token is configured.
        let cli_enabled = std::env::var("DEVFOLIO_CLI")
            .ok()
            .map(|v| parse_flag(&v))
            .unwrap_or(telegram_token.is_none());

        let skip_token = std::env::var("DEVFOLIO_SKIP_TOKEN")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.skip_token);

        let draft_idle_secs: u64 = std::env::var("DEVFOLIO_DRAFT_IDLE_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.draft_idle_timeout.as_secs());

        let top_cities_limit: usize = std::env::var("DEVFOLIO_TOP_CITIES_LIMIT")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.top_cities_limit);

        Ok(Self {
            db_path,
            telegram_token,
            cli_enabled,
            skip_token,
            draft_idle_timeout: Duration::from_secs(draft_idle_secs),
            top_cities_limit,
            accrual: AccrualConfig::from_env()?,
            ..defaults
        })
    }
}

/// Settings for the monthly experience accrual job.
#[derive(Debug, Clone)]
pub struct AccrualConfig {
    pub enabled: bool,
    /// Cron expression with a leading seconds field.
    pub schedule: String,
}

impl Default for AccrualConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            schedule: DEFAULT_ACCRUAL_SCHEDULE.to_string(),
        }
    }
}

impl AccrualConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let enabled = std::env::var("DEVFOLIO_ACCRUAL_ENABLED")
            .ok()
            .map(|v| parse_flag(&v))
            .unwrap_or(true);

        let schedule = std::env::var("DEVFOLIO_ACCRUAL_SCHEDULE")
            .unwrap_or_else(|_| DEFAULT_ACCRUAL_SCHEDULE.to_string());

        if let Err(e) = cron::Schedule::from_str(&schedule) {
            return Err(ConfigError::InvalidValue {
                key: "DEVFOLIO_ACCRUAL_SCHEDULE".to_string(),
                message: e.to_string(),
            });
        }

        Ok(Self { enabled, schedule })
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
