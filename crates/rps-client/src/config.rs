//! Client configuration from environment variables.

use std::env;
use std::time::Duration;

use tracing::{error, warn};

use crate::algorithms::DEFAULT_LEADERBOARD_SIZE;
use crate::domain::{ConfigError, LeaderboardMode};

/// Default auto-refresh period.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Default realtime event rate hint.
pub const DEFAULT_EVENTS_PER_SECOND: u32 = 10;

/// Default HTTP timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Deployment kind. Decides whether missing credentials are fatal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Environment {
    /// Local development: missing credentials only warn.
    #[default]
    Development,
    /// Production: missing credentials are an error.
    Production,
}

/// How standings are computed and how many are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaderboardSettings {
    /// Raw aggregation or precomputed statistics.
    pub mode: LeaderboardMode,
    /// Top-N cut.
    pub size: usize,
    /// Raw mode only: aggregate just the most recent N rounds.
    pub sample_limit: Option<usize>,
}

impl Default for LeaderboardSettings {
    fn default() -> Self {
        Self {
            mode: LeaderboardMode::Raw,
            size: DEFAULT_LEADERBOARD_SIZE,
            sample_limit: None,
        }
    }
}

/// Behavioural settings for the client services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientSettings {
    /// Leaderboard computation.
    pub leaderboard: LeaderboardSettings,
    /// Auto-refresh period.
    pub poll_interval: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            leaderboard: LeaderboardSettings::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Remote store connection plus client settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Base URL of the hosted service.
    pub url: Option<String>,
    /// Public (anon) API key.
    pub anon_key: Option<String>,
    /// Deployment kind.
    pub environment: Environment,
    /// Realtime event rate hint.
    pub events_per_second: u32,
    /// HTTP request timeout.
    pub request_timeout: Duration,
    /// Service settings.
    pub settings: ClientSettings,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            anon_key: None,
            environment: Environment::Development,
            events_per_second: DEFAULT_EVENTS_PER_SECOND,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            settings: ClientSettings::default(),
        }
    }
}

impl StoreConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `SUPABASE_URL` / `VITE_SUPABASE_URL`: base URL
    /// - `SUPABASE_ANON_KEY` / `VITE_SUPABASE_ANON_KEY`: public key
    /// - `RPS_ENV`: `production` or `development` (default)
    /// - `RPS_LEADERBOARD_MODE`: `raw` (default) or `stats`
    /// - `RPS_LEADERBOARD_SIZE`: top-N (default 20)
    /// - `RPS_LEADERBOARD_SAMPLE`: raw mode row cap (default none)
    /// - `RPS_POLL_INTERVAL_SECS`: auto-refresh period (default 30)
    /// - `RPS_REALTIME_EVENTS_PER_SECOND`: default 10
    /// - `RPS_REQUEST_TIMEOUT_SECS`: default 10
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`StoreConfig::from_env`] over an arbitrary lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let number = |key: &str| non_empty(key).and_then(|v| v.trim().parse::<u64>().ok());

        let environment = match non_empty("RPS_ENV").map(|v| v.to_lowercase()).as_deref() {
            Some("production") | Some("prod") => Environment::Production,
            _ => Environment::Development,
        };

        let mode = match non_empty("RPS_LEADERBOARD_MODE") {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to raw leaderboard mode");
                LeaderboardMode::Raw
            }),
            None => LeaderboardMode::Raw,
        };

        Self {
            url: non_empty("SUPABASE_URL").or_else(|| non_empty("VITE_SUPABASE_URL")),
            anon_key: non_empty("SUPABASE_ANON_KEY").or_else(|| non_empty("VITE_SUPABASE_ANON_KEY")),
            environment,
            events_per_second: number("RPS_REALTIME_EVENTS_PER_SECOND")
                .map(|v| v as u32)
                .unwrap_or(DEFAULT_EVENTS_PER_SECOND),
            request_timeout: number("RPS_REQUEST_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            settings: ClientSettings {
                leaderboard: LeaderboardSettings {
                    mode,
                    size: number("RPS_LEADERBOARD_SIZE")
                        .map(|v| v as usize)
                        .filter(|v| *v > 0)
                        .unwrap_or(DEFAULT_LEADERBOARD_SIZE),
                    sample_limit: number("RPS_LEADERBOARD_SAMPLE").map(|v| v as usize),
                },
                poll_interval: number("RPS_POLL_INTERVAL_SECS")
                    .filter(|v| *v > 0)
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_POLL_INTERVAL),
            },
        }
    }

    /// Check that the store can be reached.
    ///
    /// Missing credentials are fatal in production and a warning otherwise.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url_set = self.url.is_some();
        let key_set = self.anon_key.is_some();
        if url_set && key_set {
            return Ok(());
        }

        let err = ConfigError::MissingCredentials { url_set, key_set };
        match self.environment {
            Environment::Production => {
                error!(url_set, key_set, "Remote store credentials are not configured");
                Err(err)
            }
            Environment::Development => {
                warn!(url_set, key_set, "Remote store credentials are not configured");
                Ok(())
            }
        }
    }

    /// Both credentials, or the error describing which one is missing.
    pub fn credentials(&self) -> Result<(&str, &str), ConfigError> {
        match (self.url.as_deref(), self.anon_key.as_deref()) {
            (Some(url), Some(key)) => Ok((url, key)),
            (url, key) => Err(ConfigError::MissingCredentials {
                url_set: url.is_some(),
                key_set: key.is_some(),
            }),
        }
    }
}
