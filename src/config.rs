//! Client configuration.
//!
//! Values come from defaults, then environment variables, then CLI flags
//! (the binary passes its parsed flags through [`ClientConfig::with_api_url`]
//! and friends).

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::{ClientError, Result};

pub const DEFAULT_API_URL: &str = "http://localhost:8080";
pub const DEFAULT_DB_PATH: &str = ".kairo_db";

pub const API_URL_ENV: &str = "KAIRO_API_URL";
pub const DB_PATH_ENV: &str = "KAIRO_DB_PATH";
pub const REQUEST_TIMEOUT_ENV: &str = "KAIRO_REQUEST_TIMEOUT_SECS";

/// Idle window after the last keystroke before the editor saves on its own.
pub const AUTO_SAVE_DELAY: Duration = Duration::from_secs(2);
pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);
pub const REMINDER_POLL_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const SNOOZE_DURATION: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: Url,
    pub db_path: PathBuf,
    pub request_timeout: Duration,
    pub auto_save_delay: Duration,
    pub search_debounce: Duration,
    pub reminder_poll_interval: Duration,
    pub snooze: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: Url::parse(DEFAULT_API_URL).expect("default API URL is valid"),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            request_timeout: Duration::from_secs(15),
            auto_save_delay: AUTO_SAVE_DELAY,
            search_debounce: SEARCH_DEBOUNCE,
            reminder_poll_interval: REMINDER_POLL_INTERVAL,
            snooze: SNOOZE_DURATION,
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `KAIRO_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(url) = env::var(API_URL_ENV) {
            config = config.with_api_url(&url)?;
        }
        if let Ok(path) = env::var(DB_PATH_ENV) {
            config.db_path = PathBuf::from(path);
        }
        if let Ok(secs) = env::var(REQUEST_TIMEOUT_ENV) {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                ClientError::Config(format!("{} must be a number of seconds", REQUEST_TIMEOUT_ENV))
            })?;
            config.request_timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    pub fn with_api_url(mut self, raw: &str) -> Result<Self> {
        self.api_url = parse_api_url(raw)?;
        Ok(self)
    }

    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = path.into();
        self
    }
}

/// Parse and validate the backend base URL: http(s) with a host.
pub fn parse_api_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ClientError::Config(format!(
                "unsupported URL scheme '{}', expected http or https",
                other
            )))
        }
    }
    if url.host_str().map(|h| h.is_empty()).unwrap_or(true) {
        return Err(ClientError::Config("API URL has no host".to_string()));
    }
    Ok(url)
}
