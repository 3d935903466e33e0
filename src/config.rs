use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_RETRIES: usize = 2;
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_RETRY_STATUSES: [u16; 5] = [408, 429, 502, 503, 504];

/// Configures the target service, default headers, and timeout/retry policy.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Base URL every request path is resolved against.
    pub base_url: String,
    /// Headers sent with every request; per-call headers override them.
    #[serde(default)]
    pub default_headers: BTreeMap<String, String>,
    /// Retry attempts beyond the first try.
    #[serde(default = "default_retries")]
    pub retries: usize,
    /// Response statuses that trigger a retry while attempts remain.
    #[serde(default = "default_retry_statuses")]
    pub retry_statuses: BTreeSet<u16>,
    /// Per-attempt timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
}

fn default_retries() -> usize {
    DEFAULT_RETRIES
}

fn default_retry_statuses() -> BTreeSet<u16> {
    DEFAULT_RETRY_STATUSES.into_iter().collect()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: BTreeMap<&str, &str> = self
            .default_headers
            .iter()
            .map(|(name, value)| {
                if name.eq_ignore_ascii_case("authorization") {
                    (name.as_str(), "<redacted>")
                } else {
                    (name.as_str(), value.as_str())
                }
            })
            .collect();
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("default_headers", &headers)
            .field("retries", &self.retries)
            .field("retry_statuses", &self.retry_statuses)
            .field("default_timeout_ms", &self.default_timeout_ms)
            .finish()
    }
}

impl ClientConfig {
    /// Creates a config for `base_url` with the default retry and timeout policy.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            default_headers: BTreeMap::new(),
            retries: DEFAULT_RETRIES,
            retry_statuses: default_retry_statuses(),
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_retry_statuses<I>(mut self, statuses: I) -> Self
    where
        I: IntoIterator<Item = u16>,
    {
        self.retry_statuses = statuses.into_iter().collect();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.default_timeout_ms = timeout_ms;
        self
    }

    /// Total attempts for one logical request: the first try plus `retries`.
    pub fn max_attempts(&self) -> usize {
        self.retries.saturating_add(1)
    }

    /// Creates a config from environment variables sharing `prefix`.
    ///
    /// Reads:
    /// - `<PREFIX>_BASE_URL`: required
    /// - `<PREFIX>_TIMEOUT_MS`: optional, positive integer
    /// - `<PREFIX>_RETRIES`: optional, non-negative integer
    ///
    /// # Example
    ///
    /// ```no_run
    /// use resilient_http::ClientConfig;
    ///
    /// let config = ClientConfig::from_env("USERS_API").expect("missing USERS_API_* env vars");
    /// ```
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        Self::from_lookup(prefix, |name| std::env::var(name).ok())
    }

    fn from_lookup<F>(prefix: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url_var = format!("{prefix}_BASE_URL");
        let base_url = lookup(&url_var).ok_or_else(|| ConfigError::Missing(url_var.clone()))?;
        if base_url.trim().is_empty() {
            return Err(ConfigError::Empty(url_var));
        }

        let mut config = Self::new(base_url.trim());

        let timeout_var = format!("{prefix}_TIMEOUT_MS");
        if let Some(raw) = lookup(&timeout_var) {
            config.default_timeout_ms = match raw.trim().parse::<u64>() {
                Ok(value) if value > 0 => value,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: timeout_var,
                        value: raw,
                        expected: "a positive integer",
                    })
                }
            };
        }

        let retries_var = format!("{prefix}_RETRIES");
        if let Some(raw) = lookup(&retries_var) {
            config.retries = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                name: retries_var,
                value: raw.clone(),
                expected: "a non-negative integer",
            })?;
        }

        Ok(config)
    }
}
