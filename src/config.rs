//! Client configuration: endpoint, scheme, headers and timeouts.
//!
//! Built in code with the `with_*` setters, or from environment variables with
//! [`ClientConfig::from_env`].

use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 3600;
pub const DEFAULT_PING_TIMEOUT_SECS: u64 = 20;

/// Failure to build a [`ClientConfig`] from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: {message}")]
    Invalid { var: &'static str, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Host and optional port, without scheme (e.g. `"stack.example.com"`).
    pub hostname: String,
    /// Selects `https`/`wss` when true, `http`/`ws` otherwise.
    pub secure: bool,
    /// Extra headers sent on every request and on the WebSocket upgrade.
    pub headers: BTreeMap<String, String>,
    /// Ceiling applied to every REST call.
    pub request_timeout: Duration,
    /// Client-initiated ping cadence. `None` disables client pings.
    pub ping_interval: Option<Duration>,
    /// WebSocket handshake deadline.
    pub ping_timeout: Duration,
}

impl ClientConfig {
    pub fn new(hostname: impl Into<String>) -> Self {
        let hostname = hostname.into().trim_end_matches('/').to_string();
        Self {
            hostname,
            secure: true,
            headers: BTreeMap::new(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            ping_interval: None,
            ping_timeout: Duration::from_secs(DEFAULT_PING_TIMEOUT_SECS),
        }
    }

    /// Build config from environment variables.
    ///
    /// Required:
    /// - `STACK_HOSTNAME`
    ///
    /// Optional:
    /// - `STACK_SECURE`: `true` (default) / `false`, or `1` / `0`
    /// - `STACK_REQUEST_TIMEOUT_SECS`: default 3600
    /// - `STACK_PING_INTERVAL_SECS`: unset or `0` disables client pings
    /// - `STACK_PING_TIMEOUT_SECS`: default 20
    /// - `STACK_HEADERS`: comma-separated `Name: value` pairs
    ///
    /// # Errors
    ///
    /// Returns an error if the hostname is missing or a value does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with_hostname(None)
    }

    /// Like [`ClientConfig::from_env`], but `hostname` (when given) replaces
    /// `STACK_HOSTNAME`. Every other variable still applies.
    ///
    /// # Errors
    ///
    /// Returns an error if no hostname is available or a value does not parse.
    pub fn from_env_with_hostname(hostname: Option<String>) -> Result<Self, ConfigError> {
        let hostname = match hostname {
            Some(hostname) => hostname,
            None => std::env::var("STACK_HOSTNAME").map_err(|_| ConfigError::Missing("STACK_HOSTNAME"))?,
        };
        if hostname.trim().is_empty() {
            return Err(ConfigError::Missing("STACK_HOSTNAME"));
        }

        let mut config = Self::new(hostname.trim());
        if let Ok(raw) = std::env::var("STACK_SECURE") {
            config.secure = parse_bool("STACK_SECURE", &raw)?;
        }
        if let Some(secs) = env_parse_u64("STACK_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse_u64("STACK_PING_INTERVAL_SECS")? {
            config.ping_interval = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(secs) = env_parse_u64("STACK_PING_TIMEOUT_SECS")? {
            config.ping_timeout = Duration::from_secs(secs);
        }
        if let Ok(raw) = std::env::var("STACK_HEADERS") {
            config.headers = parse_headers(&raw)?;
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_ping_interval(mut self, interval: Option<Duration>) -> Self {
        self.ping_interval = interval;
        self
    }

    #[must_use]
    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    /// `http://host` or `https://host`.
    #[must_use]
    pub fn http_base_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{scheme}://{}", self.hostname)
    }

    /// `ws://host/ws` or `wss://host/ws`.
    #[must_use]
    pub fn ws_url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{scheme}://{}/ws", self.hostname)
    }
}

fn env_parse_u64(var: &'static str) -> Result<Option<u64>, ConfigError> {
    let Ok(raw) = std::env::var(var) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<u64>()
        .map(Some)
        .map_err(|e| ConfigError::Invalid { var, message: e.to_string() })
}

fn parse_bool(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(ConfigError::Invalid { var, message: format!("expected a boolean, got '{other}'") }),
    }
}

fn parse_headers(raw: &str) -> Result<BTreeMap<String, String>, ConfigError> {
    let mut headers = BTreeMap::new();
    for pair in raw.split(',').map(str::trim).filter(|pair| !pair.is_empty()) {
        let Some((name, value)) = pair.split_once(':') else {
            return Err(ConfigError::Invalid {
                var: "STACK_HEADERS",
                message: format!("expected 'Name: value', got '{pair}'"),
            });
        };
        headers.insert(name.trim().to_string(), value.trim().to_string());
    }
    Ok(headers)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
