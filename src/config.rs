//! Client configuration parsed from environment variables.

use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";
pub const DEFAULT_SOCKET_PATH: &str = "/socket.io/";
pub const DEFAULT_CRANE_ID: u32 = 1;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_RECONNECT_INITIAL_MS: u64 = 1000;
pub const DEFAULT_RECONNECT_MAX_MS: u64 = 10_000;
pub const DEFAULT_TOAST_TTL_MS: u64 = 4000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid base URL {0:?}: expected http:// or https://")]
    InvalidBaseUrl(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

/// Exponential reconnect backoff for the event channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_ms: u64,
    pub max_ms: u64,
}

impl ReconnectPolicy {
    /// Delay after `delay_ms`: doubled, capped at `max_ms`.
    #[must_use]
    pub fn next_delay(self, delay_ms: u64) -> u64 {
        delay_ms.saturating_mul(2).min(self.max_ms)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { initial_ms: DEFAULT_RECONNECT_INITIAL_MS, max_ms: DEFAULT_RECONNECT_MAX_MS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YardConfig {
    /// Backend origin without a trailing slash.
    pub base_url: String,
    pub socket_path: String,
    /// Bound on coils kept by the live view.
    pub capacity: usize,
    /// Crane credited on manual coil registrations.
    pub crane_id: u32,
    pub timeouts: HttpTimeouts,
    pub reconnect: ReconnectPolicy,
    pub toast_ttl_ms: u64,
}

impl YardConfig {
    /// Build config from environment variables.
    ///
    /// Optional:
    /// - `COILYARD_BASE_URL`: default `http://localhost:5000`
    /// - `COILYARD_SOCKET_PATH`: default `/socket.io/`
    /// - `COILYARD_CAPACITY`: default 20
    /// - `COILYARD_CRANE_ID`: default 1, used by `/add_coil` only
    /// - `COILYARD_REQUEST_TIMEOUT_SECS`: default 10
    /// - `COILYARD_CONNECT_TIMEOUT_SECS`: default 5
    /// - `COILYARD_RECONNECT_INITIAL_MS`: default 1000
    /// - `COILYARD_RECONNECT_MAX_MS`: default 10000
    /// - `COILYARD_TOAST_TTL_MS`: default 4000
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBaseUrl`] when the base URL is not http(s).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`YardConfig::from_env`] with a custom variable source.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBaseUrl`] when the base URL is not http(s).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base_url = normalize_base_url(lookup("COILYARD_BASE_URL").as_deref().unwrap_or(DEFAULT_BASE_URL))?;
        let socket_path = lookup("COILYARD_SOCKET_PATH").unwrap_or_else(|| DEFAULT_SOCKET_PATH.to_owned());
        let parse = |key: &str, default: u64| lookup(key).and_then(|v| v.trim().parse::<u64>().ok()).unwrap_or(default);

        let capacity = lookup("COILYARD_CAPACITY")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|cap| *cap > 0)
            .unwrap_or(crate::store::DEFAULT_CAPACITY);
        let crane_id = lookup("COILYARD_CRANE_ID")
            .and_then(|v| v.trim().parse::<u32>().ok())
            .unwrap_or(DEFAULT_CRANE_ID);

        let initial_ms = parse("COILYARD_RECONNECT_INITIAL_MS", DEFAULT_RECONNECT_INITIAL_MS).max(1);
        let max_ms = parse("COILYARD_RECONNECT_MAX_MS", DEFAULT_RECONNECT_MAX_MS).max(initial_ms);

        Ok(Self {
            base_url,
            socket_path,
            capacity,
            crane_id,
            timeouts: HttpTimeouts {
                request_secs: parse("COILYARD_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
                connect_secs: parse("COILYARD_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
            },
            reconnect: ReconnectPolicy { initial_ms, max_ms },
            toast_ttl_ms: parse("COILYARD_TOAST_TTL_MS", DEFAULT_TOAST_TTL_MS),
        })
    }

    /// Defaults with an explicit backend origin.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBaseUrl`] when the base URL is not http(s).
    pub fn with_base_url(base_url: &str) -> Result<Self, ConfigError> {
        let mut config = Self::from_lookup(|_| None)?;
        config.base_url = normalize_base_url(base_url)?;
        Ok(config)
    }

    /// WebSocket URL of the realtime channel.
    #[must_use]
    pub fn ws_url(&self) -> String {
        let origin = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else {
            format!("ws://{}", self.base_url.trim_start_matches("http://"))
        };
        let path = self.socket_path.trim_matches('/');
        format!("{origin}/{path}/?EIO=4&transport=websocket")
    }

    #[must_use]
    pub fn toast_ttl(&self) -> Duration {
        Duration::from_millis(self.toast_ttl_ms)
    }
}

fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Ok(trimmed.to_owned())
    } else {
        Err(ConfigError::InvalidBaseUrl(raw.to_owned()))
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
