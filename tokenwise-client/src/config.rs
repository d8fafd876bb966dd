//! Backend location and connection timing
//!
//! Everything is derived from one backend base URL. The REST API lives under
//! `{base}/api`, and the stream endpoint is the same origin with the scheme
//! switched to `ws`/`wss` and `/ws/transactions` appended.

use std::time::Duration;

use tokenwise_core::{TokenwiseError, TokenwiseResult};
use tracing::warn;
use url::Url;

/// Backend used when nothing is configured
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

/// Heartbeat interval while the stream is open
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Delay between a close and the reconnection attempt
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Limit on one stream connection attempt, upgrade included
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-request timeout for REST calls
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const STREAM_PATH: &str = "/ws/transactions";

/// Timers driving the stream lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamTiming {
    pub heartbeat_interval: Duration,
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
}

impl Default for StreamTiming {
    fn default() -> Self {
        Self {
            heartbeat_interval: HEARTBEAT_INTERVAL,
            reconnect_delay: RECONNECT_DELAY,
            connect_timeout: CONNECT_TIMEOUT,
        }
    }
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    backend_url: Url,
    pub request_timeout: Duration,
    pub stream: StreamTiming,
}

impl ClientConfig {
    /// Create a config for the given backend base URL (`http` or `https`)
    pub fn new(backend_url: &str) -> TokenwiseResult<Self> {
        let backend_url = Url::parse(backend_url).map_err(|e| {
            TokenwiseError::config(format!("Invalid backend URL '{}': {}", backend_url, e))
        })?;

        match backend_url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(TokenwiseError::config(format!(
                    "Backend URL must use http or https, got '{}'",
                    other
                )))
            }
        }

        if backend_url.host_str().is_none() {
            return Err(TokenwiseError::config("Backend URL has no host"));
        }

        Ok(Self {
            backend_url,
            request_timeout: REQUEST_TIMEOUT,
            stream: StreamTiming::default(),
        })
    }

    /// Build from environment variables
    ///
    /// - `TOKENWISE_BACKEND_URL` (or `BACKEND_URL`), default `http://localhost:8000`
    /// - `TOKENWISE_REQUEST_TIMEOUT_SECS`
    /// - `TOKENWISE_HEARTBEAT_SECS`
    /// - `TOKENWISE_RECONNECT_DELAY_SECS`
    /// - `TOKENWISE_CONNECT_TIMEOUT_SECS`
    pub fn from_env() -> TokenwiseResult<Self> {
        let backend_url = std::env::var("TOKENWISE_BACKEND_URL")
            .or_else(|_| std::env::var("BACKEND_URL"))
            .unwrap_or_else(|_| DEFAULT_BACKEND_URL.to_string());

        let mut config = Self::new(&backend_url)?;

        if let Some(timeout) = env_secs("TOKENWISE_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = timeout;
        }
        if let Some(interval) = env_secs("TOKENWISE_HEARTBEAT_SECS") {
            config.stream.heartbeat_interval = interval;
        }
        if let Some(delay) = env_secs("TOKENWISE_RECONNECT_DELAY_SECS") {
            config.stream.reconnect_delay = delay;
        }
        if let Some(timeout) = env_secs("TOKENWISE_CONNECT_TIMEOUT_SECS") {
            config.stream.connect_timeout = timeout;
        }

        Ok(config)
    }

    /// Override the stream timers
    pub fn with_stream_timing(mut self, timing: StreamTiming) -> Self {
        self.stream = timing;
        self
    }

    pub fn backend_url(&self) -> &Url {
        &self.backend_url
    }

    /// Base for REST calls, without a trailing slash
    pub fn api_base(&self) -> String {
        format!("{}/api", self.base_without_trailing_slash())
    }

    /// Stream endpoint; encrypted iff the backend origin is
    pub fn stream_url(&self) -> String {
        let scheme = if self.backend_url.scheme() == "https" {
            "wss"
        } else {
            "ws"
        };
        let base = self.base_without_trailing_slash();
        let rest = base.split_once("://").map(|(_, rest)| rest).unwrap_or(&base);
        format!("{}://{}{}", scheme, rest, STREAM_PATH)
    }

    fn base_without_trailing_slash(&self) -> String {
        let mut base = self.backend_url.clone();
        base.set_query(None);
        base.set_fragment(None);
        base.as_str().trim_end_matches('/').to_string()
    }
}

fn env_secs(name: &str) -> Option<Duration> {
    let raw = std::env::var(name).ok()?;
    match raw.parse::<u64>() {
        Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
        _ => {
            warn!("Ignoring invalid {}='{}' (expected positive seconds)", name, raw);
            None
        }
    }
}
