//! Session configuration.

use std::time::Duration;

/// Default auto-refresh period of the queue poller.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(3000);

/// Default STOMP topic carrying match results.
pub const DEFAULT_MATCH_TOPIC: &str = "/topic/matches";

/// Default path of the raw-WebSocket STOMP endpoint, relative to the base URL.
pub const DEFAULT_WS_PATH: &str = "/ws-match/websocket";

const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;
const DEFAULT_MATCH_LOG_CAPACITY: usize = 50;
const DEFAULT_STATUS_LOG_CAPACITY: usize = 200;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Configuration for a [`SessionController`](crate::session::SessionController).
///
/// Only the base URL is required; everything else has a default.
///
/// # Example
///
/// ```
/// use matchmaking_session::config::SessionConfig;
/// use std::time::Duration;
///
/// let config = SessionConfig::new("http://localhost:8080")
///     .with_refresh_interval(Duration::from_secs(5));
/// assert_eq!(config.ws_url, "ws://localhost:8080/ws-match/websocket");
/// assert_eq!(config.match_topic, "/topic/matches");
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Base URL of the REST API, e.g. `http://localhost:8080`.
    pub base_url: String,
    /// URL of the STOMP WebSocket endpoint.
    ///
    /// Derived from `base_url` unless overridden.
    pub ws_url: String,
    /// Topic subscribed to on connect.
    pub match_topic: String,
    /// Auto-refresh period. Defaults to **3000 ms**; zero falls back to it.
    pub refresh_interval: Duration,
    /// Match log length kept in the view.
    pub match_log_capacity: usize,
    /// Status log length kept in the view.
    pub status_log_capacity: usize,
    /// Per-request timeout of the REST client.
    pub request_timeout: Duration,
    /// Time allowed for the WebSocket to open and the STOMP `CONNECTED` reply.
    pub handshake_timeout: Duration,
    /// Time the link loop gets to release the subscription and close the
    /// transport before it is aborted.
    pub shutdown_timeout: Duration,
    /// Capacity of the channel carrying match results and queue snapshots.
    /// Values below 1 are clamped to 1. Control events are never dropped.
    pub event_channel_capacity: usize,
}

impl SessionConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let ws_url = derive_ws_url(&base_url);
        Self {
            base_url,
            ws_url,
            match_topic: DEFAULT_MATCH_TOPIC.to_string(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            match_log_capacity: DEFAULT_MATCH_LOG_CAPACITY,
            status_log_capacity: DEFAULT_STATUS_LOG_CAPACITY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }

    #[must_use]
    pub fn with_ws_url(mut self, ws_url: impl Into<String>) -> Self {
        self.ws_url = ws_url.into();
        self
    }

    #[must_use]
    pub fn with_match_topic(mut self, topic: impl Into<String>) -> Self {
        self.match_topic = topic.into();
        self
    }

    /// Zero falls back to the 3000 ms default.
    #[must_use]
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = effective_interval(interval);
        self
    }

    #[must_use]
    pub fn with_match_log_capacity(mut self, capacity: usize) -> Self {
        self.match_log_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Host name sent in the STOMP `CONNECT` frame.
    pub fn stomp_host(&self) -> String {
        reqwest::Url::parse(&self.ws_url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| "localhost".to_string())
    }
}

/// Zero means "use the default".
pub fn effective_interval(interval: Duration) -> Duration {
    if interval.is_zero() {
        DEFAULT_REFRESH_INTERVAL
    } else {
        interval
    }
}

/// `http://h/p` → `ws://h/p/ws-match/websocket`, `https` → `wss`.
fn derive_ws_url(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    let swapped = if let Some(rest) = trimmed.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        trimmed.to_string()
    };
    format!("{swapped}{DEFAULT_WS_PATH}")
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = SessionConfig::new("http://localhost:8080/");
        assert_eq!(config.ws_url, "ws://localhost:8080/ws-match/websocket");
        assert_eq!(config.refresh_interval, Duration::from_millis(3000));
        assert_eq!(config.match_log_capacity, 50);
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
    }

    #[test]
    fn https_maps_to_wss() {
        let config = SessionConfig::new("https://mm.example.com");
        assert_eq!(config.ws_url, "wss://mm.example.com/ws-match/websocket");
        assert_eq!(config.stomp_host(), "mm.example.com");
    }

    #[test]
    fn builder_methods() {
        let config = SessionConfig::new("http://h")
            .with_ws_url("ws://other:9000/stomp")
            .with_match_topic("/topic/other")
            .with_refresh_interval(Duration::ZERO)
            .with_event_channel_capacity(0);
        assert_eq!(config.ws_url, "ws://other:9000/stomp");
        assert_eq!(config.stomp_host(), "other");
        assert_eq!(config.match_topic, "/topic/other");
        assert_eq!(config.refresh_interval, DEFAULT_REFRESH_INTERVAL);
        assert_eq!(config.event_channel_capacity, 1);
    }
}
