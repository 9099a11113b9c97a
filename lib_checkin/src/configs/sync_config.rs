use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, SyncError};

/// Configuration for one sync client instance.
///
/// Every field has a default, so a JSON document only needs the keys it
/// wants to change:
///
/// ```rust
/// use lib_checkin::SyncConfig;
///
/// let config: SyncConfig = serde_json::from_str(r#"{"baseUrl":"https://api.example.com"}"#).unwrap();
/// assert_eq!(config.ws_url().unwrap(), "wss://api.example.com/ws");
/// assert_eq!(config.max_reconnect_attempts, 5);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    /// HTTP(S) base URL of the API server.
    pub base_url: String,
    /// Path appended to the derived socket URL.
    pub ws_path: String,
    /// Bearer token sent in the CONNECT frame.
    pub auth_token: Option<String>,
    pub max_reconnect_attempts: u32,
    pub reconnect_base_delay_ms: u64,
    /// Largest power of two applied to the base delay.
    pub reconnect_cap_exponent: u32,
    /// Interval at which this client promises to send heartbeats. 0 disables.
    pub heartbeat_outgoing_ms: u64,
    /// Interval at which this client asks the server to send heartbeats.
    pub heartbeat_incoming_ms: u64,
    /// Inbound silence after which the connection is treated as failed. 0 disables.
    pub heartbeat_timeout_ms: u64,
    /// Budget for socket open + CONNECT + first inbound frame.
    pub connect_timeout_ms: u64,
    /// Capacity of each broadcast stream; slow consumers lose the oldest events.
    pub event_buffer_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            ws_path: "/ws".to_string(),
            auth_token: None,
            max_reconnect_attempts: 5,
            reconnect_base_delay_ms: 1000,
            reconnect_cap_exponent: 4,
            heartbeat_outgoing_ms: 10_000,
            heartbeat_incoming_ms: 10_000,
            heartbeat_timeout_ms: 0,
            connect_timeout_ms: 10_000,
            event_buffer_size: 256,
        }
    }
}

impl SyncConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Derives the socket URL: `http` becomes `ws`, `https` becomes `wss`,
    /// and `ws_path` is appended to the base path. Any query or fragment on
    /// the base URL is dropped.
    pub fn ws_url(&self) -> Result<String> {
        let invalid = |reason: String| SyncError::InvalidUrl {
            url: self.base_url.clone(),
            reason,
        };

        let mut url = Url::parse(self.base_url.trim()).map_err(|e| invalid(e.to_string()))?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(invalid(format!("unsupported scheme '{}'", other))),
        };
        url.set_scheme(scheme)
            .map_err(|_| invalid(format!("cannot switch scheme to '{}'", scheme)))?;

        let path = format!(
            "{}/{}",
            url.path().trim_end_matches('/'),
            self.ws_path.trim_start_matches('/')
        );
        url.set_path(&path);
        url.set_query(None);
        url.set_fragment(None);
        Ok(url.into())
    }

    pub fn validate(&self) -> Result<()> {
        if self.event_buffer_size == 0 {
            return Err(SyncError::Config("eventBufferSize must be greater than zero".to_string()));
        }
        if self.reconnect_base_delay_ms == 0 {
            return Err(SyncError::Config(
                "reconnectBaseDelayMs must be greater than zero".to_string(),
            ));
        }
        self.ws_url().map(|_| ())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn heartbeat_outgoing(&self) -> Option<Duration> {
        (self.heartbeat_outgoing_ms > 0).then(|| Duration::from_millis(self.heartbeat_outgoing_ms))
    }

    pub fn heartbeat_timeout(&self) -> Option<Duration> {
        (self.heartbeat_timeout_ms > 0).then(|| Duration::from_millis(self.heartbeat_timeout_ms))
    }
}
