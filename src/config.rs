//! Session configuration
//!
//! Fixed at construction. Defaults match the lobby server: plain WebSocket
//! on localhost, unlimited reconnects two seconds apart, five second
//! acknowledgement timeout.

use std::time::Duration;

use url::Url;

use crate::error::ClientError;

/// Default server endpoint
pub const DEFAULT_URL: &str = "ws://localhost:3000";

/// The single room this client joins
pub const DEFAULT_ROOM: &str = "lobby";

/// Default delay between reconnect attempts
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Default wait for a message acknowledgement
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Reconnect behaviour after a lost link or failed handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Retry at all
    pub enabled: bool,
    /// Maximum consecutive attempts (None = unlimited)
    pub max_attempts: Option<u32>,
    /// Fixed wait before each attempt
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: None,
            delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl ReconnectPolicy {
    /// Whether attempt number `attempt` (1-based) may still be made
    pub fn allows(&self, attempt: u32) -> bool {
        self.enabled && self.max_attempts.map_or(true, |max| attempt <= max)
    }
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    url: Url,
    room: String,
    reconnect: ReconnectPolicy,
    ack_timeout: Duration,
    log_frames: bool,
}

impl SessionConfig {
    /// Create a configuration for the given endpoint
    ///
    /// The URL must use the `ws` or `wss` scheme.
    pub fn new(url: &str) -> Result<Self, ClientError> {
        let url = Url::parse(url)?;
        match url.scheme() {
            "ws" | "wss" => {}
            other => return Err(ClientError::UnsupportedScheme(other.to_string())),
        }

        Ok(Self {
            url,
            room: DEFAULT_ROOM.to_string(),
            reconnect: ReconnectPolicy::default(),
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            log_frames: true,
        })
    }

    pub fn with_room(mut self, room: impl Into<String>) -> Self {
        self.room = room.into();
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_ack_timeout(mut self, ack_timeout: Duration) -> Self {
        self.ack_timeout = ack_timeout;
        self
    }

    /// Trace every raw frame sent and received
    pub fn with_frame_logging(mut self, log_frames: bool) -> Self {
        self.log_frames = log_frames;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn reconnect(&self) -> &ReconnectPolicy {
        &self.reconnect
    }

    pub fn ack_timeout(&self) -> Duration {
        self.ack_timeout
    }

    pub fn log_frames(&self) -> bool {
        self.log_frames
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: Url::parse(DEFAULT_URL).expect("default URL is valid"),
            room: DEFAULT_ROOM.to_string(),
            reconnect: ReconnectPolicy::default(),
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            log_frames: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();

        assert_eq!(config.url().as_str(), "ws://localhost:3000/");
        assert_eq!(config.room(), "lobby");
        assert_eq!(config.ack_timeout(), Duration::from_secs(5));
        assert_eq!(config.reconnect().delay, Duration::from_secs(2));
        assert!(config.reconnect().max_attempts.is_none());
    }

    #[test]
    fn test_rejects_non_websocket_scheme() {
        let err = SessionConfig::new("http://localhost:3000").unwrap_err();
        assert!(matches!(err, ClientError::UnsupportedScheme(s) if s == "http"));

        assert!(matches!(
            SessionConfig::new("not a url"),
            Err(ClientError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_accepts_wss() {
        let config = SessionConfig::new("wss://chat.example.com/socket").unwrap();
        assert_eq!(config.url().host_str(), Some("chat.example.com"));
    }

    #[test]
    fn test_reconnect_policy_allows() {
        let unlimited = ReconnectPolicy::default();
        assert!(unlimited.allows(1));
        assert!(unlimited.allows(u32::MAX));

        let bounded = ReconnectPolicy {
            max_attempts: Some(2),
            ..ReconnectPolicy::default()
        };
        assert!(bounded.allows(2));
        assert!(!bounded.allows(3));

        let disabled = ReconnectPolicy {
            enabled: false,
            ..ReconnectPolicy::default()
        };
        assert!(!disabled.allows(1));
    }
}
