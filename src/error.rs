//! Error types for the chat client
//!
//! Transport failures are absorbed by the reconnect loop and never reach
//! the caller as errors; what remains here is caller misuse, configuration
//! problems and the errors a `Link` reports to the driver.

use thiserror::Error;

/// Client-level errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// WebSocket protocol error (ends the current link)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Server endpoint could not be parsed
    #[error("Invalid server URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Server endpoint is not a WebSocket URL
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    /// Operation called before `connect`
    #[error("Session is not connected")]
    NotConnected,

    /// `connect` called while a session driver is already running
    #[error("Session is already connected")]
    AlreadyConnected,

    /// Internal channel broken (driver or link gone)
    #[error("Channel closed")]
    ChannelClosed,
}
