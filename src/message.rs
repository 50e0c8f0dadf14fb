//! Chat message model
//!
//! `ChatMessage` is built from the loosely-typed payload of an inbound
//! `message` event. Anything malformed yields no message at all.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::types::MessageId;

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// One entry of the chat feed
///
/// Immutable once parsed. The `id` is generated locally and is never
/// derived from the payload, so identical payloads give distinct messages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    id: MessageId,
    user: String,
    text: String,
    timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Parse an inbound `message` payload
    ///
    /// Requires a string `user`, a string `text` and a numeric `timestamp`
    /// in seconds since the Unix epoch. Returns `None` if any of them is
    /// missing or mistyped, or if `payload` is not an object.
    pub fn parse(payload: &Value) -> Option<Self> {
        let user = payload.get("user")?.as_str()?;
        let text = payload.get("text")?.as_str()?;
        let seconds = payload.get("timestamp")?.as_f64()?;
        let timestamp = from_epoch_seconds(seconds)?;

        Some(Self {
            id: MessageId::new(),
            user: user.to_string(),
            text: text.to_string(),
            timestamp,
        })
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Display name of the author
    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Convert epoch seconds (possibly fractional) to an absolute time
fn from_epoch_seconds(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }

    let whole = seconds.floor();
    let nanos = ((seconds - whole) * NANOS_PER_SEC).round();
    let (whole, nanos) = if nanos >= NANOS_PER_SEC {
        (whole + 1.0, 0.0)
    } else {
        (whole, nanos)
    };

    DateTime::from_timestamp(whole as i64, nanos as u32)
}

/// Epoch seconds of `at`, with sub-second precision
pub(crate) fn epoch_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp() as f64 + f64::from(at.timestamp_subsec_nanos()) / NANOS_PER_SEC
}
