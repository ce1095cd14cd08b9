//! Devices reported by the feedback service.

use chrono::{DateTime, Utc};
use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};

/// A device that no longer accepts notifications.
///
/// Immutable once built; serializes as `{"token": "<hex>", "timestamp": <secs>}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    token: String,
    timestamp: u32,
}

impl Device {
    /// Build from a raw binary token and the feedback timestamp.
    pub fn from_raw(token: &[u8], timestamp: u32) -> Self {
        Self {
            token: HEXLOWER.encode(token),
            timestamp,
        }
    }

    /// Lowercase hex device token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// UTC epoch seconds at which the gateway saw the app disappear.
    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    /// `timestamp` as a UTC date.
    pub fn unregistered_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(i64::from(self.timestamp), 0)
    }

    /// Pretty-printed JSON representation.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
