//! Error-response frames and the gateway status table.
//!
//! The gateway never acknowledges a good notification. When it rejects one it
//! writes a single 6-byte frame and closes the connection:
//!
//! ```text
//! [u8 command = 8] [u8 status] [i32 BE identifier]
//! ```

use crate::constants::{ERROR_RESPONSE_COMMAND, ERROR_RESPONSE_SIZE};

/// Message used for any status byte missing from [`STATUS_TABLE`].
pub const UNKNOWN_STATUS_MESSAGE: &str = "Unknown error";

/// Status code → message, ordered by code.
pub const STATUS_TABLE: [(u8, &str); 11] = [
    (0, "No errors encountered"),
    (1, "Processing error"),
    (2, "Missing device token"),
    (3, "Missing topic"),
    (4, "Missing payload"),
    (5, "Invalid token size"),
    (6, "Invalid topic size"),
    (7, "Invalid payload size"),
    (8, "Invalid token"),
    (10, "Shutdown"),
    (255, UNKNOWN_STATUS_MESSAGE),
];

/// Look up the message for a status byte.
pub fn status_message(code: u8) -> &'static str {
    STATUS_TABLE
        .binary_search_by_key(&code, |(c, _)| *c)
        .map_or(UNKNOWN_STATUS_MESSAGE, |i| STATUS_TABLE[i].1)
}

/// Status reported by the gateway for a rejected notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryStatus {
    /// 0
    NoError,
    /// 1
    ProcessingError,
    /// 2
    MissingDeviceToken,
    /// 3
    MissingTopic,
    /// 4
    MissingPayload,
    /// 5
    InvalidTokenSize,
    /// 6
    InvalidTopicSize,
    /// 7
    InvalidPayloadSize,
    /// 8
    InvalidToken,
    /// 10
    Shutdown,
    /// 255, or any code the table does not know.
    Unknown(u8),
}

impl DeliveryStatus {
    /// Map a status byte onto the table.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::NoError,
            1 => Self::ProcessingError,
            2 => Self::MissingDeviceToken,
            3 => Self::MissingTopic,
            4 => Self::MissingPayload,
            5 => Self::InvalidTokenSize,
            6 => Self::InvalidTopicSize,
            7 => Self::InvalidPayloadSize,
            8 => Self::InvalidToken,
            10 => Self::Shutdown,
            other => Self::Unknown(other),
        }
    }

    /// The raw status byte.
    pub fn code(self) -> u8 {
        match self {
            Self::NoError => 0,
            Self::ProcessingError => 1,
            Self::MissingDeviceToken => 2,
            Self::MissingTopic => 3,
            Self::MissingPayload => 4,
            Self::InvalidTokenSize => 5,
            Self::InvalidTopicSize => 6,
            Self::InvalidPayloadSize => 7,
            Self::InvalidToken => 8,
            Self::Shutdown => 10,
            Self::Unknown(code) => code,
        }
    }

    /// Human-readable message from the status table.
    pub fn message(self) -> &'static str {
        status_message(self.code())
    }
}

impl From<u8> for DeliveryStatus {
    fn from(code: u8) -> Self {
        Self::from_code(code)
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// A decoded error-response frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Command byte as received (8 for a well-behaved gateway; not enforced).
    pub command: u8,
    /// Raw status byte.
    pub status: u8,
    /// Identifier of the rejected notification.
    pub identifier: i32,
}

impl ErrorResponse {
    /// Build a response for `identifier` with the standard command byte.
    pub fn new(status: u8, identifier: i32) -> Self {
        Self {
            command: ERROR_RESPONSE_COMMAND,
            status,
            identifier,
        }
    }

    /// Decode a fixed-size frame. The command byte is carried but not checked.
    pub fn decode(buf: &[u8; ERROR_RESPONSE_SIZE]) -> Self {
        Self {
            command: buf[0],
            status: buf[1],
            identifier: i32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]),
        }
    }

    /// Encode into the 6-byte wire form.
    pub fn encode(&self) -> [u8; ERROR_RESPONSE_SIZE] {
        let id = self.identifier.to_be_bytes();
        [self.command, self.status, id[0], id[1], id[2], id[3]]
    }

    /// Status mapped onto the table.
    pub fn delivery_status(&self) -> DeliveryStatus {
        DeliveryStatus::from_code(self.status)
    }
}
