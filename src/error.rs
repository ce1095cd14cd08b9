//! Error taxonomy for the push client.
//!
//! Each layer has its own error type so callers can tell a bad certificate
//! (fatal before any network activity) from a dropped connection (retryable
//! during recovery) from a malformed notification (affects only that item).

use thiserror::Error;

use crate::wire::response::DeliveryStatus;

/// Failures while turning a certificate bundle into a TLS identity.
#[derive(Debug, Error)]
pub enum CertificateError {
    /// No certificate block, or the block did not parse.
    #[error("Failed to parse certificate data: {0}")]
    CertificateParse(String),
    /// No private-key block, or the key did not parse.
    #[error("Failed to parse key data: {0}")]
    KeyParse(String),
    /// The key is encrypted and the passphrase was missing or wrong.
    #[error("Failed to decrypt: {0}")]
    Decryption(String),
    /// Certificate and key parsed but could not form a client identity.
    #[error("Invalid client identity: {0}")]
    Identity(String),
}

/// Failures on an encrypted session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The `host:port` string could not be parsed.
    #[error("Invalid endpoint '{0}'")]
    InvalidEndpoint(String),
    /// Dial, handshake or connect timeout.
    #[error("Connection to {endpoint} failed: {reason}")]
    Connection {
        /// Endpoint being dialed.
        endpoint: String,
        /// Underlying cause.
        reason: String,
    },
    /// The read deadline elapsed before the buffer was filled.
    #[error("Read timed out")]
    ReadTimeout,
    /// The peer closed the stream before the buffer was filled.
    #[error("Stream closed by peer")]
    StreamClosed,
    /// Socket-level read failure.
    #[error("Read failed: {0}")]
    Read(#[source] std::io::Error),
    /// Socket-level write failure or short write.
    #[error("Write failed: {0}")]
    Write(#[source] std::io::Error),
}

impl SessionError {
    /// Whether this error happened while establishing the session.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::InvalidEndpoint(_) | Self::Connection { .. })
    }
}

/// A notification that cannot be put on the wire.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The hex device token did not decode to exactly 32 bytes.
    #[error("Invalid device token '{0}'")]
    InvalidToken(String),
    /// The serialized JSON payload exceeds the gateway limit.
    #[error("Invalid payload size: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Serialized payload size.
        size: usize,
        /// Gateway limit.
        max: usize,
    },
    /// The payload could not be serialized.
    #[error("Payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Bytes on the wire did not form a valid frame.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),
}

/// A notification rejected by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Notification {identifier} rejected: {status}")]
pub struct DeliveryStatusError {
    /// Status reported in the error-response frame.
    pub status: DeliveryStatus,
    /// Identifier of the offending notification.
    pub identifier: i32,
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    /// Certificate bundle could not be loaded.
    #[error(transparent)]
    Certificate(#[from] CertificateError),
    /// Connection or stream failure.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// Notification could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// Gateway rejected a notification.
    #[error(transparent)]
    DeliveryStatus(#[from] DeliveryStatusError),
}

/// Crate-level result alias.
pub type Result<T> = std::result::Result<T, Error>;
