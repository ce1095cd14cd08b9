//! Application-wide constants for pushwire.
//!
//! Centralizes gateway endpoints, protocol limits and timing defaults so the
//! delivery pipeline, feedback reader and CLI agree on a single set of values.
//!
//! # Categories
//!
//! - **Endpoints**: Production and sandbox hosts and ports
//! - **Protocol**: Wire-format sizes and command bytes
//! - **Timeouts**: Read deadlines and the send-task inactivity window

use std::time::Duration;

// ============================================================================
// Endpoints
// ============================================================================

/// Production notification gateway.
pub const PRODUCTION_GATEWAY: &str = "gateway.push.apple.com:2195";

/// Production feedback service.
pub const PRODUCTION_FEEDBACK: &str = "feedback.push.apple.com:2196";

/// Sandbox notification gateway.
pub const SANDBOX_GATEWAY: &str = "gateway.sandbox.push.apple.com:2195";

/// Sandbox feedback service.
pub const SANDBOX_FEEDBACK: &str = "feedback.sandbox.push.apple.com:2196";

// ============================================================================
// Protocol
// ============================================================================

/// Maximum size of the serialized JSON payload item, in bytes.
pub const MAX_PAYLOAD_SIZE: usize = 2048;

/// Size of a binary device token.
pub const DEVICE_TOKEN_SIZE: usize = 32;

/// Command byte of a notification frame.
pub const NOTIFICATION_COMMAND: u8 = 2;

/// Command byte of an error-response frame.
pub const ERROR_RESPONSE_COMMAND: u8 = 8;

/// Fixed size of an error-response frame.
pub const ERROR_RESPONSE_SIZE: usize = 6;

/// Fixed size of a feedback tuple.
pub const FEEDBACK_TUPLE_SIZE: usize = 38;

/// Default notification priority (deliver immediately).
pub const DEFAULT_PRIORITY: u8 = 10;

// ============================================================================
// Timeouts
// ============================================================================

/// TCP connect + TLS handshake budget.
///
/// Applies to every session open, including reopens during recovery.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Read deadline for error-response and feedback reads.
///
/// The gateway only writes when something went wrong, so an elapsed deadline
/// is the normal "nothing to report" outcome rather than a failure.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Send-task inactivity window.
///
/// If the work queue stays open but yields nothing for this long, the send
/// task reports a stall and stops.
pub const INACTIVITY_WINDOW: Duration = Duration::from_secs(3);
