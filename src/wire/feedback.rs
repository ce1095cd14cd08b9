//! Feedback tuple codec.
//!
//! The feedback service streams fixed-size tuples, one per device that
//! stopped accepting notifications:
//!
//! ```text
//! [u32 BE timestamp] [u16 BE token length] [32 bytes device token]
//! ```
//!
//! The token length field is informational; this protocol version always
//! carries 32-byte tokens.

use crate::constants::{DEVICE_TOKEN_SIZE, FEEDBACK_TUPLE_SIZE};
use crate::device::Device;

/// Decode one 38-byte tuple into a [`Device`].
pub fn decode_tuple(buf: &[u8; FEEDBACK_TUPLE_SIZE]) -> Device {
    let timestamp = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let token_length = u16::from_be_bytes([buf[4], buf[5]]);
    if usize::from(token_length) != DEVICE_TOKEN_SIZE {
        log::debug!("[Feedback] Tuple reports token length {token_length}, reading {DEVICE_TOKEN_SIZE}");
    }

    let mut token = [0u8; DEVICE_TOKEN_SIZE];
    token.copy_from_slice(&buf[6..]);
    Device::from_raw(&token, timestamp)
}

/// Encode a raw token and timestamp into a tuple.
pub fn encode_tuple(token: &[u8; DEVICE_TOKEN_SIZE], timestamp: u32) -> [u8; FEEDBACK_TUPLE_SIZE] {
    let mut buf = [0u8; FEEDBACK_TUPLE_SIZE];
    buf[..4].copy_from_slice(&timestamp.to_be_bytes());
    buf[4..6].copy_from_slice(&(DEVICE_TOKEN_SIZE as u16).to_be_bytes());
    buf[6..].copy_from_slice(token);
    buf
}
