//! Notification frame codec.
//!
//! Big-endian frames with a command byte and a list of items:
//!
//! ```text
//! [u8 command = 2] [u32 BE frame length] [item]*
//! item := [u8 id] [u16 BE length] [data: length bytes]
//! ```
//!
//! Items, always written in this order:
//! - `1`: device token (32 raw bytes)
//! - `2`: JSON payload (at most 2048 bytes)
//! - `3`: notification identifier (`i32`)
//! - `4`: expiration date (`u32` epoch seconds)
//! - `5`: priority (`u8`)
//!
//! The frame length counts the item bytes only, not the command byte or the
//! length field itself.

use bytes::{BufMut, Bytes, BytesMut};
use data_encoding::HEXLOWER_PERMISSIVE;

use crate::constants::{DEVICE_TOKEN_SIZE, MAX_PAYLOAD_SIZE, NOTIFICATION_COMMAND};
use crate::error::ProtocolError;
use crate::notification::Notification;

/// Size of the command byte plus the frame length field.
pub const FRAME_HEADER_SIZE: usize = 5;

/// Size of an item header (id + length).
pub const ITEM_HEADER_SIZE: usize = 3;

/// Largest frame body a well-formed notification can produce.
const MAX_FRAME_LENGTH: u32 =
    (5 * ITEM_HEADER_SIZE + DEVICE_TOKEN_SIZE + MAX_PAYLOAD_SIZE + 4 + 4 + 1) as u32;

/// Item id constants.
pub mod item {
    /// Binary device token.
    pub const DEVICE_TOKEN: u8 = 1;
    /// JSON payload.
    pub const PAYLOAD: u8 = 2;
    /// Notification identifier.
    pub const IDENTIFIER: u8 = 3;
    /// Expiration date.
    pub const EXPIRATION: u8 = 4;
    /// Priority.
    pub const PRIORITY: u8 = 5;
}

/// Decode a hex device token into its 32 raw bytes.
pub fn decode_token(token: &str) -> Result<[u8; DEVICE_TOKEN_SIZE], ProtocolError> {
    let raw = HEXLOWER_PERMISSIVE
        .decode(token.as_bytes())
        .map_err(|e| ProtocolError::InvalidToken(format!("{token}: {e}")))?;
    <[u8; DEVICE_TOKEN_SIZE]>::try_from(raw.as_slice()).map_err(|_| {
        ProtocolError::InvalidToken(format!("{token}: expected {DEVICE_TOKEN_SIZE} bytes, got {}", raw.len()))
    })
}

/// Encode a notification into a wire frame.
///
/// Fails if the token is not 32 bytes of hex or the payload is too large.
pub fn encode_notification(notification: &Notification) -> Result<Bytes, ProtocolError> {
    let token = decode_token(&notification.device_token)?;
    let payload = notification.to_json()?;
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }

    let frame_length = 5 * ITEM_HEADER_SIZE + token.len() + payload.len() + 4 + 4 + 1;
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + frame_length);

    buf.put_u8(NOTIFICATION_COMMAND);
    buf.put_u32(frame_length as u32);

    put_item(&mut buf, item::DEVICE_TOKEN, &token);
    put_item(&mut buf, item::PAYLOAD, &payload);
    put_item(&mut buf, item::IDENTIFIER, &notification.identifier.to_be_bytes());
    put_item(&mut buf, item::EXPIRATION, &notification.expiration.to_be_bytes());
    put_item(&mut buf, item::PRIORITY, &[notification.priority]);

    Ok(buf.freeze())
}

fn put_item(buf: &mut BytesMut, id: u8, data: &[u8]) {
    buf.put_u8(id);
    buf.put_u16(data.len() as u16);
    buf.put_slice(data);
}

/// A notification frame as seen by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationFrame {
    /// Raw device token.
    pub device_token: [u8; DEVICE_TOKEN_SIZE],
    /// Raw JSON payload bytes.
    pub payload: Vec<u8>,
    /// Notification identifier.
    pub identifier: i32,
    /// Expiration date.
    pub expiration: u32,
    /// Priority.
    pub priority: u8,
}

impl NotificationFrame {
    /// Lowercase hex form of the device token.
    pub fn token_hex(&self) -> String {
        data_encoding::HEXLOWER.encode(&self.device_token)
    }

    /// Decode the item list of a frame body (the bytes after the header).
    fn from_items(mut body: &[u8]) -> Result<Self, ProtocolError> {
        let mut device_token = None;
        let mut payload = None;
        let mut identifier = None;
        let mut expiration = None;
        let mut priority = None;

        while !body.is_empty() {
            if body.len() < ITEM_HEADER_SIZE {
                return Err(malformed(format!("truncated item header ({} bytes)", body.len())));
            }
            let id = body[0];
            let len = usize::from(u16::from_be_bytes([body[1], body[2]]));
            let rest = &body[ITEM_HEADER_SIZE..];
            if rest.len() < len {
                return Err(malformed(format!("item {id} needs {len} bytes, {} left", rest.len())));
            }
            let data = &rest[..len];

            match id {
                item::DEVICE_TOKEN => {
                    device_token = Some(fixed::<DEVICE_TOKEN_SIZE>(id, data)?);
                }
                item::PAYLOAD => payload = Some(data.to_vec()),
                item::IDENTIFIER => identifier = Some(i32::from_be_bytes(fixed::<4>(id, data)?)),
                item::EXPIRATION => expiration = Some(u32::from_be_bytes(fixed::<4>(id, data)?)),
                item::PRIORITY => priority = Some(fixed::<1>(id, data)?[0]),
                other => return Err(malformed(format!("unknown item id {other}"))),
            }

            body = &rest[len..];
        }

        Ok(Self {
            device_token: device_token.ok_or_else(|| malformed("missing device token".into()))?,
            payload: payload.ok_or_else(|| malformed("missing payload".into()))?,
            identifier: identifier.ok_or_else(|| malformed("missing identifier".into()))?,
            expiration: expiration.unwrap_or(0),
            priority: priority.unwrap_or(crate::constants::DEFAULT_PRIORITY),
        })
    }
}

fn fixed<const N: usize>(id: u8, data: &[u8]) -> Result<[u8; N], ProtocolError> {
    <[u8; N]>::try_from(data)
        .map_err(|_| malformed(format!("item {id} must be {N} bytes, got {}", data.len())))
}

fn malformed(msg: String) -> ProtocolError {
    ProtocolError::MalformedFrame(msg)
}

/// Incremental notification frame decoder.
///
/// Feed bytes via [`FrameDecoder::feed`] and extract complete frames.
/// Handles TCP-style byte stream reassembly.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    /// Create a new decoder with empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes into the decoder and extract all complete frames.
    ///
    /// Incomplete data is buffered for the next call.
    ///
    /// # Errors
    ///
    /// Returns an error on an unknown command byte, an oversized frame, or a
    /// malformed item list.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<NotificationFrame>, ProtocolError> {
        self.buf.extend_from_slice(bytes);
        let mut frames = Vec::new();

        loop {
            if self.buf.len() < FRAME_HEADER_SIZE {
                break;
            }

            if self.buf[0] != NOTIFICATION_COMMAND {
                return Err(malformed(format!("unknown command 0x{:02x}", self.buf[0])));
            }

            let length = u32::from_be_bytes([self.buf[1], self.buf[2], self.buf[3], self.buf[4]]);
            if length > MAX_FRAME_LENGTH {
                return Err(malformed(format!("frame too large: {length} bytes (max {MAX_FRAME_LENGTH})")));
            }

            let total = FRAME_HEADER_SIZE + length as usize;
            if self.buf.len() < total {
                break; // Incomplete frame, wait for more data
            }

            frames.push(NotificationFrame::from_items(&self.buf[FRAME_HEADER_SIZE..total])?);
            self.buf.drain(..total);
        }

        Ok(frames)
    }

    /// Returns true if the decoder has buffered partial data.
    pub fn has_partial(&self) -> bool {
        !self.buf.is_empty()
    }
}
