//! Binary wire formats spoken with the gateway and the feedback service.
//!
//! # Frames
//!
//! ```text
//! client → gateway   notification frame   [u8 2][u32 len][items]     (framing)
//! gateway → client   error response       [u8 8][u8 status][i32 id]  (response)
//! feedback → client  feedback tuple       [u32 ts][u16 len][token]   (feedback)
//! ```
//!
//! All integers are big-endian.

pub mod feedback;
pub mod framing;
pub mod response;

pub use framing::{encode_notification, FrameDecoder, NotificationFrame};
pub use response::{status_message, DeliveryStatus, ErrorResponse};
