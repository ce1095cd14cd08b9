//! Pushwire - client for the binary push notification gateway.
//!
//! Streams batches of notifications over a long-lived TLS connection and
//! reads the feedback service's list of devices that stopped accepting them.
//!
//! # Architecture
//!
//! - **Identity** - PEM bundle → TLS client certificate + key
//! - **Session** - one TLS stream with deadline-bounded full reads
//! - **Wire** - notification frames, error responses, feedback tuples
//! - **Delivery** - send task + response task per session, resend after rejection
//! - **Feedback** - drain the feedback stream into device records
//!
//! # Modules
//!
//! - [`client`] - High-level client for one environment
//! - [`delivery`] - Delivery pipeline
//! - [`feedback`] - Feedback reader
//! - [`wire`] - Binary codecs
//! - [`config`] - Configuration loading/saving

// Library modules
pub mod client;
pub mod commands;
pub mod delivery;
pub mod feedback;
pub mod session;
pub mod wire;

pub mod config;
pub mod constants;
pub mod device;
pub mod error;
pub mod identity;
pub mod notification;

// Re-export commonly used types
pub use client::Client;
pub use config::{Config, Environment};
pub use delivery::{DeliveryPipeline, DeliveryReport, DeliverySettings, Rejection, SendOutcome};
pub use device::Device;
pub use error::{
    CertificateError, DeliveryStatusError, Error, ProtocolError, Result, SessionError,
};
pub use feedback::FeedbackReader;
pub use identity::Identity;
pub use notification::{Alert, AlertDictionary, Notification, Payload};
pub use session::{Connector, Endpoint, Session, TlsConnector};
pub use wire::{DeliveryStatus, ErrorResponse};
