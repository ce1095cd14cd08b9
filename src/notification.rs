//! Notifications and their JSON payload.
//!
//! A [`Notification`] carries a hex device token, a JSON payload whose "aps"
//! dictionary is described by [`Payload`], and the delivery state the pipeline
//! fills in (`sent`, `error_code`). Everything else in the payload map is
//! passed through untouched as custom keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::DEFAULT_PRIORITY;
use crate::error::{DeliveryStatusError, ProtocolError};
use crate::wire::response::DeliveryStatus;

/// Alert text: either a plain string or a structured dictionary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Alert {
    /// Plain alert body.
    Body(String),
    /// Structured alert with localization keys.
    Dictionary(AlertDictionary),
}

impl From<&str> for Alert {
    fn from(body: &str) -> Self {
        Self::Body(body.to_string())
    }
}

impl From<String> for Alert {
    fn from(body: String) -> Self {
        Self::Body(body)
    }
}

impl From<AlertDictionary> for Alert {
    fn from(dict: AlertDictionary) -> Self {
        Self::Dictionary(dict)
    }
}

/// The structured "alert" dictionary.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AlertDictionary {
    /// Short title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Alert body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Localization key for the title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_loc_key: Option<String>,
    /// Arguments for `title_loc_key`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub title_loc_args: Vec<String>,
    /// Localization key for the action button.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_loc_key: Option<String>,
    /// Localization key for the body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc_key: Option<String>,
    /// Arguments for `loc_key`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub loc_args: Vec<String>,
    /// Launch image filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_image: Option<String>,
}

/// The "aps" dictionary.
///
/// Absent fields are omitted from the JSON. `badge: Some(0)` is sent as an
/// explicit zero, which clears the badge on the device.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// Alert text or dictionary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<Alert>,
    /// Badge number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge: Option<i32>,
    /// Sound to play.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
    /// Background update flag.
    #[serde(
        default,
        rename = "content-available",
        skip_serializing_if = "Option::is_none"
    )]
    pub content_available: Option<u8>,
}

impl Payload {
    /// Payload with just an alert.
    pub fn alert(alert: impl Into<Alert>) -> Self {
        Self {
            alert: Some(alert.into()),
            ..Self::default()
        }
    }
}

/// A single push notification and its delivery outcome.
#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    /// Device token, 64 hex characters.
    pub device_token: String,
    /// JSON payload; the "aps" key holds the [`Payload`].
    pub payload: Map<String, Value>,
    /// Position in the current batch, assigned by the pipeline.
    pub identifier: i32,
    /// UTC epoch seconds after which the gateway may discard it (0 = never store).
    pub expiration: u32,
    /// Delivery priority.
    pub priority: u8,
    /// Whether the notification was written and not rejected.
    pub sent: bool,
    /// Status byte from a gateway rejection.
    pub error_code: Option<u8>,
}

impl Notification {
    /// New notification for `device_token` with default priority and no payload.
    pub fn new(device_token: impl Into<String>) -> Self {
        Self {
            device_token: device_token.into(),
            payload: Map::new(),
            identifier: 0,
            expiration: 0,
            priority: DEFAULT_PRIORITY,
            sent: false,
            error_code: None,
        }
    }

    /// Set the "aps" dictionary.
    pub fn add_payload(&mut self, payload: &Payload) -> Result<(), ProtocolError> {
        let value = serde_json::to_value(payload)?;
        self.set_payload_value("aps", value);
        Ok(())
    }

    /// Set a top-level payload key.
    pub fn set_payload_value(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.payload.insert(key.into(), value.into());
    }

    /// Builder-style expiration.
    pub fn with_expiration(mut self, at: DateTime<Utc>) -> Self {
        self.expiration = u32::try_from(at.timestamp().max(0)).unwrap_or(u32::MAX);
        self
    }

    /// Builder-style priority.
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Serialized JSON payload, as it goes on the wire.
    pub fn to_json(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(&self.payload)?)
    }

    /// The gateway rejection recorded for this notification, if any.
    pub fn delivery_error(&self) -> Option<DeliveryStatusError> {
        self.error_code.map(|code| DeliveryStatusError {
            status: DeliveryStatus::from_code(code),
            identifier: self.identifier,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "aabbccddeeff00112233445566778899aabbccddeeff00112233445566778899";

    #[test]
    fn test_defaults() {
        let n = Notification::new(TOKEN);
        assert_eq!(n.priority, 10);
        assert_eq!(n.expiration, 0);
        assert!(!n.sent);
        assert!(n.error_code.is_none());
        assert!(n.payload.is_empty());
    }

    #[test]
    fn test_payload_omits_absent_fields() {
        let mut n = Notification::new(TOKEN);
        n.add_payload(&Payload::alert("hello")).unwrap();
        assert_eq!(n.to_json().unwrap(), br#"{"aps":{"alert":"hello"}}"#.to_vec());
    }

    #[test]
    fn test_explicit_zero_badge_is_sent() {
        let payload = Payload {
            badge: Some(0),
            content_available: Some(1),
            ..Payload::default()
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert_eq!(json, r#"{"badge":0,"content-available":1}"#);
    }

    #[test]
    fn test_alert_dictionary_uses_kebab_case_keys() {
        let dict = AlertDictionary {
            body: Some("Body".into()),
            loc_key: Some("GAME_PLAY".into()),
            loc_args: vec!["Jenna".into()],
            ..AlertDictionary::default()
        };
        let json = serde_json::to_string(&Payload::alert(dict)).unwrap();
        assert_eq!(
            json,
            r#"{"alert":{"body":"Body","loc-key":"GAME_PLAY","loc-args":["Jenna"]}}"#
        );
    }

    #[test]
    fn test_custom_payload_keys() {
        let mut n = Notification::new(TOKEN);
        n.add_payload(&Payload::alert("hi")).unwrap();
        n.set_payload_value("acme", serde_json::json!({"id": 7}));
        let value: Value = serde_json::from_slice(&n.to_json().unwrap()).unwrap();
        assert_eq!(value["acme"]["id"], 7);
        assert_eq!(value["aps"]["alert"], "hi");
    }

    #[test]
    fn test_expiration_from_datetime() {
        let at = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        let n = Notification::new(TOKEN).with_expiration(at).with_priority(5);
        assert_eq!(n.expiration, 1_700_000_000);
        assert_eq!(n.priority, 5);
    }

    #[test]
    fn test_delivery_error_from_code() {
        let mut n = Notification::new(TOKEN);
        assert!(n.delivery_error().is_none());
        n.identifier = 4;
        n.error_code = Some(8);
        let err = n.delivery_error().unwrap();
        assert_eq!(err.identifier, 4);
        assert_eq!(err.status, DeliveryStatus::InvalidToken);
    }
}
