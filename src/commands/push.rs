//! `pushwire push` - send one alert to a list of device tokens.
//!
//! ```bash
//! pushwire push -c cert.pem -a "Hello" -b 1 -s default <token> <token>
//! ```

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use super::{failure_line, success_line};
use crate::client::Client;
use crate::config::Config;
use crate::delivery::DeliveryReport;
use crate::identity::Identity;
use crate::notification::{Notification, Payload};

/// What to put in the "aps" dictionary.
#[derive(Debug, Clone, Default)]
pub struct Message {
    pub alert: Option<String>,
    pub badge: Option<i32>,
    pub sound: Option<String>,
}

impl Message {
    fn payload(&self) -> Payload {
        Payload {
            alert: self.alert.clone().map(Into::into),
            badge: self.badge,
            sound: self.sound.clone(),
            content_available: None,
        }
    }
}

/// One notification per token, all carrying `message`.
pub fn build_batch(tokens: &[String], message: &Message) -> Result<Vec<Notification>> {
    let payload = message.payload();
    tokens
        .iter()
        .map(|token| {
            let mut notification = Notification::new(token.clone());
            notification.add_payload(&payload)?;
            Ok(notification)
        })
        .collect()
}

/// Push `message` to `tokens` and print one line per token.
///
/// Returns the report; the caller decides the exit status.
pub async fn run(
    config: &Config,
    identity: &Identity,
    tokens: &[String],
    message: &Message,
    shutdown: CancellationToken,
) -> Result<DeliveryReport> {
    let client = Client::from_config(config, identity)?.with_shutdown(shutdown);
    let mut batch = build_batch(tokens, message)?;

    let report = client.push(&mut batch).await?;
    for line in outcome_lines(&batch) {
        match line {
            Ok(text) => success_line(&text),
            Err(text) => failure_line(&text),
        }
    }
    Ok(report)
}

/// `Ok` lines for delivered notifications, `Err` lines for the rest.
fn outcome_lines(batch: &[Notification]) -> Vec<std::result::Result<String, String>> {
    batch
        .iter()
        .map(|n| {
            if n.sent {
                Ok(format!("Sent notification to {}", n.device_token))
            } else if let Some(error) = n.delivery_error() {
                Err(format!("Failed to send notification to {}: {error}", n.device_token))
            } else {
                Err(format!("Notification to {} was not sent", n.device_token))
            }
        })
        .collect()
}
