//! `pushwire feedback` - list devices that stopped accepting notifications.

use anyhow::Result;

use super::success_line;
use crate::client::Client;
use crate::config::Config;
use crate::device::Device;
use crate::identity::Identity;

/// Fetch the feed and print each device as JSON with its UTC date.
pub async fn run(config: &Config, identity: &Identity) -> Result<Vec<Device>> {
    let client = Client::from_config(config, identity)?;
    let devices = client.unregistered_devices().await?;

    if devices.is_empty() {
        println!("No feedback available");
        return Ok(devices);
    }

    for device in &devices {
        println!("{}", describe(device)?);
    }
    success_line(&format!("{} device(s) unregistered", devices.len()));
    Ok(devices)
}

fn describe(device: &Device) -> Result<String> {
    let date = device
        .unregistered_at()
        .map(|at| at.to_rfc3339())
        .unwrap_or_else(|| device.timestamp().to_string());
    Ok(format!("{}\n  unregistered at {date}", device.to_json()?))
}
