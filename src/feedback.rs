//! Feedback reader: drains the feedback service into [`Device`] records.
//!
//! The service writes one 38-byte tuple per unregistered device and then
//! closes the connection (or simply goes quiet). Either way the first failed
//! read marks the end of the feed.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::constants::{FEEDBACK_TUPLE_SIZE, RESPONSE_TIMEOUT};
use crate::device::Device;
use crate::error::SessionError;
use crate::session::{Connector, Endpoint, Session};
use crate::wire::feedback::decode_tuple;

/// Reads the unregistered-device feed from one feedback endpoint.
#[derive(Debug)]
pub struct FeedbackReader<C> {
    connector: Arc<C>,
    endpoint: Endpoint,
    read_timeout: Duration,
}

impl<C> FeedbackReader<C>
where
    C: Connector + 'static,
{
    pub fn new(connector: Arc<C>, endpoint: Endpoint) -> Self {
        Self {
            connector,
            endpoint,
            read_timeout: RESPONSE_TIMEOUT,
        }
    }

    /// Deadline applied to each tuple read.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Fetch every device the service reports, in stream order.
    ///
    /// # Errors
    ///
    /// Only when the session cannot be opened. A read failure after that is
    /// the end of the feed.
    pub async fn unregistered_devices(&self) -> Result<Vec<Device>, SessionError> {
        let session = Session::open_with(&*self.connector, &self.endpoint).await?;
        let (device_tx, mut device_rx) = mpsc::unbounded_channel();

        let drain = tokio::spawn(drain_feed(session, device_tx, self.read_timeout));

        let mut devices = Vec::new();
        while let Some(device) = device_rx.recv().await {
            devices.push(device);
        }

        match drain.await {
            Ok(session) => session.close().await,
            Err(e) => log::warn!("[Feedback] Reader task failed: {e}"),
        }

        log::info!(
            "[Feedback] {} unregistered device(s) from {}",
            devices.len(),
            self.endpoint
        );
        Ok(devices)
    }
}

async fn drain_feed<S>(
    mut session: Session<S>,
    devices: mpsc::UnboundedSender<Device>,
    read_timeout: Duration,
) -> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut tuple = [0u8; FEEDBACK_TUPLE_SIZE];
    loop {
        session.set_read_deadline(Some(Instant::now() + read_timeout));
        match session.read(&mut tuple).await {
            Ok(()) => {
                if devices.send(decode_tuple(&tuple)).is_err() {
                    break;
                }
            }
            Err(e) => {
                log::debug!("[Feedback] End of feed: {e}");
                break;
            }
        }
    }
    session
}
