//! Delivery pipeline: streams a batch to the gateway and recovers from
//! rejections by resending everything after the rejected notification.
//!
//! # Architecture
//!
//! ```text
//! push(batch)
//!   │ identifiers = batch positions, frames encoded up front
//!   ▼
//! ┌──────────────────────── one gateway session ─────────────────────────┐
//! │ work queue ──► send task ──► SessionWriter ──► gateway               │
//! │                  │ Written / SendFinished                            │
//! │                  ▼                                                   │
//! │             orchestrator ◄── Rejected / ResponseClosed ── response   │
//! │                  │                                           task    │
//! └──────────────────┼───────────────────────────────────────────────────┘
//!                    │ Rejected(k): batch[k] unsent + status,
//!                    │              reopen, resend k+1..
//!                    ▼
//!             DeliveryReport
//! ```
//!
//! The gateway reports at most one bad notification per connection and then
//! drops it, so a rejection always ends the session. Only the orchestrator
//! writes `sent` and `error_code`; the tasks report by index over a channel.
//!
//! A session ends when:
//! - the response task decodes an error response (recover and continue)
//! - the send task finished and the inbound stream closed
//! - the send task finished and one response window passed with no error
//! - the shutdown token was cancelled

mod tasks;

pub use tasks::SendOutcome;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::constants::{INACTIVITY_WINDOW, RESPONSE_TIMEOUT};
use crate::error::SessionError;
use crate::notification::Notification;
use crate::session::{Connector, Endpoint, Session};
use crate::wire::framing::encode_notification;
use crate::wire::response::{DeliveryStatus, ErrorResponse};

use tasks::{DeliveryEvent, WorkItem};

/// Timing knobs for a delivery run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliverySettings {
    /// How long the send task waits on an open, empty queue before stopping.
    pub inactivity_window: Duration,
    /// Read deadline for the error response, renewed while the stream is quiet.
    pub response_timeout: Duration,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            inactivity_window: INACTIVITY_WINDOW,
            response_timeout: RESPONSE_TIMEOUT,
        }
    }
}

/// A notification the gateway rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejection {
    /// Batch index (and identifier) of the rejected notification.
    pub index: usize,
    /// Status reported by the gateway.
    pub status: DeliveryStatus,
}

/// Summary of one `push` call. Per-notification detail stays on the batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Notifications ending with `sent == true`.
    pub sent: usize,
    /// Notifications ending with `sent == false`.
    pub unsent: usize,
    /// Gateway rejections in the order they were received.
    pub rejected: Vec<Rejection>,
    /// Sessions opened, initial one included.
    pub sessions: usize,
}

impl DeliveryReport {
    fn tally(batch: &[Notification], rejected: Vec<Rejection>, sessions: usize) -> Self {
        let sent = batch.iter().filter(|n| n.sent).count();
        Self {
            sent,
            unsent: batch.len() - sent,
            rejected,
            sessions,
        }
    }

    /// True when every notification was sent.
    pub fn all_sent(&self) -> bool {
        self.unsent == 0
    }
}

/// How one session ended.
#[derive(Debug)]
enum SessionEnd {
    Finished,
    Rejected(ErrorResponse),
    Cancelled,
}

/// Delivers batches of notifications to one gateway endpoint.
#[derive(Debug)]
pub struct DeliveryPipeline<C> {
    connector: Arc<C>,
    endpoint: Endpoint,
    settings: DeliverySettings,
    shutdown: CancellationToken,
}

impl<C> DeliveryPipeline<C>
where
    C: Connector + 'static,
{
    pub fn new(connector: Arc<C>, endpoint: Endpoint, settings: DeliverySettings) -> Self {
        Self {
            connector,
            endpoint,
            settings,
            shutdown: CancellationToken::new(),
        }
    }

    /// Stop waiting and return as soon as `token` is cancelled.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn settings(&self) -> DeliverySettings {
        self.settings
    }

    /// Deliver `batch`, updating each notification's `identifier`, `sent` and
    /// `error_code` in place.
    ///
    /// Notifications that fail to encode (bad token, oversized payload) are
    /// skipped and left unsent. After a rejection at index `k`, the session is
    /// reopened and `k + 1..` is resent; if the reopen fails, `k + 1..` is
    /// left unsent and the call still succeeds.
    ///
    /// # Errors
    ///
    /// Only when the first session cannot be opened. No notification is
    /// marked sent in that case.
    pub async fn push(&self, batch: &mut [Notification]) -> Result<DeliveryReport, SessionError> {
        let frames = prepare(batch);

        let mut session = Session::open_with(&*self.connector, &self.endpoint).await?;
        let mut sessions = 1;
        let mut rejected = Vec::new();
        let mut start = 0;

        log::info!(
            "[Delivery] Pushing {} notification(s) to {}",
            batch.len(),
            self.endpoint
        );

        loop {
            let queue: Vec<usize> = (start..batch.len()).filter(|&i| frames[i].is_some()).collect();

            let response = match self.run_session(session, &frames, &queue, batch).await {
                SessionEnd::Rejected(response) => response,
                SessionEnd::Finished => break,
                SessionEnd::Cancelled => {
                    log::warn!("[Delivery] Shutdown requested, stopping batch");
                    break;
                }
            };

            let Some(index) = rejected_index(&response, &queue) else {
                log::warn!(
                    "[Delivery] Error response names identifier {} outside this session; stopping batch",
                    response.identifier
                );
                break;
            };

            let status = response.delivery_status();
            log::warn!("[Delivery] Notification {index} rejected: {status}");
            batch[index].sent = false;
            batch[index].error_code = Some(response.status);
            rejected.push(Rejection { index, status });

            let resume = index + 1;
            for notification in &mut batch[resume..] {
                notification.sent = false;
            }
            if !frames[resume..].iter().any(Option::is_some) {
                break;
            }
            if self.shutdown.is_cancelled() {
                break;
            }

            session = match Session::open_with(&*self.connector, &self.endpoint).await {
                Ok(session) => session,
                Err(e) => {
                    log::warn!(
                        "[Delivery] Reconnect after rejection failed, {} notification(s) left unsent: {e}",
                        batch.len() - resume
                    );
                    break;
                }
            };
            sessions += 1;
            start = resume;
            log::debug!("[Delivery] Resending from index {resume} on session {sessions}");
        }

        let report = DeliveryReport::tally(batch, rejected, sessions);
        log::info!(
            "[Delivery] Done: {} sent, {} unsent, {} rejected, {} session(s)",
            report.sent,
            report.unsent,
            report.rejected.len(),
            report.sessions
        );
        Ok(report)
    }

    /// Stream `queue` over `session` until the session ends, then close it.
    async fn run_session(
        &self,
        session: Session<C::Stream>,
        frames: &[Option<Bytes>],
        queue: &[usize],
        batch: &mut [Notification],
    ) -> SessionEnd {
        let endpoint = session.endpoint().clone();
        let (reader, writer) = session.split();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (work_tx, work_rx) = mpsc::unbounded_channel();
        let cancel = self.shutdown.child_token();

        let send = tokio::spawn(tasks::send_task(
            writer,
            work_rx,
            event_tx.clone(),
            cancel.clone(),
            self.settings.inactivity_window,
        ));
        let response = tokio::spawn(tasks::response_task(
            reader,
            event_tx,
            cancel.clone(),
            self.settings.response_timeout,
        ));

        for &index in queue {
            if let Some(frame) = &frames[index] {
                let _ = work_tx.send(WorkItem {
                    index,
                    frame: frame.clone(),
                });
            }
        }
        drop(work_tx);

        let end = self.await_session_end(&mut event_rx, batch).await;

        cancel.cancel();
        match (send.await, response.await) {
            (Ok(writer), Ok(reader)) => Session::from_halves(endpoint, reader, writer).close().await,
            _ => log::warn!("[Delivery] Session task panicked, dropping connection to {endpoint}"),
        }
        end
    }

    async fn await_session_end(
        &self,
        events: &mut mpsc::UnboundedReceiver<DeliveryEvent>,
        batch: &mut [Notification],
    ) -> SessionEnd {
        let mut send_finished = false;
        let mut response_closed = false;
        let mut grace_deadline: Option<Instant> = None;

        loop {
            let grace = async move {
                match grace_deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };

            let event = tokio::select! {
                event = events.recv() => event,
                () = grace => return SessionEnd::Finished,
                () = self.shutdown.cancelled() => return SessionEnd::Cancelled,
            };

            match event {
                Some(DeliveryEvent::Written { index }) => batch[index].sent = true,
                Some(DeliveryEvent::SendFinished(outcome)) => {
                    match &outcome {
                        SendOutcome::Flushed { written } => {
                            log::debug!("[Delivery] Flushed {written} frame(s)");
                        }
                        SendOutcome::Stalled { written } => {
                            log::warn!("[Delivery] Work queue stalled after {written} frame(s)");
                        }
                        SendOutcome::WriteFailed { index, error } => {
                            log::warn!("[Delivery] Write of notification {index} failed: {error}");
                        }
                        SendOutcome::Cancelled => {}
                    }
                    send_finished = true;
                    if response_closed {
                        return SessionEnd::Finished;
                    }
                    grace_deadline = Some(Instant::now() + self.settings.response_timeout);
                }
                // Written events for earlier frames are already ahead of this one
                Some(DeliveryEvent::Rejected(response)) => return SessionEnd::Rejected(response),
                Some(DeliveryEvent::ResponseClosed) => {
                    response_closed = true;
                    if send_finished {
                        return SessionEnd::Finished;
                    }
                }
                None => return SessionEnd::Finished,
            }
        }
    }
}

/// Reset delivery state, assign identifiers and encode every notification.
///
/// Slots that fail to encode stay `None` and are never queued.
fn prepare(batch: &mut [Notification]) -> Vec<Option<Bytes>> {
    batch
        .iter_mut()
        .enumerate()
        .map(|(index, notification)| {
            notification.sent = false;
            notification.error_code = None;

            let Ok(identifier) = i32::try_from(index) else {
                log::warn!("[Delivery] Batch index {index} exceeds the identifier range, skipping");
                return None;
            };
            notification.identifier = identifier;

            match encode_notification(notification) {
                Ok(frame) => Some(frame),
                Err(e) => {
                    log::warn!("[Delivery] Skipping notification {index}: {e}");
                    None
                }
            }
        })
        .collect()
}

/// Batch index named by `response`, if it was queued on this session.
fn rejected_index(response: &ErrorResponse, queue: &[usize]) -> Option<usize> {
    let index = usize::try_from(response.identifier).ok()?;
    queue.binary_search(&index).ok().map(|_| index)
}
