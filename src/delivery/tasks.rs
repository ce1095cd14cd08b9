//! The two tasks running against one gateway session.
//!
//! - Send task: drains the work queue, writes each frame, reports `Written`
//!   per frame and exactly one `SendFinished` when it stops.
//! - Response task: waits for the gateway's 6-byte error response, renewing
//!   its read deadline while the stream stays quiet, and reports `Rejected`
//!   or `ResponseClosed`.
//!
//! Both tasks hand their session half back through their `JoinHandle` so the
//! orchestrator can close the session.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::constants::ERROR_RESPONSE_SIZE;
use crate::error::SessionError;
use crate::session::{SessionReader, SessionWriter};
use crate::wire::response::ErrorResponse;

/// One encoded notification on its way to the wire.
#[derive(Debug, Clone)]
pub(crate) struct WorkItem {
    /// Position in the batch.
    pub index: usize,
    /// Encoded frame.
    pub frame: Bytes,
}

/// How the send task stopped.
#[derive(Debug)]
pub enum SendOutcome {
    /// The queue was closed and every item was written.
    Flushed {
        /// Frames written on this session.
        written: usize,
    },
    /// The queue stayed open but yielded nothing within the inactivity window.
    Stalled {
        /// Frames written on this session.
        written: usize,
    },
    /// Writing the frame at `index` failed; nothing after it was written.
    WriteFailed {
        /// Batch index of the failed frame.
        index: usize,
        /// Underlying write error.
        error: SessionError,
    },
    /// The session was torn down by the orchestrator.
    Cancelled,
}

/// Signals from the session tasks to the orchestrator.
#[derive(Debug)]
pub(crate) enum DeliveryEvent {
    /// The frame at `index` was written.
    Written { index: usize },
    /// The send task stopped.
    SendFinished(SendOutcome),
    /// The gateway rejected a notification.
    Rejected(ErrorResponse),
    /// The inbound stream ended without an error response.
    ResponseClosed,
}

pub(crate) async fn send_task<S>(
    mut writer: SessionWriter<S>,
    mut work_rx: UnboundedReceiver<WorkItem>,
    events: UnboundedSender<DeliveryEvent>,
    cancel: CancellationToken,
    inactivity_window: Duration,
) -> SessionWriter<S>
where
    S: AsyncWrite + Unpin,
{
    let mut written = 0;

    let outcome = loop {
        let next = tokio::select! {
            () = cancel.cancelled() => break SendOutcome::Cancelled,
            next = tokio::time::timeout(inactivity_window, work_rx.recv()) => next,
        };

        let item = match next {
            Ok(Some(item)) => item,
            Ok(None) => break SendOutcome::Flushed { written },
            Err(_) => break SendOutcome::Stalled { written },
        };

        let result = tokio::select! {
            () = cancel.cancelled() => break SendOutcome::Cancelled,
            result = writer.write(&item.frame) => result,
        };

        match result {
            Ok(()) => {
                written += 1;
                if events.send(DeliveryEvent::Written { index: item.index }).is_err() {
                    break SendOutcome::Cancelled;
                }
            }
            Err(error) => break SendOutcome::WriteFailed { index: item.index, error },
        }
    };

    log::debug!("[Delivery] Send task finished: {outcome:?}");
    let _ = events.send(DeliveryEvent::SendFinished(outcome));
    writer
}

pub(crate) async fn response_task<S>(
    mut reader: SessionReader<S>,
    events: UnboundedSender<DeliveryEvent>,
    cancel: CancellationToken,
    response_timeout: Duration,
) -> SessionReader<S>
where
    S: AsyncRead + Unpin,
{
    let mut buf = [0u8; ERROR_RESPONSE_SIZE];

    loop {
        reader.set_read_deadline(Some(Instant::now() + response_timeout));

        let result = tokio::select! {
            () = cancel.cancelled() => break,
            result = reader.read(&mut buf) => result,
        };

        match result {
            Ok(()) => {
                let response = ErrorResponse::decode(&buf);
                log::debug!(
                    "[Delivery] Error response: status {} for identifier {}",
                    response.status,
                    response.identifier
                );
                let _ = events.send(DeliveryEvent::Rejected(response));
                break;
            }
            Err(SessionError::ReadTimeout) => {}
            Err(e) => {
                log::debug!("[Delivery] Response stream ended: {e}");
                let _ = events.send(DeliveryEvent::ResponseClosed);
                break;
            }
        }
    }

    reader
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Endpoint, Session};
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};
    use tokio::sync::mpsc;

    fn item(index: usize, frame: &'static [u8]) -> WorkItem {
        WorkItem {
            index,
            frame: Bytes::from_static(frame),
        }
    }

    #[tokio::test]
    async fn test_send_task_flushes_closed_queue_in_order() {
        let (client, mut server) = duplex(1024);
        let (_reader, writer) = Session::from_stream(Endpoint::new("test", 1), client).split();
        let (work_tx, work_rx) = mpsc::unbounded_channel();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();

        work_tx.send(item(0, b"aa")).unwrap();
        work_tx.send(item(1, b"bb")).unwrap();
        drop(work_tx);

        let writer = send_task(
            writer,
            work_rx,
            event_tx,
            CancellationToken::new(),
            Duration::from_secs(5),
        )
        .await;
        drop(writer);

        let mut events = Vec::new();
        while let Some(event) = event_rx.recv().await {
            events.push(event);
        }
        assert!(matches!(events[0], DeliveryEvent::Written { index: 0 }));
        assert!(matches!(events[1], DeliveryEvent::Written { index: 1 }));
        assert!(matches!(
            events[2],
            DeliveryEvent::SendFinished(SendOutcome::Flushed { written: 2 })
        ));

        let mut wire = [0u8; 4];
        server.read_exact(&mut wire).await.unwrap();
        assert_eq!(&wire, b"aabb");
    }

    #[tokio::test]
    async fn test_send_task_reports_stall() {
        let (client, _server) = duplex(1024);
        let (_reader, writer) = Session::from_stream(Endpoint::new("test", 1), client).split();
        let (_work_tx, work_rx) = mpsc::unbounded_channel::<WorkItem>();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();

        send_task(
            writer,
            work_rx,
            event_tx,
            CancellationToken::new(),
            Duration::from_millis(20),
        )
        .await;

        assert!(matches!(
            event_rx.recv().await,
            Some(DeliveryEvent::SendFinished(SendOutcome::Stalled { written: 0 }))
        ));
    }

    #[tokio::test]
    async fn test_response_task_decodes_error_frame() {
        let (client, mut server) = duplex(1024);
        let (reader, _writer) = Session::from_stream(Endpoint::new("test", 1), client).split();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(response_task(
            reader,
            event_tx,
            CancellationToken::new(),
            Duration::from_millis(10),
        ));

        // Arrives after a few quiet deadlines
        tokio::time::sleep(Duration::from_millis(35)).await;
        server.write_all(&ErrorResponse::new(7, 12).encode()).await.unwrap();

        match event_rx.recv().await {
            Some(DeliveryEvent::Rejected(response)) => {
                assert_eq!(response.status, 7);
                assert_eq!(response.identifier, 12);
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_response_task_reports_close() {
        let (client, server) = duplex(1024);
        let (reader, _writer) = Session::from_stream(Endpoint::new("test", 1), client).split();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        drop(server);

        response_task(reader, event_tx, CancellationToken::new(), Duration::from_millis(10)).await;
        assert!(matches!(event_rx.recv().await, Some(DeliveryEvent::ResponseClosed)));
    }

    #[tokio::test]
    async fn test_response_task_stops_on_cancel() {
        let (client, _server) = duplex(1024);
        let (reader, _writer) = Session::from_stream(Endpoint::new("test", 1), client).split();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let task = tokio::spawn(response_task(
            reader,
            event_tx,
            cancel.clone(),
            Duration::from_millis(10),
        ));
        cancel.cancel();
        task.await.unwrap();
        assert!(event_rx.recv().await.is_none());
    }
}
