//! In-memory gateway and feedback service for integration tests.
//!
//! `FakeGateway` implements [`Connector`] over `tokio::io::duplex`. Each
//! `connect` call takes the next [`Script`] entry (or `Accept` once the script
//! is exhausted) and runs it against the server end of a fresh duplex pair.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pushwire::wire::feedback::encode_tuple;
use pushwire::wire::FrameDecoder;
use pushwire::{
    Client, Connector, DeliverySettings, Endpoint, ErrorResponse, Notification, Payload,
    SessionError,
};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

pub const TOKEN: &str = "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff";

/// What the fake server does with one connection.
#[derive(Debug, Clone)]
pub enum Script {
    /// Read frames until the client closes.
    Accept,
    /// Refuse the connection.
    Refuse,
    /// Read frames until `identifier` arrives, answer with `status`, hang up.
    Reject { identifier: i32, status: u8 },
    /// Send `response` right away and hang up.
    Respond(ErrorResponse),
    /// Write these feedback tuples and hang up.
    Feed(Vec<([u8; 32], u32)>),
}

/// Scripted gateway recording the identifiers received on each connection.
#[derive(Debug, Default)]
pub struct FakeGateway {
    script: Mutex<VecDeque<Script>>,
    connections: Arc<Mutex<Vec<Vec<i32>>>>,
}

impl FakeGateway {
    pub fn new(script: impl IntoIterator<Item = Script>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            connections: Arc::default(),
        }
    }

    /// Handle for inspecting received identifiers after the gateway moved into a client.
    pub fn recorder(&self) -> Recorder {
        Recorder(Arc::clone(&self.connections))
    }
}

#[derive(Debug, Clone)]
pub struct Recorder(Arc<Mutex<Vec<Vec<i32>>>>);

impl Recorder {
    /// Identifiers received per accepted connection, in order.
    pub fn connections(&self) -> Vec<Vec<i32>> {
        self.0.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for FakeGateway {
    type Stream = DuplexStream;

    async fn connect(&self, endpoint: &Endpoint) -> Result<DuplexStream, SessionError> {
        let script = self.script.lock().unwrap().pop_front().unwrap_or(Script::Accept);
        if matches!(script, Script::Refuse) {
            return Err(SessionError::Connection {
                endpoint: endpoint.to_string(),
                reason: "connection refused".into(),
            });
        }

        let slot = {
            let mut connections = self.connections.lock().unwrap();
            connections.push(Vec::new());
            connections.len() - 1
        };
        let (client, server) = duplex(64 * 1024);
        tokio::spawn(serve(server, script, Arc::clone(&self.connections), slot));
        Ok(client)
    }
}

async fn serve(
    mut stream: DuplexStream,
    script: Script,
    connections: Arc<Mutex<Vec<Vec<i32>>>>,
    slot: usize,
) {
    match script {
        Script::Accept | Script::Refuse => {
            read_frames(&mut stream, &connections, slot, None).await;
        }
        Script::Reject { identifier, status } => {
            if read_frames(&mut stream, &connections, slot, Some(identifier)).await {
                let _ = stream.write_all(&ErrorResponse::new(status, identifier).encode()).await;
            }
        }
        Script::Respond(response) => {
            let _ = stream.write_all(&response.encode()).await;
        }
        Script::Feed(tuples) => {
            for (token, timestamp) in tuples {
                let _ = stream.write_all(&encode_tuple(&token, timestamp)).await;
            }
        }
    }
}

/// Record frames until EOF, or until `stop_at` is seen (returns true then).
async fn read_frames(
    stream: &mut DuplexStream,
    connections: &Mutex<Vec<Vec<i32>>>,
    slot: usize,
    stop_at: Option<i32>,
) -> bool {
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return false,
            Ok(n) => n,
        };
        let frames = decoder.feed(&buf[..n]).expect("client sent a malformed frame");
        for frame in frames {
            connections.lock().unwrap()[slot].push(frame.identifier);
            if Some(frame.identifier) == stop_at {
                return true;
            }
        }
    }
}

/// Short timings so tests finish quickly.
pub fn fast_settings() -> DeliverySettings {
    DeliverySettings {
        inactivity_window: Duration::from_millis(200),
        response_timeout: Duration::from_millis(100),
    }
}

pub fn client(gateway: FakeGateway) -> Client<FakeGateway> {
    Client::with_connector(
        gateway,
        Endpoint::new("gateway.test", 2195),
        Endpoint::new("feedback.test", 2196),
    )
    .with_settings(fast_settings())
}

pub fn notification(alert: &str) -> Notification {
    let mut notification = Notification::new(TOKEN);
    notification.add_payload(&Payload::alert(alert)).unwrap();
    notification
}

pub fn batch(len: usize) -> Vec<Notification> {
    (0..len).map(|i| notification(&format!("message {i}"))).collect()
}

pub fn sent_flags(batch: &[Notification]) -> Vec<bool> {
    batch.iter().map(|n| n.sent).collect()
}
