//! Encrypted byte-stream sessions to the gateway and feedback service.
//!
//! A [`Session`] owns one connected stream and exposes the blocking-style
//! primitives the protocol needs: fill a buffer completely (bounded by a read
//! deadline), write a whole frame, close. Streams come from a [`Connector`],
//! which is the seam between the protocol code and the transport:
//!
//! ```text
//! DeliveryPipeline / FeedbackReader
//!     ↓ Session::open_with(connector, endpoint)
//! Connector::connect ── TlsConnector: TCP dial + TLS handshake (client cert)
//!     ↓ stream
//! Session ── split ──► SessionReader (response task)
//!                  └─► SessionWriter (send task)
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::constants::CONNECT_TIMEOUT;
use crate::error::{CertificateError, SessionError};
use crate::identity::Identity;

/// A `host:port` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Host name, also used as the TLS server name.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl Endpoint {
    /// Build from parts.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `host:port`.
    pub fn parse(uri: &str) -> Result<Self, SessionError> {
        let (host, port) = uri
            .rsplit_once(':')
            .ok_or_else(|| SessionError::InvalidEndpoint(uri.to_string()))?;
        let port = port
            .parse::<u16>()
            .map_err(|_| SessionError::InvalidEndpoint(uri.to_string()))?;
        if host.is_empty() {
            return Err(SessionError::InvalidEndpoint(uri.to_string()));
        }
        Ok(Self::new(host, port))
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl std::str::FromStr for Endpoint {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Produces connected streams for an endpoint.
///
/// The production implementation is [`TlsConnector`]; tests plug in
/// in-memory streams.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Stream type produced by this connector.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Dial `endpoint` and complete any handshake.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Connection` if the dial or handshake fails.
    async fn connect(&self, endpoint: &Endpoint) -> Result<Self::Stream, SessionError>;
}

/// TLS client connector presenting a client certificate.
#[derive(Debug, Clone)]
pub struct TlsConnector {
    config: Arc<ClientConfig>,
    connect_timeout: Duration,
}

impl TlsConnector {
    /// Connector trusting the bundled web PKI roots.
    pub fn new(identity: &Identity) -> Result<Self, CertificateError> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        Self::with_roots(identity, roots)
    }

    /// Connector trusting `roots` only.
    pub fn with_roots(identity: &Identity, roots: RootCertStore) -> Result<Self, CertificateError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| CertificateError::Identity(e.to_string()))?
            .with_root_certificates(roots)
            .with_client_auth_cert(identity.cert_chain(), identity.private_key())
            .map_err(|e| CertificateError::Identity(e.to_string()))?;

        Ok(Self {
            config: Arc::new(config),
            connect_timeout: CONNECT_TIMEOUT,
        })
    }

    /// Override the dial + handshake budget.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    async fn dial(&self, endpoint: &Endpoint) -> Result<tokio_rustls::client::TlsStream<TcpStream>, String> {
        let server_name = ServerName::try_from(endpoint.host.clone()).map_err(|e| e.to_string())?;

        let tcp = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
            .await
            .map_err(|e| format!("dial: {e}"))?;
        tcp.set_nodelay(true).map_err(|e| format!("nodelay: {e}"))?;

        tokio_rustls::TlsConnector::from(Arc::clone(&self.config))
            .connect(server_name, tcp)
            .await
            .map_err(|e| format!("handshake: {e}"))
    }
}

#[async_trait]
impl Connector for TlsConnector {
    type Stream = tokio_rustls::client::TlsStream<TcpStream>;

    async fn connect(&self, endpoint: &Endpoint) -> Result<Self::Stream, SessionError> {
        log::debug!("[Session] Connecting to {endpoint}");
        match tokio::time::timeout(self.connect_timeout, self.dial(endpoint)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(reason)) => Err(SessionError::Connection {
                endpoint: endpoint.to_string(),
                reason,
            }),
            Err(_) => Err(SessionError::Connection {
                endpoint: endpoint.to_string(),
                reason: format!("timed out after {:?}", self.connect_timeout),
            }),
        }
    }
}

/// Read side of a session.
///
/// Reads fill the caller's buffer completely. Bytes received before a
/// deadline elapsed are kept and handed out by the next read, so a timeout
/// never tears a frame.
#[derive(Debug)]
pub struct SessionReader<S> {
    inner: ReadHalf<S>,
    pending: Vec<u8>,
    deadline: Option<Instant>,
}

impl<S: AsyncRead + Unpin> SessionReader<S> {
    /// Bound subsequent reads. `None` blocks indefinitely.
    pub fn set_read_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
    }

    /// Fill `buf` completely.
    ///
    /// # Errors
    ///
    /// - `ReadTimeout` if the deadline elapsed first
    /// - `StreamClosed` if the peer closed the stream (zero-byte read)
    /// - `Read` on any other socket error
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<(), SessionError> {
        while self.pending.len() < buf.len() {
            let mut chunk = vec![0u8; buf.len() - self.pending.len()];
            let read = self.inner.read(&mut chunk);
            let result = match self.deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, read)
                    .await
                    .map_err(|_| SessionError::ReadTimeout)?,
                None => read.await,
            };

            let n = match result {
                Ok(0) => return Err(SessionError::StreamClosed),
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Err(SessionError::StreamClosed)
                }
                Err(e) => return Err(SessionError::Read(e)),
            };
            self.pending.extend_from_slice(&chunk[..n]);
        }

        let rest = self.pending.split_off(buf.len());
        buf.copy_from_slice(&self.pending);
        self.pending = rest;
        Ok(())
    }
}

/// Write side of a session.
#[derive(Debug)]
pub struct SessionWriter<S> {
    inner: WriteHalf<S>,
}

impl<S: AsyncWrite + Unpin> SessionWriter<S> {
    /// Write all of `bytes` and flush.
    pub async fn write(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        self.inner.write_all(bytes).await.map_err(SessionError::Write)?;
        self.inner.flush().await.map_err(SessionError::Write)
    }

    async fn shutdown(&mut self) -> std::io::Result<()> {
        self.inner.shutdown().await
    }
}

/// One live connection to an endpoint.
///
/// Closing consumes the session; reopen by calling [`Session::open_with`] again.
#[derive(Debug)]
pub struct Session<S> {
    endpoint: Endpoint,
    reader: SessionReader<S>,
    writer: SessionWriter<S>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Open a session through `connector`.
    pub async fn open_with<C>(connector: &C, endpoint: &Endpoint) -> Result<Self, SessionError>
    where
        C: Connector<Stream = S> + ?Sized,
    {
        let stream = connector.connect(endpoint).await?;
        log::debug!("[Session] Opened {endpoint}");
        Ok(Self::from_stream(endpoint.clone(), stream))
    }

    /// Wrap an already connected stream.
    pub fn from_stream(endpoint: Endpoint, stream: S) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            endpoint,
            reader: SessionReader {
                inner: read_half,
                pending: Vec::new(),
                deadline: None,
            },
            writer: SessionWriter { inner: write_half },
        }
    }

    /// Reassemble a session from halves previously returned by [`Session::split`].
    pub fn from_halves(endpoint: Endpoint, reader: SessionReader<S>, writer: SessionWriter<S>) -> Self {
        Self {
            endpoint,
            reader,
            writer,
        }
    }

    /// Endpoint this session is connected to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// See [`SessionReader::set_read_deadline`].
    pub fn set_read_deadline(&mut self, deadline: Option<Instant>) {
        self.reader.set_read_deadline(deadline);
    }

    /// See [`SessionReader::read`].
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<(), SessionError> {
        self.reader.read(buf).await
    }

    /// See [`SessionWriter::write`].
    pub async fn write(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        self.writer.write(bytes).await
    }

    /// Split into independently owned read and write halves.
    pub fn split(self) -> (SessionReader<S>, SessionWriter<S>) {
        (self.reader, self.writer)
    }

    /// Shut down the write side and release the stream.
    pub async fn close(mut self) {
        if let Err(e) = self.writer.shutdown().await {
            log::debug!("[Session] Shutdown of {} failed: {e}", self.endpoint);
        }
        log::debug!("[Session] Closed {}", self.endpoint);
    }
}

impl Session<tokio_rustls::client::TlsStream<TcpStream>> {
    /// Resolve, dial and handshake `uri` (`host:port`) presenting `identity`.
    pub async fn open(uri: &str, identity: &Identity) -> crate::error::Result<Self> {
        let endpoint = Endpoint::parse(uri)?;
        let connector = TlsConnector::new(identity)?;
        Ok(Self::open_with(&connector, &endpoint).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, DuplexStream};

    fn pair() -> (Session<DuplexStream>, DuplexStream) {
        let (client, server) = duplex(1024);
        (Session::from_stream(Endpoint::new("test", 1), client), server)
    }

    #[test]
    fn test_endpoint_parse() {
        let endpoint = Endpoint::parse("gateway.push.apple.com:2195").unwrap();
        assert_eq!(endpoint.host, "gateway.push.apple.com");
        assert_eq!(endpoint.port, 2195);
        assert_eq!(endpoint.to_string(), "gateway.push.apple.com:2195");

        assert!(Endpoint::parse("no-port").is_err());
        assert!(Endpoint::parse(":2195").is_err());
        assert!(Endpoint::parse("host:99999").is_err());
    }

    #[tokio::test]
    async fn test_read_fills_buffer_across_chunks() {
        let (mut session, mut server) = pair();
        server.write_all(&[1, 2, 3]).await.unwrap();

        let reader = tokio::spawn(async move {
            let mut buf = [0u8; 6];
            session.read(&mut buf).await.map(|()| buf)
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        server.write_all(&[4, 5, 6]).await.unwrap();

        assert_eq!(reader.await.unwrap().unwrap(), [1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn test_read_times_out_and_keeps_partial_bytes() {
        let (mut session, mut server) = pair();
        server.write_all(&[8, 5]).await.unwrap();

        session.set_read_deadline(Some(Instant::now() + Duration::from_millis(20)));
        let mut buf = [0u8; 6];
        assert!(matches!(session.read(&mut buf).await, Err(SessionError::ReadTimeout)));

        server.write_all(&[0, 0, 0, 9]).await.unwrap();
        session.set_read_deadline(None);
        session.read(&mut buf).await.unwrap();
        assert_eq!(buf, [8, 5, 0, 0, 0, 9]);
    }

    #[tokio::test]
    async fn test_read_reports_closed_stream() {
        let (mut session, server) = pair();
        drop(server);
        let mut buf = [0u8; 6];
        assert!(matches!(session.read(&mut buf).await, Err(SessionError::StreamClosed)));
    }

    #[tokio::test]
    async fn test_partial_fill_then_close_is_not_silent() {
        let (mut session, mut server) = pair();
        server.write_all(&[1, 2]).await.unwrap();
        drop(server);
        let mut buf = [0u8; 6];
        assert!(matches!(session.read(&mut buf).await, Err(SessionError::StreamClosed)));
    }

    #[tokio::test]
    async fn test_write_to_closed_peer_fails() {
        let (mut session, server) = pair();
        drop(server);
        assert!(matches!(session.write(b"frame").await, Err(SessionError::Write(_))));
    }

    #[tokio::test]
    async fn test_close_signals_eof_to_peer() {
        let (mut session, mut server) = pair();
        session.write(b"bye").await.unwrap();
        session.close().await;

        let mut received = Vec::new();
        server.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"bye");
    }
}
