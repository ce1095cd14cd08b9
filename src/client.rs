//! High-level client bundling a connector with the gateway and feedback
//! endpoints of one environment.
//!
//! ```ignore
//! let identity = Identity::from_pem(&bundle, Some(b"passphrase"))?;
//! let client = Client::new(Environment::Sandbox, &identity)?;
//!
//! let mut batch = vec![notification];
//! let report = client.push(&mut batch).await?;
//! let devices = client.unregistered_devices().await?;
//! ```

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::{Config, Environment};
use crate::delivery::{DeliveryPipeline, DeliveryReport, DeliverySettings};
use crate::device::Device;
use crate::error::{Result, SessionError};
use crate::feedback::FeedbackReader;
use crate::identity::Identity;
use crate::notification::Notification;
use crate::session::{Connector, Endpoint, TlsConnector};

/// Push and feedback client.
#[derive(Debug)]
pub struct Client<C = TlsConnector> {
    connector: Arc<C>,
    gateway: Endpoint,
    feedback: Endpoint,
    settings: DeliverySettings,
    shutdown: CancellationToken,
}

impl Client<TlsConnector> {
    /// Client for `environment`'s endpoints, authenticating as `identity`.
    pub fn new(environment: Environment, identity: &Identity) -> Result<Self> {
        let connector = TlsConnector::new(identity)?;
        Ok(Self::with_connector(
            connector,
            Endpoint::parse(environment.gateway())?,
            Endpoint::parse(environment.feedback())?,
        ))
    }

    /// Client built from `config`: endpoint overrides and timeouts included.
    pub fn from_config(config: &Config, identity: &Identity) -> Result<Self> {
        let connector = TlsConnector::new(identity)?.with_connect_timeout(config.connect_timeout());
        Ok(Self::with_connector(
            connector,
            config.gateway_endpoint()?,
            config.feedback_endpoint()?,
        )
        .with_settings(config.delivery_settings()))
    }

    /// Load `bundle` and build a client for `environment`.
    pub fn from_certificate(
        environment: Environment,
        bundle: &[u8],
        passphrase: Option<&[u8]>,
    ) -> Result<Self> {
        Self::new(environment, &Identity::from_pem(bundle, passphrase)?)
    }
}

impl<C> Client<C>
where
    C: Connector + 'static,
{
    /// Client over an arbitrary connector.
    pub fn with_connector(connector: C, gateway: Endpoint, feedback: Endpoint) -> Self {
        Self {
            connector: Arc::new(connector),
            gateway,
            feedback,
            settings: DeliverySettings::default(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_settings(mut self, settings: DeliverySettings) -> Self {
        self.settings = settings;
        self
    }

    /// Cancel in-flight pushes when `token` is cancelled.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn gateway(&self) -> &Endpoint {
        &self.gateway
    }

    pub fn feedback(&self) -> &Endpoint {
        &self.feedback
    }

    /// See [`DeliveryPipeline::push`].
    pub async fn push(
        &self,
        batch: &mut [Notification],
    ) -> std::result::Result<DeliveryReport, SessionError> {
        DeliveryPipeline::new(Arc::clone(&self.connector), self.gateway.clone(), self.settings)
            .with_shutdown(self.shutdown.clone())
            .push(batch)
            .await
    }

    /// See [`FeedbackReader::unregistered_devices`].
    pub async fn unregistered_devices(&self) -> std::result::Result<Vec<Device>, SessionError> {
        FeedbackReader::new(Arc::clone(&self.connector), self.feedback.clone())
            .with_read_timeout(self.settings.response_timeout)
            .unregistered_devices()
            .await
    }
}
