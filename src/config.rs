//! Configuration loading and persistence.
//!
//! Reads `config.json` from the pushwire config directory, then applies
//! `PUSHWIRE_*` environment overrides. Command-line flags are applied last by
//! the binary.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::constants::{
    CONNECT_TIMEOUT, INACTIVITY_WINDOW, PRODUCTION_FEEDBACK, PRODUCTION_GATEWAY,
    RESPONSE_TIMEOUT, SANDBOX_FEEDBACK, SANDBOX_GATEWAY,
};
use crate::delivery::DeliverySettings;
use crate::error::SessionError;
use crate::session::Endpoint;

/// Which gateway deployment to talk to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Environment {
    #[default]
    Production,
    Sandbox,
}

impl Environment {
    pub fn from_sandbox(sandbox: bool) -> Self {
        if sandbox {
            Self::Sandbox
        } else {
            Self::Production
        }
    }

    /// Notification gateway `host:port`.
    pub fn gateway(self) -> &'static str {
        match self {
            Self::Production => PRODUCTION_GATEWAY,
            Self::Sandbox => SANDBOX_GATEWAY,
        }
    }

    /// Feedback service `host:port`.
    pub fn feedback(self) -> &'static str {
        match self {
            Self::Production => PRODUCTION_FEEDBACK,
            Self::Sandbox => SANDBOX_FEEDBACK,
        }
    }
}

/// Configuration for the pushwire client and CLI.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Use the sandbox deployment instead of production.
    pub sandbox: bool,
    /// Path to the PEM certificate bundle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<PathBuf>,
    /// Gateway `host:port` override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    /// Feedback `host:port` override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    /// TCP connect + TLS handshake timeout.
    pub connect_timeout_ms: u64,
    /// Read deadline for error responses and feedback tuples.
    pub response_timeout_ms: u64,
    /// Send-task inactivity window.
    pub inactivity_window_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sandbox: false,
            certificate: None,
            gateway: None,
            feedback: None,
            connect_timeout_ms: millis(CONNECT_TIMEOUT),
            response_timeout_ms: millis(RESPONSE_TIMEOUT),
            inactivity_window_ms: millis(INACTIVITY_WINDOW),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Config {
    /// Returns the configuration directory path.
    ///
    /// `PUSHWIRE_CONFIG_DIR` if set, otherwise the platform config dir
    /// (e.g. `~/.config/pushwire`).
    pub fn config_dir() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var("PUSHWIRE_CONFIG_DIR") {
            return Ok(PathBuf::from(dir));
        }
        Ok(dirs::config_dir()
            .context("Could not determine config directory")?
            .join("pushwire"))
    }

    /// Path of `config.json`.
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Loads configuration from file, with environment variable overrides.
    ///
    /// A missing file yields defaults; a file that does not parse is an error.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Read a config file without applying overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Apply `PUSHWIRE_*` overrides looked up through `var`.
    ///
    /// Unparseable numeric or boolean values are ignored.
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(sandbox) = var("PUSHWIRE_SANDBOX") {
            match sandbox.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => self.sandbox = true,
                "0" | "false" | "no" => self.sandbox = false,
                other => log::warn!("Ignoring PUSHWIRE_SANDBOX={other}"),
            }
        }

        if let Some(certificate) = var("PUSHWIRE_CERTIFICATE") {
            self.certificate = Some(PathBuf::from(certificate));
        }

        if let Some(gateway) = var("PUSHWIRE_GATEWAY") {
            self.gateway = Some(gateway);
        }

        if let Some(feedback) = var("PUSHWIRE_FEEDBACK") {
            self.feedback = Some(feedback);
        }

        let millis_var = |key: &str| var(key).and_then(|v| v.parse::<u64>().ok());

        if let Some(ms) = millis_var("PUSHWIRE_CONNECT_TIMEOUT_MS") {
            self.connect_timeout_ms = ms;
        }

        if let Some(ms) = millis_var("PUSHWIRE_RESPONSE_TIMEOUT_MS") {
            self.response_timeout_ms = ms;
        }

        if let Some(ms) = millis_var("PUSHWIRE_INACTIVITY_WINDOW_MS") {
            self.inactivity_window_ms = ms;
        }
    }

    /// Persists the current configuration to the config directory.
    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)?;
        self.save_to(&dir.join("config.json"))
    }

    /// Write pretty JSON to `path`, readable by the owner only.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;

        #[cfg(unix)]
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }

    pub fn environment(&self) -> Environment {
        Environment::from_sandbox(self.sandbox)
    }

    /// Gateway endpoint: the override if set, else the environment's.
    pub fn gateway_endpoint(&self) -> Result<Endpoint, SessionError> {
        Endpoint::parse(self.gateway.as_deref().unwrap_or(self.environment().gateway()))
    }

    /// Feedback endpoint: the override if set, else the environment's.
    pub fn feedback_endpoint(&self) -> Result<Endpoint, SessionError> {
        Endpoint::parse(self.feedback.as_deref().unwrap_or(self.environment().feedback()))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn delivery_settings(&self) -> DeliverySettings {
        DeliverySettings {
            inactivity_window: Duration::from_millis(self.inactivity_window_ms),
            response_timeout: self.response_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(!config.sandbox);
        assert_eq!(config.response_timeout_ms, 2000);
        assert_eq!(config.inactivity_window_ms, 3000);
        assert_eq!(
            config.gateway_endpoint().unwrap(),
            Endpoint::new("gateway.push.apple.com", 2195)
        );
        assert_eq!(
            config.feedback_endpoint().unwrap(),
            Endpoint::new("feedback.push.apple.com", 2196)
        );
    }

    #[test]
    fn test_sandbox_endpoints() {
        let config = Config {
            sandbox: true,
            ..Config::default()
        };
        assert_eq!(config.environment(), Environment::Sandbox);
        assert_eq!(config.gateway_endpoint().unwrap().host, "gateway.sandbox.push.apple.com");
        assert_eq!(config.feedback_endpoint().unwrap().port, 2196);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(vars(&[
            ("PUSHWIRE_SANDBOX", "true"),
            ("PUSHWIRE_GATEWAY", "localhost:12195"),
            ("PUSHWIRE_RESPONSE_TIMEOUT_MS", "150"),
            ("PUSHWIRE_INACTIVITY_WINDOW_MS", "not-a-number"),
        ]));

        assert!(config.sandbox);
        assert_eq!(config.gateway_endpoint().unwrap(), Endpoint::new("localhost", 12195));
        assert_eq!(config.feedback_endpoint().unwrap().host, "feedback.sandbox.push.apple.com");
        assert_eq!(config.delivery_settings().response_timeout, Duration::from_millis(150));
        assert_eq!(config.delivery_settings().inactivity_window, Duration::from_secs(3));
    }

    #[test]
    fn test_invalid_override_endpoint() {
        let config = Config {
            gateway: Some("no-port".into()),
            ..Config::default()
        };
        assert!(matches!(
            config.gateway_endpoint(),
            Err(SessionError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = Config {
            sandbox: true,
            certificate: Some(PathBuf::from("/etc/push/cert.pem")),
            ..Config::default()
        };

        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);

        #[cfg(unix)]
        {
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"sandbox": true}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert!(config.sandbox);
        assert_eq!(config.connect_timeout_ms, 10_000);
    }
}
