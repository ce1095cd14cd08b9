//! CLI subcommand implementations for pushwire.
//!
//! - [`push`] - Send one alert to a list of device tokens
//! - [`feedback`] - Print devices reported by the feedback service
//!
//! # Usage
//!
//! ```ignore
//! use pushwire::commands;
//!
//! let identity = commands::load_identity(&config, prompt)?;
//! commands::push::run(&config, &identity, &tokens, &message, shutdown).await?;
//! commands::feedback::run(&config, &identity).await?;
//! ```

pub mod feedback;
pub mod push;

use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::{Context, Result};
use zeroize::Zeroizing;

use crate::config::Config;
use crate::identity::Identity;

/// Environment variable holding the certificate passphrase.
pub const PASSPHRASE_VAR: &str = "PUSHWIRE_PASSPHRASE";

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

/// Wrap `text` in an ANSI color when stdout is a terminal.
fn paint(color: &str, text: &str) -> String {
    if atty::is(atty::Stream::Stdout) {
        format!("{color}{text}{RESET}")
    } else {
        text.to_string()
    }
}

pub(crate) fn success_line(text: &str) {
    println!("{}", paint(GREEN, text));
}

pub(crate) fn failure_line(text: &str) {
    println!("{}", paint(RED, text));
}

/// Read the certificate bundle named in `config`.
pub fn read_certificate(config: &Config) -> Result<Vec<u8>> {
    let path = config
        .certificate
        .as_deref()
        .context("No certificate configured (use -c or PUSHWIRE_CERTIFICATE)")?;
    read_bundle(path)
}

fn read_bundle(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read certificate {}", path.display()))
}

/// Passphrase from `PUSHWIRE_PASSPHRASE`, else prompted on stdin when
/// `prompt` is set.
pub fn read_passphrase(prompt: bool) -> Result<Option<Zeroizing<String>>> {
    if let Ok(passphrase) = std::env::var(PASSPHRASE_VAR) {
        return Ok(Some(Zeroizing::new(passphrase)));
    }
    if !prompt {
        return Ok(None);
    }

    if atty::is(atty::Stream::Stdin) {
        print!("Certificate passphrase: ");
        io::stdout().flush()?;
    }
    let mut line = Zeroizing::new(String::new());
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read passphrase")?;
    let trimmed = line.trim_end_matches(['\r', '\n']).len();
    line.truncate(trimmed);
    Ok(Some(line))
}

/// Read the configured certificate and decrypt it.
pub fn load_identity(config: &Config, prompt: bool) -> Result<Identity> {
    let bundle = Zeroizing::new(read_certificate(config)?);
    let passphrase = read_passphrase(prompt)?;
    let identity = Identity::from_pem(&bundle, passphrase.as_ref().map(|p| p.as_bytes()))
        .context("Failed to load certificate")?;
    log::info!(
        "Loaded certificate {}",
        identity.common_name().unwrap_or("<no CN>")
    );
    Ok(identity)
}
