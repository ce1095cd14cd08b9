//! Pushwire CLI - push notifications and read the feedback service.
//!
//! This is the main binary entry point. See the `pushwire` library for the
//! core functionality.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use pushwire::{commands, Config};
use tokio_util::sync::CancellationToken;

// CLI
#[derive(Parser)]
#[command(name = "pushwire")]
#[command(version)]
#[command(about = "Send push notifications over the binary gateway protocol")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Connection flags shared by every subcommand.
#[derive(clap::Args)]
struct ConnectionArgs {
    /// Path to the PEM certificate bundle
    #[arg(short = 'c', long)]
    certificate: Option<PathBuf>,
    /// Use the sandbox (development) environment
    #[arg(short = 'd', long)]
    sandbox: bool,
    /// Prompt for the certificate passphrase
    #[arg(short = 'p', long)]
    passphrase: bool,
}

impl ConnectionArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(certificate) = &self.certificate {
            config.certificate = Some(certificate.clone());
        }
        if self.sandbox {
            config.sandbox = true;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Send an alert to one or more device tokens
    Push {
        /// Hex device tokens
        #[arg(required = true)]
        tokens: Vec<String>,
        /// Alert text
        #[arg(short = 'a', long)]
        alert: Option<String>,
        /// Badge number
        #[arg(short = 'b', long)]
        badge: Option<i32>,
        /// Sound name
        #[arg(short = 's', long)]
        sound: Option<String>,
        #[command(flatten)]
        connection: ConnectionArgs,
    },
    /// List devices reported by the feedback service
    Feedback {
        #[command(flatten)]
        connection: ConnectionArgs,
    },
}

fn init_logging() -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    builder.format_timestamp_secs();
    if let Ok(path) = std::env::var("PUSHWIRE_LOG_FILE") {
        let log_file = std::fs::File::create(&path)?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    }
    builder.init();
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_logging()?;
    let cli = Cli::parse();
    let mut config = Config::load()?;

    match cli.command {
        Commands::Push {
            tokens,
            alert,
            badge,
            sound,
            connection,
        } => {
            connection.apply(&mut config);
            let identity = commands::load_identity(&config, connection.passphrase)?;

            let shutdown = CancellationToken::new();
            let ctrl_c = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::warn!("Interrupted, stopping delivery");
                    ctrl_c.cancel();
                }
            });

            let message = commands::push::Message {
                alert,
                badge,
                sound,
            };
            let report =
                commands::push::run(&config, &identity, &tokens, &message, shutdown).await?;
            if !report.all_sent() {
                anyhow::bail!("{} of {} notification(s) not sent", report.unsent, tokens.len());
            }
        }
        Commands::Feedback { connection } => {
            connection.apply(&mut config);
            let identity = commands::load_identity(&config, connection.passphrase)?;
            commands::feedback::run(&config, &identity).await?;
        }
    }

    Ok(())
}
