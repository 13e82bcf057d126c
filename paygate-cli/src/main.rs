//! Paygate CLI - drive the purchase authorization flow against a simulated
//! device and an in-process verification backend.

mod commands;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use paygate_auth::{AuthConfig, SigningAlgorithm};
use tracing_subscriber::EnvFilter;

use commands::PresenceArg;

/// Paygate - presence-gated purchase authorization
#[derive(Parser)]
#[command(name = "paygate", version, about)]
struct Cli {
    /// Purchasing user (overrides PAYGATE_USER_ID)
    #[arg(long, global = true)]
    user: Option<String>,

    /// Device signing algorithm (overrides PAYGATE_SIGNING_ALGORITHM)
    #[arg(long, global = true, value_parser = parse_algorithm)]
    algorithm: Option<SigningAlgorithm>,

    /// Password registered when the simulated device is enrolled
    #[arg(long, global = true, default_value = "paygate")]
    enroll_password: String,

    /// Output JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Buy an item with biometric presence, falling back to a password
    Purchase {
        /// Item ID
        item: u64,

        /// Scripted sensor responses, in order (default: grant)
        #[arg(long, value_enum, value_delimiter = ',')]
        presence: Vec<PresenceArg>,

        /// Password to submit if the biometric channel is unavailable
        #[arg(long)]
        password: Option<String>,

        /// Simulate a device credential change before the attempt
        #[arg(long)]
        reset_credential: bool,

        /// Generate and enroll a new key after a password re-enrollment
        #[arg(long)]
        reenroll: bool,

        /// Cancel a pending prompt after this long (e.g. 500ms, 2s)
        #[arg(long, value_parser = parse_duration)]
        cancel_after: Option<std::time::Duration>,
    },

    /// Buy an item with the recency-window symmetric key
    Recency {
        /// Item ID
        item: u64,

        /// Time since the last device unlock (e.g. 2s, 6s)
        #[arg(long, value_parser = parse_duration)]
        unlocked_ago: Option<std::time::Duration>,

        /// Scripted lock-screen responses, in order (default: grant)
        #[arg(long, value_enum, value_delimiter = ',')]
        presence: Vec<PresenceArg>,
    },

    /// Show that a verified transaction cannot be submitted twice
    Replay {
        /// Item ID
        item: u64,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = run(cli).await;

    if let Err(e) = &result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Purchase {
            item,
            presence,
            password,
            reset_credential,
            reenroll,
            cancel_after,
        } => {
            commands::purchase(
                config,
                &cli.enroll_password,
                commands::PurchaseOptions {
                    item,
                    presence,
                    password,
                    reset_credential,
                    reenroll,
                    cancel_after,
                },
                cli.json,
            )
            .await
        }

        Commands::Recency {
            item,
            unlocked_ago,
            presence,
        } => {
            commands::recency(
                config,
                &cli.enroll_password,
                item,
                unlocked_ago,
                presence,
                cli.json,
            )
            .await
        }

        Commands::Replay { item } => {
            commands::replay(config, &cli.enroll_password, item, cli.json).await
        }

        Commands::Config => output::print_config(&config, cli.json),
    }
}

/// Environment first, then command-line flags.
fn load_config(cli: &Cli) -> Result<AuthConfig> {
    let mut config = AuthConfig::from_env().context("Invalid PAYGATE_* environment")?;
    if let Some(user) = &cli.user {
        config.user_id = user.clone();
    }
    if let Some(algorithm) = cli.algorithm {
        config.signing_algorithm = algorithm;
    }
    Ok(config)
}

fn parse_algorithm(s: &str) -> Result<SigningAlgorithm, String> {
    s.parse().map_err(|e| format!("{e}"))
}

fn parse_duration(s: &str) -> Result<std::time::Duration, String> {
    paygate_auth::config::parse_duration(s).ok_or_else(|| format!("Invalid duration: {s}"))
}
