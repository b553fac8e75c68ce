#![deny(unsafe_code)]

//! crelay CLI: switch relays from the shell or run the HTTP daemon.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crelay_config::{AppConfig, DEFAULT_CONFIG_PATH};
use crelay_core::build_info::VERSION_LINE;
use crelay_core::{CardType, Command, Daemon, Dispatcher, Outcome, RelayError};

/// crelay: control relay cards from the command line or over HTTP.
#[derive(Parser, Debug)]
#[command(name = "crelay", version = VERSION_LINE, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Run the HTTP daemon. Remaining arguments are relay labels.
    #[arg(short, long)]
    daemon: bool,

    /// List every attached relay card.
    #[arg(short = 'i', long = "list")]
    list: bool,

    /// Print the card list as JSON.
    #[arg(long, requires = "list")]
    json: bool,

    /// Select the card with this serial number.
    #[arg(short, long)]
    serial: Option<String>,

    /// `info`, `CHANNEL` or `CHANNEL on|off|pulse` (relay labels with -d).
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

impl Cli {
    /// Whether anything beyond global options was given.
    fn has_request(&self) -> bool {
        self.daemon || self.list || self.serial.is_some() || !self.args.is_empty()
    }

    /// The relay request as an argument vector for [`Command::from_args`].
    fn command_words(&self) -> Vec<String> {
        let mut words = Vec::new();
        if let Some(serial) = &self.serial {
            words.push("-s".to_string());
            words.push(serial.clone());
        }
        if self.list {
            words.push("-i".to_string());
        }
        words.extend(self.args.iter().cloned());
        words
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    if !cli.has_request() {
        print_usage();
        return Ok(ExitCode::SUCCESS);
    }

    let (config, found) = load_config(&cli.config).await?;
    init_tracing(&cli, &config);
    if !found {
        info!(path = %cli.config.display(), "Config file not found, using defaults");
    }

    if cli.daemon {
        cmd_daemon(config, &cli.args).await?;
        return Ok(ExitCode::SUCCESS);
    }
    cmd_relay(&cli, &config).await
}

/// `RUST_LOG` wins, then `-v`. The daemon falls back to the configured level,
/// interactive commands to warnings only so results stay readable.
fn init_tracing(cli: &Cli, config: &AppConfig) {
    let filter = match cli.verbose {
        0 if cli.daemon => config.logging.level.as_str(),
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();
}

async fn cmd_daemon(config: AppConfig, labels: &[String]) -> Result<()> {
    info!(version = VERSION_LINE, "Starting crelay daemon");
    let daemon = Daemon::new(config, labels);
    daemon.run().await?;
    Ok(())
}

async fn cmd_relay(cli: &Cli, config: &AppConfig) -> Result<ExitCode> {
    let command = match Command::from_args(&cli.command_words()) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{e}");
            eprintln!("Run 'crelay' without arguments for usage.");
            return Ok(ExitCode::FAILURE);
        }
    };
    debug!(?command, "Parsed command");

    let dispatcher = Dispatcher::from_config(config);
    match dispatcher.dispatch(&command).await {
        Ok(outcome) => {
            print_outcome(&outcome, cli.json)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(RelayError::NoDeviceFound { .. }) => {
            eprintln!("** No compatible device detected **");
            Ok(ExitCode::FAILURE)
        }
        Err(e) => {
            eprintln!("Error: {e}");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_outcome(outcome: &Outcome, json: bool) -> Result<()> {
    match outcome {
        Outcome::Cards(cards) if json => {
            println!("{}", serde_json::to_string_pretty(cards)?);
        }
        Outcome::Cards(cards) => {
            println!("Detected relay cards:");
            for (i, card) in cards.iter().enumerate() {
                println!(
                    "  #{} {} ({} relays) on {}{}",
                    i + 1,
                    card.card_type.display_name(),
                    card.relay_count,
                    card.path,
                    card.serial
                        .as_deref()
                        .map(|s| format!(", serial {s}"))
                        .unwrap_or_default()
                );
            }
        }
        Outcome::Card(card) => {
            println!("Relay card: {}", card.card_type.display_name());
            println!("Path:       {}", card.path);
            if let Some(serial) = &card.serial {
                println!("Serial:     {serial}");
            }
            println!("Relays:     {}", card.relay_count);
        }
        Outcome::Snapshot(snapshot) => match snapshot.target {
            Some(channel) => {
                let state = snapshot
                    .state_of(channel)
                    .context("relay missing from read-back")?;
                println!("Relay {channel} is {state}");
            }
            None => {
                for (channel, state) in &snapshot.channels {
                    println!("Relay {channel} is {state}");
                }
            }
        },
    }
    Ok(())
}

fn print_usage() {
    let _ = Cli::command().print_help();
    println!();
    println!("Examples:");
    println!("  crelay -d [LABEL1 .. LABEL8]      run the HTTP daemon");
    println!("  crelay -i [--json]                list attached relay cards");
    println!("  crelay [-s SERIAL] info           describe the relay card");
    println!("  crelay [-s SERIAL] RELAY [on|off|pulse]");
    println!();
    println!("Supported relay cards:");
    for card_type in CardType::ALL {
        println!("  - {}", card_type.display_name());
    }
}

/// Load the config file, or defaults when it does not exist. Returns whether
/// the file was found.
async fn load_config(path: &Path) -> Result<(AppConfig, bool)> {
    if path.exists() {
        let config = AppConfig::load(path)
            .await
            .with_context(|| format!("failed to load {}", path.display()))?;
        Ok((config, true))
    } else {
        Ok((AppConfig::default(), false))
    }
}
