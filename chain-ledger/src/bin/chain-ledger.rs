//! Chain ledger operator CLI

use anyhow::Context;
use chain_ledger::{api::EventApi, events, Config, Ledger};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Operate a local chain ledger
///
/// # Usage
///
/// ```sh
/// chain-ledger [OPTIONS] <COMMAND>
/// ```
#[derive(Parser, Debug)]
#[command(name = "chain-ledger", version, about = "Tamper-evident event ledger")]
struct Cli {
    /// TOML configuration file
    #[arg(long, short = 'c', global = true, env = "LEDGER_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory; overrides the configuration file
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the genesis block if the store is empty
    Init,
    /// Append an event
    Submit {
        /// Event type tag
        event_type: String,
        /// Payload as a JSON object
        payload: String,
    },
    /// List payloads of one event type, oldest first
    List {
        /// Event type tag
        event_type: String,
    },
    /// Verify the whole chain; exits non-zero when invalid
    Verify,
    /// Print one block
    Show {
        /// Block height; defaults to the tip
        height: Option<u64>,
    },
    /// Print block counts per event type
    Stats,
    /// Initialize the ledger and submit the demo activities
    Seed,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    config.apply_env().context("Invalid LEDGER_* environment")?;
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = data_dir.clone();
    }
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Serialize)]
struct BlockView<'a> {
    height: u64,
    timestamp: i64,
    prev_hash: &'a str,
    hash: &'a str,
    event_type: &'a str,
    payload: &'a str,
    sealed: bool,
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = load_config(&cli)?;
    tracing::info!(data_dir = ?config.data_dir, "Opening ledger");

    let ledger = Arc::new(Ledger::open(config).await?);
    let api = EventApi::new(ledger.clone());

    match cli.command {
        Command::Init => match ledger.ensure_genesis().await? {
            Some(receipt) => print_json(&receipt)?,
            None => println!("Ledger already initialized"),
        },
        Command::Submit {
            event_type,
            payload,
        } => {
            let payload: serde_json::Value =
                serde_json::from_str(&payload).context("Payload is not valid JSON")?;
            match api.submit_event(&event_type, &payload).await {
                Ok(response) => print_json(&response)?,
                Err(e) => {
                    print_json(&e.body())?;
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Command::List { event_type } => print_json(&api.list_events(&event_type).await?)?,
        Command::Verify => {
            let response = api.verify().await?;
            print_json(&response)?;
            if !response.valid {
                return Ok(ExitCode::from(2));
            }
        }
        Command::Show { height } => {
            let block = match height {
                Some(height) => ledger.get_block(height).await?,
                None => ledger
                    .tip()
                    .await?
                    .context("Ledger is empty; run `chain-ledger init`")?,
            };
            print_json(&BlockView {
                height: block.height,
                timestamp: block.timestamp,
                prev_hash: &block.prev_hash,
                hash: &block.hash,
                event_type: &block.event_type,
                payload: block.payload_str(),
                sealed: block.is_sealed_correctly(),
            })?;
        }
        Command::Stats => print_json(&ledger.stats().await?)?,
        Command::Seed => {
            ledger.ensure_genesis().await?;
            let samples = events::sample_activities();
            let total = samples.len();
            for sample in samples {
                match api.submit_activity(sample).await {
                    Ok(response) => print_json(&response)?,
                    Err(e) => {
                        print_json(&e.body())?;
                        return Ok(ExitCode::FAILURE);
                    }
                }
            }
            tracing::info!(activities = total, "Ledger seeded");
        }
    }

    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
