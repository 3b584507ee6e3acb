//! Conditioner simulator
//!
//! Replays scripted network telemetry through a conditioner and prints the
//! resulting adjustments, so strategies can be compared without an encoder.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{cmd_list, cmd_modes, cmd_run, RunArgs};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario preset or JSON file through a conditioner
    Run {
        /// Preset name or path to a scenario JSON file
        scenario: String,

        /// Mode name (logarithmic-descend, ladder-ascend, hybrid, constant) or code 0-3
        #[arg(long, default_value = "logarithmic-descend")]
        mode: String,

        /// Initial bitrate in bps
        #[arg(long, default_value_t = 2_000_000)]
        initial_bitrate: u32,

        /// Conditioner configuration JSON file
        #[arg(long)]
        config: Option<String>,
    },

    /// List available scenario presets
    List,

    /// Show supported conditioner modes
    Modes,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            scenario,
            mode,
            initial_bitrate,
            config,
        } => {
            cmd_run(RunArgs {
                scenario,
                mode,
                initial_bitrate,
                config,
            })
            .await?;
        }
        Commands::List => {
            cmd_list()?;
        }
        Commands::Modes => {
            cmd_modes()?;
        }
    }

    Ok(())
}
