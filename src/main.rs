//! pinboard - geographic bookmarks from the command line.

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::warn;

use pinboard::{Config, Pinboard, paths};

#[derive(Parser)]
#[command(name = "pinboard")]
#[command(about = "Bookmark places, with photos that survive crashes")]
#[command(version)]
struct Cli {
    /// Configuration file (default: <data dir>/pinboard.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a pin
    Add {
        /// Latitude in degrees, -90 to 90
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        /// Longitude in degrees, -180 to 180
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        details: Option<String>,
        /// Altitude in meters
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        altitude: f64,
        /// Color id, 0-13 (see `pinboard colors`)
        #[arg(long, default_value_t = 0)]
        color: u8,
        /// Image file to attach
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Change fields of a pin; omitted fields are kept
    Edit {
        id: String,
        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        lon: Option<f64>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        details: Option<String>,
        #[arg(long, allow_hyphen_values = true)]
        altitude: Option<f64>,
        #[arg(long)]
        color: Option<u8>,
    },
    /// Delete a pin and its image
    Rm { id: String },
    /// Show one pin
    Show {
        id: String,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// List pins, newest first
    List {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Attach (or replace) a pin's image
    Attach { id: String, image: PathBuf },
    /// Remove a pin's image
    Detach { id: String },
    /// List pin colors
    Colors,
    /// Set the nickname of a color
    RenameColor { color_id: u8, descriptor: String },
    /// Apply all pending image operations now
    Drain,
    /// List image operations that failed permanently
    Failures {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Requeue (or discard) a failed image operation
    Retry {
        sequence: i64,
        /// Drop the request instead of retrying it
        #[arg(long)]
        discard: bool,
    },
    /// Check that every referenced image is stored or queued
    Audit,
}

fn init_stdout_logging(json: bool) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let path = match path {
        Some(path) => path,
        None => paths::get_config_path()?,
    };
    let config = Config::load_or_default(&path)?;

    let validation = config
        .validate()
        .with_context(|| format!("Invalid configuration: {}", path.display()))?;
    for warning in &validation.warnings {
        warn!("{warning}");
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_stdout_logging(cli.log_json);

    let config = load_config(cli.config)?;
    let board = Pinboard::open(&config).await?;

    let result = run(&board, cli.command).await;

    // Leave nothing half-queued behind for a CLI invocation.
    if let Err(e) = board.queue().drain().await {
        warn!(error = %e, "Final drain failed; requests remain queued");
    }
    board.shutdown().await;
    result
}

async fn run(board: &Pinboard, command: Commands) -> Result<()> {
    match command {
        Commands::Add {
            lat,
            lon,
            name,
            details,
            altitude,
            color,
            image,
        } => {
            commands::pins::add(
                board,
                commands::pins::AddArgs {
                    latitude: lat,
                    longitude: lon,
                    name,
                    details,
                    altitude,
                    color,
                    image,
                },
            )
            .await
        },
        Commands::Edit {
            id,
            lat,
            lon,
            name,
            details,
            altitude,
            color,
        } => commands::pins::edit(
            board,
            &id,
            commands::pins::EditArgs {
                latitude: lat,
                longitude: lon,
                name,
                details,
                altitude,
                color,
            },
        ),
        Commands::Rm { id } => commands::pins::remove(board, &id),
        Commands::Show { id, json } => commands::pins::show(board, &id, json).await,
        Commands::List { json } => commands::pins::list(board, json),
        Commands::Attach { id, image } => commands::pins::attach(board, &id, &image).await,
        Commands::Detach { id } => commands::pins::detach(board, &id),
        Commands::Colors => commands::colors::list(board),
        Commands::RenameColor {
            color_id,
            descriptor,
        } => commands::colors::rename(board, color_id, &descriptor),
        Commands::Drain => commands::queue::drain(board).await,
        Commands::Failures { json } => commands::queue::failures(board, json),
        Commands::Retry { sequence, discard } => {
            commands::queue::retry(board, sequence, discard).await
        },
        Commands::Audit => commands::queue::audit(board),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_log_json_is_global() {
        let cli = Cli::try_parse_from(["pinboard", "failures", "--log-json"]).unwrap();
        assert!(cli.log_json);
        assert!(matches!(cli.command, Commands::Failures { json: false }));

        let cli = Cli::try_parse_from(["pinboard", "list"]).unwrap();
        assert!(!cli.log_json);
    }
}
