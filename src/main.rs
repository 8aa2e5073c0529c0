use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::Config;

mod businesses;
mod census;
mod config;
mod directory;
mod feature;
mod fetch;
mod geocode;
mod geojson;
mod geometry;
mod locations;
mod utils;

#[derive(Debug, Parser)]
struct Cli {
    /// Pipeline configuration.
    #[arg(long, default_value = "maps.yaml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, Subcommand)]
enum Command {
    /// Build business maps whose output does not exist yet.
    Build {
        /// Rebuild even if the output exists.
        #[arg(long)]
        force: bool,
    },
    /// Apply location codes, images and hand edits to built maps.
    Correct,
    /// Scrape the map listing pages into a location index.
    Locations {
        /// Use the full census polygon instead of its bounding box.
        #[arg(long)]
        outline: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    match cli.command {
        Command::Build { force } => businesses::build(&config, force),
        Command::Correct => businesses::correct(&config),
        Command::Locations { outline } => locations::main(&config, outline),
    }
}
