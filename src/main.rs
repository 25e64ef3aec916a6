//! hotswap command-line entry point.

use anyhow::Result;
use clap::{ColorChoice, Parser};
use hotswap::cli::{self, Cli, Commands};
use hotswap::config::HotswapConfig;
use hotswap::{logger, watch};

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    let config = HotswapConfig::load(&cli.config)?;

    match &cli.command {
        Commands::Instrument { file, output, list } => {
            cli::instrument::run(&config, file, output.as_deref(), *list)
        }
        Commands::Classify { old, new, pretty } => cli::classify::run(&config, old, new, *pretty),
        Commands::Watch => watch::run(&config),
    }
}
