//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

/// Component hot-reload toolkit
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file path (default: hotswap.toml)
    #[arg(short = 'C', long, global = true, default_value = "hotswap.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Enable verbose output for debugging
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Instrument one module for hot reload
    #[command(visible_alias = "i")]
    Instrument {
        /// Source module
        #[arg(value_hint = clap::ValueHint::FilePath)]
        file: PathBuf,

        /// Write the result here instead of stdout
        #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
        output: Option<PathBuf>,

        /// Print the detected components as JSON instead of code
        #[arg(short, long)]
        list: bool,
    },

    /// Compare two versions of a module and print a change record per component
    #[command(visible_alias = "c")]
    Classify {
        /// Previous version of the module
        #[arg(value_hint = clap::ValueHint::FilePath)]
        old: PathBuf,

        /// New version of the module
        #[arg(value_hint = clap::ValueHint::FilePath)]
        new: PathBuf,

        /// Pretty-print JSON output
        #[arg(short, long)]
        pretty: bool,
    },

    /// Instrument the source tree and keep it in sync
    #[command(visible_alias = "w")]
    Watch,
}
