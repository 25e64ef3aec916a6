//! Command-line interface module.

mod args;
pub mod classify;
pub mod instrument;

pub use args::{Cli, Commands};
