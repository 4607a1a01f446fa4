//! Command-line interface module
//!
//! Argument parsing with clap and the interactive prompts.

pub mod args;
pub mod interactive;

pub use args::Cli;
