//! pfx-to-pem - split a PKCS#12 container into PEM files
//!
//! Writes an unencrypted private key, the leaf certificate and the
//! intermediate chain as three separate PEM files.

use clap::Parser;
use console::style;
use pfx_to_pem::cert_ops::runner::{self, RunOutcome};
use pfx_to_pem::cli::interactive;
use pfx_to_pem::{config, Cli, Settings, ToolkitError};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();

    // Handle color preference
    if cli.no_color {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let settings = match config::load_config(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => fail(ToolkitError::from(e)),
    };

    init_logging(&cli, &settings);

    match interactive::install_interrupt_handler() {
        Ok(()) => tracing::debug!("interrupt handler installed"),
        Err(e) => tracing::warn!(error = %e, "could not install interrupt handler"),
    }

    match runner::run_convert(&cli, &settings) {
        Ok(RunOutcome::Converted) => {}
        Ok(RunOutcome::Cancelled) => interactive::report_cancelled(),
        Err(e) => fail(e),
    }
}

/// `--verbose` wins, then RUST_LOG, then the configured level
fn init_logging(cli: &Cli, settings: &Settings) {
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn fail(e: impl std::fmt::Display) -> ! {
    eprintln!("{} {}", style("Error:").red().bold(), e);
    std::process::exit(1);
}
