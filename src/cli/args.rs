//! CLI argument definitions using clap

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pfx-to-pem")]
#[command(version)]
#[command(
    about = "Split a password-protected PKCS#12 (PFX) container into PEM key, certificate and chain files",
    long_about = None
)]
pub struct Cli {
    /// PKCS#12 container to convert (discovered in --dir when omitted)
    #[arg(value_name = "CONTAINER")]
    pub container: Option<PathBuf>,

    /// Directory searched for containers when none is given
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub dir: PathBuf,

    /// Output directory (default: <container stem>_certs beside the container)
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Read the password from this environment variable instead of prompting
    #[arg(long, value_name = "VAR")]
    pub password_env: Option<String>,

    /// Settings file (default: config/default.toml when present)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print a JSON summary instead of status lines
    #[arg(long)]
    pub json: bool,

    /// Overwrite existing output files
    #[arg(short, long)]
    pub force: bool,

    /// Verbose output (debug logging)
    #[arg(short, long)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}
