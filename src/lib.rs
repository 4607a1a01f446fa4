//! pfx-to-pem library
//!
//! Converts a password-protected PKCS#12 (PFX) container into three PEM
//! artifacts: an unencrypted PKCS#8 private key, the leaf certificate that
//! pairs with it, and the remaining certificates as the chain.
//!
//! # Usage
//!
//! ```rust,no_run
//! use pfx_to_pem::convert;
//!
//! let container = std::fs::read("site.pfx")?;
//! let bundle = convert(&container, "export password")?;
//! std::fs::write("certificate.pem", bundle.cert_pem())?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod cert_ops;
pub mod cli;
pub mod config;
pub mod pkcs12;
pub mod utils;

// Re-export commonly used types
pub use cert_ops::{convert, ArtifactRole, CredentialBundle, PemArtifact};
pub use cli::Cli;
pub use config::Settings;
pub use utils::{ConvertError, Result, ToolkitError};
