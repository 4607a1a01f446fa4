//! Utility modules for pfx-to-pem
//!
//! This module contains error types and progress indicators.

pub mod error;
pub mod progress;

pub use error::{
    CertFileError, ConfigError, ConvertError, KeyMatchError, Pkcs12Error, Result, ToolkitError,
};
