//! Custom error types for pfx-to-pem
//!
//! One `thiserror` enum per concern. The converter's four-class taxonomy
//! lives in [`ConvertError`]; the others describe failures of the layers
//! below (container reader, key handling) and around (files, config) it.

use thiserror::Error;
use yasna::ASN1ErrorKind;

/// Top-level error type for the pfx-to-pem application
#[derive(Error, Debug)]
pub enum ToolkitError {
    #[error("{0}")]
    Convert(#[from] ConvertError),

    #[error("Certificate file error: {0}")]
    CertFile(#[from] CertFileError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Failures of the PKCS#12 container reader
#[derive(Error, Debug)]
pub enum Pkcs12Error {
    #[error("not a PKCS#12 container ({kind:?})")]
    Framing { kind: ASN1ErrorKind },

    #[error("unsupported PFX version {version}")]
    UnsupportedVersion { version: u64 },

    #[error("integrity check failed")]
    MacMismatch,

    #[error("failed to decrypt {what}")]
    Decryption { what: &'static str },

    /// Unreadable content. `authenticated` is set when the MAC had verified,
    /// which rules out a wrong password as the cause.
    #[error("invalid {context}")]
    Structure {
        context: &'static str,
        authenticated: bool,
    },

    #[error("unsupported algorithm {oid}")]
    UnsupportedAlgorithm { oid: String },
}

impl Pkcs12Error {
    pub(crate) fn invalid(context: &'static str) -> Self {
        Pkcs12Error::Structure {
            context,
            authenticated: false,
        }
    }

    pub(crate) fn unsupported(oid: impl ToString) -> Self {
        Pkcs12Error::UnsupportedAlgorithm {
            oid: oid.to_string(),
        }
    }
}

/// Private key parsing and key/certificate matching errors
#[derive(Error, Debug)]
pub enum KeyMatchError {
    #[error("Failed to parse private key: {message}")]
    InvalidKey { message: String },

    #[error("Unsupported private key algorithm: {oid}")]
    UnsupportedKeyAlgorithm { oid: String },

    #[error("Failed to parse certificate: {message}")]
    CertificateParse { message: String },
}

/// The converter's failure taxonomy
#[derive(Error, Debug)]
pub enum ConvertError {
    /// Integrity check rejected the password, or the content is unreadable
    /// in a way a wrong password would also produce.
    #[error("wrong password or corrupted file")]
    AuthenticationOrCorruption {
        #[source]
        source: Pkcs12Error,
    },

    #[error("malformed input: {reason}")]
    MalformedContainer { reason: String },

    #[error("incomplete credential data: {reason}")]
    IncompleteBundle { reason: String },

    #[error("unexpected error: {source}")]
    UnexpectedFailure {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

impl ConvertError {
    /// Short classification shown to the operator
    pub fn user_message(&self) -> String {
        match self {
            ConvertError::AuthenticationOrCorruption { .. } => {
                "wrong password or corrupted file".to_string()
            }
            ConvertError::MalformedContainer { .. } => "malformed input".to_string(),
            ConvertError::IncompleteBundle { .. } => "incomplete credential data".to_string(),
            ConvertError::UnexpectedFailure { .. } => {
                format!("unexpected error: {}", cause_chain(self))
            }
        }
    }

    /// Stable identifier for machine-readable output
    pub fn kind(&self) -> &'static str {
        match self {
            ConvertError::AuthenticationOrCorruption { .. } => "authentication_or_corruption",
            ConvertError::MalformedContainer { .. } => "malformed_container",
            ConvertError::IncompleteBundle { .. } => "incomplete_bundle",
            ConvertError::UnexpectedFailure { .. } => "unexpected_failure",
        }
    }

    pub(crate) fn unexpected<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ConvertError::UnexpectedFailure {
            source: Box::new(source),
        }
    }
}

/// Joins the `source()` chain below `err` with ": ".
fn cause_chain(err: &dyn std::error::Error) -> String {
    let mut parts = Vec::new();
    let mut current = err.source();
    while let Some(cause) = current {
        parts.push(cause.to_string());
        current = cause.source();
    }
    parts.join(": ")
}

/// Container and artifact file errors on the operator side
#[derive(Error, Debug)]
pub enum CertFileError {
    #[error("Failed to read {path}: {message}")]
    FileReadError { path: String, message: String },

    #[error("Failed to write {path}: {message}")]
    FileWriteError { path: String, message: String },

    #[error("{path} is {size} bytes, larger than the {limit} byte limit")]
    TooLarge { path: String, size: u64, limit: u64 },

    #[error("No container found in {dir} (looked for: {extensions})")]
    NoContainerFound { dir: String, extensions: String },

    #[error("Refusing to overwrite existing {path} (use --force)")]
    OutputExists { path: String },

    #[error("Password environment variable {name} is not set")]
    PasswordEnvMissing { name: String },

    #[error("Password environment variable {name} is not valid UTF-8")]
    PasswordEnvNotUnicode { name: String },

    #[error("Password must not be empty")]
    EmptyPassword,
}

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ParseError { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Result type alias using ToolkitError
pub type Result<T> = std::result::Result<T, ToolkitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages() {
        let auth = ConvertError::AuthenticationOrCorruption {
            source: Pkcs12Error::MacMismatch,
        };
        assert_eq!(auth.user_message(), "wrong password or corrupted file");

        let malformed = ConvertError::MalformedContainer {
            reason: "x".to_string(),
        };
        assert_eq!(malformed.user_message(), "malformed input");

        let incomplete = ConvertError::IncompleteBundle {
            reason: "x".to_string(),
        };
        assert_eq!(incomplete.user_message(), "incomplete credential data");
    }

    #[test]
    fn test_toolkit_error_keeps_converter_message() {
        let err: ToolkitError = ConvertError::AuthenticationOrCorruption {
            source: Pkcs12Error::MacMismatch,
        }
        .into();
        assert_eq!(err.to_string(), "wrong password or corrupted file");

        let err: ToolkitError = CertFileError::EmptyPassword.into();
        assert_eq!(err.to_string(), "Certificate file error: Password must not be empty");
    }

    #[test]
    fn test_unexpected_keeps_cause() {
        let err = ConvertError::unexpected(Pkcs12Error::unsupported("1.2.840.113549.1.12.1.1"));
        assert_eq!(
            err.user_message(),
            "unexpected error: unsupported algorithm 1.2.840.113549.1.12.1.1"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
