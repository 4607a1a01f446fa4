//! Application settings configuration
//!
//! Artifact file names, output directory naming, container discovery and
//! the default log level.

use crate::utils::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Output artifact naming
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputSettings {
    pub key_file: String,
    pub cert_file: String,
    pub chain_file: String,
    /// Appended to the container's file stem to name the output directory
    pub dir_suffix: String,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            key_file: "private_key.pem".to_string(),
            cert_file: "certificate.pem".to_string(),
            chain_file: "certificate_chain.pem".to_string(),
            dir_suffix: "_certs".to_string(),
        }
    }
}

/// Container discovery settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoverySettings {
    pub extensions: Vec<String>,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            extensions: vec!["pfx".to_string(), "p12".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `tracing_subscriber::EnvFilter` directive used when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

/// Application settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub output: OutputSettings,
    #[serde(default)]
    pub discovery: DiscoverySettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Settings {
    /// Load settings from the default config file
    pub fn load_default() -> Result<Self, ConfigError> {
        let config_path = Path::new("config/default.toml");
        if config_path.exists() {
            Self::load_from_file(config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load settings from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let names = [
            ("output.key_file", &self.output.key_file),
            ("output.cert_file", &self.output.cert_file),
            ("output.chain_file", &self.output.chain_file),
        ];
        for (key, name) in names {
            if name.is_empty() || name.contains(['/', '\\']) {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("'{}' is not a plain file name", name),
                });
            }
        }

        if self.output.key_file == self.output.cert_file
            || self.output.key_file == self.output.chain_file
            || self.output.cert_file == self.output.chain_file
        {
            return Err(ConfigError::InvalidValue {
                key: "output".to_string(),
                message: "artifact file names must be distinct".to_string(),
            });
        }

        if self.discovery.extensions.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "discovery.extensions".to_string(),
                message: "at least one extension is required".to_string(),
            });
        }

        Ok(())
    }
}
