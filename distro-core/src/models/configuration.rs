//! Configuration data structures

use super::destination::DestinationDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use url::Url;

/// Logging level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub enum LogLevel {
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "info")]
    #[default]
    Info,
    #[serde(rename = "debug")]
    Debug,
    #[serde(rename = "trace")]
    Trace,
}

/// A configured destination plus the TLS material used by secured schemes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    #[serde(flatten)]
    pub descriptor: DestinationDescriptor,
    /// PEM client certificate, read only for tcps/ssl/tls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_file: Option<PathBuf>,
    /// PEM private key, read only for tcps/ssl/tls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,
}

impl DestinationConfig {
    pub fn cert_path(&self) -> PathBuf {
        self.cert_file.clone().unwrap_or_default()
    }

    pub fn key_path(&self) -> PathBuf {
        self.key_file.clone().unwrap_or_default()
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Configuration {
    /// Logging verbosity level
    #[serde(default)]
    pub log_level: LogLevel,
    /// Export destinations
    #[serde(default)]
    pub destinations: Vec<DestinationConfig>,
}

impl Configuration {
    /// Load configuration from file
    pub fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Configuration = toml::from_str(&content)?;
            Ok(config)
        } else {
            // Return default configuration if file doesn't exist
            Ok(Configuration::default())
        }
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the XDG config directory path
    pub fn default_config_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_dir = dirs::config_dir().ok_or("Could not determine config directory")?;
        Ok(config_dir.join("distro").join("config.toml"))
    }

    /// Find a destination by name
    pub fn destination(&self, name: &str) -> Option<&DestinationConfig> {
        self.destinations
            .iter()
            .find(|d| d.descriptor.name == name)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let mut seen = HashSet::new();

        for (index, destination) in self.destinations.iter().enumerate() {
            let d = &destination.descriptor;
            let label = if d.name.is_empty() {
                format!("destinations[{}]", index)
            } else {
                d.name.clone()
            };

            if !d.name.is_empty() && !seen.insert(d.name.as_str()) {
                errors.push(format!("{}: duplicate destination name", label));
            }

            if d.address.trim().is_empty() {
                errors.push(format!("{}: address cannot be empty", label));
            }

            if d.port == 0 {
                errors.push(format!("{}: port must be non-zero", label));
            }

            if !d.path.is_empty() && !d.path.starts_with('/') {
                errors.push(format!("{}: path must start with '/'", label));
            } else if !d.address.trim().is_empty() && Url::parse(&d.broker_uri()).is_err() {
                errors.push(format!("{}: broker URI {} is malformed", label, d.broker_uri()));
            }

            if d.topic.is_empty() {
                errors.push(format!("{}: topic cannot be empty", label));
            } else if d.topic.contains(['+', '#']) {
                errors.push(format!("{}: topic cannot contain wildcards", label));
            }

            if d.scheme().is_secured()
                && (destination.cert_file.is_none() || destination.key_file.is_none())
            {
                errors.push(format!(
                    "{}: scheme {} requires cert_file and key_file",
                    label, d.protocol
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
