//! Verifier configuration.
//!
//! Configuration is read from a TOML file (conventionally `cpv.toml`) and
//! converted into an immutable [`VerificationPolicy`] that the orchestrator
//! consults. Every member has a default, so an empty file is valid.
//!
//! ```toml
//! [policy]
//! accepted_signature_algorithms = ["ES256", "Ed25519"]
//! accepted_tsa_services = []
//! require_anchor = true
//! require_signature = true
//! recompute_chain_hashes = true
//!
//! [logging]
//! level = "warn"
//! format = "text"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::SignatureAlgorithm;

/// Top-level verifier configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifierConfig {
    /// Verification policy.
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Logging setup for binaries embedding the verifier.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl VerifierConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The TOML is invalid or carries unknown keys
    /// - `accepted_signature_algorithms` is empty
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] describing the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.policy.accepted_signature_algorithms.is_empty() {
            return Err(ConfigError::Validation(
                "policy.accepted_signature_algorithms must not be empty".to_string(),
            ));
        }
        if self.policy.accepted_tsa_services.iter().any(|s| s.trim().is_empty()) {
            return Err(ConfigError::Validation(
                "policy.accepted_tsa_services must not contain blank names".to_string(),
            ));
        }
        Ok(())
    }

    /// The policy this configuration describes.
    #[must_use]
    pub fn verification_policy(&self) -> VerificationPolicy {
        let mut accepted = self.policy.accepted_signature_algorithms.clone();
        accepted.sort_unstable();
        accepted.dedup();
        VerificationPolicy {
            accepted_signature_algorithms: accepted,
            accepted_tsa_services: self.policy.accepted_tsa_services.clone(),
            require_anchor: self.policy.require_anchor,
            require_signature: self.policy.require_signature,
            recompute_chain_hashes: self.policy.recompute_chain_hashes,
        }
    }
}

/// `[policy]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    /// Signature algorithms accepted on events.
    #[serde(default = "default_algorithms")]
    pub accepted_signature_algorithms: Vec<SignatureAlgorithm>,

    /// TSA service names accepted on anchors. Empty accepts any.
    #[serde(default)]
    pub accepted_tsa_services: Vec<String>,

    /// Fail when no anchor is supplied.
    #[serde(default = "default_true")]
    pub require_anchor: bool,

    /// Fail when the event carries no signature.
    #[serde(default = "default_true")]
    pub require_signature: bool,

    /// Recompute every chain event's hash during the chain walk.
    #[serde(default = "default_true")]
    pub recompute_chain_hashes: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            accepted_signature_algorithms: default_algorithms(),
            accepted_tsa_services: Vec::new(),
            require_anchor: true,
            require_signature: true,
            recompute_chain_hashes: true,
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. `warn` or `cpv_core=debug`.
    #[serde(default = "default_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

fn default_algorithms() -> Vec<SignatureAlgorithm> {
    SignatureAlgorithm::ALL.to_vec()
}

const fn default_true() -> bool {
    true
}

fn default_level() -> String {
    "warn".to_string()
}

/// Immutable trust configuration handed to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationPolicy {
    /// Accepted event signature algorithms.
    pub accepted_signature_algorithms: Vec<SignatureAlgorithm>,
    /// Accepted TSA services; empty accepts any.
    pub accepted_tsa_services: Vec<String>,
    /// Missing anchor is a failure rather than "not applicable".
    pub require_anchor: bool,
    /// Missing signature is a failure rather than "not applicable".
    pub require_signature: bool,
    /// Recompute chain hashes during the walk.
    pub recompute_chain_hashes: bool,
}

impl Default for VerificationPolicy {
    fn default() -> Self {
        VerifierConfig::default().verification_policy()
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading configuration file.
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Validation error.
    #[error("configuration validation failed: {0}")]
    Validation(String),
}
