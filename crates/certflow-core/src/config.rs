//! Configuration types for the certificate lifecycle orchestrator
//!
//! This module defines all configuration structures used throughout the crate.
//! Every field has a serde default so an empty JSON object is a valid config.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main certflow configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CertflowConfig {
    /// Stepwise certificate-issuance wait (paced by the workflow driver)
    #[serde(default)]
    pub issuance: IssuanceConfig,

    /// Blocking wait for DNS change propagation
    #[serde(default)]
    pub propagation: PollConfig,

    /// Blocking wait for validation options to appear on a new certificate
    #[serde(default)]
    pub validation_options: PollConfig,

    /// DNS record rendering settings
    #[serde(default)]
    pub records: RecordConfig,

    /// Delivery deduplication settings
    #[serde(default)]
    pub dedup: DedupConfig,

    /// Engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl CertflowConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.issuance.max_rounds == 0 {
            return Err(crate::Error::config("issuance.max_rounds must be > 0"));
        }
        self.propagation.validate("propagation")?;
        self.validation_options.validate("validation_options")?;
        self.records.validate()?;
        self.dedup.validate()?;
        if self.engine.event_channel_capacity == 0 {
            return Err(crate::Error::config(
                "engine.event_channel_capacity must be > 0",
            ));
        }
        Ok(())
    }
}

/// Budget for the stepwise issuance wait
///
/// The pacing between rounds belongs to the workflow driver, so only the
/// round ceiling lives here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuanceConfig {
    /// Rounds after which a still-pending certificate is reported as failed
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
}

impl Default for IssuanceConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
        }
    }
}

/// Budget for an internally blocking poll
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Maximum number of probes
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Sleep between probes (in seconds)
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl PollConfig {
    /// Interval between probes as a `Duration`
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    fn validate(&self, name: &str) -> Result<(), crate::Error> {
        if self.max_rounds == 0 {
            return Err(crate::Error::config(format!(
                "{}.max_rounds must be > 0",
                name
            )));
        }
        if self.poll_interval_secs > 300 {
            return Err(crate::Error::config(format!(
                "{}.poll_interval_secs must be <= 300, got {}",
                name, self.poll_interval_secs
            )));
        }
        Ok(())
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

/// DNS record rendering settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordConfig {
    /// Time-to-live for every generated record
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// CAA record value authorizing the certificate authority
    #[serde(default = "default_caa_value")]
    pub caa_value: String,

    /// Comment attached to each submitted change batch
    #[serde(default = "default_change_comment")]
    pub change_comment: String,
}

impl RecordConfig {
    fn validate(&self) -> Result<(), crate::Error> {
        if self.ttl == 0 {
            return Err(crate::Error::config("records.ttl must be > 0"));
        }
        if self.caa_value.trim().is_empty() {
            return Err(crate::Error::config("records.caa_value cannot be empty"));
        }
        Ok(())
    }
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            ttl: default_ttl(),
            caa_value: default_caa_value(),
            change_comment: default_change_comment(),
        }
    }
}

/// Delivery deduplication settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Prefix of every dedup marker parameter name
    #[serde(default = "default_parameter_prefix")]
    pub parameter_prefix: String,

    /// Description stored alongside each marker
    #[serde(default = "default_parameter_description")]
    pub parameter_description: String,
}

impl DedupConfig {
    fn validate(&self) -> Result<(), crate::Error> {
        if !self.parameter_prefix.starts_with('/') {
            return Err(crate::Error::config(format!(
                "dedup.parameter_prefix must start with '/', got '{}'",
                self.parameter_prefix
            )));
        }
        if self.parameter_prefix.ends_with('/') {
            return Err(crate::Error::config(
                "dedup.parameter_prefix must not end with '/'",
            ));
        }
        Ok(())
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            parameter_prefix: default_parameter_prefix(),
            parameter_description: default_parameter_description(),
        }
    }
}

/// Engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the engine event channel; events beyond it are dropped
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_event_channel_capacity() -> usize {
    100
}

fn default_max_rounds() -> u32 {
    60
}

fn default_poll_interval_secs() -> u64 {
    3
}

fn default_ttl() -> u32 {
    300
}

fn default_caa_value() -> String {
    "0 issue \"amazon.com\"".to_string()
}

fn default_change_comment() -> String {
    "by certflow DnsCertificate".to_string()
}

fn default_parameter_prefix() -> String {
    "/certflow".to_string()
}

fn default_parameter_description() -> String {
    "certflow: delivery dedup marker for DnsCertificate".to_string()
}
