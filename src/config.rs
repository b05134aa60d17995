//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,

    #[serde(default)]
    pub recording: RecordingConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    /// USB vendor id of the monitor's serial adapter
    #[serde(default = "default_vendor_id")]
    pub vendor_id: u16,

    /// USB product id of the monitor's serial adapter
    #[serde(default = "default_product_id")]
    pub product_id: u16,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Period of the distance/pace poll started on the first stroke
    #[serde(default = "default_distance_poll_ms")]
    pub distance_poll_ms: u64,
}

/// Recording configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RecordingConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Start a session as soon as the driver comes up. When false the
    /// session must be started by an external trigger.
    #[serde(default = "default_autostart")]
    pub autostart: bool,

    /// Period of the snapshot tick
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

// Default value functions
fn default_vendor_id() -> u16 { 0x04d8 }
fn default_product_id() -> u16 { 0x000a }
fn default_baud_rate() -> u32 { 19200 }
fn default_distance_poll_ms() -> u64 { 500 }

fn default_output_dir() -> String { "./activities".to_string() }
fn default_autostart() -> bool { true }
fn default_tick_interval_ms() -> u64 { 1000 }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            vendor_id: default_vendor_id(),
            product_id: default_product_id(),
            baud_rate: default_baud_rate(),
            distance_poll_ms: default_distance_poll_ms(),
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            autostart: default_autostart(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, TOML parsing fails, or
    /// validation fails.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any value is out of its usable range.
    pub fn validate(&self) -> Result<()> {
        if self.serial.baud_rate == 0 {
            return Err(toml::de::Error::custom("serial.baud_rate must be nonzero").into());
        }
        if self.serial.distance_poll_ms == 0 {
            return Err(toml::de::Error::custom("serial.distance_poll_ms must be nonzero").into());
        }
        if self.recording.tick_interval_ms == 0 {
            return Err(toml::de::Error::custom("recording.tick_interval_ms must be nonzero").into());
        }
        if self.recording.output_dir.is_empty() {
            return Err(toml::de::Error::custom("recording.output_dir must not be empty").into());
        }
        Ok(())
    }
}
