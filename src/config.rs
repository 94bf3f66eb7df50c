//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, VibraError};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub link: LinkConfig,

    #[serde(default)]
    pub reconnect: ReconnectConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Link and session configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LinkConfig {
    #[serde(default = "default_device")]
    pub device: String,

    #[serde(default)]
    pub label: Option<String>,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_write_pacing_ms")]
    pub write_pacing_ms: u64,

    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,

    #[serde(default = "default_frame_buffer")]
    pub frame_buffer: usize,
}

/// Auto-reconnect configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ReconnectConfig {
    #[serde(default = "default_reconnect_enabled")]
    pub enabled: bool,

    #[serde(default = "default_reconnect_interval_ms")]
    pub interval_ms: u64,
}

/// Telemetry engine configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,

    #[serde(default = "default_stats_interval_ms")]
    pub stats_interval_ms: u64,

    #[serde(default = "default_raw_display_len")]
    pub raw_display_len: usize,
}

/// Diagnostic logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily rolling log files; empty logs to stderr only
    #[serde(default)]
    pub directory: String,
}

// Default value functions
fn default_device() -> String { "/dev/rfcomm0".to_string() }
fn default_baud_rate() -> u32 { 115200 }
fn default_connect_timeout_ms() -> u64 { 10000 }
fn default_write_pacing_ms() -> u64 { 50 }
fn default_read_buffer_size() -> usize { 4096 }
fn default_frame_buffer() -> usize { 1024 }

fn default_reconnect_enabled() -> bool { true }
fn default_reconnect_interval_ms() -> u64 { 4000 }

fn default_log_capacity() -> usize { 200 }
fn default_stats_interval_ms() -> u64 { 5000 }
fn default_raw_display_len() -> usize { 80 }

fn default_log_level() -> String { "info".to_string() }

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            label: None,
            baud_rate: default_baud_rate(),
            connect_timeout_ms: default_connect_timeout_ms(),
            write_pacing_ms: default_write_pacing_ms(),
            read_buffer_size: default_read_buffer_size(),
            frame_buffer: default_frame_buffer(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: default_reconnect_enabled(),
            interval_ms: default_reconnect_interval_ms(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_capacity: default_log_capacity(),
            stats_interval_ms: default_stats_interval_ms(),
            raw_display_len: default_raw_display_len(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: String::new(),
        }
    }
}

impl LinkConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn write_pacing(&self) -> Duration {
        Duration::from_millis(self.write_pacing_ms)
    }
}

impl ReconnectConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl TelemetryConfig {
    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }
}

fn invalid(message: impl std::fmt::Display) -> VibraError {
    VibraError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use vibra_link::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.link.device.trim().is_empty() {
            return Err(invalid("link device cannot be empty"));
        }

        if self.link.baud_rate == 0 {
            return Err(invalid("baud_rate must be greater than 0"));
        }

        if self.link.connect_timeout_ms == 0 || self.link.connect_timeout_ms > 60000 {
            return Err(invalid("connect_timeout_ms must be between 1 and 60000"));
        }

        if self.link.write_pacing_ms > 5000 {
            return Err(invalid("write_pacing_ms must be at most 5000"));
        }

        if self.link.read_buffer_size < 64 || self.link.read_buffer_size > 65536 {
            return Err(invalid("read_buffer_size must be between 64 and 65536"));
        }

        if self.link.frame_buffer == 0 {
            return Err(invalid("frame_buffer must be greater than 0"));
        }

        if self.reconnect.interval_ms < 100 || self.reconnect.interval_ms > 600000 {
            return Err(invalid("reconnect interval_ms must be between 100 and 600000"));
        }

        if self.telemetry.log_capacity == 0 {
            return Err(invalid("log_capacity must be greater than 0"));
        }

        if self.telemetry.stats_interval_ms < 100 || self.telemetry.stats_interval_ms > 600000 {
            return Err(invalid("stats_interval_ms must be between 100 and 600000"));
        }

        if self.telemetry.raw_display_len == 0 {
            return Err(invalid("raw_display_len must be greater than 0"));
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(invalid("logging level must be one of: trace, debug, info, warn, error"));
        }

        Ok(())
    }
}
