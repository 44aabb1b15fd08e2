//! # Configuration Management
//!
//! Centralized configuration for the interception library.
//!
//! This module provides structured configuration for the packet pipeline,
//! including decode limits, buffer pool sizing, compression settings, and
//! logging options.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment-specific overrides
//!
//! ## Security Considerations
//! - Decode limits cap attacker-controlled length prefixes
//! - The decompression cap protects against decompression bombs
//! - Pool sizing bounds memory held on behalf of idle connections

use crate::core::wrapper::DEFAULT_MAX_STRING_LEN;
use crate::error::{ProtocolError, Result};
use crate::utils::compression::{DEFAULT_COMPRESSION_THRESHOLD, MAX_DECOMPRESSED_SIZE};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::Level;

/// Max allowed single packet size (matches the wire protocol's frame cap).
pub const MAX_PACKET_SIZE: usize = 2 * 1024 * 1024;

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct InterceptConfig {
    /// Decode limit configuration
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Buffer pool configuration
    #[serde(default)]
    pub buffers: BufferConfig,

    /// Compression configuration
    #[serde(default)]
    pub compression: CompressionConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl InterceptConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Start with defaults
        let mut config = Self::default();

        // Override with environment variables
        if let Ok(size) = std::env::var("PACKET_INTERCEPT_MAX_PACKET_SIZE") {
            if let Ok(val) = size.parse::<usize>() {
                config.limits.max_packet_size = val;
            }
        }

        if let Ok(len) = std::env::var("PACKET_INTERCEPT_MAX_STRING_LENGTH") {
            if let Ok(val) = len.parse::<usize>() {
                config.limits.max_string_length = val;
            }
        }

        if let Ok(size) = std::env::var("PACKET_INTERCEPT_POOL_SIZE") {
            if let Ok(val) = size.parse::<usize>() {
                config.buffers.pool_size = val;
            }
        }

        if let Ok(threshold) = std::env::var("PACKET_INTERCEPT_COMPRESSION_THRESHOLD") {
            if let Ok(val) = threshold.parse::<usize>() {
                config.compression.threshold_bytes = val;
            }
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        errors.extend(self.limits.validate());
        errors.extend(self.buffers.validate());
        errors.extend(self.compression.validate(&self.limits));
        errors.extend(self.logging.validate());

        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Decode limit configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimitsConfig {
    /// Maximum allowed single packet size in bytes
    pub max_packet_size: usize,

    /// Maximum string length, in characters
    pub max_string_length: usize,

    /// Maximum element count accepted for length-prefixed lists
    pub max_list_length: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_packet_size: MAX_PACKET_SIZE,
            max_string_length: DEFAULT_MAX_STRING_LEN,
            max_list_length: 65_536,
        }
    }
}

impl LimitsConfig {
    /// Validate decode limits
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_packet_size == 0 {
            errors.push("Max packet size cannot be 0".to_string());
        } else if self.max_packet_size > 100 * 1024 * 1024 {
            errors.push(format!(
                "Max packet size too large: {} bytes (maximum recommended: 100 MB)",
                self.max_packet_size
            ));
        }

        if self.max_string_length == 0 {
            errors.push("Max string length cannot be 0".to_string());
        } else if self.max_string_length > i32::MAX as usize / 4 {
            errors.push(format!(
                "Max string length too large: {} (its UTF-8 byte bound must fit an i32)",
                self.max_string_length
            ));
        }

        if self.max_list_length == 0 {
            errors.push("Max list length cannot be 0".to_string());
        }

        errors
    }
}

/// Buffer pool configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BufferConfig {
    /// Number of backing buffers kept ready in the pool
    pub pool_size: usize,

    /// Initial capacity of each pooled buffer, in bytes
    pub initial_capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            pool_size: 50,
            initial_capacity: 4096,
        }
    }
}

impl BufferConfig {
    /// Validate buffer pool configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.pool_size == 0 {
            errors.push("Buffer pool size must be greater than 0".to_string());
        } else if self.pool_size > 100_000 {
            errors.push(format!(
                "Buffer pool size very high: {} (ensure system resources can support this)",
                self.pool_size
            ));
        }

        if self.initial_capacity == 0 {
            errors.push("Initial buffer capacity cannot be 0".to_string());
        } else if self.initial_capacity > 16 * 1024 * 1024 {
            errors.push(format!(
                "Initial buffer capacity too large: {} bytes (maximum recommended: 16 MB)",
                self.initial_capacity
            ));
        }

        errors
    }
}

/// Compression configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompressionConfig {
    /// Minimum payload size (bytes) before compression is applied
    /// Payloads smaller than this threshold are framed raw to reduce overhead
    pub threshold_bytes: usize,

    /// Maximum allowed decompressed size in bytes
    pub max_decompressed_size: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            threshold_bytes: DEFAULT_COMPRESSION_THRESHOLD,
            max_decompressed_size: MAX_DECOMPRESSED_SIZE,
        }
    }
}

impl CompressionConfig {
    /// Validate compression configuration against the decode limits
    pub fn validate(&self, limits: &LimitsConfig) -> Vec<String> {
        let mut errors = Vec::new();

        if self.threshold_bytes > limits.max_packet_size {
            errors.push("Compression threshold cannot be larger than max packet size".to_string());
        }

        if self.max_decompressed_size == 0 {
            errors.push("Max decompressed size cannot be 0".to_string());
        } else if self.max_decompressed_size < limits.max_packet_size {
            errors.push(format!(
                "Max decompressed size ({}) below max packet size ({}): legitimate packets would be rejected",
                self.max_decompressed_size, limits.max_packet_size
            ));
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to log to console
    pub log_to_console: bool,

    /// Whether to log to file
    pub log_to_file: bool,

    /// Path to log file (if log_to_file is true)
    pub log_file_path: Option<String>,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("packet-intercept"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        if self.log_to_file {
            if let Some(ref path) = self.log_file_path {
                if let Some(parent) = std::path::Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        errors.push(format!(
                            "Log file directory does not exist: {}",
                            parent.display()
                        ));
                    }
                }
            } else {
                errors.push("log_file_path must be specified when log_to_file is true".to_string());
            }
        }

        if !self.log_to_console && !self.log_to_file {
            errors
                .push("At least one logging output (console or file) must be enabled".to_string());
        }

        errors
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
