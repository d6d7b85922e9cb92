//! Configuration management module.

use crate::link::{RX_PAYLOAD_MAX, TX_PAYLOAD_MAX};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration load result.
#[derive(Debug)]
pub enum ConfigLoadResult {
    /// Config loaded successfully.
    Loaded(LinkConfig),
    /// Config file missing.
    Missing,
    /// Config file exists but invalid.
    Invalid(ConfigError),
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Validation failed: {0}")]
    Validation(String),
}

/// Protocol and endpoint settings for one MCU link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Payload bytes per write burst chunk (default: 600).
    #[serde(default = "default_tx_capacity")]
    pub tx_capacity: usize,
    /// Payload bytes per read burst chunk (default: 900).
    #[serde(default = "default_rx_capacity")]
    pub rx_capacity: usize,
    /// Reads allowed while waiting for an answer header (default: 15).
    #[serde(default = "default_header_retries")]
    pub header_retries: u32,
    /// Delay per answer byte before reading the payload, in microseconds (default: 6).
    #[serde(default = "default_payload_delay_us")]
    pub payload_delay_us: u64,
    /// Upper bound on the payload read; unset relies on the port's own timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_timeout_ms: Option<u64>,
    /// Firmware version the MCU must acknowledge on open.
    #[serde(default = "default_firmware_version")]
    pub firmware_version: u32,
    /// Candidate device paths, tried in order.
    #[serde(default = "default_ports")]
    pub ports: Vec<PathBuf>,
}

/// Upper bound for `payload_delay_us`; a full answer then waits under 2 s.
const MAX_PAYLOAD_DELAY_US: u64 = 1_000;

fn default_tx_capacity() -> usize {
    600
}

fn default_rx_capacity() -> usize {
    900
}

fn default_header_retries() -> u32 {
    15
}

fn default_payload_delay_us() -> u64 {
    6
}

fn default_firmware_version() -> u32 {
    0x010a_0006
}

fn default_ports() -> Vec<PathBuf> {
    (0..10).map(|i| PathBuf::from(format!("/dev/ttyACM{i}"))).collect()
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            tx_capacity: default_tx_capacity(),
            rx_capacity: default_rx_capacity(),
            header_retries: default_header_retries(),
            payload_delay_us: default_payload_delay_us(),
            payload_timeout_ms: None,
            firmware_version: default_firmware_version(),
            ports: default_ports(),
        }
    }
}

impl LinkConfig {
    /// Get config file path (per-user config directory).
    pub fn default_path() -> PathBuf {
        ProjectDirs::from("", "", "picocell-link")
            .map(|dirs| dirs.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
            .join("link.toml")
    }

    /// Attempt to load config with detailed result.
    pub fn try_load(path: &Path) -> ConfigLoadResult {
        if !path.exists() {
            return ConfigLoadResult::Missing;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str::<LinkConfig>(&content) {
                Ok(config) => match config.validate() {
                    Ok(()) => ConfigLoadResult::Loaded(config),
                    Err(e) => ConfigLoadResult::Invalid(e),
                },
                Err(e) => ConfigLoadResult::Invalid(ConfigError::Parse(e)),
            },
            Err(e) => ConfigLoadResult::Invalid(ConfigError::Read(e)),
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tx_capacity == 0 || self.tx_capacity > TX_PAYLOAD_MAX {
            return Err(ConfigError::Validation(format!(
                "TX capacity must be between 1 and {TX_PAYLOAD_MAX}"
            )));
        }
        if self.rx_capacity == 0 || self.rx_capacity > RX_PAYLOAD_MAX {
            return Err(ConfigError::Validation(format!(
                "RX capacity must be between 1 and {RX_PAYLOAD_MAX}"
            )));
        }
        if self.header_retries == 0 {
            return Err(ConfigError::Validation(
                "Header retries must be at least 1".to_string(),
            ));
        }
        if self.payload_delay_us > MAX_PAYLOAD_DELAY_US {
            return Err(ConfigError::Validation(format!(
                "Payload delay cannot exceed {MAX_PAYLOAD_DELAY_US} us per byte"
            )));
        }
        if self.payload_timeout_ms == Some(0) {
            return Err(ConfigError::Validation(
                "Payload timeout must be greater than 0".to_string(),
            ));
        }
        if self.ports.is_empty() {
            return Err(ConfigError::Validation("Port list cannot be empty".to_string()));
        }
        Ok(())
    }

    /// Save configuration to file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Sleep owed to the MCU before reading an answer payload of `declared_len` bytes.
    pub fn payload_delay(&self, declared_len: usize) -> Duration {
        Duration::from_micros((declared_len as u64 + 1).saturating_mul(self.payload_delay_us))
    }

    /// Payload read deadline, if one is configured.
    pub fn payload_timeout(&self) -> Option<Duration> {
        self.payload_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = LinkConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ports.len(), 10);
        assert_eq!(config.ports[0], PathBuf::from("/dev/ttyACM0"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: LinkConfig = toml::from_str("tx_capacity = 4\nfirmware_version = 0x01020304\n").unwrap();
        assert_eq!(config.tx_capacity, 4);
        assert_eq!(config.firmware_version, 0x0102_0304);
        assert_eq!(config.rx_capacity, 900);
        assert_eq!(config.header_retries, 15);
        assert!(config.payload_timeout_ms.is_none());
    }

    #[test]
    fn test_validation_capacity_bounds() {
        let mut config = LinkConfig::default();

        config.tx_capacity = 0;
        assert!(config.validate().is_err());

        config.tx_capacity = TX_PAYLOAD_MAX + 1;
        assert!(config.validate().is_err());

        config.tx_capacity = TX_PAYLOAD_MAX;
        assert!(config.validate().is_ok());

        config.rx_capacity = RX_PAYLOAD_MAX + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_zero_retries() {
        let mut config = LinkConfig::default();
        config.header_retries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_empty_ports() {
        let mut config = LinkConfig::default();
        config.ports.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_payload_delay_scales_with_length() {
        let config = LinkConfig::default();
        assert_eq!(config.payload_delay(0), Duration::from_micros(6));
        assert_eq!(config.payload_delay(99), Duration::from_micros(600));
    }

    #[test]
    fn test_validation_payload_delay_bound() {
        let config: LinkConfig = toml::from_str("payload_delay_us = 18446744073709551615\n").unwrap();
        assert!(config.validate().is_err());

        let mut config = LinkConfig::default();
        config.payload_delay_us = MAX_PAYLOAD_DELAY_US;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_payload_delay_saturates() {
        let config = LinkConfig {
            payload_delay_us: u64::MAX,
            ..LinkConfig::default()
        };
        assert_eq!(config.payload_delay(61), Duration::from_micros(u64::MAX));
    }

    #[test]
    fn test_save_and_reload() {
        let path = std::env::temp_dir().join(format!("picocell-link-{}.toml", std::process::id()));
        let config = LinkConfig {
            tx_capacity: 64,
            payload_timeout_ms: Some(250),
            ..LinkConfig::default()
        };
        config.save(&path).unwrap();

        match LinkConfig::try_load(&path) {
            ConfigLoadResult::Loaded(loaded) => assert_eq!(loaded, config),
            other => panic!("unexpected load result: {other:?}"),
        }
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_missing_file() {
        let path = Path::new("/nonexistent/picocell-link/link.toml");
        assert!(matches!(LinkConfig::try_load(path), ConfigLoadResult::Missing));
    }
}
