//! Configuration
//!
//! Shared handshake parameters, loaded from the `key=value` config file both
//! roles read. `#`-prefixed lines and blank lines are ignored; unrecognized
//! keys are skipped with a warning.

use log::warn;

/// Sample error rate above which the handshake aborts. A fixed protocol
/// constant, deliberately not configurable from the config file.
pub const ABORT_THRESHOLD: f64 = 0.2;

/// Handshake protocol parameters shared by both roles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// Number of qubit pulses transmitted (`num_bits`)
    pub num_bits: usize,
    /// Number of sifted bits revealed for error estimation (`error_bits`)
    pub error_bits: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            num_bits: 32,
            error_bits: 5,
        }
    }
}

impl ProtocolConfig {
    /// Load configuration from a `key=value` text file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::parse(&content)
    }

    /// Parse configuration from `key=value` text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| ConfigError::ParseError(format!("missing '=' in line {:?}", line)))?;
            let key = key.trim();
            let value = value.trim();
            match key {
                "num_bits" => config.num_bits = parse_count(key, value)?,
                "error_bits" => config.error_bits = parse_count(key, value)?,
                _ => warn!("Ignoring unrecognized config key {:?}", key),
            }
        }
        Ok(config)
    }
}

fn parse_count(key: &str, value: &str) -> Result<usize, ConfigError> {
    value
        .parse::<usize>()
        .map_err(|_| ConfigError::ParseError(format!("invalid value for {}: {:?}", key, value)))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProtocolConfig::default();
        assert_eq!(config.num_bits, 32);
        assert_eq!(config.error_bits, 5);
    }

    #[test]
    fn test_parse_config() {
        let config = ProtocolConfig::parse("# QKD parameters\nnum_bits=64\n\nerror_bits=8\n").unwrap();
        assert_eq!(config.num_bits, 64);
        assert_eq!(config.error_bits, 8);
    }

    #[test]
    fn test_parse_ignores_unknown_keys() {
        let config = ProtocolConfig::parse("threshold=0.5\nnum_bits=16\n").unwrap();
        assert_eq!(config.num_bits, 16);
        assert_eq!(config.error_bits, 5);
    }

    #[test]
    fn test_parse_rejects_malformed_lines() {
        assert!(ProtocolConfig::parse("num_bits 64\n").is_err());
        assert!(ProtocolConfig::parse("num_bits=many\n").is_err());
    }
}
