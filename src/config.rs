//! Configuration for the synchronization engine
//!
//! Provides the tunables consumed at session creation: startup dejitter
//! slack and the drift-averaging window. Values load from a TOML file or
//! fall back to defaults; the runtime setters on the main clock still
//! override the dejitter values per session.

use crate::errors::ClockError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Engine tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Minimum slack absorbing input-side jitter before the first render (ms)
    pub input_dejitter_ms: i64,
    /// Minimum slack absorbing output-side jitter before the first render (ms)
    pub output_dejitter_ms: i64,
    /// Number of samples in the drift-coefficient moving average
    pub coeff_average_range: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            input_dejitter_ms: 300,
            output_dejitter_ms: 80,
            coeff_average_range: 10,
        }
    }
}

impl SyncConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ClockError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| ClockError::Config(format!("Failed to read config file: {}", e)))?;

        let config: SyncConfig = toml::from_str(&contents)
            .map_err(|e| ClockError::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;
        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ClockError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ClockError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ClockError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| ClockError::Config(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("crabclock.toml")
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ClockError> {
        if self.coeff_average_range == 0 {
            return Err(ClockError::Config(
                "coeff_average_range must be at least 1".to_string(),
            ));
        }
        if self.input_dejitter_ms < 0 || self.output_dejitter_ms < 0 {
            return Err(ClockError::Config(
                "dejitter values must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.coeff_average_range, 10);
    }

    #[test]
    fn test_rejects_zero_average_range() {
        let config = SyncConfig {
            coeff_average_range: 0,
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_negative_dejitter() {
        let config = SyncConfig {
            input_dejitter_ms: -5,
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("crabclock.toml");
        let config = SyncConfig {
            input_dejitter_ms: 150,
            output_dejitter_ms: 40,
            coeff_average_range: 5,
        };
        config.save_to_file(&path).expect("save config");
        let loaded = SyncConfig::load_from_file(&path).expect("load config");
        assert_eq!(loaded.input_dejitter_ms, 150);
        assert_eq!(loaded.output_dejitter_ms, 40);
        assert_eq!(loaded.coeff_average_range, 5);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = SyncConfig::load_from_file("/nonexistent/crabclock.toml")
            .expect("missing file should yield defaults");
        assert_eq!(config.coeff_average_range, 10);
    }
}
