//! Error types for the synchronization engine
//!
//! Expected playback conditions (invalid timestamps, unstable coefficients,
//! excessive PCR delay) are not errors: they are handled in place with
//! sentinel returns, log lines and discontinuity events. `ClockError` only
//! covers the fallible edges, configuration handling in particular.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClockError {
    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = ClockError::Config("bad value".to_string());
        assert_eq!(error.to_string(), "Configuration error: bad value");
    }

    #[test]
    fn test_error_is_std_error() {
        fn takes_error(_: &dyn std::error::Error) {}
        takes_error(&ClockError::Config("x".to_string()));
    }
}
