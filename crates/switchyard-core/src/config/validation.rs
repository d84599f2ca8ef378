//! Configuration errors

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: '{value}', expected {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Validation failed for {field}: {reason}")]
    ValidationFailed { field: String, reason: String },
}

impl ConfigError {
    /// Create a validation error for `field`
    pub fn validation_failed<F: Into<String>, R: Into<String>>(field: F, reason: R) -> Self {
        ConfigError::ValidationFailed {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ConfigError::validation_failed("shutdown_timeout_secs", "must be greater than 0");
        assert_eq!(
            err.to_string(),
            "Validation failed for shutdown_timeout_secs: must be greater than 0"
        );
    }
}
