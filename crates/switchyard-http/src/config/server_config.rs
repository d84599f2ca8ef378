//! Per-instance transport configuration
//!
//! Every server instance embeds one [`ServerConfig`]. Values come from
//! defaults, from `SWITCHYARD_*` environment variables, or are set
//! programmatically before the server is created.

use super::defaults::ServerDefaults;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use switchyard_core::{get_env_parsed, AppConfigTrait, ConfigError, ConfigSource};

const ENV_REQUEST_TIMEOUT: &str = "SWITCHYARD_REQUEST_TIMEOUT";
const ENV_MAX_HEADER_BYTES: &str = "SWITCHYARD_MAX_HEADER_BYTES";
const ENV_MAX_BODY_SIZE: &str = "SWITCHYARD_MAX_BODY_SIZE";
const ENV_SHUTDOWN_TIMEOUT: &str = "SWITCHYARD_SHUTDOWN_TIMEOUT";
const ENV_MAX_CALLBACK_HEADERS: &str = "SWITCHYARD_MAX_CALLBACK_HEADERS";

/// Transport settings of one server instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Time allowed for a plain request, callback included, in seconds
    pub request_timeout_secs: u64,
    /// Maximum total size of the request head in bytes
    pub max_header_bytes: usize,
    /// Maximum request body size in bytes
    pub max_body_size: usize,
    /// Drain deadline used when the server is stopped without an explicit one
    pub shutdown_timeout_secs: u64,
    /// Maximum number of header entries handed to the engine
    pub max_callback_headers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: ServerDefaults::REQUEST_TIMEOUT_SECS,
            max_header_bytes: ServerDefaults::MAX_HEADER_BYTES,
            max_body_size: ServerDefaults::MAX_BODY_SIZE,
            shutdown_timeout_secs: ServerDefaults::SHUTDOWN_TIMEOUT_SECS,
            max_callback_headers: ServerDefaults::MAX_CALLBACK_HEADERS,
        }
    }
}

impl AppConfigTrait for ServerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let config = ServerConfig {
            request_timeout_secs: get_env_parsed(
                ENV_REQUEST_TIMEOUT,
                "request_timeout_secs",
                ServerDefaults::REQUEST_TIMEOUT_SECS,
                "valid number of seconds",
            )?,
            max_header_bytes: get_env_parsed(
                ENV_MAX_HEADER_BYTES,
                "max_header_bytes",
                ServerDefaults::MAX_HEADER_BYTES,
                "valid number of bytes",
            )?,
            max_body_size: get_env_parsed(
                ENV_MAX_BODY_SIZE,
                "max_body_size",
                ServerDefaults::MAX_BODY_SIZE,
                "valid number of bytes",
            )?,
            shutdown_timeout_secs: get_env_parsed(
                ENV_SHUTDOWN_TIMEOUT,
                "shutdown_timeout_secs",
                ServerDefaults::SHUTDOWN_TIMEOUT_SECS,
                "valid number of seconds",
            )?,
            max_callback_headers: get_env_parsed(
                ENV_MAX_CALLBACK_HEADERS,
                "max_callback_headers",
                ServerDefaults::MAX_CALLBACK_HEADERS,
                "valid header count",
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::validation_failed(
                "request_timeout_secs",
                "Request timeout must be greater than 0",
            ));
        }

        if self.max_header_bytes == 0 {
            return Err(ConfigError::validation_failed(
                "max_header_bytes",
                "Maximum header size must be greater than 0",
            ));
        }

        if self.max_body_size == 0 {
            return Err(ConfigError::validation_failed(
                "max_body_size",
                "Maximum body size must be greater than 0",
            ));
        }

        if self.shutdown_timeout_secs == 0 {
            return Err(ConfigError::validation_failed(
                "shutdown_timeout_secs",
                "Shutdown timeout must be greater than 0",
            ));
        }

        if self.max_callback_headers == 0 {
            return Err(ConfigError::validation_failed(
                "max_callback_headers",
                "Callback header cap must be greater than 0",
            ));
        }

        Ok(())
    }

    fn config_sources(&self) -> HashMap<String, ConfigSource> {
        let mut sources = HashMap::new();
        for (field, var) in [
            ("request_timeout_secs", ENV_REQUEST_TIMEOUT),
            ("max_header_bytes", ENV_MAX_HEADER_BYTES),
            ("max_body_size", ENV_MAX_BODY_SIZE),
            ("shutdown_timeout_secs", ENV_SHUTDOWN_TIMEOUT),
            ("max_callback_headers", ENV_MAX_CALLBACK_HEADERS),
        ] {
            let source = if std::env::var(var).is_ok() {
                ConfigSource::EnvVar(var.to_string())
            } else {
                ConfigSource::Default(field.to_string())
            };
            sources.insert(field.to_string(), source);
        }
        sources
    }
}

impl ServerConfig {
    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clean_test_env() {
        for var in [
            ENV_REQUEST_TIMEOUT,
            ENV_MAX_HEADER_BYTES,
            ENV_MAX_BODY_SIZE,
            ENV_SHUTDOWN_TIMEOUT,
            ENV_MAX_CALLBACK_HEADERS,
        ] {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_server_config_defaults() {
        let config = ServerConfig::default();

        assert_eq!(config.request_timeout_secs, 10);
        assert_eq!(config.max_header_bytes, 1 << 20);
        assert_eq!(config.shutdown_timeout_secs, 5);
        assert_eq!(config.max_callback_headers, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_server_config_from_env() {
        clean_test_env();
        env::set_var(ENV_REQUEST_TIMEOUT, "30");
        env::set_var(ENV_SHUTDOWN_TIMEOUT, "2");
        env::set_var(ENV_MAX_CALLBACK_HEADERS, "20");

        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.shutdown_timeout_secs, 2);
        assert_eq!(config.max_callback_headers, 20);
        assert_eq!(config.max_body_size, ServerDefaults::MAX_BODY_SIZE);

        let sources = config.config_sources();
        assert!(sources["request_timeout_secs"].is_env_var());
        assert!(sources["max_body_size"].is_default());

        clean_test_env();
    }

    #[test]
    #[serial]
    fn test_server_config_rejects_garbage() {
        clean_test_env();
        env::set_var(ENV_MAX_BODY_SIZE, "lots");

        let err = ServerConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "max_body_size"));

        env::set_var(ENV_MAX_BODY_SIZE, "0");
        assert!(matches!(
            ServerConfig::from_env().unwrap_err(),
            ConfigError::ValidationFailed { .. }
        ));

        clean_test_env();
    }

    #[test]
    fn test_duration_helpers() {
        let config = ServerConfig::default();

        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(5));
    }
}
