//! # Structured Logging Integration
//!
//! Logging setup for processes embedding the server registry: JSON, pretty or
//! plain output through `tracing-subscriber`, with presets per environment.

use serde_json::{json, Value};
use std::io;
use switchyard_core::{Environment, PROJECT_NAME, VERSION};
use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "warn")
    pub level: String,
    /// Enable JSON structured logging (vs plain text)
    pub json_format: bool,
    /// Enable pretty printing for development
    pub pretty_print: bool,
    /// Include file and line number information
    pub include_location: bool,
    /// Custom fields to include in the initialization event
    pub global_fields: serde_json::Map<String, Value>,
    /// Environment filter (supports filters like "switchyard_http=debug,tower_http=info")
    pub env_filter: Option<String>,
    /// Service name for the initialization event, defaults to `PROJECT_NAME`
    pub service_name: Option<String>,
    /// Service version for the initialization event, defaults to `VERSION`
    pub service_version: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            pretty_print: true,
            include_location: false,
            global_fields: serde_json::Map::new(),
            env_filter: None,
            service_name: None,
            service_version: None,
        }
    }
}

impl LoggingConfig {
    /// Create production logging configuration
    pub fn production() -> Self {
        Self {
            level: "info".to_string(),
            json_format: true,
            pretty_print: false,
            include_location: false,
            global_fields: {
                let mut fields = serde_json::Map::new();
                fields.insert("env".to_string(), json!("production"));
                fields
            },
            env_filter: Some("switchyard_http=info,tower_http=warn,axum=warn".to_string()),
            service_name: None,
            service_version: None,
        }
    }

    /// Create development logging configuration
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            json_format: false,
            pretty_print: true,
            include_location: true,
            global_fields: {
                let mut fields = serde_json::Map::new();
                fields.insert("env".to_string(), json!("development"));
                fields
            },
            env_filter: Some("switchyard_http=debug,tower_http=debug,axum=debug".to_string()),
            service_name: None,
            service_version: None,
        }
    }

    /// Create test logging configuration (minimal output)
    pub fn test() -> Self {
        Self {
            level: "error".to_string(),
            json_format: false,
            pretty_print: false,
            include_location: false,
            global_fields: {
                let mut fields = serde_json::Map::new();
                fields.insert("env".to_string(), json!("test"));
                fields
            },
            env_filter: Some("switchyard_http=error".to_string()),
            service_name: None,
            service_version: None,
        }
    }

    /// Pick the preset matching a deployment environment
    pub fn for_environment(environment: Environment) -> Self {
        match environment {
            Environment::Production => Self::production(),
            Environment::Testing => Self::test(),
            Environment::Development => Self::development(),
        }
    }

    /// Add a global field to include in the initialization event
    pub fn with_global_field<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.global_fields.insert(key.into(), value.into());
        self
    }

    /// Set service name and version
    pub fn with_service(mut self, name: &str, version: &str) -> Self {
        self.service_name = Some(name.to_string());
        self.service_version = Some(version.to_string());
        self
    }

    /// Set environment filter
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }
}

/// Initialize structured logging for the process.
///
/// `RUST_LOG` takes precedence over the configured filter. Fails if a global
/// subscriber is already installed.
pub fn init_logging(config: LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = config.env_filter.as_deref().unwrap_or(&config.level);

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(env_filter))?;

    if config.json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                Layer::new()
                    .with_writer(io::stdout)
                    .with_file(config.include_location)
                    .with_line_number(config.include_location)
                    .json(),
            )
            .try_init()?;
    } else if config.pretty_print {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                Layer::new()
                    .with_writer(io::stdout)
                    .with_file(config.include_location)
                    .with_line_number(config.include_location)
                    .pretty(),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stdout))
            .try_init()?;
    }

    tracing::info!(target: "switchyard::logging", "{}", init_message(&config));

    Ok(())
}

/// Initialization event; service name and version default to this crate's
fn init_message(config: &LoggingConfig) -> Value {
    let mut init_msg = json!({
        "message": "Structured logging initialized",
        "service": config.service_name.as_deref().unwrap_or(PROJECT_NAME),
        "version": config.service_version.as_deref().unwrap_or(VERSION),
        "config": {
            "level": config.level,
            "json_format": config.json_format,
            "pretty_print": config.pretty_print,
        }
    });
    for (key, value) in &config.global_fields {
        init_msg[key.as_str()] = value.clone();
    }
    init_msg
}

/// Log process startup with system information
pub fn log_startup_info(service_name: &str, service_version: &str) {
    let startup_info = json!({
        "event": "application_startup",
        "service": service_name,
        "version": service_version,
        "pid": std::process::id(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "os": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
    });

    tracing::info!(target: "switchyard::startup", "{}", startup_info);
}

/// Log process shutdown
pub fn log_shutdown_info(service_name: &str) {
    let shutdown_info = json!({
        "event": "application_shutdown",
        "service": service_name,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    tracing::info!(target: "switchyard::shutdown", "{}", shutdown_info);
}

/// Structured events for the server lifecycle
pub mod structured {
    use crate::foundation::ServerId;
    use serde_json::json;
    use tracing::{error, info, warn};

    /// Log a lifecycle transition of one server instance
    pub fn log_server_event(id: ServerId, event: &str, address: &str) {
        let log_data = json!({
            "event": event,
            "server_id": id.0,
            "address": address,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        match event {
            "crash_exit" => error!(target: "switchyard::lifecycle", "{}", log_data),
            "shutdown_timeout" => warn!(target: "switchyard::lifecycle", "{}", log_data),
            _ => info!(target: "switchyard::lifecycle", "{}", log_data),
        }
    }

    /// Log a completed plain request
    pub fn log_request(id: ServerId, method: &str, path: &str, status: u16, duration_ms: u128) {
        let log_data = json!({
            "event": "http_request",
            "server_id": id.0,
            "method": method,
            "path": path,
            "status": status,
            "duration_ms": duration_ms,
        });

        if status >= 500 {
            error!(target: "switchyard::http", "{}", log_data);
        } else if status >= 400 {
            warn!(target: "switchyard::http", "{}", log_data);
        } else {
            info!(target: "switchyard::http", "{}", log_data);
        }
    }
}
