//! # switchyard-core
//!
//! Configuration contract shared by the switchyard crates: the
//! [`AppConfigTrait`] every configuration struct implements, the
//! [`ConfigError`] it reports and the [`ConfigSource`] bookkeeping used when
//! diagnosing where a value came from.

pub mod config;

pub use config::{
    get_env_optional, get_env_or_default, get_env_parsed, AppConfigTrait, ConfigError,
    ConfigSource, Environment,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Project name
pub const PROJECT_NAME: &str = "switchyard";
