pub mod app_config;
pub mod sources;
pub mod validation;

pub use app_config::*;
pub use sources::ConfigSource;
pub use validation::ConfigError;
