pub mod defaults;
pub mod server_config;

pub use defaults::*;
pub use server_config::*;
