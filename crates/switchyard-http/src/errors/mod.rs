pub mod hub_error;

pub use hub_error::*;
