//! Fixtures for exercising servers without a real script engine

pub mod engine;
pub mod server;

pub use engine::{RecordedMessage, RecordingEngine};
pub use server::{eventually, wait_for_listener};
