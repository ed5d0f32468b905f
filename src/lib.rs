#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod errors;
pub mod listener;
pub mod relay;
pub mod session;
pub mod shell;

pub use config::BridgeConfig;
pub use errors::{AppError, Result};
