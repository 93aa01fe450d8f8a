//! Core types, configuration and signing for Porta

pub mod auth;
pub mod config;
pub mod error;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::*;
pub use error::*;
pub use types::*;

/// Result type alias for Porta operations
pub type Result<T> = std::result::Result<T, PortaError>;
