//! Tottori Core - Shared infrastructure for the Tottori dashboard
//!
//! Error types with context, configuration loading, logging setup and small
//! async helpers used by the session manager and the CLI.

pub mod async_utils;
pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use async_utils::*;
pub use config::*;
pub use error::*;
pub use logging::*;
pub use types::*;
