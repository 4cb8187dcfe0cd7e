//! RestGate Common Types and Utilities
//!
//! Shared catalog types, configuration, and error handling for the RestGate
//! query engine and its HTTP surface.

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod types;

pub use config::RestGateConfig;
pub use error::{Error, Result};
