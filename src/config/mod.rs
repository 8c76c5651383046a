//! Configuration module for the Arrow Flight destination
//!
//! This module handles configuration loading, validation, and management.

pub mod loader;
pub mod types;

pub use types::{DestinationConfig, ObservabilityConfig};
