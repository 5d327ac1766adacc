// src/config/mod.rs
//! Configuration management for the miner
//!
//! This module handles all configuration-related functionality including:
//! - Loading and parsing configuration files
//! - Generating configuration templates
//! - Turning the file into coordinator settings
//!
//! The configuration uses TOML format; every field has a default.

/// Core configuration implementation
///
/// Contains the [`Config`] struct and related types that define
/// the miner's configuration structure and behavior.
pub mod config;

// Re-export key items for easy access
pub use config::{Config, SnapshotConfig};

use crate::utils::error::MinerError;
use std::path::PathBuf;

/// Loads miner configuration from a TOML file
///
/// # Arguments
/// * `path` - Path to the configuration file (anything convertible to PathBuf)
///
/// # Returns
/// * `Ok(Config)` - Successfully loaded configuration
/// * `Err(MinerError)` - If the file couldn't be read or parsed
pub fn load(path: impl Into<PathBuf>) -> Result<Config, MinerError> {
    Config::load(path)
}

/// Loads `path` if given, otherwise the defaults
pub fn load_or_default(path: Option<&PathBuf>) -> Result<Config, MinerError> {
    match path {
        Some(path) => load(path),
        None => Ok(Config::default()),
    }
}

/// Generates a commented configuration template
pub fn generate_template() -> String {
    Config::generate_template()
}
