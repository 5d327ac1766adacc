// src/cli/mod.rs
//! Command-line interface
//!
//! Argument definitions for the `nostr-pow` binary, built with clap's
//! derive API.

/// Subcommands and their options
pub mod commands;

pub use commands::{Action, BenchmarkOptions, Commands, ConfigOptions, MineOptions, ResumeOptions};
