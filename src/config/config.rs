// src/config/config.rs
use crate::miner::coordinator::CoordinatorSettings;
use crate::miner::partition::RedistributionPolicy;
use crate::utils::error::MinerError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for the miner
///
/// Every field has a default, so an empty file is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Number of worker threads
    /// (default: hardware threads minus one, at least 1)
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Required leading zero bits
    #[serde(default = "default_difficulty")]
    pub difficulty: u32,

    /// Event kind of mined notes
    #[serde(default = "default_kind")]
    pub kind: u32,

    /// Tags added to every note before the caller's tags
    #[serde(default = "default_tags")]
    pub default_tags: Vec<Vec<String>>,

    /// Minimum time between hash-rate total recomputations
    #[serde(default = "default_refresh_ms")]
    pub hash_rate_refresh_ms: u64,

    /// Rate samples averaged per worker
    #[serde(default = "default_window")]
    pub hash_rate_window: usize,

    /// How often workers report progress
    #[serde(default = "default_progress_ms")]
    pub progress_interval_ms: u64,

    /// Delay between worker launches
    #[serde(default)]
    pub spawn_stagger_ms: u64,

    /// Saved-cursor handling when the worker count changes
    #[serde(default)]
    pub redistribution: RedistributionPolicy,

    /// Snapshot persistence
    #[serde(default)]
    pub snapshot: SnapshotConfig,
}

/// Where and how often snapshots are written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Snapshot file; `None` disables persistence unless given on the
    /// command line
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Minimum time between writes while mining
    #[serde(default = "default_snapshot_interval_ms")]
    pub interval_ms: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        SnapshotConfig {
            path: None,
            interval_ms: default_snapshot_interval_ms(),
        }
    }
}

fn default_worker_threads() -> usize {
    num_cpus::get().saturating_sub(1).max(1)
}

fn default_difficulty() -> u32 {
    21
}

fn default_kind() -> u32 {
    1
}

fn default_tags() -> Vec<Vec<String>> {
    vec![vec!["miner".into(), "nostr-pow".into()]]
}

fn default_refresh_ms() -> u64 {
    250
}

fn default_window() -> usize {
    11
}

fn default_progress_ms() -> u64 {
    250
}

fn default_snapshot_interval_ms() -> u64 {
    5000
}

impl Default for Config {
    fn default() -> Self {
        Config {
            worker_threads: default_worker_threads(),
            difficulty: default_difficulty(),
            kind: default_kind(),
            default_tags: default_tags(),
            hash_rate_refresh_ms: default_refresh_ms(),
            hash_rate_window: default_window(),
            progress_interval_ms: default_progress_ms(),
            spawn_stagger_ms: 0,
            redistribution: RedistributionPolicy::default(),
            snapshot: SnapshotConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from a file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file (TOML format)
    ///
    /// # Returns
    /// * `Ok(Config)` - Successfully loaded configuration
    /// * `Err(MinerError)` - If file couldn't be read or parsed
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, MinerError> {
        let path = path.into();
        let config_str = std::fs::read_to_string(&path).map_err(|e| {
            MinerError::ConfigError(format!(
                "Failed to read config at {}: {}",
                path.display(),
                e
            ))
        })?;

        Ok(toml::from_str(&config_str)?)
    }

    /// Settings for a [`MiningCoordinator`](crate::miner::MiningCoordinator)
    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            default_tags: self.default_tags.clone(),
            progress_interval: Duration::from_millis(self.progress_interval_ms),
            spawn_stagger: Duration::from_millis(self.spawn_stagger_ms),
            redistribution: self.redistribution,
            hash_rate_window: self.hash_rate_window,
            hash_rate_refresh: Duration::from_millis(self.hash_rate_refresh_ms),
        }
    }

    /// Minimum time between snapshot writes
    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_millis(self.snapshot.interval_ms)
    }

    /// Generates a configuration template string
    ///
    /// # Returns
    /// String containing a commented TOML configuration template
    pub fn generate_template() -> String {
        let mut template = String::new();
        template.push_str("# Nostr PoW Miner Configuration\n\n");
        template.push_str("# Number of worker threads (default: hardware threads - 1)\n");
        template.push_str(&format!("worker_threads = {}\n", default_worker_threads()));
        template.push_str("# Required leading zero bits\n");
        template.push_str("difficulty = 21\n");
        template.push_str("# Event kind of mined notes\n");
        template.push_str("kind = 1\n");
        template.push_str("# Tags added to every note\n");
        template.push_str("default_tags = [[\"miner\", \"nostr-pow\"]]\n\n");

        template.push_str("# Telemetry\n");
        template.push_str("hash_rate_refresh_ms = 250\n");
        template.push_str("hash_rate_window = 11\n");
        template.push_str("progress_interval_ms = 250\n");
        template.push_str("# Delay between worker launches (0 = none)\n");
        template.push_str("spawn_stagger_ms = 0\n\n");

        template.push_str("# Worker-count changes on resume: preserve-cursors, repartition\n");
        template.push_str("redistribution = \"preserve-cursors\"\n\n");

        template.push_str("[snapshot]\n");
        template.push_str("# path = \"mining-snapshot.json\"\n");
        template.push_str("interval_ms = 5000\n");

        template
    }
}
