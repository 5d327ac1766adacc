// src/cli/commands.rs
use crate::utils::error::MinerError;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Nostr PoW Miner CLI - NIP-13 proof-of-work stamping in Rust
#[derive(Parser, Debug)]
#[command(name = "nostr-pow")]
#[command(version, about, long_about = None)]
pub struct Commands {
    /// The action to perform
    #[command(subcommand)]
    pub action: Action,
}

/// Top-level commands for the miner application
#[derive(Subcommand, Debug)]
pub enum Action {
    /// Mine a new note
    Mine(MineOptions),

    /// Continue mining from a saved snapshot
    Resume(ResumeOptions),

    /// Measure hash rate on an unreachable difficulty
    Benchmark(BenchmarkOptions),

    /// Generate configuration file template
    Config(ConfigOptions),
}

/// Options for mining a note
#[derive(Parser, Debug)]
pub struct MineOptions {
    /// Path to configuration file (defaults apply when omitted)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Author public key (hex)
    #[arg(long)]
    pub pubkey: String,

    /// Note content
    #[arg(long)]
    pub content: String,

    /// Event kind (overrides config)
    #[arg(short, long)]
    pub kind: Option<u32>,

    /// Extra tag as comma-separated values, e.g. `t,nostr`; repeatable
    #[arg(short, long = "tag", value_name = "NAME,VALUE,...")]
    pub tags: Vec<String>,

    /// Required leading zero bits (overrides config)
    #[arg(short, long)]
    pub difficulty: Option<u32>,

    /// Number of worker threads (overrides config)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Snapshot file written while mining (overrides config)
    #[arg(short, long)]
    pub snapshot: Option<PathBuf>,

    /// Pause after this many seconds and save the snapshot
    #[arg(long, value_name = "SECS")]
    pub pause_after: Option<u64>,
}

impl MineOptions {
    /// Parses the `--tag` values
    pub fn parsed_tags(&self) -> Result<Vec<Vec<String>>, MinerError> {
        self.tags.iter().map(|tag| parse_tag(tag)).collect()
    }
}

/// Options for resuming from a snapshot
#[derive(Parser, Debug)]
pub struct ResumeOptions {
    /// Path to configuration file (defaults apply when omitted)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Snapshot file to resume from (and keep updating)
    #[arg(short, long)]
    pub snapshot: PathBuf,

    /// Number of worker threads (default: the snapshot's)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Pause after this many seconds and save the snapshot
    #[arg(long, value_name = "SECS")]
    pub pause_after: Option<u64>,
}

/// Options for running the benchmark
#[derive(Parser, Debug)]
pub struct BenchmarkOptions {
    /// Duration of benchmark in seconds
    #[arg(short, long, default_value_t = 10)]
    pub duration: u64,

    /// Number of threads to use
    #[arg(short, long, default_value_t = num_cpus::get())]
    pub threads: usize,
}

/// Options for generating configuration files
#[derive(Parser, Debug)]
pub struct ConfigOptions {
    /// Output file path
    #[arg(short, long, default_value = "config.toml")]
    pub output: PathBuf,
}

/// Splits `name,value,...` into a tag
pub fn parse_tag(raw: &str) -> Result<Vec<String>, MinerError> {
    let tag: Vec<String> = raw.split(',').map(|part| part.trim().to_string()).collect();
    if tag.first().is_none_or(String::is_empty) {
        return Err(MinerError::InvalidRequest(format!("tag '{}' has no name", raw)));
    }
    Ok(tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mine_arguments_parse() {
        let cli = Commands::try_parse_from([
            "nostr-pow", "mine", "--pubkey", "ab", "--content", "hi", "-t", "t,nostr", "-t",
            "client,cli", "-d", "16", "--pause-after", "30",
        ])
        .unwrap();
        let Action::Mine(opts) = cli.action else {
            panic!("expected mine");
        };
        assert_eq!(opts.difficulty, Some(16));
        assert_eq!(opts.pause_after, Some(30));
        assert_eq!(
            opts.parsed_tags().unwrap(),
            vec![vec!["t".to_string(), "nostr".to_string()], vec!["client".to_string(), "cli".to_string()]]
        );
    }

    #[test]
    fn nameless_tag_is_rejected() {
        assert!(parse_tag(",value").is_err());
        assert_eq!(parse_tag("e").unwrap(), vec!["e".to_string()]);
    }

    #[test]
    fn resume_requires_snapshot() {
        assert!(Commands::try_parse_from(["nostr-pow", "resume"]).is_err());
        assert!(Commands::try_parse_from(["nostr-pow", "resume", "-s", "snap.json", "-w", "2"]).is_ok());
    }
}
