// src/main.rs
use clap::Parser;
use nostr_pow_rs::miner::{MiningCoordinator, MiningFuture};
use nostr_pow_rs::snapshot::SnapshotStore;
use nostr_pow_rs::types::{MiningRequest, MiningState};
use nostr_pow_rs::utils::logging::init_bench_logging;
use nostr_pow_rs::{self, *};
use std::time::{Duration, Instant};

/// How long one pump of the coordinator may block
const PUMP_INTERVAL: Duration = Duration::from_millis(250);

/// Interval of the progress log lines
const REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Main entry point for the miner
///
/// # Returns
/// - `Ok(())` on successful execution
/// - `Err(MinerError)` if any operation fails
fn main() -> Result<(), MinerError> {
    let cli = cli::Commands::parse();

    match cli.action {
        cli::Action::Mine(opts) => mine(opts),
        cli::Action::Resume(opts) => resume(opts),
        cli::Action::Benchmark(opts) => run_benchmark(opts),
        cli::Action::Config(opts) => generate_config(opts),
    }
}

/// Mines a new note
///
/// # Operations
/// 1. Initializes logging
/// 2. Loads configuration and applies CLI overrides
/// 3. Starts the coordinator and the telemetry reporter
/// 4. Pumps until success, failure or the pause deadline
fn mine(opts: cli::MineOptions) -> Result<(), MinerError> {
    utils::init_logging();

    let mut config = config::load_or_default(opts.config.as_ref())?;
    // Apply CLI overrides
    if let Some(workers) = opts.workers {
        config.worker_threads = workers;
    }
    if let Some(difficulty) = opts.difficulty {
        config.difficulty = difficulty;
    }
    if let Some(kind) = opts.kind {
        config.kind = kind;
    }

    let mut request = MiningRequest::new(opts.pubkey.clone(), opts.content.clone(), config.difficulty)
        .with_workers(config.worker_threads);
    request.kind = config.kind;
    request.tags = opts.parsed_tags()?;

    let store_path = opts.snapshot.clone().or_else(|| config.snapshot.path.clone());
    let store = store_path.map(|path| SnapshotStore::new(path, config.snapshot_interval()));

    let mut coordinator = MiningCoordinator::with_threads(config.coordinator_settings());
    let reporter = stats::TelemetryReporter::new(REPORT_INTERVAL).spawn(coordinator.subscribe());

    let future = coordinator.start(request)?;
    let outcome = drive(&mut coordinator, future, store, opts.pause_after);

    drop(coordinator);
    let _ = reporter.join();
    outcome
}

/// Continues mining from a snapshot file
fn resume(opts: cli::ResumeOptions) -> Result<(), MinerError> {
    utils::init_logging();

    let config = config::load_or_default(opts.config.as_ref())?;
    let store = SnapshotStore::new(&opts.snapshot, config.snapshot_interval());
    let snapshot = store.load()?.ok_or_else(|| {
        MinerError::ConfigError(format!("No snapshot at {}", opts.snapshot.display()))
    })?;
    log::info!(
        "Loaded snapshot: difficulty {}, {} saved cursors, best {:?} bits",
        snapshot.difficulty,
        snapshot.worker_nonces.len(),
        snapshot.best.as_ref().map(|b| b.score)
    );

    let mut coordinator = MiningCoordinator::with_threads(config.coordinator_settings());
    let reporter = stats::TelemetryReporter::new(REPORT_INTERVAL).spawn(coordinator.subscribe());
    if let Some(workers) = opts.workers {
        coordinator.set_worker_count(workers)?;
    }

    let future = coordinator.resume(Some(snapshot))?;
    let outcome = drive(&mut coordinator, future, Some(store), opts.pause_after);

    drop(coordinator);
    let _ = reporter.join();
    outcome
}

/// Pumps the coordinator until the attempt ends or the pause deadline
///
/// Prints the mined note, or the snapshot when pausing, as JSON.
fn drive(
    coordinator: &mut MiningCoordinator,
    mut future: MiningFuture,
    mut store: Option<SnapshotStore>,
    pause_after: Option<u64>,
) -> Result<(), MinerError> {
    let pause_at = pause_after.map(|secs| Instant::now() + Duration::from_secs(secs));

    loop {
        coordinator.pump(PUMP_INTERVAL);

        if let Some(outcome) = future.try_result() {
            let result = outcome?;
            if let Some(store) = &store {
                store.clear()?;
            }
            println!("{}", serde_json::to_string_pretty(&result)?);
            return Ok(());
        }

        if let Some(store) = store.as_mut() {
            if coordinator.state() == MiningState::Mining
                && store.save_throttled(&coordinator.snapshot()?)?
            {
                log::debug!("Snapshot written to {}", store.path().display());
            }
        }

        if pause_at.is_some_and(|at| Instant::now() >= at) {
            let snapshot = coordinator.pause()?;
            match store.as_mut() {
                Some(store) if snapshot.has_progress() => {
                    store.save(&snapshot)?;
                    log::info!("Paused; snapshot saved to {}", store.path().display());
                }
                _ => log::info!("Paused"),
            }
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            return Ok(());
        }
    }
}

/// Runs the hash-rate benchmark
///
/// Mines an unreachable difficulty for the requested duration and reports
/// the aggregated rate.
fn run_benchmark(opts: cli::BenchmarkOptions) -> Result<(), MinerError> {
    init_bench_logging();

    let settings = config::Config::default().coordinator_settings();
    let mut coordinator = MiningCoordinator::with_threads(settings);
    let request = MiningRequest::new("0".repeat(64), "benchmark", 256).with_workers(opts.threads);

    log::info!(
        "Starting benchmark for {} seconds on {} threads",
        opts.duration,
        opts.threads
    );

    let _future = coordinator.start(request)?;
    let deadline = Instant::now() + Duration::from_secs(opts.duration);
    while Instant::now() < deadline && coordinator.state() == MiningState::Mining {
        coordinator.pump(PUMP_INTERVAL);
    }

    let stats = coordinator.stats();
    coordinator.cancel();

    // Report final results
    log::info!("Benchmark results:");
    log::info!("Messages applied: {}", stats.messages_applied);
    log::info!("Total hashrate: {:.2} H/s", stats.total_hash_rate);
    for (worker, rate) in &stats.max_worker_rates {
        log::info!("Worker {} peak: {:.2} H/s", worker, rate);
    }
    if let Some(best) = coordinator.best() {
        log::info!("Best: {} bits at nonce {}", best.score, best.nonce);
    }
    log::logger().flush(); // Ensure final results appear

    Ok(())
}

/// Generates configuration template file
fn generate_config(opts: cli::ConfigOptions) -> Result<(), MinerError> {
    let template = config::generate_template();
    std::fs::write(&opts.output, template)?;
    println!("Configuration template written to {}", opts.output.display());
    Ok(())
}
