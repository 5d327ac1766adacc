// src/utils/logging.rs
//! Logging configuration
//!
//! Sets up the `env_logger` backend for the `log` facade used throughout
//! the crate. `RUST_LOG` always wins over the built-in defaults.

use env_logger::{Builder, Target};
use log::LevelFilter;
use std::env;

/// Initializes logging for normal mining runs (default level: info)
pub fn init_logging() {
    init_with_default(LevelFilter::Info);
}

/// Initializes logging for benchmarks (default level: debug, so per-worker
/// rate lines are visible)
pub fn init_bench_logging() {
    init_with_default(LevelFilter::Debug);
}

fn init_with_default(level: LevelFilter) {
    let mut builder = common_log_config();

    if env::var("RUST_LOG").is_err() {
        builder.filter_level(level);
    } else {
        builder.parse_env("RUST_LOG");
    }

    // A second init (e.g. from tests) is harmless.
    let _ = builder.try_init();
}

/// Base builder: `[ts level module:line] message` on stdout
fn common_log_config() -> Builder {
    let mut builder = Builder::new();

    builder
        .format(|buf, record| {
            use std::io::Write;
            let ts = buf.timestamp_millis();
            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                ts,
                record.level(),
                record.module_path().unwrap_or_default(),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .target(Target::Stdout);

    builder
}
