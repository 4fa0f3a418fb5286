// src/utils/logging.rs
//! Logging configuration and utilities
//!
//! Uses `env_logger` under the hood with custom formatting and filtering.

use env_logger::{Builder, Target};
use log::LevelFilter;
use std::env;

/// Initializes the logging subsystem with sensible defaults
///
/// Logs to stdout at Info level; `RUST_LOG` overrides the filter when set.
pub fn init_logging() {
    let mut builder = common_log_config();

    if env::var("RUST_LOG").is_err() {
        builder.filter_level(LevelFilter::Info);
    } else {
        builder.parse_env("RUST_LOG");
    }

    builder.init();
}

/// Configures debug-level logging for protocol dumps and benchmarks
///
/// Same format as standard logging with a Debug default level.
pub fn init_debug_logging() {
    let mut builder = common_log_config();

    if env::var("RUST_LOG").is_err() {
        builder.filter_level(LevelFilter::Debug);
    } else {
        builder.parse_env("RUST_LOG");
    }

    builder.init();
}

/// Creates a base logger builder with common settings
///
/// Format: timestamp, level, module path, line number, message.
fn common_log_config() -> Builder {
    let mut builder = Builder::new();

    builder
        .format(|buf, record| {
            use std::io::Write;
            let ts = buf.timestamp_seconds();
            let level = record.level();
            let module = record.module_path().unwrap_or_default();
            let line = record.line().unwrap_or(0);

            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                ts,
                level,
                module,
                line,
                record.args()
            )
        })
        .target(Target::Stdout);

    builder
}
