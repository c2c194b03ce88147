//! Logging setup for `send-mq-message`.
//! Console output goes to stderr; with a log directory configured, entries are appended to a
//! daily rolled file instead.

use anyhow::Result;
use std::path::PathBuf;
use time::UtcOffset;

mod config;
mod tracing_init;

pub use config::{DEFAULT_DIRECTIVE, LogTarget, TelemetryConfig};
pub use tracing_appender::non_blocking::WorkerGuard;
pub use tracing_init::init_tracing;

/// Installs the shared subscriber for `service_name`, filtered by `RUST_LOG`.
pub fn install(
    service_name: &str,
    log_dir: Option<PathBuf>,
    utc_offset: UtcOffset,
) -> Result<Option<WorkerGuard>> {
    init_tracing(&TelemetryConfig::new(service_name, log_dir).with_utc_offset(utc_offset))
}
