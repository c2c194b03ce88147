use std::sync::OnceLock;

use anyhow::{Context, Result};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::layer::Layer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogTarget, TelemetryConfig};

const TIMESTAMP: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

static INIT: OnceLock<()> = OnceLock::new();

/// Installs the process-wide subscriber. The returned guard flushes the file writer on drop and
/// must be held until the process exits. Later calls are no-ops.
pub fn init_tracing(cfg: &TelemetryConfig) -> Result<Option<WorkerGuard>> {
    if INIT.get().is_some() {
        return Ok(None);
    }

    let env_filter = EnvFilter::try_new(&cfg.directive).unwrap_or_else(|_| EnvFilter::new("info"));
    let timer = OffsetTime::new(cfg.utc_offset, TIMESTAMP);

    let (fmt_layer, guard) = match &cfg.target {
        LogTarget::Directory(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_suffix(cfg.file_suffix())
                .build(dir)
                .with_context(|| format!("opening log file in {}", dir.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_timer(timer)
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer)
                .boxed();
            (layer, Some(guard))
        }
        LogTarget::Stderr => {
            let layer = tracing_subscriber::fmt::layer()
                .with_timer(timer)
                .with_target(false)
                .with_writer(std::io::stderr)
                .boxed();
            (layer, None)
        }
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .ok();

    INIT.set(()).ok();
    Ok(guard)
}
