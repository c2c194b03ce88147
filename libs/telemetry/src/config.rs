use std::env;
use std::path::PathBuf;
use time::UtcOffset;

/// Filter applied when `RUST_LOG` is unset or invalid.
pub const DEFAULT_DIRECTIVE: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    /// Daily rolled files `<dir>/<yyyy-MM-dd>.<service>.log`.
    Directory(PathBuf),
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub target: LogTarget,
    pub directive: String,
    pub utc_offset: UtcOffset,
}

impl TelemetryConfig {
    pub fn new(service_name: &str, log_dir: Option<PathBuf>) -> Self {
        let target = match log_dir {
            Some(dir) => LogTarget::Directory(dir),
            None => LogTarget::Stderr,
        };
        Self {
            service_name: service_name.to_string(),
            target,
            directive: env::var("RUST_LOG")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_DIRECTIVE.to_string()),
            utc_offset: UtcOffset::UTC,
        }
    }

    /// Offset used for timestamps in log lines.
    pub fn with_utc_offset(mut self, offset: UtcOffset) -> Self {
        self.utc_offset = offset;
        self
    }

    pub fn file_suffix(&self) -> String {
        format!("{}.log", self.service_name)
    }
}
