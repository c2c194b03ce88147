use smq_bus::TransportError;
use std::path::PathBuf;
use thiserror::Error;

/// Malformed or missing configuration. Fatal before any connection attempt.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("missing config value [{section}] {key}")]
    Missing {
        section: &'static str,
        key: &'static str,
    },
    #[error("Unknown mode set: {0}; Expected: cli | file")]
    UnknownMode(String),
    #[error("invalid config value [{section}] {key}: {reason}")]
    Invalid {
        section: &'static str,
        key: &'static str,
        reason: String,
    },
}

/// The resource directory could not be scanned.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read resource directory {}: {source}", .path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Per-message failure. Always converted into a failed outcome, never fatal to the batch.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("[Error][session]not connected to a queue manager")]
    NotConnected,
    #[error("[Error][put]{0}")]
    Put(#[source] TransportError),
    #[error("[Error][get]{0}")]
    Get(#[source] TransportError),
}

impl ExchangeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ExchangeError::Get(err) if err.is_timeout())
    }
}

/// Failure archiving or removing a resource file after its exchange.
#[derive(Debug, Error)]
pub enum SideEffectError {
    #[error("move {} to {} failed: {source}", .from.display(), .to.display())]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("delete {} failed: {source}", .path.display())]
    Delete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that end a run before or instead of dispatching the batch.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("{0}")]
    Connection(#[from] TransportError),
}
