//! Configuration file model.
//!
//! The file is TOML with three sections mirroring the legacy INI layout:
//!
//! ```toml
//! [APP]
//! MODE = "file"
//!
//! [MQ]
//! USER_ID = "mfguser"
//! QUEUE_NAME = "GATEWAY.Q"
//! REPLY_QUEUE_NAME = "REPLY.Q"
//! MANAGER_NAME = "QM1"
//! CHANNEL = "SVRCONN"
//! HOST = "mq.local"
//! PORT = 1414
//! WAIT_REPLY_INTERVAL = 15000
//!
//! [PATH]
//! APP_LOG_PATH = "logs"
//! RESOURCE_PATH = "resource"
//! RESOURCE_BACKUP_PATH = "resource/backup"
//! ```
use crate::correlation::SuffixStrategy;
use crate::error::ConfigError;
use serde::Deserialize;
use smq_bus::{DEFAULT_CHARACTER_SET, DEFAULT_ENCODING};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "MFG_MQ_INI";
/// File name looked up next to the executable when no override is given.
pub const DEFAULT_CONFIG_FILE: &str = "SendMQMessage.toml";

pub const DEFAULT_PORT: u16 = 1414;
pub const DEFAULT_WAIT_REPLY_MS: u64 = 15_000;

/// Where work items come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Cli,
    File,
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "cli" => Ok(Mode::Cli),
            "file" => Ok(Mode::File),
            other => Err(ConfigError::UnknownMode(other.to_string())),
        }
    }
}

/// Everything the exchange client needs for its whole lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub channel: String,
    pub manager_name: String,
    pub queue_name: String,
    pub reply_queue_name: String,
    pub user_id: String,
    pub wait_reply_interval: Duration,
    pub need_reply: bool,
    pub include_application_tag: bool,
    pub character_set: i32,
    pub encoding: i32,
    pub id_suffix: SuffixStrategy,
}

impl SessionConfig {
    /// Minimal configuration with legacy defaults for the optional values.
    pub fn new(
        manager_name: impl Into<String>,
        queue_name: impl Into<String>,
        reply_queue_name: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            host: "localhost".into(),
            port: DEFAULT_PORT,
            channel: String::new(),
            manager_name: manager_name.into(),
            queue_name: queue_name.into(),
            reply_queue_name: reply_queue_name.into(),
            user_id: user_id.into(),
            wait_reply_interval: Duration::from_millis(DEFAULT_WAIT_REPLY_MS),
            need_reply: true,
            include_application_tag: true,
            character_set: DEFAULT_CHARACTER_SET,
            encoding: DEFAULT_ENCODING,
            id_suffix: SuffixStrategy::Random,
        }
    }

    /// `host(port)` as shown in connection log lines.
    pub fn connection_name(&self) -> String {
        format!("{}({})", self.host, self.port)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathConfig {
    pub log_dir: Option<PathBuf>,
    pub resource_dir: Option<PathBuf>,
    pub backup_dir: Option<PathBuf>,
}

impl PathConfig {
    /// Resource and backup directories, both required in directory mode.
    pub fn directory_paths(&self) -> Result<(PathBuf, PathBuf), ConfigError> {
        let resource = self.resource_dir.clone().ok_or(ConfigError::Missing {
            section: "PATH",
            key: "RESOURCE_PATH",
        })?;
        let backup = self.backup_dir.clone().ok_or(ConfigError::Missing {
            section: "PATH",
            key: "RESOURCE_BACKUP_PATH",
        })?;
        Ok((resource, backup))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub mode: Mode,
    pub session: SessionConfig,
    pub paths: PathConfig,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw, path)
    }

    /// Parses file contents; `origin` only feeds error messages.
    pub fn parse(raw: &str, origin: &Path) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        file.resolve()
    }
}

/// Explicit path, else `MFG_MQ_INI`, else [`DEFAULT_CONFIG_FILE`] next to the executable.
pub fn resolve_config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
        .unwrap_or_else(default_config_path)
}

fn default_config_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_default()
        .join(DEFAULT_CONFIG_FILE)
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(rename = "APP", default)]
    app: AppSection,
    #[serde(rename = "MQ", default)]
    mq: MqSection,
    #[serde(rename = "PATH", default)]
    path: PathSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct AppSection {
    mode: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct MqSection {
    user_id: Option<String>,
    queue_name: Option<String>,
    reply_queue_name: Option<String>,
    manager_name: Option<String>,
    channel: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    wait_reply_interval: Option<u64>,
    need_reply: Option<bool>,
    with_application_id_data: Option<bool>,
    character_set: Option<i32>,
    encoding: Option<i32>,
    id_suffix: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct PathSection {
    app_log_path: Option<PathBuf>,
    resource_path: Option<PathBuf>,
    resource_backup_path: Option<PathBuf>,
}

fn required(value: Option<String>, key: &'static str) -> Result<String, ConfigError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing { section: "MQ", key })
}

fn non_empty(value: Option<PathBuf>) -> Option<PathBuf> {
    value.filter(|p| !p.as_os_str().is_empty())
}

impl ConfigFile {
    fn resolve(self) -> Result<AppConfig, ConfigError> {
        let mode = match self.app.mode {
            Some(mode) => mode.parse()?,
            None => Mode::Cli,
        };
        let mq = self.mq;
        let id_suffix = match mq.id_suffix {
            Some(value) => value.parse().map_err(|reason| ConfigError::Invalid {
                section: "MQ",
                key: "ID_SUFFIX",
                reason,
            })?,
            None => SuffixStrategy::Random,
        };
        let session = SessionConfig {
            host: required(mq.host, "HOST")?,
            port: mq.port.unwrap_or(DEFAULT_PORT),
            channel: required(mq.channel, "CHANNEL")?,
            manager_name: required(mq.manager_name, "MANAGER_NAME")?,
            queue_name: required(mq.queue_name, "QUEUE_NAME")?,
            reply_queue_name: required(mq.reply_queue_name, "REPLY_QUEUE_NAME")?,
            user_id: required(mq.user_id, "USER_ID")?,
            wait_reply_interval: Duration::from_millis(
                mq.wait_reply_interval.unwrap_or(DEFAULT_WAIT_REPLY_MS),
            ),
            need_reply: mq.need_reply.unwrap_or(true),
            include_application_tag: mq.with_application_id_data.unwrap_or(true),
            character_set: mq.character_set.unwrap_or(DEFAULT_CHARACTER_SET),
            encoding: mq.encoding.unwrap_or(DEFAULT_ENCODING),
            id_suffix,
        };
        let paths = PathConfig {
            log_dir: non_empty(self.path.app_log_path),
            resource_dir: non_empty(self.path.resource_path),
            backup_dir: non_empty(self.path.resource_backup_path),
        };
        Ok(AppConfig {
            mode,
            session,
            paths,
        })
    }
}
