//! Work items: positional CLI arguments or `[<tag>]<name>.trx` files in a resource directory.
use crate::error::SourceError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::debug;

static TRX_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[(.+)\](.+)\.trx$").unwrap_or_else(|err| panic!("invalid trx pattern: {err}"))
});

/// One message to send, optionally backed by the file it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub tag: String,
    pub payload: String,
    pub origin: Option<PathBuf>,
}

impl WorkItem {
    pub fn direct(tag: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            payload: payload.into(),
            origin: None,
        }
    }
}

/// Tag of a resource file name, when it follows the `[<tag>]<name>.trx` convention.
pub fn trx_tag(file_name: &str) -> Option<&str> {
    TRX_NAME
        .captures(file_name)
        .and_then(|caps| caps.get(1))
        .map(|tag| tag.as_str())
}

/// First argument is the tag shared by every following message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectSource {
    tag: String,
    messages: Vec<String>,
}

impl DirectSource {
    /// `None` when fewer than two arguments are given.
    pub fn from_args(args: &[String]) -> Option<Self> {
        let (tag, messages) = args.split_first()?;
        if messages.is_empty() {
            return None;
        }
        Some(Self {
            tag: tag.clone(),
            messages: messages.to_vec(),
        })
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Qualifying files of a resource directory, sorted by file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectorySource {
    backup_dir: PathBuf,
    items: Vec<WorkItem>,
}

impl DirectorySource {
    /// Reads every regular file whose name matches the trx convention. Empty files and other
    /// names are skipped; the directory is not descended into.
    pub async fn scan(resource_dir: &Path, backup_dir: &Path) -> Result<Self, SourceError> {
        let read_dir_err = |source| SourceError::ReadDir {
            path: resource_dir.to_path_buf(),
            source,
        };
        let mut entries = tokio::fs::read_dir(resource_dir)
            .await
            .map_err(read_dir_err)?;

        let mut candidates = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(read_dir_err)? {
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };
            if !file_type.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(tag) = trx_tag(&name) {
                candidates.push((name.clone(), tag.to_string(), entry.path()));
            }
        }
        candidates.sort_by(|a, b| a.0.cmp(&b.0));

        let mut items = Vec::with_capacity(candidates.len());
        for (name, tag, path) in candidates {
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    debug!(file = %name, error = %err, "skipping unreadable resource file");
                    continue;
                }
            };
            if bytes.is_empty() {
                debug!(file = %name, "skipping empty resource file");
                continue;
            }
            items.push(WorkItem {
                tag,
                payload: String::from_utf8_lossy(&bytes).into_owned(),
                origin: Some(path),
            });
        }

        Ok(Self {
            backup_dir: backup_dir.to_path_buf(),
            items,
        })
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// What to do with an item's backing file once its exchange finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    Direct,
    Directory { backup_dir: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkSource {
    Direct(DirectSource),
    Directory(DirectorySource),
}

impl WorkSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            WorkSource::Direct(_) => SourceKind::Direct,
            WorkSource::Directory(source) => SourceKind::Directory {
                backup_dir: source.backup_dir.clone(),
            },
        }
    }

    pub fn len(&self) -> usize {
        match self {
            WorkSource::Direct(source) => source.len(),
            WorkSource::Directory(source) => source.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_items(self) -> Box<dyn Iterator<Item = WorkItem> + Send> {
        match self {
            WorkSource::Direct(DirectSource { tag, messages }) => Box::new(
                messages
                    .into_iter()
                    .map(move |payload| WorkItem::direct(tag.clone(), payload)),
            ),
            WorkSource::Directory(source) => Box::new(source.items.into_iter()),
        }
    }
}
