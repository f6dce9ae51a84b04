//! One JSON file per dataset under the storage directory.
//!
//! Files are replaced whole on every write. There is no locking here; the
//! aggregation service serializes refreshes of the same dataset.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::time_utils::parse_timestamp_value;
use crate::types::CacheEntry;

/// Record fields that carry an event time. Activity records have `timestamp`,
/// active users have `firstSeen`/`lastSeen`.
const TIME_FIELDS: [&str; 3] = ["timestamp", "firstSeen", "lastSeen"];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheFileStatus {
    pub name: String,
    pub count: usize,
    pub size_bytes: u64,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
    /// When the entry was written, from the entry itself.
    pub cached_at: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.dir.join(format!("{name}.json")))
    }

    /// Missing file ⇒ `None`. Unparseable content is logged and also treated as `None`.
    pub async fn read_entry<T: DeserializeOwned>(&self, name: &str) -> Result<Option<CacheEntry<T>>> {
        let path = self.path_for(name)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice::<CacheEntry<T>>(&bytes) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                warn!(cache = name, "Ignoring corrupt cache file {}: {e}", path.display());
                Ok(None)
            }
        }
    }

    /// Pretty-printed, written to a temp file then renamed over the old one.
    pub async fn write_entry<T: Serialize>(&self, name: &str, entry: &CacheEntry<T>) -> Result<()> {
        let path = self.path_for(name)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let body = serde_json::to_string_pretty(entry)?;
        let tmp = self.dir.join(format!(".{name}.json.tmp"));
        tokio::fs::write(&tmp, body.as_bytes()).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(cache = name, count = entry.count, "Wrote {}", path.display());
        Ok(())
    }

    /// Returns whether a file was removed.
    pub async fn delete(&self, name: &str) -> Result<bool> {
        let path = self.path_for(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove every cache file, returning how many were removed.
    pub async fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for name in self.names().await? {
            if self.delete(&name).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Every cache file with record count, size and the date range of its records.
    pub async fn status(&self) -> Result<Vec<CacheFileStatus>> {
        let mut out = Vec::new();
        for name in self.names().await? {
            let path = self.path_for(&name)?;
            let meta = match tokio::fs::metadata(&path).await {
                Ok(m) => m,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let modified = meta.modified().ok().map(DateTime::<Utc>::from);

            let entry = self.read_entry::<Value>(&name).await?;
            let (count, cached_at, oldest, newest) = match &entry {
                Some(e) => {
                    let times: Vec<DateTime<Utc>> = e
                        .data
                        .iter()
                        .flat_map(|r| TIME_FIELDS.iter().filter_map(|f| r.get(*f)))
                        .filter_map(parse_timestamp_value)
                        .collect();
                    (
                        e.data.len(),
                        Some(e.timestamp),
                        times.iter().min().copied(),
                        times.iter().max().copied(),
                    )
                }
                None => (0, None, None, None),
            };

            out.push(CacheFileStatus {
                name,
                count,
                size_bytes: meta.len(),
                oldest,
                newest,
                cached_at,
                modified,
            });
        }
        Ok(out)
    }

    /// Stems of `*.json` files in the cache directory, sorted.
    async fn names(&self) -> Result<Vec<String>> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        while let Some(item) = dir.next_entry().await? {
            let file_name = item.file_name();
            let Some(stem) = file_name.to_str().and_then(|f| f.strip_suffix(".json")) else {
                continue;
            };
            if validate_name(stem).is_ok() {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Cache keys are plain file stems: ASCII letters, digits, `_` and `-`.
pub fn validate_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name.len() <= 64
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if ok {
        Ok(())
    } else {
        Err(AppError::InvalidCacheKey(name.to_string()))
    }
}
