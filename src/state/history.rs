//! Run history.
//!
//! Completed runs are prepended (newest first) and never edited or removed
//! here. The list is persisted as JSON under the user data directory:
//! ~/.local/share/ndtspeed/history.json on Linux.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Refuse to load history files larger than this
const MAX_HISTORY_SIZE: u64 = 10 * 1024 * 1024; // 10MB

/// Record of one finished run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub download_mbps: f64,
    pub upload_mbps: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl HistoryEntry {
    pub fn new(download_mbps: f64, upload_mbps: f64, latency_ms: Option<u64>) -> Self {
        Self {
            timestamp: Utc::now(),
            download_mbps,
            upload_mbps,
            latency_ms,
        }
    }
}

/// Append-only, newest-first list of finished runs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default history file: <data dir>/ndtspeed/history.json
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|p| p.join("ndtspeed").join("history.json"))
    }

    /// Prepend a finished run
    pub fn record(&mut self, entry: HistoryEntry) {
        self.entries.insert(0, entry);
    }

    /// Entries, newest first
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load history from `path`; a missing file is an empty history
    pub fn load(path: &Path) -> Result<Self> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(e.into()),
        };
        if file.metadata()?.len() > MAX_HISTORY_SIZE {
            return Err(std::io::Error::other(format!(
                "history file too large (max 10MB): {}",
                path.display()
            ))
            .into());
        }
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Load history that is about to be saved back to `path`.
    ///
    /// A file that exists but cannot be loaded (too large, corrupt) is
    /// renamed to [`set_aside_path`] first, so a later save starts a fresh
    /// file instead of overwriting the old entries. Errors only if the file
    /// can be neither loaded nor moved; the caller must not save to `path`
    /// then.
    pub fn open(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(history) => Ok(history),
            Err(e) => {
                let aside = set_aside_path(path, Utc::now());
                fs::rename(path, &aside)?;
                tracing::warn!(
                    path = %path.display(),
                    moved_to = %aside.display(),
                    error = %e,
                    "unreadable history set aside"
                );
                Ok(Self::new())
            }
        }
    }

    /// Write the whole list to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Write then rename so a crash never leaves a truncated file behind
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Where [`History::open`] moves an unreadable file:
/// `history.json` becomes `history.json.20260114T093000.bak`
pub fn set_aside_path(path: &Path, now: DateTime<Utc>) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "history.json".into());
    name.push(format!(".{}.bak", now.format("%Y%m%dT%H%M%S")));
    path.with_file_name(name)
}
