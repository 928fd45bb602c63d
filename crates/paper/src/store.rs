//! Durable ledger snapshots.
//!
//! The whole ledger is written on every mutation as one JSON object
//! `{version, open, history, saved_at_ms}`. Writes go to a uniquely named
//! sibling temp file which is fsynced and renamed over the target, so a crash leaves
//! either the old or the new snapshot on disk, never a torn one.

use crate::types::Position;
use gex_desk_core::{DeskError, Result};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

pub const SNAPSHOT_VERSION: u32 = 1;

/// Persisted ledger layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub version: u32,
    #[serde(default)]
    pub open: Vec<Position>,
    #[serde(default)]
    pub history: Vec<Position>,
    #[serde(default)]
    pub saved_at_ms: i64,
}

impl Default for LedgerSnapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            open: Vec::new(),
            history: Vec::new(),
            saved_at_ms: 0,
        }
    }
}

/// Storage backend for the position ledger.
pub trait LedgerStore: Send + Sync {
    /// Returns `None` when nothing has been stored yet.
    fn load(&self) -> Result<Option<LedgerSnapshot>>;

    fn save(&self, snapshot: &LedgerSnapshot) -> Result<()>;
}

/// Ledger store backed by a single JSON file.
#[derive(Debug, Clone)]
pub struct JsonLedgerStore {
    path: PathBuf,
}

impl JsonLedgerStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LedgerStore for JsonLedgerStore {
    /// Missing file: `None`. Unparseable file: moved aside and `None`, so the
    /// next save cannot overwrite it. Snapshot from a newer version: error.
    fn load(&self) -> Result<Option<LedgerSnapshot>> {
        let Some(snapshot) = read_json::<LedgerSnapshot>(&self.path)? else {
            return Ok(None);
        };

        if snapshot.version > SNAPSHOT_VERSION {
            return Err(DeskError::persistence(format!(
                "ledger {} has version {}, newest supported is {SNAPSHOT_VERSION}",
                self.path.display(),
                snapshot.version
            )));
        }

        info!(
            path = %self.path.display(),
            open = snapshot.open.len(),
            history = snapshot.history.len(),
            "Loaded paper ledger"
        );
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &LedgerSnapshot) -> Result<()> {
        write_json_atomic(&self.path, snapshot)?;
        debug!(
            path = %self.path.display(),
            open = snapshot.open.len(),
            history = snapshot.history.len(),
            "Saved paper ledger"
        );
        Ok(())
    }
}

/// In-memory store; `set_fail_saves` simulates a broken disk.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    snapshot: Mutex<Option<LedgerSnapshot>>,
    fail_saves: Mutex<bool>,
    saves: Mutex<usize>,
}

impl MemoryLedgerStore {
    #[must_use]
    pub fn with_snapshot(snapshot: LedgerSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(Some(snapshot)),
            ..Self::default()
        }
    }

    pub fn set_fail_saves(&self, fail: bool) {
        *self.fail_saves.lock() = fail;
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<LedgerSnapshot> {
        self.snapshot.lock().clone()
    }

    #[must_use]
    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn load(&self) -> Result<Option<LedgerSnapshot>> {
        Ok(self.snapshot.lock().clone())
    }

    fn save(&self, snapshot: &LedgerSnapshot) -> Result<()> {
        if *self.fail_saves.lock() {
            return Err(DeskError::persistence("simulated write failure"));
        }
        *self.snapshot.lock() = Some(snapshot.clone());
        *self.saves.lock() += 1;
        Ok(())
    }
}

/// Reads a JSON document. Missing file: `None`. Corrupt file: renamed to
/// `<name>.corrupt-<unix_ms>` with a warning, then `None`.
///
/// # Errors
///
/// Returns `Persistence` if the file exists but cannot be read.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        info!(path = %path.display(), "No persisted file found, starting fresh");
        return Ok(None);
    }

    let file = File::open(path)
        .map_err(|e| DeskError::persistence(format!("open {}: {e}", path.display())))?;

    match serde_json::from_reader(BufReader::new(file)) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            let aside = quarantine_path(path);
            warn!(
                path = %path.display(),
                moved_to = %aside.display(),
                error = %e,
                "Persisted file is corrupt, starting fresh"
            );
            if let Err(rename_err) = fs::rename(path, &aside) {
                return Err(DeskError::persistence(format!(
                    "corrupt {} could not be moved aside: {rename_err}",
                    path.display()
                )));
            }
            Ok(None)
        }
    }
}

/// Writes `value` as JSON via a uniquely named sibling temp file, fsync and
/// rename. Concurrent writers never share a temp file; the last rename wins.
///
/// # Errors
///
/// Returns `Persistence` on any I/O or serialization failure; the target
/// file is left untouched in that case.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if !parent.exists() {
        fs::create_dir_all(parent).map_err(|e| io_error("create dir for", path, &e))?;
    }

    let tmp = NamedTempFile::new_in(parent).map_err(|e| io_error("create temp for", path, &e))?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        serde_json::to_writer_pretty(&mut writer, value)
            .map_err(|e| io_error("serialize", tmp.path(), &e))?;
        writer.flush().map_err(|e| io_error("flush", tmp.path(), &e))?;
    }
    tmp.as_file().sync_all().map_err(|e| io_error("fsync", tmp.path(), &e))?;
    tmp.persist(path)
        .map_err(|e| io_error("rename into", path, &e.error))?;
    Ok(())
}

fn io_error(what: &str, path: &Path, e: &dyn std::fmt::Display) -> DeskError {
    DeskError::persistence(format!("{what} {}: {e}", path.display()))
}

fn quarantine_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".corrupt-{}", chrono::Utc::now().timestamp_millis()));
    path.with_file_name(name)
}
