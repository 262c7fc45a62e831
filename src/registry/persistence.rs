//! Durable storage boundary for the registry
//!
//! The store calls [`RegistryPersistence::load`] once at startup and
//! [`RegistryPersistence::commit`] after every content-changing merge. A
//! commit either fully lands or leaves the previous state readable.
//!
//! # File format
//!
//! One JSON document:
//!
//! ```text
//! {"format_version":1,"saved_at":"...","seal":"<hex>","checksum":"crc32:xxxxxxxx","entries":[...]}
//! ```
//!
//! `checksum` covers the serialized `entries` array. The previous good file
//! is kept at `<path>.bak`.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

use super::errors::{PersistError, PersistResult};
use super::seal::{seal, Seal};
use super::snapshot::{RegistryEntry, RegistrySnapshot};
use crate::observability::{Event, Logger};

/// Current on-disk format version
pub const FORMAT_VERSION: u32 = 1;

/// Durable home for registry snapshots
pub trait RegistryPersistence: Send + Sync {
    /// Load the last committed snapshot; empty if nothing was ever committed
    fn load(&self) -> PersistResult<RegistrySnapshot>;

    /// Durably store `snapshot`. Must not return `Ok` until it would survive a crash.
    fn commit(&self, snapshot: &RegistrySnapshot, seal: &Seal) -> PersistResult<()>;
}

/// In-memory persistence for tests and ephemeral registries
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    state: Mutex<Option<RegistrySnapshot>>,
    fail_commits: AtomicBool,
    commits: AtomicU64,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following commit fail until switched off again
    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Number of successful commits
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    /// Last committed snapshot, if any
    pub fn stored(&self) -> Option<RegistrySnapshot> {
        self.state.lock().ok().and_then(|s| s.clone())
    }
}

impl RegistryPersistence for MemoryPersistence {
    fn load(&self) -> PersistResult<RegistrySnapshot> {
        let state = self
            .state
            .lock()
            .map_err(|_| PersistError::Unavailable("memory state lock poisoned".to_string()))?;
        Ok(state.clone().unwrap_or_default())
    }

    fn commit(&self, snapshot: &RegistrySnapshot, _seal: &Seal) -> PersistResult<()> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(PersistError::Unavailable("commit failure injected".to_string()));
        }
        let mut state = self
            .state
            .lock()
            .map_err(|_| PersistError::Unavailable("memory state lock poisoned".to_string()))?;
        *state = Some(snapshot.clone());
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Serialize)]
struct StateFileOut<'a> {
    format_version: u32,
    saved_at: String,
    seal: Seal,
    checksum: String,
    entries: Vec<&'a RegistryEntry>,
}

#[derive(Deserialize)]
struct StateFileIn {
    format_version: u32,
    #[allow(dead_code)]
    saved_at: String,
    seal: Seal,
    checksum: String,
    entries: Vec<RegistryEntry>,
}

/// Single-file JSON persistence with atomic replace and a backup copy
#[derive(Debug, Clone)]
pub struct FilePersistence {
    path: PathBuf,
    #[cfg(test)]
    fail_dir_sync: bool,
}

impl FilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            #[cfg(test)]
            fail_dir_sync: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> PathBuf {
        sibling(&self.path, "bak")
    }

    fn temp_path(&self) -> PathBuf {
        sibling(&self.path, "tmp")
    }

    fn read_state(path: &Path) -> PersistResult<Option<RegistrySnapshot>> {
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(PersistError::io(path, e)),
        };

        let doc: StateFileIn = serde_json::from_slice(&bytes)
            .map_err(|e| PersistError::corrupt(path, format!("invalid JSON: {}", e)))?;

        if doc.format_version != FORMAT_VERSION {
            return Err(PersistError::corrupt(
                path,
                format!("unsupported format_version {}", doc.format_version),
            ));
        }

        let expected = entries_checksum(doc.entries.iter())?;
        if parse_checksum(&doc.checksum) != Some(expected) {
            return Err(PersistError::corrupt(path, "checksum mismatch"));
        }

        let snapshot = RegistrySnapshot::from_entries(doc.entries)
            .ok_or_else(|| PersistError::corrupt(path, "duplicate token"))?;

        if seal(&snapshot) != doc.seal {
            return Err(PersistError::corrupt(path, "seal mismatch"));
        }

        Ok(Some(snapshot))
    }
}

impl RegistryPersistence for FilePersistence {
    fn load(&self) -> PersistResult<RegistrySnapshot> {
        let primary = match Self::read_state(&self.path) {
            Ok(Some(snapshot)) => return Ok(snapshot),
            other => other,
        };

        let backup_path = self.backup_path();
        match (primary, Self::read_state(&backup_path)) {
            (Ok(_), Ok(None)) => Ok(RegistrySnapshot::empty()),
            (primary, Ok(Some(snapshot))) => {
                let reason = match primary {
                    Err(e) => e.to_string(),
                    _ => "primary state missing".to_string(),
                };
                Logger::event(Event::StateRecoveredFromBackup)
                    .field("path", backup_path.display())
                    .field("reason", &reason)
                    .warn();
                Ok(snapshot)
            }
            (Err(e), _) => Err(e),
            (Ok(_), Err(e)) => Err(e),
        }
    }

    fn commit(&self, snapshot: &RegistrySnapshot, seal: &Seal) -> PersistResult<()> {
        let entries: Vec<&RegistryEntry> = snapshot.iter().collect();
        let doc = StateFileOut {
            format_version: FORMAT_VERSION,
            saved_at: Utc::now().to_rfc3339(),
            seal: *seal,
            checksum: format_checksum(entries_checksum(entries.iter().copied())?),
            entries,
        };
        let bytes = serde_json::to_vec(&doc).map_err(|e| PersistError::Encode(e.to_string()))?;

        if let Some(parent) = parent_dir(&self.path) {
            fs::create_dir_all(parent).map_err(|e| PersistError::io(parent, e))?;
        }

        let tmp = self.temp_path();
        write_synced(&tmp, &bytes)?;

        let bak = self.backup_path();
        let had_previous = self.path.exists();
        if had_previous {
            fs::rename(&self.path, &bak).map_err(|e| PersistError::io(&bak, e))?;
        }
        if let Err(e) = fs::rename(&tmp, &self.path) {
            self.roll_back(had_previous);
            return Err(PersistError::io(&self.path, e));
        }

        // The new file is in place but not yet durable; until the directory
        // sync succeeds the previous state must be what a restart sees.
        if let Err(e) = self.sync_dir() {
            self.roll_back(had_previous);
            return Err(e);
        }
        Ok(())
    }
}

impl FilePersistence {
    fn sync_dir(&self) -> PersistResult<()> {
        let dir = parent_dir(&self.path).unwrap_or_else(|| Path::new("."));
        #[cfg(test)]
        {
            if self.fail_dir_sync {
                return Err(PersistError::io(
                    dir,
                    io::Error::new(io::ErrorKind::Other, "directory sync failed"),
                ));
            }
        }
        fsync_dir(dir)
    }

    /// Put the previous state file back after a failed commit
    fn roll_back(&self, had_previous: bool) {
        let restored = if had_previous {
            fs::rename(self.backup_path(), &self.path)
        } else {
            match fs::remove_file(&self.path) {
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                other => other,
            }
        };

        if let Err(e) = restored {
            Logger::event(Event::CommitFailed)
                .field("stage", "rollback")
                .field("path", self.path.display())
                .field("reason", e)
                .error();
        }
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> PersistResult<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|e| PersistError::io(path, e))?;
    file.write_all(bytes).map_err(|e| PersistError::io(path, e))?;
    file.sync_all().map_err(|e| PersistError::io(path, e))
}

/// fsync a directory so renames inside it are durable
fn fsync_dir(path: &Path) -> PersistResult<()> {
    let dir = File::open(path).map_err(|e| PersistError::io(path, e))?;
    dir.sync_all().map_err(|e| PersistError::io(path, e))
}

fn parent_dir(path: &Path) -> Option<&Path> {
    path.parent().filter(|p| !p.as_os_str().is_empty())
}

fn sibling(path: &Path, ext: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

fn entries_checksum<'a>(entries: impl Iterator<Item = &'a RegistryEntry>) -> PersistResult<u32> {
    let mut hasher = Hasher::new();
    for entry in entries {
        let line = serde_json::to_vec(entry).map_err(|e| PersistError::Encode(e.to_string()))?;
        hasher.update(&line);
        hasher.update(b"\n");
    }
    Ok(hasher.finalize())
}

/// Format: `crc32:xxxxxxxx` (lowercase hex, zero-padded)
fn format_checksum(checksum: u32) -> String {
    format!("crc32:{:08x}", checksum)
}

fn parse_checksum(formatted: &str) -> Option<u32> {
    let stripped = formatted.strip_prefix("crc32:")?;
    if stripped.len() != 8 || !stripped.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(stripped, 16).ok()
}
