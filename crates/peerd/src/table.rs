//! Concurrent route table with change tracking and JSON persistence
//!
//! The table is the only shared mutable state in the daemon. Every
//! accessor locks internally; callers never iterate the interior and
//! only ever exchange snapshot copies.

use parking_lot::Mutex;
use std::fs;
use std::io;
use std::path::PathBuf;
use syncmesh_core::RouteItem;
use thiserror::Error;

/// Route table errors
#[derive(Debug, Error)]
pub enum TableError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The process-local view of known peers, keyed by peer id.
pub struct RouteTable {
    path: PathBuf,
    inner: Mutex<Inner>,
}

struct Inner {
    entries: Vec<RouteItem>,
    /// Structural change since the last successful persist
    dirty: bool,
}

impl RouteTable {
    /// Load the last persisted snapshot from `path`, or start empty if
    /// no snapshot exists yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, TableError> {
        let path = path.into();
        let entries = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(source) => return Err(TableError::Io { path, source }),
        };

        Ok(Self {
            path,
            inner: Mutex::new(Inner {
                entries,
                dirty: false,
            }),
        })
    }

    /// Insert a peer, or overwrite the existing entry with the same id
    /// in place (FlashTime included). Only a genuinely new peer marks
    /// the table dirty; refreshing a known peer does not force a
    /// persistence cycle.
    pub fn update(&self, item: RouteItem) {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner
            .entries
            .iter_mut()
            .find(|e| e.peer_id == item.peer_id)
        {
            *existing = item;
            return;
        }
        inner.dirty = true;
        inner.entries.push(item);
    }

    /// Remove the entry with the given peer id, if present. Unknown ids
    /// are a silent no-op.
    pub fn delete(&self, peer_id: &str) {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|e| e.peer_id != peer_id);
        if inner.entries.len() != before {
            inner.dirty = true;
        }
    }

    /// Independent copy of the current entries.
    pub fn snapshot(&self) -> Vec<RouteItem> {
        self.inner.lock().entries.clone()
    }

    /// Whether the table changed since it was last persisted.
    pub fn is_dirty(&self) -> bool {
        self.inner.lock().dirty
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rewrite the table file wholesale from the current entries.
    ///
    /// The dirty flag clears only on success, so a failed write is
    /// retried by the next maintenance tick. The lock is held across
    /// the write: an update landing mid-persist cannot be lost.
    pub fn persist(&self) -> Result<(), TableError> {
        let mut inner = self.inner.lock();

        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir).map_err(|source| TableError::Io {
                    path: dir.to_path_buf(),
                    source,
                })?;
            }
        }

        let bytes = serde_json::to_vec_pretty(&inner.entries)?;
        fs::write(&self.path, bytes).map_err(|source| TableError::Io {
            path: self.path.clone(),
            source,
        })?;

        inner.dirty = false;
        Ok(())
    }
}
