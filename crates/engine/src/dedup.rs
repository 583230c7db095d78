//! Dedup store: bounded record of message ids already relayed.
//!
//! Persisted as `{"processed_ids": [...]}`, oldest first. When the window
//! grows past `cap`, only the most recent `retain` ids are kept.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use herald_common::error::StorageError;

/// Size limits of the dedup window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupLimits {
    cap: usize,
    retain: usize,
}

impl DedupLimits {
    /// Requires `1 <= retain <= cap`.
    pub fn new(cap: usize, retain: usize) -> Result<Self, StorageError> {
        if retain == 0 || retain > cap {
            return Err(StorageError::InvalidLimits { cap, retain });
        }
        Ok(Self { cap, retain })
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn retain(&self) -> usize {
        self.retain
    }
}

impl Default for DedupLimits {
    fn default() -> Self {
        Self { cap: 50, retain: 25 }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    processed_ids: Vec<String>,
}

/// File-backed dedup window.
pub struct DedupStore {
    path: PathBuf,
    ids: VecDeque<String>,
    limits: DedupLimits,
    dirty: bool,
    trimmed_on_load: usize,
}

impl DedupStore {
    /// Empty store that will persist to `path`.
    pub fn empty(path: impl Into<PathBuf>, limits: DedupLimits) -> Self {
        Self {
            path: path.into(),
            ids: VecDeque::with_capacity(limits.cap + 1),
            limits,
            dirty: false,
            trimmed_on_load: 0,
        }
    }

    /// Load the store from `path`. A missing file yields an empty store.
    ///
    /// An oversized file is compacted in memory right away; the result is
    /// written on the next [`DedupStore::persist`].
    pub fn load(path: impl Into<PathBuf>, limits: DedupLimits) -> Result<Self, StorageError> {
        let mut store = Self::empty(path, limits);

        let contents = match fs::read_to_string(&store.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %store.path.display(), "No state file, starting empty");
                return Ok(store);
            }
            Err(e) => return Err(e.into()),
        };

        let file: StateFile = if contents.trim().is_empty() {
            StateFile::default()
        } else {
            serde_json::from_str(&contents)?
        };

        for id in file.processed_ids {
            if !store.ids.contains(&id) {
                store.ids.push_back(id);
            }
        }

        store.trimmed_on_load = store.compact();
        tracing::info!(
            path = %store.path.display(),
            ids = store.ids.len(),
            trimmed = store.trimmed_on_load,
            "Loaded dedup state"
        );
        Ok(store)
    }

    /// Like [`DedupStore::load`], but an unreadable or corrupt file is
    /// logged and replaced by an empty store.
    pub fn load_or_empty(path: impl Into<PathBuf>, limits: DedupLimits) -> Self {
        let path = path.into();
        match Self::load(&path, limits) {
            Ok(store) => store,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Dedup state unusable, starting empty"
                );
                Self::empty(path, limits)
            }
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|known| known == id)
    }

    /// Record `id` as relayed. Recording a known id is a no-op.
    pub fn record(&mut self, id: impl Into<String>) {
        let id = id.into();
        if self.contains(&id) {
            return;
        }
        self.ids.push_back(id);
        self.dirty = true;

        let dropped = self.compact();
        if dropped > 0 {
            tracing::debug!(dropped, kept = self.ids.len(), "Compacted dedup window");
        }
    }

    /// Drop the oldest ids when the window exceeds the cap. Returns the number dropped.
    pub fn compact(&mut self) -> usize {
        if self.ids.len() <= self.limits.cap {
            return 0;
        }
        let dropped = self.ids.len() - self.limits.retain;
        self.ids.drain(..dropped);
        self.dirty = true;
        dropped
    }

    /// Atomically write the window: temp file in the same directory, then rename.
    pub fn persist(&mut self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let file = StateFile {
            processed_ids: self.ids.iter().cloned().collect(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        let tmp = tmp_path(&self.path);
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;

        self.dirty = false;
        tracing::debug!(path = %self.path.display(), ids = self.ids.len(), "Persisted dedup state");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Ids oldest first.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    /// Whether there are changes not yet persisted.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// How many ids [`DedupStore::load`] dropped from an oversized file.
    pub fn trimmed_on_load(&self) -> usize {
        self.trimmed_on_load
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn limits(&self) -> DedupLimits {
        self.limits
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
