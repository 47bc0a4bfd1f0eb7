//! Durable backing for the derived-result cache: one namespaced document that
//! holds the whole `ownerKey -> entry` map.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::core::lock;

/// A single-key durable slot.
pub trait CacheStorage: Send + Sync {
    /// Returns the stored document, or `None` if nothing was ever written.
    fn read(&self) -> io::Result<Option<String>>;
    /// Replaces the stored document.
    fn write(&self, raw: &str) -> io::Result<()>;
}

/// Stores the document as `<dir>/<namespace>.json`.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    /// Storage for `namespace` inside `dir`. The directory is created lazily on first write.
    pub fn new(dir: impl AsRef<Path>, namespace: &str) -> Self {
        Self {
            path: dir.as_ref().join(format!("{}.json", namespace)),
        }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CacheStorage for FileStorage {
    fn read(&self) -> io::Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write(&self, raw: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Write-then-rename so a crash never leaves a half-written document.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, raw)?;
        fs::rename(&tmp, &self.path)
    }
}

/// Process-local storage for tests and for sessions without a cache directory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    slot: Mutex<Option<String>>,
}

impl MemoryStorage {
    /// Empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-seeded with a raw document.
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            slot: Mutex::new(Some(raw.into())),
        }
    }

    /// The raw document as last written.
    pub fn raw(&self) -> Option<String> {
        lock(&self.slot).clone()
    }
}

impl CacheStorage for MemoryStorage {
    fn read(&self) -> io::Result<Option<String>> {
        Ok(lock(&self.slot).clone())
    }

    fn write(&self, raw: &str) -> io::Result<()> {
        *lock(&self.slot) = Some(raw.to_owned());
        Ok(())
    }
}
