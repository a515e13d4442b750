//! Backing media for the conversation store
//!
//! A backend only knows how to read, replace and remove one opaque JSON
//! document. Decoding and invariants live in [`super::ConversationStore`].

use crate::error::{OverlapError, Result};
use anyhow::Context;
use directories::ProjectDirs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Environment variable that overrides the history file location
pub const HISTORY_FILE_ENV: &str = "OVERLAP_HISTORY_FILE";

/// Storage medium holding the serialized conversation document
#[cfg_attr(test, mockall::automock)]
pub trait StateBackend: Send + Sync {
    /// Read the whole document, or `None` if nothing has been stored yet
    fn load(&self) -> Result<Option<String>>;

    /// Replace the whole document
    fn save(&self, document: &str) -> Result<()>;

    /// Remove the document entirely
    fn remove(&self) -> Result<()>;
}

/// History file on local disk
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    /// Open the default history file
    ///
    /// Honors `OVERLAP_HISTORY_FILE`, otherwise uses
    /// `<data dir>/conversations.json` for the current user.
    pub fn new() -> Result<Self> {
        if let Ok(override_path) = std::env::var(HISTORY_FILE_ENV) {
            if !override_path.is_empty() {
                return Self::new_with_path(override_path);
            }
        }

        let proj_dirs = ProjectDirs::from("org", "overlap", "overlap")
            .ok_or_else(|| OverlapError::Storage("Could not determine data directory".into()))?;

        Self::new_with_path(proj_dirs.data_dir().join("conversations.json"))
    }

    /// Use the history file at `path`, creating its parent directory.
    ///
    /// # Examples
    ///
    /// ```
    /// use overlap::storage::JsonFileBackend;
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let backend = JsonFileBackend::new_with_path(dir.path().join("h.json")).unwrap();
    /// assert!(backend.path().ends_with("h.json"));
    /// ```
    pub fn new_with_path<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create parent directory for history file")
                    .map_err(|e| OverlapError::Storage(format!("{:#}", e)))?;
            }
        }

        Ok(Self { path })
    }

    /// Location of the history file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateBackend for JsonFileBackend {
    fn load(&self) -> Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(OverlapError::Storage(format!(
                "Failed to read {}: {}",
                self.path.display(),
                e
            ))
            .into()),
        }
    }

    fn save(&self, document: &str) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        // Write beside the target and rename over it so readers never see
        // a half-written document.
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .context("Failed to create temporary history file")
            .map_err(|e| OverlapError::Storage(format!("{:#}", e)))?;
        tmp.write_all(document.as_bytes())
            .and_then(|_| tmp.flush())
            .context("Failed to write history file")
            .map_err(|e| OverlapError::Storage(format!("{:#}", e)))?;
        tmp.persist(&self.path)
            .map_err(|e| OverlapError::Storage(format!("Failed to replace history file: {}", e)))?;

        Ok(())
    }

    fn remove(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(OverlapError::Storage(format!(
                "Failed to remove {}: {}",
                self.path.display(),
                e
            ))
            .into()),
        }
    }
}

/// Process-local backend, used by mock mode and tests
#[derive(Debug, Default)]
pub struct MemoryBackend {
    document: Mutex<Option<String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing document, valid or not
    pub fn with_document(document: impl Into<String>) -> Self {
        Self {
            document: Mutex::new(Some(document.into())),
        }
    }

    /// Current raw document
    pub fn document(&self) -> Option<String> {
        self.document
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl StateBackend for MemoryBackend {
    fn load(&self) -> Result<Option<String>> {
        Ok(self.document())
    }

    fn save(&self, document: &str) -> Result<()> {
        *self
            .document
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(document.to_string());
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        *self
            .document
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
        Ok(())
    }
}
