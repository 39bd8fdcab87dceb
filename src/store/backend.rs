//! Storage backends for JSON documents

use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Where one JSON document lives
pub trait Backend: Send + Sync {
    /// Read the whole document. A missing document reads as `"[]"`.
    fn read(&self) -> Result<String>;

    /// Replace the whole document
    fn write(&self, contents: &str) -> Result<()>;

    /// Human-readable location for logs
    fn describe(&self) -> String;
}

/// Backend on a single file, created as `[]` on first read
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn ensure_exists(&self) -> Result<()> {
        if self.path.exists() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, "[]")?;
        info!("Created empty store {}", self.path.display());
        Ok(())
    }
}

impl Backend for FileBackend {
    fn read(&self) -> Result<String> {
        self.ensure_exists()?;
        std::fs::read_to_string(&self.path)
            .map_err(|e| Error::Io(format!("Failed to read {}: {}", self.path.display(), e)))
    }

    fn write(&self, contents: &str) -> Result<()> {
        self.ensure_exists()?;
        std::fs::write(&self.path, contents)
            .map_err(|e| Error::Io(format!("Failed to write {}: {}", self.path.display(), e)))?;
        debug!("Wrote {} bytes to {}", contents.len(), self.path.display());
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory backend, used by tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryBackend {
    contents: Mutex<Option<String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for MemoryBackend {
    fn read(&self) -> Result<String> {
        let guard = self
            .contents
            .lock()
            .map_err(|_| Error::Internal("memory store poisoned".to_string()))?;
        Ok(guard.clone().unwrap_or_else(|| "[]".to_string()))
    }

    fn write(&self, contents: &str) -> Result<()> {
        let mut guard = self
            .contents
            .lock()
            .map_err(|_| Error::Internal("memory store poisoned".to_string()))?;
        *guard = Some(contents.to_string());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_backend_creates_on_first_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data").join("proofs.json");
        let backend = FileBackend::new(&path);

        assert!(!path.exists());
        assert_eq!(backend.read().unwrap(), "[]");
        assert!(path.exists());
    }

    #[test]
    fn test_file_backend_replaces_whole_file() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("registered.json"));
        backend.write("[1, 2, 3]").unwrap();
        backend.write("[4]").unwrap();
        assert_eq!(backend.read().unwrap(), "[4]");
    }

    #[test]
    fn test_memory_backend() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.read().unwrap(), "[]");
        backend.write("[true]").unwrap();
        assert_eq!(backend.read().unwrap(), "[true]");
    }
}
