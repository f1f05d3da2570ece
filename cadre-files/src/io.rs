//! File I/O backend boundary.
//!
//! The coordinator calls these only after a lock is held; it never bypasses
//! them. The in-memory implementation backs tests and non-disk deployments.

use async_trait::async_trait;
use cadre_core::{CadreError, CadreResult, CoordinationError, FileError};
use std::collections::HashMap;
use std::sync::RwLock;

/// Backend performing the actual file operations.
#[async_trait]
pub trait FileIo: Send + Sync {
    async fn read_file(&self, path: &str) -> CadreResult<String>;
    async fn write_file(&self, path: &str, content: &str) -> CadreResult<()>;
    async fn delete_file(&self, path: &str) -> CadreResult<()>;
    async fn move_file(&self, from: &str, to: &str) -> CadreResult<()>;
    async fn list_directory(&self, path: &str) -> CadreResult<Vec<String>>;
    /// Whether a file currently exists.
    async fn exists(&self, path: &str) -> CadreResult<bool>;
}

/// In-memory file backend.
#[derive(Debug, Default)]
pub struct InMemoryFileIo {
    files: RwLock<HashMap<String, String>>,
}

impl InMemoryFileIo {
    /// Create an empty in-memory workspace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the workspace with initial files.
    pub fn with_files(files: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            files: RwLock::new(files.into_iter().collect()),
        }
    }

    fn guard(&self) -> CadreResult<std::sync::RwLockWriteGuard<'_, HashMap<String, String>>> {
        self.files
            .write()
            .map_err(|_| CadreError::from(CoordinationError::LockPoisoned))
    }
}

#[async_trait]
impl FileIo for InMemoryFileIo {
    async fn read_file(&self, path: &str) -> CadreResult<String> {
        self.guard()?
            .get(path)
            .cloned()
            .ok_or_else(|| {
                FileError::Backend {
                    path: path.to_string(),
                    reason: "file not found".to_string(),
                }
                .into()
            })
    }

    async fn write_file(&self, path: &str, content: &str) -> CadreResult<()> {
        self.guard()?.insert(path.to_string(), content.to_string());
        Ok(())
    }

    async fn delete_file(&self, path: &str) -> CadreResult<()> {
        self.guard()?.remove(path).map(|_| ()).ok_or_else(|| {
            FileError::Backend {
                path: path.to_string(),
                reason: "file not found".to_string(),
            }
            .into()
        })
    }

    async fn move_file(&self, from: &str, to: &str) -> CadreResult<()> {
        let mut files = self.guard()?;
        match files.remove(from) {
            Some(content) => {
                files.insert(to.to_string(), content);
                Ok(())
            }
            None => Err(FileError::Backend {
                path: from.to_string(),
                reason: "file not found".to_string(),
            }
            .into()),
        }
    }

    async fn list_directory(&self, path: &str) -> CadreResult<Vec<String>> {
        let prefix = if path.is_empty() || path.ends_with('/') {
            path.to_string()
        } else {
            format!("{path}/")
        };
        let mut entries: Vec<String> = self
            .guard()?
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect();
        entries.sort();
        Ok(entries)
    }

    async fn exists(&self, path: &str) -> CadreResult<bool> {
        Ok(self.guard()?.contains_key(path))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_then_read() {
        let io = InMemoryFileIo::new();
        io.write_file("src/lib.rs", "pub mod api;").await.unwrap();
        assert_eq!(io.read_file("src/lib.rs").await.unwrap(), "pub mod api;");
        assert!(io.exists("src/lib.rs").await.unwrap());
    }

    #[tokio::test]
    async fn test_read_missing_is_backend_error() {
        let io = InMemoryFileIo::new();
        assert!(io.read_file("nope.rs").await.is_err());
    }

    #[tokio::test]
    async fn test_move_file() {
        let io = InMemoryFileIo::new();
        io.write_file("old.rs", "x").await.unwrap();
        io.move_file("old.rs", "new.rs").await.unwrap();
        assert!(!io.exists("old.rs").await.unwrap());
        assert_eq!(io.read_file("new.rs").await.unwrap(), "x");
    }

    #[tokio::test]
    async fn test_list_directory_filters_by_prefix() {
        let io = InMemoryFileIo::with_files([
            ("src/a.rs".to_string(), String::new()),
            ("src/b.rs".to_string(), String::new()),
            ("docs/c.md".to_string(), String::new()),
        ]);
        let listed = io.list_directory("src").await.unwrap();
        assert_eq!(listed, vec!["src/a.rs".to_string(), "src/b.rs".to_string()]);
    }
}
