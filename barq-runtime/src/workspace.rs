//! Per-function code workspaces
//!
//! Each function's code lives under a directory that gets bind-mounted
//! into its containers. `WorkspaceStore` owns a base temp directory (one
//! per process, like the teacher's `LambdaService::code_dir`) and creates
//! one subdirectory per function on registration.

use std::path::{Path, PathBuf};

use barq_core::BarqError;
use sha2::{Digest, Sha256};
use tempfile::TempDir;

pub struct WorkspaceStore {
    base: TempDir,
}

impl WorkspaceStore {
    pub fn new() -> Result<Self, BarqError> {
        let base = TempDir::new().map_err(BarqError::Io)?;
        Ok(Self { base })
    }

    /// Directory a given function's code lives in, whether or not it
    /// exists yet.
    pub fn dir_for(&self, func_id: &str) -> PathBuf {
        self.base.path().join(func_id)
    }

    /// Materialize `source` as the function's entrypoint file and return
    /// its directory and content hash.
    pub async fn write_code(
        &self,
        func_id: &str,
        filename: &str,
        source: &[u8],
    ) -> Result<(PathBuf, String), BarqError> {
        let dir = self.dir_for(func_id);
        tokio::fs::create_dir_all(&dir).await.map_err(BarqError::Io)?;
        tokio::fs::write(dir.join(filename), source)
            .await
            .map_err(BarqError::Io)?;
        Ok((dir, hash_source(source)))
    }

    pub async fn remove(&self, func_id: &str) {
        let _ = tokio::fs::remove_dir_all(self.dir_for(func_id)).await;
    }
}

pub fn hash_source(source: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source);
    format!("{:x}", hasher.finalize())
}

/// True once a directory holds the entrypoint file `run_cold`/`run_warm`
/// mount expects to find.
pub async fn code_exists(dir: &Path, filename: &str) -> bool {
    tokio::fs::metadata(dir.join(filename)).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_code_creates_dir_and_returns_stable_hash() {
        let store = WorkspaceStore::new().unwrap();
        let (dir, hash1) = store.write_code("f1", "handler.py", b"def handler(e, c): return e").await.unwrap();
        assert!(dir.ends_with("f1"));
        let (_, hash2) = store.write_code("f1", "handler.py", b"def handler(e, c): return e").await.unwrap();
        assert_eq!(hash1, hash2);
    }

    #[tokio::test]
    async fn different_code_hashes_differently() {
        let store = WorkspaceStore::new().unwrap();
        let (_, hash1) = store.write_code("f1", "handler.py", b"a").await.unwrap();
        let (_, hash2) = store.write_code("f1", "handler.py", b"b").await.unwrap();
        assert_ne!(hash1, hash2);
    }

    #[tokio::test]
    async fn remove_deletes_the_directory() {
        let store = WorkspaceStore::new().unwrap();
        store.write_code("f1", "handler.py", b"a").await.unwrap();
        store.remove("f1").await;
        assert!(!code_exists(&store.dir_for("f1"), "handler.py").await);
    }
}
