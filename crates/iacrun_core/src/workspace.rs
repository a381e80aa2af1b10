//! Ephemeral request workspaces.
//!
//! A [`Workspace`] owns one freshly created temporary directory. It is
//! removed exactly once: explicitly through [`Workspace::destroy`], or by the
//! guard's `Drop` on any other exit path (errors, panics, a dropped future).

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::fileset::FileSet;

/// Default directory name prefix.
pub const DEFAULT_PREFIX: &str = "tf-";

/// An exclusively-owned temporary directory for one request.
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl Workspace {
    /// Create a fresh, empty, uniquely named directory.
    ///
    /// With `root = None` the system temporary directory is used.
    pub fn create(root: Option<&Path>, prefix: &str) -> std::io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix);
        let dir = match root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        let path = dir.path().to_path_buf();
        debug!("Created workspace {:?}", path);
        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write every file of `files` below the workspace root.
    pub async fn materialize(&self, files: &FileSet) -> OrchestratorResult<()> {
        for (rel, content) in files.iter() {
            let target = self.resolve(rel)?;
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|source| OrchestratorError::FileWrite {
                        path: parent.to_path_buf(),
                        source,
                    })?;
            }
            tokio::fs::write(&target, content)
                .await
                .map_err(|source| OrchestratorError::FileWrite {
                    path: target.clone(),
                    source,
                })?;
        }
        debug!(
            "Materialized {} files ({} bytes) into {:?}",
            files.len(),
            files.total_bytes(),
            self.path
        );
        Ok(())
    }

    /// Join `rel` onto the root, refusing anything that would leave it.
    fn resolve(&self, rel: &str) -> OrchestratorResult<PathBuf> {
        let rel_path = Path::new(rel);
        let escapes = rel_path.is_absolute()
            || rel_path.components().any(|c| {
                !matches!(
                    c,
                    std::path::Component::Normal(_) | std::path::Component::CurDir
                )
            });
        let target = self.path.join(rel_path);
        if escapes || !target.starts_with(&self.path) {
            return Err(OrchestratorError::PathEscape(rel.to_string()));
        }
        Ok(target)
    }

    /// Remove the directory now. Failures are logged, never returned.
    pub fn destroy(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(dir) = self.dir.take() {
            match dir.close() {
                Ok(()) => debug!("Removed workspace {:?}", self.path),
                Err(e) => warn!("Failed to remove workspace {:?}: {}", self.path, e),
            }
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_is_empty_and_unique() {
        let root = tempfile::tempdir().unwrap();
        let a = Workspace::create(Some(root.path()), DEFAULT_PREFIX).unwrap();
        let b = Workspace::create(Some(root.path()), DEFAULT_PREFIX).unwrap();

        assert_ne!(a.path(), b.path());
        assert!(a.path().starts_with(root.path()));
        assert!(a
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(DEFAULT_PREFIX));
        assert_eq!(std::fs::read_dir(a.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_materialize_writes_nested_files() {
        let ws = Workspace::create(None, DEFAULT_PREFIX).unwrap();
        let files = FileSet::new([
            ("main.tf", "terraform {}\n"),
            ("modules/net/main.tf", "variable \"cidr\" {}\n"),
        ])
        .unwrap();

        ws.materialize(&files).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(ws.path().join("main.tf")).unwrap(),
            "terraform {}\n"
        );
        assert!(ws.path().join("modules/net/main.tf").is_file());
    }

    #[test]
    fn test_resolve_rejects_escape() {
        let ws = Workspace::create(None, DEFAULT_PREFIX).unwrap();
        assert!(matches!(
            ws.resolve("../outside.tf"),
            Err(OrchestratorError::PathEscape(_))
        ));
        assert!(matches!(
            ws.resolve("/etc/passwd"),
            Err(OrchestratorError::PathEscape(_))
        ));
        assert!(ws.resolve("./nested/ok.tf").is_ok());
    }

    #[tokio::test]
    async fn test_drop_removes_directory() {
        let path = {
            let ws = Workspace::create(None, DEFAULT_PREFIX).unwrap();
            let files = FileSet::new([("main.tf", "")]).unwrap();
            ws.materialize(&files).await.unwrap();
            ws.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_destroy_removes_directory() {
        let ws = Workspace::create(None, DEFAULT_PREFIX).unwrap();
        let path = ws.path().to_path_buf();
        ws.destroy();
        assert!(!path.exists());
    }
}
