//! Staging coordinator
//!
//! Backends that cannot mutate in place get their content materialized in a
//! private temp directory, changed there, and packed back. A `StagingArea`
//! is removed on every exit path: explicitly via `release`, or on drop.

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::archive::ArchiveTool;
use crate::{Result, StagingStep, VfsError};

/// Hidden file that keeps an otherwise empty directory in an archive
pub const PLACEHOLDER_NAME: &str = ".extvfs_placeholder";

const AREA_PREFIX: &str = "extvfs-";

/// One private staging directory
#[derive(Debug)]
pub struct StagingArea {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl StagingArea {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the directory, reporting a failed cleanup
    pub fn release(mut self) -> std::io::Result<()> {
        match self.dir.take() {
            Some(dir) => dir.close(),
            None => Ok(()),
        }
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            if let Err(e) = dir.close() {
                tracing::warn!("Failed to remove staging area {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Creates staging areas under one root and runs staged archive mutations
#[derive(Debug, Clone)]
pub struct StagingCoordinator {
    root: PathBuf,
}

impl StagingCoordinator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a uniquely named directory readable only by the owner
    pub fn acquire(&self) -> Result<StagingArea> {
        let dir = tempfile::Builder::new()
            .prefix(AREA_PREFIX)
            .tempdir_in(&self.root)
            .map_err(|e| VfsError::from(e).during(StagingStep::CreateArea))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o700))
                .map_err(|e| VfsError::from(e).during(StagingStep::CreateArea))?;
        }

        let path = dir.path().to_path_buf();
        tracing::debug!("Acquired staging area {}", path.display());

        Ok(StagingArea {
            dir: Some(dir),
            path,
        })
    }

    /// Run `body` inside a fresh staging area and remove the area afterwards
    ///
    /// The body's result wins; a failed cleanup is only logged.
    pub fn with_area<T>(&self, body: impl FnOnce(&StagingArea) -> Result<T>) -> Result<T> {
        let area = self.acquire()?;
        let path = area.path().to_path_buf();
        let result = body(&area);

        if let Err(e) = area.release() {
            tracing::warn!("Failed to remove staging area {}: {}", path.display(), e);
        }

        result
    }

    /// Insert `source` into `archive` as `member`, keeping existing members
    pub fn copy_in(&self, tool: &dyn ArchiveTool, archive: &Path, member: &str, source: &Path) -> Result<()> {
        self.with_area(|area| {
            let target = area.path().join(member);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| VfsError::from(e).during(StagingStep::CreateDirectory))?;
            }

            fs::copy(source, &target).map_err(|e| VfsError::from(e).during(StagingStep::CopySource))?;

            tool.add(archive, area.path(), member)
                .map_err(|e| e.during(StagingStep::AddMember))?;

            tracing::info!("Copied {} into {} as {}", source.display(), archive.display(), member);
            Ok(())
        })
    }

    /// Create `member` as a directory entry in `archive`
    ///
    /// Archives cannot hold an empty directory, so the directory goes in with
    /// a placeholder file which is deleted again right after.
    pub fn mkdir(&self, tool: &dyn ArchiveTool, archive: &Path, member: &str) -> Result<()> {
        self.with_area(|area| {
            let dir = area.path().join(member);
            fs::create_dir_all(&dir).map_err(|e| VfsError::from(e).during(StagingStep::CreateDirectory))?;

            fs::File::create(dir.join(PLACEHOLDER_NAME))
                .map_err(|e| VfsError::from(e).during(StagingStep::CreatePlaceholder))?;

            tool.add_recursive(archive, area.path(), member)
                .map_err(|e| e.during(StagingStep::AddMember))?;

            let placeholder = format!("{}/{}", member, PLACEHOLDER_NAME);
            tool.delete(archive, &placeholder)
                .map_err(|e| e.during(StagingStep::RemovePlaceholder))?;

            tracing::info!("Created directory {} in {}", member, archive.display());
            Ok(())
        })
    }
}
