//! Archive backend
//!
//! Archives are read through the listing and extraction commands of an
//! external tool. Every mutation goes through a staging area: the member is
//! materialized on local disk, changed there and added back.

mod tool;

#[cfg(test)]
pub(crate) mod testing;

pub use tool::{ArchiveTool, ExternalTool, ToolCommands};

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::adapter::{BackendAdapter, BackendKind, NativeFile};
use crate::sanitize::sanitize_member;
use crate::staging::{StagingArea, StagingCoordinator};
use crate::{
    DirectoryEntry, EntryKind, Identity, ListingNormalizer, ListingRevision, Metadata, OpenFlags,
    Reference, Result, StagingStep, VfsError, Whence,
};

/// Which listing layout to expect from the tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevisionSetting {
    /// Probe the tool's version banner once per adapter
    #[default]
    Auto,
    Legacy,
    Current,
}

/// Adapter for archive containers
pub struct ArchiveAdapter {
    tool: Arc<dyn ArchiveTool>,
    staging: StagingCoordinator,
    setting: RevisionSetting,
    current_since_major: u32,
    detected: OnceCell<ListingRevision>,
    identity: Identity,
}

impl ArchiveAdapter {
    pub fn new(tool: Arc<dyn ArchiveTool>, staging: StagingCoordinator, identity: Identity) -> Self {
        Self {
            tool,
            staging,
            setting: RevisionSetting::Auto,
            current_since_major: 9,
            detected: OnceCell::new(),
            identity,
        }
    }

    pub fn with_revision(mut self, setting: RevisionSetting, current_since_major: u32) -> Self {
        self.setting = setting;
        self.current_since_major = current_since_major;
        self
    }

    /// Listing layout in use, probing the tool on first call
    pub fn revision(&self) -> Result<ListingRevision> {
        match self.setting {
            RevisionSetting::Legacy => Ok(ListingRevision::Legacy),
            RevisionSetting::Current => Ok(ListingRevision::Current),
            RevisionSetting::Auto => self
                .detected
                .get_or_try_init(|| {
                    let banner = self.tool.version_banner()?;
                    let revision = ListingRevision::detect(&banner, self.current_since_major);
                    tracing::info!("Archive tool listing revision: {:?}", revision);
                    Ok(revision)
                })
                .copied(),
        }
    }

    fn entries(&self, archive: &Path) -> Result<Vec<DirectoryEntry>> {
        let raw = self.tool.list(archive)?;
        let normalizer = ListingNormalizer::new(self.revision()?, self.identity);
        Ok(normalizer.parse(&raw))
    }

    /// Kind of `member` if present; a missing archive counts as empty when
    /// the caller is about to create it
    fn lookup(&self, archive: &Path, member: &str, create: bool) -> Result<Option<EntryKind>> {
        let entries = match self.entries(archive) {
            Ok(entries) => entries,
            Err(_) if create && !archive.exists() => return Ok(None),
            Err(e) => return Err(e),
        };

        Ok(entries.into_iter().find(|e| e.name == member).map(|e| e.kind))
    }
}

impl BackendAdapter for ArchiveAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Archive
    }

    fn open(
        &self,
        reference: &Reference,
        path: &str,
        flags: OpenFlags,
        mode: u32,
    ) -> Result<Box<dyn NativeFile>> {
        let archive = reference.as_archive()?.to_path_buf();
        let member = sanitize_member(path)?;

        let existing = self.lookup(&archive, &member, flags.create)?;
        match existing {
            Some(EntryKind::Directory) => return Err(VfsError::errno(libc::EISDIR)),
            Some(EntryKind::File) if flags.create && flags.exclusive => {
                return Err(VfsError::errno(libc::EEXIST))
            }
            None if !flags.create => return Err(VfsError::errno(libc::ENOENT)),
            _ => {}
        }

        let area = self.staging.acquire()?;
        let staged = area.path().join(&member);
        if let Some(parent) = staged.parent() {
            fs::create_dir_all(parent).map_err(|e| VfsError::from(e).during(StagingStep::CreateDirectory))?;
        }

        if existing.is_some() {
            let mut out = File::create(&staged).map_err(|e| VfsError::from(e).during(StagingStep::Extract))?;
            if !(flags.truncate && flags.writes()) {
                self.tool
                    .extract_to(&archive, &member, &mut out)
                    .map_err(|e| e.during(StagingStep::Extract))?;
            }
        }

        let file = flags.to_open_options(mode).open(&staged)?;
        // a fresh or truncated member must reach the archive even if never written
        let rewritten = match existing {
            Some(_) => flags.truncate && flags.writes(),
            None => true,
        };
        tracing::debug!("Opened {} in {} via {}", member, archive.display(), area.path().display());

        Ok(Box::new(ArchiveFile {
            tool: Arc::clone(&self.tool),
            archive,
            member,
            file: Some(file),
            area: Some(area),
            rewritten,
        }))
    }

    fn list(&self, reference: &Reference) -> Result<Vec<DirectoryEntry>> {
        self.entries(reference.as_archive()?)
    }

    fn remove(&self, reference: &Reference, path: &str) -> Result<()> {
        let archive = reference.as_archive()?;
        let member = sanitize_member(path)?;
        self.tool.delete(archive, &member)?;
        tracing::info!("Removed {} from {}", member, archive.display());
        Ok(())
    }

    fn rmdir(&self, reference: &Reference, path: &str) -> Result<()> {
        // the tool deletes a directory member together with its contents
        self.remove(reference, path)
    }

    fn mkdir(&self, reference: &Reference, path: &str) -> Result<()> {
        let member = sanitize_member(path)?;
        self.staging.mkdir(self.tool.as_ref(), reference.as_archive()?, &member)
    }

    fn copy_in(&self, reference: &Reference, path: &str, source: &Path) -> Result<()> {
        let member = sanitize_member(path)?;
        self.staging
            .copy_in(self.tool.as_ref(), reference.as_archive()?, &member, source)
    }

    fn copy_out(&self, reference: &Reference, path: &str, destination: &mut dyn Write) -> Result<u64> {
        let member = sanitize_member(path)?;
        self.tool.extract_to(reference.as_archive()?, &member, destination)
    }
}

/// An archive member opened through a staged local copy
struct ArchiveFile {
    tool: Arc<dyn ArchiveTool>,
    archive: PathBuf,
    member: String,
    file: Option<File>,
    area: Option<StagingArea>,
    rewritten: bool,
}

impl ArchiveFile {
    fn file(&mut self) -> Result<&mut File> {
        self.file.as_mut().ok_or_else(|| VfsError::errno(libc::EBADF))
    }
}

impl NativeFile for ArchiveFile {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.file()?.read(buf)?)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        Ok(self.file()?.write(data)?)
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let pos = whence.to_seek_from(offset)?;
        Ok(self.file()?.seek(pos)?)
    }

    fn stat(&mut self) -> Result<Metadata> {
        let meta = self.file()?.metadata()?;
        Ok(Metadata {
            mode: 0o644,
            ..Metadata::from_std(&meta)
        })
    }

    fn close(&mut self, dirty: bool) -> Result<()> {
        if dirty || self.rewritten {
            self.file()?.flush()?;
            let area = self.area.as_ref().ok_or_else(|| VfsError::errno(libc::EBADF))?;
            self.tool
                .add(&self.archive, area.path(), &self.member)
                .map_err(|e| e.during(StagingStep::AddMember))?;
            tracing::info!("Wrote {} back into {}", self.member, self.archive.display());
        }

        self.file = None;
        if let Some(area) = self.area.take() {
            let path = area.path().to_path_buf();
            if let Err(e) = area.release() {
                tracing::warn!("Failed to remove staging area {}: {}", path.display(), e);
            }
        }
        Ok(())
    }
}
