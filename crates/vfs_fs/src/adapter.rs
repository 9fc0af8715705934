//! Backend adapter contract
//!
//! One adapter per backend kind translates canonical operations into
//! backend-specific calls. Errors never escape as anything but `VfsError`.

use std::fmt;
use std::io::Write;
use std::path::Path;

use crate::{DirectoryEntry, Metadata, OpenFlags, Reference, Result, Whence};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Archive,
    Share,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Archive => "archive",
            BackendKind::Share => "share",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend-native state behind one open session handle
///
/// Offsets are tracked by the handle table, not here.
pub trait NativeFile: Send {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Returns the new absolute position
    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64>;

    fn stat(&mut self) -> Result<Metadata>;

    /// Release the native resource
    ///
    /// `dirty` tells whether anything was written since open. On error the
    /// native state must stay usable so the caller can retry.
    fn close(&mut self, dirty: bool) -> Result<()>;
}

/// Canonical operations over a reference plus member path
pub trait BackendAdapter: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn open(
        &self,
        reference: &Reference,
        path: &str,
        flags: OpenFlags,
        mode: u32,
    ) -> Result<Box<dyn NativeFile>>;

    fn list(&self, reference: &Reference) -> Result<Vec<DirectoryEntry>>;

    fn remove(&self, reference: &Reference, path: &str) -> Result<()>;

    /// Remove a directory member
    fn rmdir(&self, reference: &Reference, path: &str) -> Result<()>;

    fn mkdir(&self, reference: &Reference, path: &str) -> Result<()>;

    /// Insert the local file `source` at `path`
    fn copy_in(&self, reference: &Reference, path: &str, source: &Path) -> Result<()>;

    /// Stream the member at `path` into `destination`; returns bytes written
    fn copy_out(&self, reference: &Reference, path: &str, destination: &mut dyn Write) -> Result<u64>;
}
