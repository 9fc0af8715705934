//! VFS session: the host-facing operation surface
//!
//! Routes each call to the adapter for the reference's backend and keeps the
//! per-handle offset and dirty state in the handle table.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use crate::adapter::{BackendAdapter, BackendKind};
use crate::handle::{HandleTable, SessionHandle};
use crate::{DirectoryEntry, Metadata, OpenFlags, Reference, Result, Whence};

/// Largest buffer a single read allocates
pub const MAX_READ_CHUNK: usize = 1024 * 1024;

pub struct VfsSession {
    handles: HandleTable,
    archive: Arc<dyn BackendAdapter>,
    share: Arc<dyn BackendAdapter>,
}

impl VfsSession {
    pub fn new(archive: Arc<dyn BackendAdapter>, share: Arc<dyn BackendAdapter>) -> Self {
        Self {
            handles: HandleTable::new(),
            archive,
            share,
        }
    }

    fn adapter(&self, kind: BackendKind) -> &dyn BackendAdapter {
        match kind {
            BackendKind::Archive => self.archive.as_ref(),
            BackendKind::Share => self.share.as_ref(),
        }
    }

    pub fn open(&self, reference: &Reference, path: &str, flags: OpenFlags, mode: u32) -> Result<SessionHandle> {
        let kind = reference.kind();
        let native = self.adapter(kind).open(reference, path, flags, mode)?;
        let handle = self.handles.allocate(kind, native);
        tracing::debug!("Opened {} in {} as {}", path, reference, handle);
        Ok(handle)
    }

    /// Read up to `max_bytes`, at most `MAX_READ_CHUNK` per call
    ///
    /// An empty result means end of file; a short one does not.
    pub fn read(&self, handle: SessionHandle, max_bytes: usize) -> Result<Vec<u8>> {
        let state = self.handles.resolve(handle, "read")?;
        let mut state = state.lock();

        let mut buf = vec![0u8; max_bytes.min(MAX_READ_CHUNK)];
        let n = state.native.read(&mut buf)?;
        buf.truncate(n);
        state.offset += n as u64;
        Ok(buf)
    }

    pub fn write(&self, handle: SessionHandle, data: &[u8]) -> Result<usize> {
        let state = self.handles.resolve(handle, "write")?;
        if data.is_empty() {
            return Ok(0);
        }

        let mut state = state.lock();
        let n = state.native.write(data)?;
        state.offset += n as u64;
        if n > 0 {
            state.dirty = true;
        }
        Ok(n)
    }

    /// Returns the new absolute offset
    pub fn seek(&self, handle: SessionHandle, offset: i64, whence: Whence) -> Result<u64> {
        let state = self.handles.resolve(handle, "seek")?;
        let mut state = state.lock();

        let position = state.native.seek(offset, whence)?;
        state.offset = position;
        Ok(position)
    }

    pub fn stat(&self, handle: SessionHandle) -> Result<Metadata> {
        let state = self.handles.resolve(handle, "stat")?;
        let mut state = state.lock();
        state.native.stat()
    }

    /// Position the session believes the handle is at
    pub fn tell(&self, handle: SessionHandle) -> Result<u64> {
        let state = self.handles.resolve(handle, "tell")?;
        let offset = state.lock().offset;
        Ok(offset)
    }

    /// Close the native file and forget the handle
    ///
    /// On failure the handle stays valid so the close can be retried.
    pub fn close(&self, handle: SessionHandle) -> Result<()> {
        let state = self.handles.resolve(handle, "close")?;
        {
            let mut state = state.lock();
            let dirty = state.dirty;
            state.native.close(dirty)?;
        }

        self.handles.release(handle);
        tracing::debug!("Closed {}", handle);
        Ok(())
    }

    pub fn open_handles(&self) -> usize {
        self.handles.count()
    }

    pub fn list(&self, reference: &Reference) -> Result<Vec<DirectoryEntry>> {
        self.adapter(reference.kind()).list(reference)
    }

    pub fn remove(&self, reference: &Reference, path: &str) -> Result<()> {
        self.adapter(reference.kind()).remove(reference, path)
    }

    pub fn rmdir(&self, reference: &Reference, path: &str) -> Result<()> {
        self.adapter(reference.kind()).rmdir(reference, path)
    }

    pub fn mkdir(&self, reference: &Reference, path: &str) -> Result<()> {
        self.adapter(reference.kind()).mkdir(reference, path)
    }

    pub fn copy_in(&self, reference: &Reference, path: &str, source: &Path) -> Result<()> {
        self.adapter(reference.kind()).copy_in(reference, path, source)
    }

    pub fn copy_out(&self, reference: &Reference, path: &str, destination: &mut dyn Write) -> Result<u64> {
        self.adapter(reference.kind()).copy_out(reference, path, destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::testing::{MemoryTool, ToolStep};
    use crate::archive::ArchiveAdapter;
    use crate::share::{MountedShareClient, ShareAdapter};
    use crate::{Identity, ListingRevision, StagingCoordinator, PLACEHOLDER_NAME};
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        session: VfsSession,
        tool: Arc<MemoryTool>,
        archive: Reference,
        share: Reference,
        mount: TempDir,
        staging: TempDir,
    }

    fn fixture() -> Fixture {
        let mount = TempDir::new().unwrap();
        let staging = TempDir::new().unwrap();
        fs::create_dir_all(mount.path().join("nas/media")).unwrap();

        let identity = Identity::new(1000, 100);
        let tool = Arc::new(MemoryTool::new(ListingRevision::Current));
        let archive_adapter = ArchiveAdapter::new(tool.clone(), StagingCoordinator::new(staging.path()), identity);
        let share_adapter = ShareAdapter::new(Arc::new(MountedShareClient::new(mount.path())), identity);

        let archive = Reference::Archive(mount.path().join("pack.7z"));
        Fixture {
            session: VfsSession::new(Arc::new(archive_adapter), Arc::new(share_adapter)),
            tool,
            archive,
            share: Reference::parse("smb://nas/media").unwrap(),
            mount,
            staging,
        }
    }

    #[test]
    fn test_seek_then_read() {
        let f = fixture();
        fs::write(f.mount.path().join("nas/media/digits.txt"), b"0123456789").unwrap();

        let h = f.session.open(&f.share, "digits.txt", OpenFlags::read_only(), 0).unwrap();
        assert_eq!(f.session.seek(h, 6, Whence::Start).unwrap(), 6);
        assert_eq!(f.session.read(h, 100).unwrap(), b"6789");
        assert_eq!(f.session.tell(h).unwrap(), 10);
        assert!(f.session.read(h, 100).unwrap().is_empty());
        f.session.close(h).unwrap();
    }

    #[test]
    fn test_huge_read_request_is_capped() {
        let f = fixture();
        let data = vec![7u8; MAX_READ_CHUNK + 10];
        fs::write(f.mount.path().join("nas/media/big.bin"), &data).unwrap();

        let h = f.session.open(&f.share, "big.bin", OpenFlags::read_only(), 0).unwrap();
        assert_eq!(f.session.read(h, usize::MAX).unwrap().len(), MAX_READ_CHUNK);
        assert_eq!(f.session.read(h, usize::MAX).unwrap().len(), 10);
        assert_eq!(f.session.tell(h).unwrap(), data.len() as u64);
        f.session.close(h).unwrap();
    }

    #[test]
    fn test_write_advances_offset() {
        let f = fixture();
        let h = f
            .session
            .open(&f.share, "out.txt", OpenFlags::create_truncate(), 0o644)
            .unwrap();

        assert_eq!(f.session.write(h, b"hello").unwrap(), 5);
        assert_eq!(f.session.write(h, b"").unwrap(), 0);
        assert_eq!(f.session.tell(h).unwrap(), 5);
        f.session.close(h).unwrap();

        assert_eq!(fs::read(f.mount.path().join("nas/media/out.txt")).unwrap(), b"hello");
    }

    #[test]
    fn test_failed_ops_keep_offset() {
        let f = fixture();
        fs::write(f.mount.path().join("nas/media/ro.txt"), b"abc").unwrap();

        let h = f.session.open(&f.share, "ro.txt", OpenFlags::read_only(), 0).unwrap();
        f.session.read(h, 2).unwrap();

        assert!(f.session.write(h, b"zz").is_err());
        assert!(f.session.seek(h, -10, Whence::Start).is_err());
        assert_eq!(f.session.tell(h).unwrap(), 2);
    }

    #[test]
    fn test_closed_handle_is_unresolvable() {
        let f = fixture();
        fs::write(f.mount.path().join("nas/media/a"), b"a").unwrap();

        let h = f.session.open(&f.share, "a", OpenFlags::read_only(), 0).unwrap();
        f.session.close(h).unwrap();

        let err = f.session.close(h).unwrap_err();
        assert!(err.is_resolution());
        assert!(f.session.read(h, 1).unwrap_err().is_resolution());
        assert_eq!(f.session.open_handles(), 0);
    }

    #[test]
    fn test_archive_copy_round_trip() {
        let f = fixture();
        let source = f.mount.path().join("local.txt");
        fs::write(&source, b"archived bytes").unwrap();

        f.session.copy_in(&f.archive, "dir/file.txt", &source).unwrap();

        let mut out: Vec<u8> = Vec::new();
        f.session.copy_out(&f.archive, "dir/file.txt", &mut out).unwrap();
        assert_eq!(out, b"archived bytes");
    }

    #[test]
    fn test_archive_mkdir_lists_directory_only() {
        let f = fixture();
        f.session.mkdir(&f.archive, "empty").unwrap();

        let entries = f.session.list(&f.archive).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_dir());
        assert_eq!(entries[0].name, "empty");
        assert!(entries.iter().all(|e| !e.name.ends_with(PLACEHOLDER_NAME)));
    }

    #[test]
    fn test_archive_handle_write_back() {
        let f = fixture();
        let h = f
            .session
            .open(&f.archive, "notes.txt", OpenFlags::create_truncate(), 0o644)
            .unwrap();
        f.session.write(h, b"note").unwrap();

        f.tool.fail_on(ToolStep::Add);
        assert!(f.session.close(h).is_err());
        assert_eq!(f.session.open_handles(), 1);

        f.tool.clear_failure();
        f.session.close(h).unwrap();
        assert_eq!(f.session.open_handles(), 0);
        assert_eq!(f.tool.member(f.archive.as_archive().unwrap(), "notes.txt").unwrap(), b"note");
        assert!(fs::read_dir(f.staging.path()).unwrap().next().is_none());
    }

    #[test]
    fn test_clean_archive_handle_skips_write_back() {
        let f = fixture();
        f.tool
            .insert_file(f.archive.as_archive().unwrap(), "r.txt", b"read me");

        let h = f.session.open(&f.archive, "r.txt", OpenFlags::read_only(), 0).unwrap();
        assert_eq!(f.session.read(h, 4).unwrap(), b"read");
        f.session.close(h).unwrap();
        assert_eq!(f.tool.calls(ToolStep::Add), 0);
    }

    #[test]
    fn test_share_namespace_ops() {
        let f = fixture();
        f.session.mkdir(&f.share, "new").unwrap();
        assert!(f.session.list(&f.share).unwrap()[0].is_dir());
        f.session.rmdir(&f.share, "new").unwrap();
        assert!(f.session.list(&f.share).unwrap().is_empty());
        assert!(f.session.remove(&f.share, "new").is_err());
    }
}
