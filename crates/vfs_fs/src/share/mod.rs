//! Share backend
//!
//! Shares support descriptor I/O directly, so no staging is involved. The
//! adapter only resolves member paths into URLs and streams bulk copies.

mod client;
mod mounted;

pub use client::{NativeResult, ShareClient, ShareDirent};
pub use mounted::MountedShareClient;

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use crate::adapter::{BackendAdapter, BackendKind, NativeFile};
use crate::{
    DirectoryEntry, Identity, ListingNormalizer, ListingRevision, Metadata, OpenFlags, Reference,
    Result, ShareUrl, Whence,
};

const COPY_BLOCK: usize = 64 * 1024;
const NEW_DIRECTORY_MODE: u32 = 0o755;
const NEW_FILE_MODE: u32 = 0o644;

pub struct ShareAdapter {
    client: Arc<dyn ShareClient>,
    identity: Identity,
}

impl ShareAdapter {
    pub fn new(client: Arc<dyn ShareClient>, identity: Identity) -> Self {
        Self { client, identity }
    }

    fn url(&self, reference: &Reference, path: &str) -> Result<ShareUrl> {
        reference.as_share()?.join(path)
    }

    /// Close `fd` after a failed transfer without masking the first error
    fn abandon(&self, fd: i32) {
        if let Err(e) = self.client.close(fd) {
            tracing::warn!("Failed to close fd {} after error: {}", fd, e);
        }
    }
}

impl BackendAdapter for ShareAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Share
    }

    fn open(
        &self,
        reference: &Reference,
        path: &str,
        flags: OpenFlags,
        mode: u32,
    ) -> Result<Box<dyn NativeFile>> {
        let url = self.url(reference, path)?;
        let fd = self.client.open(&url, flags, mode)?;
        Ok(Box::new(ShareFile {
            client: Arc::clone(&self.client),
            fd,
        }))
    }

    fn list(&self, reference: &Reference) -> Result<Vec<DirectoryEntry>> {
        let dirents = self.client.readdir(reference.as_share()?)?;
        let normalizer = ListingNormalizer::new(ListingRevision::Current, self.identity);
        Ok(normalizer.normalize_share(dirents))
    }

    fn remove(&self, reference: &Reference, path: &str) -> Result<()> {
        Ok(self.client.unlink(&self.url(reference, path)?)?)
    }

    fn rmdir(&self, reference: &Reference, path: &str) -> Result<()> {
        Ok(self.client.rmdir(&self.url(reference, path)?)?)
    }

    fn mkdir(&self, reference: &Reference, path: &str) -> Result<()> {
        Ok(self.client.mkdir(&self.url(reference, path)?, NEW_DIRECTORY_MODE)?)
    }

    fn copy_in(&self, reference: &Reference, path: &str, source: &Path) -> Result<()> {
        let url = self.url(reference, path)?;
        let mut local = File::open(source)?;
        let fd = self.client.open(&url, OpenFlags::create_truncate(), NEW_FILE_MODE)?;

        let mut buf = vec![0u8; COPY_BLOCK];
        let mut total = 0u64;
        loop {
            let n = match local.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    self.abandon(fd);
                    return Err(e.into());
                }
            };

            let mut chunk = &buf[..n];
            while !chunk.is_empty() {
                match self.client.write(fd, chunk) {
                    Ok(0) => {
                        self.abandon(fd);
                        return Err(std::io::Error::from(std::io::ErrorKind::WriteZero).into());
                    }
                    Ok(written) => chunk = &chunk[written..],
                    Err(e) => {
                        self.abandon(fd);
                        return Err(e.into());
                    }
                }
            }
            total += n as u64;
        }

        self.client.close(fd)?;
        tracing::info!("Copied {} bytes from {} to {}", total, source.display(), url);
        Ok(())
    }

    fn copy_out(&self, reference: &Reference, path: &str, destination: &mut dyn Write) -> Result<u64> {
        let url = self.url(reference, path)?;
        let fd = self.client.open(&url, OpenFlags::read_only(), 0)?;

        let mut buf = vec![0u8; COPY_BLOCK];
        let mut total = 0u64;
        loop {
            let n = match self.client.read(fd, &mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    self.abandon(fd);
                    return Err(e.into());
                }
            };

            if let Err(e) = destination.write_all(&buf[..n]) {
                self.abandon(fd);
                return Err(e.into());
            }
            total += n as u64;
        }

        self.client.close(fd)?;
        Ok(total)
    }
}

/// An open descriptor on the share
struct ShareFile {
    client: Arc<dyn ShareClient>,
    fd: i32,
}

impl NativeFile for ShareFile {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.client.read(self.fd, buf)?)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        Ok(self.client.write(self.fd, data)?)
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        Ok(self.client.lseek(self.fd, offset, whence)?)
    }

    fn stat(&mut self) -> Result<Metadata> {
        Ok(self.client.fstat(self.fd)?)
    }

    fn close(&mut self, _dirty: bool) -> Result<()> {
        Ok(self.client.close(self.fd)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, ShareAdapter, Reference) {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("nas/media")).unwrap();
        let adapter = ShareAdapter::new(
            Arc::new(MountedShareClient::new(root.path())),
            Identity::new(501, 20),
        );
        let reference = Reference::parse("smb://nas/media").unwrap();
        (root, adapter, reference)
    }

    #[test]
    fn test_copy_round_trip() {
        let (root, adapter, reference) = setup();
        let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let source = root.path().join("local.bin");
        fs::write(&source, &payload).unwrap();

        adapter.copy_in(&reference, "big.bin", &source).unwrap();

        let mut out: Vec<u8> = Vec::new();
        assert_eq!(adapter.copy_out(&reference, "big.bin", &mut out).unwrap(), payload.len() as u64);
        assert_eq!(out, payload);
    }

    #[test]
    fn test_list_is_flat_and_normalized() {
        let (root, adapter, reference) = setup();
        adapter.mkdir(&reference, "albums").unwrap();
        fs::write(root.path().join("nas/media/albums/deep.txt"), b"x").unwrap();
        fs::write(root.path().join("nas/media/cover.jpg"), b"jpeg").unwrap();

        let entries = adapter.list(&reference).unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["albums", "cover.jpg"]);
        assert!(entries[0].is_dir());
        assert_eq!(entries[0].permissions.chars().next(), Some('d'));
        assert_eq!(entries[1].size, 4);
        assert_eq!(entries[1].uid, 501);
    }

    #[test]
    fn test_remove_and_rmdir() {
        let (root, adapter, reference) = setup();
        adapter.mkdir(&reference, "d").unwrap();
        fs::write(root.path().join("nas/media/f"), b"").unwrap();

        adapter.remove(&reference, "f").unwrap();
        adapter.rmdir(&reference, "d").unwrap();
        assert!(adapter.list(&reference).unwrap().is_empty());

        let err = adapter.remove(&reference, "f").unwrap_err();
        assert_eq!(err.code(), libc::ENOENT);
    }

    #[test]
    fn test_copy_out_missing_member() {
        let (_root, adapter, reference) = setup();
        let err = adapter.copy_out(&reference, "nope", &mut Vec::<u8>::new()).unwrap_err();
        assert_eq!(err.code(), libc::ENOENT);
    }

    #[test]
    fn test_archive_reference_rejected() {
        let (_root, adapter, _) = setup();
        let reference = Reference::parse("/tmp/a.7z").unwrap();
        assert!(adapter.remove(&reference, "x").is_err());
    }
}
