//! Share client over locally mounted shares
//!
//! `smb://server/share/path` resolves to `<mount_root>/server/share/path`.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Seek, Write};
use std::path::PathBuf;
use std::sync::Arc;

use super::client::{NativeResult, ShareClient, ShareDirent};
use crate::{EntryKind, Metadata, NativeError, OpenFlags, ShareUrl, Whence};

/// 0..2 are left to stdio, like a real descriptor table
const FIRST_DESCRIPTOR: i32 = 3;

pub struct MountedShareClient {
    mount_root: PathBuf,
    descriptors: Mutex<BTreeMap<i32, Arc<Mutex<File>>>>,
}

impl MountedShareClient {
    pub fn new(mount_root: impl Into<PathBuf>) -> Self {
        Self {
            mount_root: mount_root.into(),
            descriptors: Mutex::new(BTreeMap::new()),
        }
    }

    /// Local path for `url`; a `user@` prefix on the server is ignored
    pub fn local_path(&self, url: &ShareUrl) -> PathBuf {
        let host = url.server.rsplit('@').next().unwrap_or(&url.server);
        self.mount_root.join(host).join(url.share_relative())
    }

    fn descriptor(&self, fd: i32) -> NativeResult<Arc<Mutex<File>>> {
        self.descriptors
            .lock()
            .get(&fd)
            .cloned()
            .ok_or_else(|| NativeError::from_errno(libc::EBADF))
    }

    /// Insert under the lowest free descriptor
    fn install(&self, file: File) -> i32 {
        let mut descriptors = self.descriptors.lock();
        let mut fd = FIRST_DESCRIPTOR;
        while descriptors.contains_key(&fd) {
            fd += 1;
        }
        descriptors.insert(fd, Arc::new(Mutex::new(file)));
        fd
    }
}

impl ShareClient for MountedShareClient {
    fn open(&self, url: &ShareUrl, flags: OpenFlags, mode: u32) -> NativeResult<i32> {
        let path = self.local_path(url);
        let file = flags.to_open_options(mode).open(&path)?;
        let fd = self.install(file);
        tracing::trace!("Opened {} as fd {}", url, fd);
        Ok(fd)
    }

    fn read(&self, fd: i32, buf: &mut [u8]) -> NativeResult<usize> {
        let file = self.descriptor(fd)?;
        let n = file.lock().read(buf)?;
        Ok(n)
    }

    fn write(&self, fd: i32, data: &[u8]) -> NativeResult<usize> {
        let file = self.descriptor(fd)?;
        let n = file.lock().write(data)?;
        Ok(n)
    }

    fn lseek(&self, fd: i32, offset: i64, whence: Whence) -> NativeResult<u64> {
        let pos = whence.to_seek_from(offset)?;
        let file = self.descriptor(fd)?;
        let n = file.lock().seek(pos)?;
        Ok(n)
    }

    fn fstat(&self, fd: i32) -> NativeResult<Metadata> {
        let file = self.descriptor(fd)?;
        let meta = file.lock().metadata()?;
        Ok(Metadata::from_std(&meta))
    }

    fn close(&self, fd: i32) -> NativeResult<()> {
        let file = self
            .descriptors
            .lock()
            .remove(&fd)
            .ok_or_else(|| NativeError::from_errno(libc::EBADF))?;

        file.lock().flush()?;
        tracing::trace!("Closed fd {}", fd);
        Ok(())
    }

    fn readdir(&self, url: &ShareUrl) -> NativeResult<Vec<ShareDirent>> {
        let mut dirents = Vec::new();

        for entry in fs::read_dir(self.local_path(url))? {
            let entry = entry?;
            // follow links so a linked directory lists as a directory
            let meta = match fs::metadata(entry.path()) {
                Ok(meta) => meta,
                Err(e) => {
                    tracing::debug!("Skipping {}: {}", entry.path().display(), e);
                    continue;
                }
            };
            let stat = Metadata::from_std(&meta);

            dirents.push(ShareDirent {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind: stat.kind,
                size: if stat.kind == EntryKind::Directory { 0 } else { stat.size },
                modified: stat.modified,
                mode: stat.mode,
            });
        }

        Ok(dirents)
    }

    fn unlink(&self, url: &ShareUrl) -> NativeResult<()> {
        Ok(fs::remove_file(self.local_path(url))?)
    }

    fn rmdir(&self, url: &ShareUrl) -> NativeResult<()> {
        Ok(fs::remove_dir(self.local_path(url))?)
    }

    fn mkdir(&self, url: &ShareUrl, mode: u32) -> NativeResult<()> {
        let mut builder = fs::DirBuilder::new();
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(mode);
        }
        #[cfg(not(unix))]
        let _ = mode;

        Ok(builder.create(self.local_path(url))?)
    }
}
