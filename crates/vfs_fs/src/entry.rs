//! Canonical data model: directory entries, metadata, open flags

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::io::SeekFrom;
use std::time::SystemTime;

use crate::NativeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    File,
    Directory,
}

/// Owner identity stamped onto entries whose backend does not track ownership
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: u32,
    pub gid: u32,
}

impl Identity {
    pub fn new(uid: u32, gid: u32) -> Self {
        Self { uid, gid }
    }

    /// Effective uid/gid of the running process
    #[cfg(unix)]
    pub fn current() -> Self {
        // SAFETY: geteuid/getegid cannot fail and touch no memory
        let (uid, gid) = unsafe { (libc::geteuid(), libc::getegid()) };
        Self { uid, gid }
    }

    #[cfg(not(unix))]
    pub fn current() -> Self {
        Self { uid: 0, gid: 0 }
    }
}

/// One normalized listing record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Path relative to the archive or share root
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
    /// Day resolution only; archive listings carry nothing finer we keep
    pub modified: NaiveDate,
    /// 10-character rwx string
    pub permissions: String,
    pub uid: u32,
    pub gid: u32,
}

impl DirectoryEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// `PERMS LINKS OWNER GROUP SIZE MM/DD/YY NAME`
    pub fn to_listing_line(&self) -> String {
        format!(
            "{} 1 {} {} {} {} {}",
            self.permissions,
            self.uid,
            self.gid,
            self.size,
            self.modified.format("%m/%d/%y"),
            self.name
        )
    }
}

/// Result of `stat` on an open handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub kind: EntryKind,
    pub size: u64,
    pub modified: Option<SystemTime>,
    /// Permission bits (no file-type bits)
    pub mode: u32,
}

impl Metadata {
    pub fn from_std(meta: &std::fs::Metadata) -> Self {
        let kind = if meta.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };

        Self {
            kind,
            size: meta.len(),
            modified: meta.modified().ok(),
            mode: permission_bits(meta, kind),
        }
    }
}

#[cfg(unix)]
fn permission_bits(meta: &std::fs::Metadata, _kind: EntryKind) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(meta: &std::fs::Metadata, kind: EntryKind) -> u32 {
    match (kind, meta.permissions().readonly()) {
        (EntryKind::Directory, _) => 0o755,
        (EntryKind::File, true) => 0o444,
        (EntryKind::File, false) => 0o644,
    }
}

/// Format permission bits the way `ls -l` does
pub(crate) fn mode_string(kind: EntryKind, mode: u32) -> String {
    let mut s = String::with_capacity(10);
    s.push(match kind {
        EntryKind::Directory => 'd',
        EntryKind::File => '-',
    });

    for shift in [6u32, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        s.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        s.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        s.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }

    s
}

/// Origin for `seek`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Start,
    Current,
    End,
}

impl Whence {
    pub fn to_seek_from(self, offset: i64) -> std::result::Result<SeekFrom, NativeError> {
        match self {
            Whence::Start => u64::try_from(offset)
                .map(SeekFrom::Start)
                .map_err(|_| NativeError::from_errno(libc::EINVAL)),
            Whence::Current => Ok(SeekFrom::Current(offset)),
            Whence::End => Ok(SeekFrom::End(offset)),
        }
    }
}

/// Open mode, mirroring `open(2)` flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenFlags {
    pub read: bool,
    pub write: bool,
    pub create: bool,
    pub truncate: bool,
    pub append: bool,
    pub exclusive: bool,
}

impl OpenFlags {
    pub fn read_only() -> Self {
        Self {
            read: true,
            ..Self::default()
        }
    }

    /// `O_WRONLY | O_CREAT | O_TRUNC`
    pub fn create_truncate() -> Self {
        Self {
            write: true,
            create: true,
            truncate: true,
            ..Self::default()
        }
    }

    /// Decode host-supplied POSIX open flags
    #[cfg(unix)]
    pub fn from_posix(bits: i32) -> Self {
        let access = bits & libc::O_ACCMODE;
        Self {
            read: access == libc::O_RDONLY || access == libc::O_RDWR,
            write: access == libc::O_WRONLY || access == libc::O_RDWR,
            create: bits & libc::O_CREAT != 0,
            truncate: bits & libc::O_TRUNC != 0,
            append: bits & libc::O_APPEND != 0,
            exclusive: bits & libc::O_EXCL != 0,
        }
    }

    pub fn writes(&self) -> bool {
        self.write || self.append
    }

    pub fn to_open_options(&self, mode: u32) -> std::fs::OpenOptions {
        let mut options = std::fs::OpenOptions::new();
        options
            .read(self.read)
            .write(self.write)
            .append(self.append)
            .truncate(self.truncate && self.writes());

        if self.exclusive && self.create {
            options.create_new(true);
        } else {
            options.create(self.create);
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(mode);
        }
        #[cfg(not(unix))]
        let _ = mode;

        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_line() {
        let entry = DirectoryEntry {
            name: "docs/read me.txt".into(),
            kind: EntryKind::File,
            size: 1234,
            modified: NaiveDate::from_ymd_opt(1998, 1, 15).unwrap(),
            permissions: "-rw-r--r--".into(),
            uid: 1000,
            gid: 100,
        };

        assert_eq!(
            entry.to_listing_line(),
            "-rw-r--r-- 1 1000 100 1234 01/15/98 docs/read me.txt"
        );
    }

    #[test]
    fn test_mode_string() {
        assert_eq!(mode_string(EntryKind::Directory, 0o755), "drwxr-xr-x");
        assert_eq!(mode_string(EntryKind::File, 0o640), "-rw-r-----");
    }

    #[cfg(unix)]
    #[test]
    fn test_posix_flags() {
        let flags = OpenFlags::from_posix(libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC);
        assert_eq!(flags, OpenFlags::create_truncate());

        let flags = OpenFlags::from_posix(libc::O_RDONLY);
        assert!(flags.read && !flags.writes());
    }

    #[test]
    fn test_negative_absolute_seek_rejected() {
        let err = Whence::Start.to_seek_from(-1).unwrap_err();
        assert_eq!(err.code, libc::EINVAL);
        assert_eq!(Whence::End.to_seek_from(-4).unwrap(), SeekFrom::End(-4));
    }
}
