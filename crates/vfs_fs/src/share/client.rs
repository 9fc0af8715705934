//! Share client contract
//!
//! Mirrors the descriptor-style API of a network share library: integer file
//! descriptors, errno-carrying failures, URL-addressed namespace calls.

use std::time::SystemTime;

use crate::{EntryKind, Metadata, NativeError, OpenFlags, ShareUrl, Whence};

pub type NativeResult<T> = std::result::Result<T, NativeError>;

/// One raw record of a share directory enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareDirent {
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
    pub modified: Option<SystemTime>,
    /// Permission bits; 0 when the server reports none
    pub mode: u32,
}

/// Descriptor-based share access
///
/// Descriptors are only meaningful to the client that issued them and may be
/// recycled after `close`.
pub trait ShareClient: Send + Sync {
    fn open(&self, url: &ShareUrl, flags: OpenFlags, mode: u32) -> NativeResult<i32>;

    fn read(&self, fd: i32, buf: &mut [u8]) -> NativeResult<usize>;

    fn write(&self, fd: i32, data: &[u8]) -> NativeResult<usize>;

    fn lseek(&self, fd: i32, offset: i64, whence: Whence) -> NativeResult<u64>;

    fn fstat(&self, fd: i32) -> NativeResult<Metadata>;

    fn close(&self, fd: i32) -> NativeResult<()>;

    /// Entries directly inside `url`
    fn readdir(&self, url: &ShareUrl) -> NativeResult<Vec<ShareDirent>>;

    fn unlink(&self, url: &ShareUrl) -> NativeResult<()>;

    fn rmdir(&self, url: &ShareUrl) -> NativeResult<()>;

    fn mkdir(&self, url: &ShareUrl, mode: u32) -> NativeResult<()>;
}
