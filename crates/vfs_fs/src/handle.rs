//! Handle table: session handles over backend-native file state
//!
//! Session handles are issued from a counter and never reused, so their
//! lifetime is independent of how a backend recycles its own descriptors.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::adapter::{BackendKind, NativeFile};
use crate::{Result, VfsError};

/// Opaque identifier the host uses to address an open file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionHandle(u64);

impl SessionHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Per-handle bookkeeping
pub struct HandleState {
    pub backend: BackendKind,
    pub native: Box<dyn NativeFile>,
    /// Current position; only moved after a successful read, write or seek
    pub offset: u64,
    /// Written since open
    pub dirty: bool,
}

impl fmt::Debug for HandleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleState")
            .field("backend", &self.backend)
            .field("offset", &self.offset)
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}

/// Maps session handles to their native state
///
/// Each entry sits behind its own mutex so that blocking I/O on one handle
/// does not stall lookups of the others.
pub struct HandleTable {
    entries: DashMap<SessionHandle, Arc<Mutex<HandleState>>>,
    next_id: AtomicU64,
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a freshly opened native file
    pub fn allocate(&self, backend: BackendKind, native: Box<dyn NativeFile>) -> SessionHandle {
        let handle = SessionHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        let state = HandleState {
            backend,
            native,
            offset: 0,
            dirty: false,
        };

        self.entries.insert(handle, Arc::new(Mutex::new(state)));
        tracing::trace!("Allocated {} handle {}", backend, handle);
        handle
    }

    /// Look up the state for `handle`; `op` names the operation for the error
    pub fn resolve(&self, handle: SessionHandle, op: &'static str) -> Result<Arc<Mutex<HandleState>>> {
        self.entries
            .get(&handle)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(VfsError::NoHandlerData { op })
    }

    /// Drop the entry; a no-op when it is already gone
    pub fn release(&self, handle: SessionHandle) {
        if self.entries.remove(&handle).is_some() {
            tracing::trace!("Released handle {}", handle);
        }
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Metadata, Whence};

    struct NullFile;

    impl NativeFile for NullFile {
        fn read(&mut self, _buf: &mut [u8]) -> Result<usize> {
            Ok(0)
        }
        fn write(&mut self, data: &[u8]) -> Result<usize> {
            Ok(data.len())
        }
        fn seek(&mut self, _offset: i64, _whence: Whence) -> Result<u64> {
            Ok(0)
        }
        fn stat(&mut self) -> Result<Metadata> {
            Err(VfsError::errno(libc::ENOSYS))
        }
        fn close(&mut self, _dirty: bool) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_allocate_resolve_release() {
        let table = HandleTable::new();
        let a = table.allocate(BackendKind::Share, Box::new(NullFile));
        let b = table.allocate(BackendKind::Archive, Box::new(NullFile));

        assert_ne!(a, b);
        assert_eq!(table.count(), 2);
        assert_eq!(table.resolve(b, "read").unwrap().lock().backend, BackendKind::Archive);

        table.release(a);
        table.release(a);
        assert_eq!(table.count(), 1);

        let err = table.resolve(a, "read").unwrap_err();
        assert!(err.is_resolution());
    }

    #[test]
    fn test_ids_not_reused() {
        let table = HandleTable::new();
        let a = table.allocate(BackendKind::Share, Box::new(NullFile));
        table.release(a);
        let b = table.allocate(BackendKind::Share, Box::new(NullFile));
        assert!(b.id() > a.id());
    }
}
