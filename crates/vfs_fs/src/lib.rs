//! extvfs File System Abstraction Layer
//!
//! Presents archive containers and remote shares as ordinary directories:
//! - Reference: archive path or `smb://` share URL
//! - HandleTable: session handles over backend-native descriptors
//! - Listing: backend directory dumps normalized into `DirectoryEntry` values
//! - Staging: private temp directories for backends without in-place writes
//! - Backend adapters for the archive tool and the share client

mod adapter;
mod encoding;
mod entry;
mod error;
mod handle;
mod listing;
mod reference;
mod sanitize;
mod session;
mod staging;

pub mod archive;
pub mod share;

pub use adapter::{BackendAdapter, BackendKind, NativeFile};
pub use encoding::{decode_listing, detect_encoding, EncodingHint};
pub use entry::{DirectoryEntry, EntryKind, Identity, Metadata, OpenFlags, Whence};
pub use error::{NativeError, Result, StagingStep, VfsError};
pub use handle::{HandleState, HandleTable, SessionHandle};
pub use listing::{normalize_permissions, sort_entries, ListingNormalizer, ListingRevision};
pub use reference::{Reference, ShareUrl};
pub use sanitize::sanitize_member;
pub use session::{VfsSession, MAX_READ_CHUNK};
pub use staging::{StagingArea, StagingCoordinator, PLACEHOLDER_NAME};
