//! extvfs Core
//!
//! This crate contains:
//! - Configuration
//! - Error types
//! - Command system
//! - Session wiring from configuration

pub mod command;
pub mod config;
pub mod error;

pub use command::{Command, CommandDispatcher, CommandHandler, CommandId, CommandParams};
pub use config::{AppConfig, ArchiveConfig, GeneralConfig, ShareConfig, StagingConfig};
pub use error::AppError;

use std::sync::Arc;
use vfs_fs::archive::{ArchiveAdapter, ExternalTool};
use vfs_fs::share::{MountedShareClient, ShareAdapter};
use vfs_fs::{Identity, StagingCoordinator, VfsSession};

/// Build a session with both backends configured from `config`
pub fn build_session(config: &AppConfig) -> VfsSession {
    let identity = Identity::current();
    let staging = StagingCoordinator::new(config.staging.root());

    let tool = ExternalTool::new(config.archive.commands.clone());
    tracing::debug!(
        "Archive tool {} (revision {:?}), staging under {}",
        tool.program(),
        config.archive.revision,
        staging.root().display()
    );

    let archive = ArchiveAdapter::new(Arc::new(tool), staging, identity)
        .with_revision(config.archive.revision, config.archive.current_since_major);

    let client = MountedShareClient::new(&config.share.mount_root);
    let share = ShareAdapter::new(Arc::new(client), identity);

    VfsSession::new(Arc::new(archive), Arc::new(share))
}
