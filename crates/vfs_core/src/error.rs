//! Application error types

use thiserror::Error;
use vfs_fs::VfsError;

/// Errors surfaced by the command layer
#[derive(Error, Debug)]
pub enum AppError {
    // ===== Backend failures (reported, exit status unaffected) =====
    #[error("{0}")]
    Vfs(#[from] VfsError),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ===== Invocation failures =====
    #[error("Usage error: {0}")]
    Usage(String),
}

impl AppError {
    /// Bad verb or arguments, as opposed to a failure while running one
    pub fn is_usage(&self) -> bool {
        matches!(self, AppError::Usage(_))
    }

    /// Numeric code printed next to the message
    pub fn code(&self) -> i32 {
        match self {
            AppError::Vfs(e) => e.code(),
            AppError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
            AppError::Usage(_) => libc::EINVAL,
        }
    }

    /// One-line text for stderr
    pub fn user_message(&self) -> String {
        format!("{} (code {})", self, self.code())
    }
}
