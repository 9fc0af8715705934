//! Error types shared by every backend

use std::fmt;
use thiserror::Error;

/// Failure reported by a native call: errno-style code plus its text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeError {
    pub code: i32,
    pub message: String,
}

impl NativeError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Build from an errno value using the platform's description
    pub fn from_errno(code: i32) -> Self {
        let message = std::io::Error::from_raw_os_error(code).to_string();
        Self { code, message }
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<std::io::Error> for NativeError {
    fn from(e: std::io::Error) -> Self {
        Self {
            code: e.raw_os_error().unwrap_or(libc::EIO),
            message: e.to_string(),
        }
    }
}

/// Step of a staged operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagingStep {
    CreateArea,
    CreateDirectory,
    CreatePlaceholder,
    CopySource,
    AddMember,
    RemovePlaceholder,
    Extract,
}

impl fmt::Display for StagingStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StagingStep::CreateArea => "create staging area",
            StagingStep::CreateDirectory => "create directory",
            StagingStep::CreatePlaceholder => "create placeholder",
            StagingStep::CopySource => "copy source file",
            StagingStep::AddMember => "add member",
            StagingStep::RemovePlaceholder => "remove placeholder",
            StagingStep::Extract => "extract member",
        };
        f.write_str(s)
    }
}

/// Error type for VFS operations
#[derive(Debug, Error)]
pub enum VfsError {
    /// The session handle has no live backing state
    #[error("no file handler data present for {op}")]
    NoHandlerData { op: &'static str },

    #[error("{0}")]
    Native(NativeError),

    #[error("{program} exited with status {status}: {message}")]
    Tool {
        program: String,
        status: i32,
        message: String,
    },

    #[error("staging failed to {step}: {source}")]
    Staging {
        step: StagingStep,
        #[source]
        source: Box<VfsError>,
    },

    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Invalid member path: {0}")]
    InvalidMemberPath(String),
}

impl VfsError {
    /// Numeric code paired with the message when surfacing to the host
    pub fn code(&self) -> i32 {
        match self {
            VfsError::NoHandlerData { .. } => -1,
            VfsError::Native(e) => e.code,
            VfsError::Tool { status, .. } => *status,
            VfsError::Staging { source, .. } => source.code(),
            VfsError::InvalidReference(_) | VfsError::InvalidMemberPath(_) => libc::EINVAL,
        }
    }

    /// Shorthand for a native error carrying an errno
    pub fn errno(code: i32) -> Self {
        VfsError::Native(NativeError::from_errno(code))
    }

    /// Wrap this error as the failure of one staging step
    pub fn during(self, step: StagingStep) -> Self {
        VfsError::Staging {
            step,
            source: Box::new(self),
        }
    }

    pub fn is_resolution(&self) -> bool {
        matches!(self, VfsError::NoHandlerData { .. })
    }
}

impl From<NativeError> for VfsError {
    fn from(e: NativeError) -> Self {
        VfsError::Native(e)
    }
}

impl From<std::io::Error> for VfsError {
    fn from(e: std::io::Error) -> Self {
        VfsError::Native(e.into())
    }
}

pub type Result<T> = std::result::Result<T, VfsError>;
