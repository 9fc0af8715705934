//! Reference - identifies the backend container an operation runs against
//!
//! A reference is resolved fresh from the host's string on every call and is
//! never cached between operations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::adapter::BackendKind;
use crate::sanitize::sanitize_optional;
use crate::{Result, VfsError};

const SMB_SCHEME: &str = "smb://";

fn has_smb_scheme(raw: &str) -> bool {
    raw.get(..SMB_SCHEME.len())
        .map_or(false, |prefix| prefix.eq_ignore_ascii_case(SMB_SCHEME))
}

/// Archive file path or remote share URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reference {
    Archive(PathBuf),
    Share(ShareUrl),
}

impl Reference {
    /// Parse the host's reference string
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(VfsError::InvalidReference(raw.to_string()));
        }

        if has_smb_scheme(raw) {
            return ShareUrl::parse(raw).map(Reference::Share);
        }

        Ok(Reference::Archive(PathBuf::from(raw)))
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Reference::Archive(_) => BackendKind::Archive,
            Reference::Share(_) => BackendKind::Share,
        }
    }

    pub fn as_archive(&self) -> Result<&Path> {
        match self {
            Reference::Archive(path) => Ok(path),
            Reference::Share(url) => Err(VfsError::InvalidReference(format!(
                "{} is not an archive",
                url
            ))),
        }
    }

    pub fn as_share(&self) -> Result<&ShareUrl> {
        match self {
            Reference::Share(url) => Ok(url),
            Reference::Archive(path) => Err(VfsError::InvalidReference(format!(
                "{} is not a share URL",
                path.display()
            ))),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Archive(path) => write!(f, "{}", path.display()),
            Reference::Share(url) => write!(f, "{}", url),
        }
    }
}

/// `smb://server/share/path`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShareUrl {
    /// Host, optionally with `user@` prefix
    pub server: String,
    pub share: String,
    /// Sanitized path inside the share; empty for the share root
    pub path: String,
}

impl ShareUrl {
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = || VfsError::InvalidReference(raw.to_string());

        if !has_smb_scheme(raw) {
            return Err(invalid());
        }
        let rest = &raw[SMB_SCHEME.len()..];

        let mut parts = rest.splitn(3, '/');
        let component = |s: &&str| !s.is_empty() && *s != "." && *s != ".." && !s.contains('\\');
        let server = parts.next().filter(component).ok_or_else(invalid)?;
        let share = parts.next().filter(component).ok_or_else(invalid)?;
        let path = sanitize_optional(parts.next().unwrap_or(""))?;

        Ok(Self {
            server: server.to_string(),
            share: share.to_string(),
            path,
        })
    }

    /// URL of `member` below this one
    pub fn join(&self, member: &str) -> Result<Self> {
        let member = sanitize_optional(member)?;
        let path = match (self.path.is_empty(), member.is_empty()) {
            (_, true) => self.path.clone(),
            (true, false) => member,
            (false, false) => format!("{}/{}", self.path, member),
        };

        Ok(Self {
            server: self.server.clone(),
            share: self.share.clone(),
            path,
        })
    }

    /// Path components below the server, i.e. `share/path`
    pub fn share_relative(&self) -> PathBuf {
        let mut p = PathBuf::from(&self.share);
        if !self.path.is_empty() {
            p.push(&self.path);
        }
        p
    }
}

impl fmt::Display for ShareUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{}", SMB_SCHEME, self.server, self.share)?;
        if !self.path.is_empty() {
            write!(f, "/{}", self.path)?;
        }
        Ok(())
    }
}
