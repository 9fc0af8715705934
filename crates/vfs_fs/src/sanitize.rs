//! Member path sanitization
//!
//! Member paths come from the host verbatim and end up both inside archive
//! tool command lines and joined under staging directories, so they must stay
//! relative and must not climb out of their root.

use crate::{Result, VfsError};

/// Normalize a member path to `a/b/c` form
///
/// Backslashes become `/`, leading `/` and `.` segments are dropped and
/// repeated separators collapse. `..` segments and empty results are rejected.
pub fn sanitize_member(path: &str) -> Result<String> {
    let unified = path.replace('\\', "/");
    let mut segments = Vec::new();

    for segment in unified.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(VfsError::InvalidMemberPath(path.to_string())),
            s if s.chars().any(|c| c == '\0') => {
                return Err(VfsError::InvalidMemberPath(path.to_string()))
            }
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        return Err(VfsError::InvalidMemberPath(path.to_string()));
    }

    Ok(segments.join("/"))
}

/// Like `sanitize_member`, but an empty path names the root itself
pub(crate) fn sanitize_optional(path: &str) -> Result<String> {
    if path.trim_matches(|c| c == '/' || c == '\\' || c == '.').is_empty() && !path.contains("..") {
        return Ok(String::new());
    }
    sanitize_member(path)
}
