//! Listing normalizer
//!
//! Turns raw backend directory dumps into ordered `DirectoryEntry` values.
//! Archive tool output is a preamble, a dashed separator line, the data
//! records, a second separator and a trailing summary. The separator also
//! marks where the name column starts, so names may contain spaces.

use chrono::{DateTime, Local, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::SystemTime;

use crate::entry::{mode_string, DirectoryEntry, EntryKind, Identity};
use crate::share::ShareDirent;

static VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\.(\d+)").expect("version pattern is valid"));

/// Characters that make up a DOS-style attribute token (`D....`, `....A`, `A`)
const DOS_ATTRIBUTES: &str = "DRHSAICLN.-";

const DIRECTORY_PERMISSIONS: &str = "drwxr-xr-x";
const FILE_PERMISSIONS: &str = "-rw-r--r--";

/// Generation of the archive tool's listing layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingRevision {
    /// `ATTR SIZE MM-DD-YY HH:MM NAME`
    Legacy,
    /// `YYYY-MM-DD HH:MM:SS ATTR SIZE [COMPRESSED] NAME`
    Current,
}

impl ListingRevision {
    /// Pick the revision from the tool's version banner
    ///
    /// 7-Zip prints the current layout in every release. For other tools the
    /// first `MAJOR.MINOR` found decides; a banner without one is assumed to
    /// come from a current tool.
    pub fn detect(banner: &str, current_since_major: u32) -> Self {
        if banner.contains("7-Zip") {
            return ListingRevision::Current;
        }

        let major = VERSION_RE
            .captures(banner)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok());

        match major {
            Some(major) if major < current_since_major => ListingRevision::Legacy,
            _ => ListingRevision::Current,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Preamble,
    Records,
}

/// Parses one listing at a time; pure apart from the injected identity
#[derive(Debug, Clone, Copy)]
pub struct ListingNormalizer {
    revision: ListingRevision,
    identity: Identity,
}

impl ListingNormalizer {
    pub fn new(revision: ListingRevision, identity: Identity) -> Self {
        Self { revision, identity }
    }

    /// Parse archive tool output
    ///
    /// Malformed records are skipped. An archive with no members yields an
    /// empty vector.
    pub fn parse(&self, raw: &str) -> Vec<DirectoryEntry> {
        let mut phase = Phase::Preamble;
        let mut name_column = 0;
        let mut entries = Vec::new();

        for line in raw.lines() {
            if let Some(column) = separator_name_column(line) {
                match phase {
                    Phase::Preamble => {
                        phase = Phase::Records;
                        name_column = column;
                        continue;
                    }
                    Phase::Records => break,
                }
            }

            if phase != Phase::Records || line.trim().is_empty() {
                continue;
            }

            match self.parse_record(line, name_column) {
                Some(entry) => entries.push(entry),
                None => tracing::debug!("Skipping malformed listing record: {:?}", line),
            }
        }

        sort_entries(&mut entries);
        entries
    }

    fn parse_record(&self, line: &str, name_column: usize) -> Option<DirectoryEntry> {
        let head = line.get(..name_column)?;
        let name = line.get(name_column..)?.trim_end();
        if name.is_empty() || name.starts_with(' ') {
            return None;
        }

        let fields: Vec<&str> = head.split_whitespace().collect();
        let (attr, size, modified) = match self.revision {
            ListingRevision::Legacy => {
                let [attr, size, date, _time] = fields.as_slice() else {
                    return None;
                };
                (*attr, size.parse::<u64>().ok()?, parse_legacy_date(date)?)
            }
            ListingRevision::Current => {
                if !(3..=5).contains(&fields.len()) {
                    return None;
                }
                let date = NaiveDate::parse_from_str(fields[0], "%Y-%m-%d").ok()?;
                // directories often leave the size columns blank
                let size = match fields.get(3) {
                    Some(s) => s.parse::<u64>().ok()?,
                    None => 0,
                };
                (fields[2], size, date)
            }
        };

        let permissions = normalize_permissions(attr);
        let kind = if permissions.starts_with('d') {
            EntryKind::Directory
        } else {
            EntryKind::File
        };

        Some(DirectoryEntry {
            name: name.trim_end_matches('/').to_string(),
            kind,
            size,
            modified,
            permissions,
            uid: self.identity.uid,
            gid: self.identity.gid,
        })
    }

    /// Normalize entries returned by a share's directory enumeration
    pub fn normalize_share(&self, dirents: impl IntoIterator<Item = ShareDirent>) -> Vec<DirectoryEntry> {
        let mut entries: Vec<DirectoryEntry> = dirents
            .into_iter()
            .filter(|d| d.name != "." && d.name != ".." && !d.name.is_empty())
            .map(|d| {
                let mode = match (d.mode, d.kind) {
                    (0, EntryKind::Directory) => 0o755,
                    (0, EntryKind::File) => 0o644,
                    (mode, _) => mode,
                };

                DirectoryEntry {
                    name: d.name,
                    kind: d.kind,
                    size: if d.kind == EntryKind::Directory { 0 } else { d.size },
                    modified: local_date(d.modified),
                    permissions: mode_string(d.kind, mode),
                    uid: self.identity.uid,
                    gid: self.identity.gid,
                }
            })
            .collect();

        sort_entries(&mut entries);
        entries
    }
}

/// Map a native attribute field onto an rwx permission string
///
/// DOS-style attribute tokens become `drwxr-xr-x` when they carry the
/// directory flag and `-rw-r--r--` otherwise. Anything else is returned as is.
pub fn normalize_permissions(attr: &str) -> String {
    let dos_style = !attr.is_empty()
        && attr.len() <= 7
        && attr.chars().all(|c| DOS_ATTRIBUTES.contains(c));

    if !dos_style {
        return attr.to_string();
    }

    if attr.contains('D') {
        DIRECTORY_PERMISSIONS.to_string()
    } else {
        FILE_PERMISSIONS.to_string()
    }
}

/// Order by name; a directory precedes a file of the same name
pub fn sort_entries(entries: &mut [DirectoryEntry]) {
    entries.sort_by(|a, b| {
        a.name
            .as_bytes()
            .cmp(b.name.as_bytes())
            .then_with(|| b.is_dir().cmp(&a.is_dir()))
    });
}

/// Start of the last dash run when `line` is a separator line
fn separator_name_column(line: &str) -> Option<usize> {
    let trimmed = line.trim_end();
    let dashes = trimmed.bytes().filter(|&b| b == b'-').count();
    if dashes < 5 || !trimmed.bytes().all(|b| b == b'-' || b == b' ') {
        return None;
    }

    trimmed.rfind(' ').map_or(Some(0), |space| Some(space + 1))
}

/// `MM-DD-YY`; two-digit years pivot at 70 (70..99 -> 19xx, 00..69 -> 20xx)
fn parse_legacy_date(field: &str) -> Option<NaiveDate> {
    let mut parts = field.split('-');
    let month: u32 = parts.next()?.parse().ok()?;
    let day: u32 = parts.next()?.parse().ok()?;
    let yy = parts.next()?;
    if parts.next().is_some() || yy.len() != 2 {
        return None;
    }

    let yy: i32 = yy.parse().ok()?;
    let year = if yy >= 70 { 1900 + yy } else { 2000 + yy };
    NaiveDate::from_ymd_opt(year, month, day)
}

fn local_date(time: Option<SystemTime>) -> NaiveDate {
    time.map(|t| DateTime::<Local>::from(t).date_naive())
        .or_else(|| NaiveDate::from_ymd_opt(1970, 1, 1))
        .unwrap_or(NaiveDate::MIN)
}
