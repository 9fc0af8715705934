//! In-memory archive tool for tests
//!
//! Keeps members in a map per archive path and renders listings in either
//! revision's column layout, so the normalizer sees realistic output.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::ArchiveTool;
use crate::{ListingRevision, Result, VfsError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ToolStep {
    Version,
    List,
    Extract,
    /// Both plain and recursive adds
    Add,
    Delete,
}

#[derive(Debug, Clone)]
enum Stored {
    Directory,
    File(Vec<u8>),
}

pub(crate) struct MemoryTool {
    revision: ListingRevision,
    archives: Mutex<HashMap<PathBuf, BTreeMap<String, Stored>>>,
    failing: Mutex<Option<ToolStep>>,
    calls: Mutex<Vec<ToolStep>>,
}

impl MemoryTool {
    pub(crate) fn new(revision: ListingRevision) -> Self {
        Self {
            revision,
            archives: Mutex::new(HashMap::new()),
            failing: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn fail_on(&self, step: ToolStep) {
        *self.failing.lock() = Some(step);
    }

    pub(crate) fn clear_failure(&self) {
        *self.failing.lock() = None;
    }

    pub(crate) fn calls(&self, step: ToolStep) -> usize {
        self.calls.lock().iter().filter(|&&s| s == step).count()
    }

    pub(crate) fn insert_file(&self, archive: &Path, name: &str, data: &[u8]) {
        self.archives
            .lock()
            .entry(archive.to_path_buf())
            .or_default()
            .insert(name.to_string(), Stored::File(data.to_vec()));
    }

    pub(crate) fn member(&self, archive: &Path, name: &str) -> Option<Vec<u8>> {
        match self.archives.lock().get(archive)?.get(name)? {
            Stored::File(data) => Some(data.clone()),
            Stored::Directory => None,
        }
    }

    pub(crate) fn has_directory(&self, archive: &Path, name: &str) -> bool {
        matches!(
            self.archives.lock().get(archive).and_then(|m| m.get(name)),
            Some(Stored::Directory)
        )
    }

    fn step(&self, step: ToolStep) -> Result<()> {
        self.calls.lock().push(step);
        if *self.failing.lock() == Some(step) {
            return Err(VfsError::Tool {
                program: "memtool".into(),
                status: 2,
                message: format!("injected {:?} failure", step),
            });
        }
        Ok(())
    }

    fn missing(member: &str) -> VfsError {
        VfsError::Tool {
            program: "memtool".into(),
            status: 2,
            message: format!("no such member: {}", member),
        }
    }

    fn render(&self, members: &BTreeMap<String, Stored>) -> String {
        let mut out = String::new();
        match self.revision {
            ListingRevision::Legacy => {
                out.push_str("Archive tool 4.65  Copyright (c) 1999-2009\n\n");
                out.push_str(" Attr       Size Date     Time   Name\n");
                let separator = "------ ---------- -------- -----  ----------------\n";
                out.push_str(separator);
                for (name, stored) in members {
                    let (attr, size) = match stored {
                        Stored::Directory => ("D", 0),
                        Stored::File(data) => ("A", data.len()),
                    };
                    out.push_str(&format!(" {:<5}{:>11} 01-15-98 12:30  {}\n", attr, size, name));
                }
                out.push_str(separator);
            }
            ListingRevision::Current => {
                out.push_str("7-Zip 23.01 (x64)\n\n");
                out.push_str("   Date      Time    Attr         Size   Compressed  Name\n");
                let separator =
                    "------------------- ----- ------------ ------------  ------------------------\n";
                out.push_str(separator);
                for (name, stored) in members {
                    let (attr, size) = match stored {
                        Stored::Directory => ("D....", String::new()),
                        Stored::File(data) => ("....A", data.len().to_string()),
                    };
                    out.push_str(&format!(
                        "2024-03-05 10:20:30 {:<5} {:>12} {:>12}  {}\n",
                        attr, size, size, name
                    ));
                }
                out.push_str(separator);
            }
        }
        out.push_str(&format!("{} entries\n", members.len()));
        out
    }

    fn add_path(members: &mut BTreeMap<String, Stored>, workdir: &Path, member: &str, recursive: bool) -> Result<()> {
        let path = workdir.join(member);
        if path.is_dir() {
            members.insert(member.to_string(), Stored::Directory);
            if recursive {
                for child in fs::read_dir(&path)? {
                    let child = child?;
                    let name = format!("{}/{}", member, child.file_name().to_string_lossy());
                    Self::add_path(members, workdir, &name, true)?;
                }
            }
        } else {
            members.insert(member.to_string(), Stored::File(fs::read(&path)?));
        }
        Ok(())
    }
}

impl ArchiveTool for MemoryTool {
    fn version_banner(&self) -> Result<String> {
        self.step(ToolStep::Version)?;
        Ok(match self.revision {
            ListingRevision::Legacy => "Archive tool 4.65  Copyright (c) 1999-2009".into(),
            ListingRevision::Current => "7-Zip 23.01 (x64) : Copyright (c) 1999-2023".into(),
        })
    }

    fn list(&self, archive: &Path) -> Result<String> {
        self.step(ToolStep::List)?;
        let archives = self.archives.lock();
        let empty = BTreeMap::new();
        Ok(self.render(archives.get(archive).unwrap_or(&empty)))
    }

    fn extract_to(&self, archive: &Path, member: &str, out: &mut dyn Write) -> Result<u64> {
        self.step(ToolStep::Extract)?;
        let data = self.member(archive, member).ok_or_else(|| Self::missing(member))?;
        out.write_all(&data)?;
        Ok(data.len() as u64)
    }

    fn add(&self, archive: &Path, workdir: &Path, member: &str) -> Result<()> {
        self.step(ToolStep::Add)?;
        let mut archives = self.archives.lock();
        let members = archives.entry(archive.to_path_buf()).or_default();
        Self::add_path(members, workdir, member, false)
    }

    fn add_recursive(&self, archive: &Path, workdir: &Path, member: &str) -> Result<()> {
        self.step(ToolStep::Add)?;
        let mut archives = self.archives.lock();
        let members = archives.entry(archive.to_path_buf()).or_default();
        Self::add_path(members, workdir, member, true)
    }

    fn delete(&self, archive: &Path, member: &str) -> Result<()> {
        self.step(ToolStep::Delete)?;
        let mut archives = self.archives.lock();
        let members = archives.get_mut(archive).ok_or_else(|| Self::missing(member))?;
        if members.remove(member).is_none() {
            return Err(Self::missing(member));
        }

        let prefix = format!("{}/", member);
        members.retain(|name, _| !name.starts_with(&prefix));
        Ok(())
    }
}
