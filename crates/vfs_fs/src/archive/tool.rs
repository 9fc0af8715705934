//! Archive tool invocation
//!
//! The archive tool is an external program driven through its command line.
//! `ArchiveTool` is the seam between the adapter and that process.

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use crate::encoding::{decode_listing, EncodingHint};
use crate::{Result, VfsError};

const ARCHIVE_PLACEHOLDER: &str = "{archive}";
const MEMBER_PLACEHOLDER: &str = "{member}";

/// Operations the adapter needs from an archive tool
pub trait ArchiveTool: Send + Sync {
    /// Raw banner text used to pick the listing revision
    fn version_banner(&self) -> Result<String>;

    /// Full listing output
    fn list(&self, archive: &Path) -> Result<String>;

    /// Stream one member's bytes into `out`
    fn extract_to(&self, archive: &Path, member: &str, out: &mut dyn Write) -> Result<u64>;

    /// Add `workdir/member` to the archive, stored as `member`
    fn add(&self, archive: &Path, workdir: &Path, member: &str) -> Result<()>;

    /// Add `workdir/member` and everything below it
    fn add_recursive(&self, archive: &Path, workdir: &Path, member: &str) -> Result<()>;

    fn delete(&self, archive: &Path, member: &str) -> Result<()>;
}

/// Command line templates for the archive tool
///
/// `{archive}` and `{member}` are substituted as whole arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolCommands {
    pub program: String,
    pub version_args: Vec<String>,
    pub list_args: Vec<String>,
    pub extract_args: Vec<String>,
    pub add_args: Vec<String>,
    pub add_recursive_args: Vec<String>,
    pub delete_args: Vec<String>,
}

impl Default for ToolCommands {
    fn default() -> Self {
        let args = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        Self {
            program: "7z".to_string(),
            version_args: Vec::new(),
            list_args: args(&["l", "--", ARCHIVE_PLACEHOLDER]),
            extract_args: args(&["e", "-so", "--", ARCHIVE_PLACEHOLDER, MEMBER_PLACEHOLDER]),
            add_args: args(&["a", "--", ARCHIVE_PLACEHOLDER, MEMBER_PLACEHOLDER]),
            add_recursive_args: args(&["a", "-r", "--", ARCHIVE_PLACEHOLDER, MEMBER_PLACEHOLDER]),
            delete_args: args(&["d", "--", ARCHIVE_PLACEHOLDER, MEMBER_PLACEHOLDER]),
        }
    }
}

/// Runs the archive tool as a child process
#[derive(Debug, Clone)]
pub struct ExternalTool {
    commands: ToolCommands,
    hint: EncodingHint,
}

impl ExternalTool {
    pub fn new(commands: ToolCommands) -> Self {
        Self {
            commands,
            hint: EncodingHint::from_env(),
        }
    }

    pub fn program(&self) -> &str {
        &self.commands.program
    }

    fn command(&self, template: &[String], archive: Option<&Path>, member: Option<&str>) -> Result<Command> {
        let archive = archive.map(absolute).transpose()?;
        let mut cmd = Command::new(&self.commands.program);

        for arg in template {
            let arg: OsString = match arg.as_str() {
                ARCHIVE_PLACEHOLDER => archive
                    .as_ref()
                    .map(|p| p.clone().into_os_string())
                    .unwrap_or_default(),
                MEMBER_PLACEHOLDER => member.unwrap_or_default().into(),
                other => other.into(),
            };
            cmd.arg(arg);
        }

        cmd.stdin(Stdio::null());
        Ok(cmd)
    }

    fn run(&self, mut cmd: Command) -> Result<Output> {
        tracing::debug!("Running {:?}", cmd);

        let output = cmd.output().map_err(|e| self.spawn_error(e))?;
        if !output.status.success() {
            return Err(self.exit_error(output.status.code(), &output.stderr));
        }

        Ok(output)
    }

    fn spawn_error(&self, e: std::io::Error) -> VfsError {
        tracing::error!("Failed to run {}: {}", self.commands.program, e);
        VfsError::from(e)
    }

    fn exit_error(&self, status: Option<i32>, stderr: &[u8]) -> VfsError {
        let message = decode_listing(stderr, self.hint).trim().to_string();
        VfsError::Tool {
            program: self.commands.program.clone(),
            status: status.unwrap_or(-1),
            message,
        }
    }
}

impl ArchiveTool for ExternalTool {
    fn version_banner(&self) -> Result<String> {
        let mut cmd = self.command(&self.commands.version_args, None, None)?;

        // banners come with usage text and a non-zero status on some tools
        let output = cmd.output().map_err(|e| self.spawn_error(e))?;
        let mut text = decode_listing(&output.stdout, self.hint);
        text.push_str(&decode_listing(&output.stderr, self.hint));
        Ok(text)
    }

    fn list(&self, archive: &Path) -> Result<String> {
        let cmd = self.command(&self.commands.list_args, Some(archive), None)?;
        let output = self.run(cmd)?;
        Ok(decode_listing(&output.stdout, self.hint))
    }

    fn extract_to(&self, archive: &Path, member: &str, out: &mut dyn Write) -> Result<u64> {
        let mut cmd = self.command(&self.commands.extract_args, Some(archive), Some(member))?;
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        tracing::debug!("Running {:?}", cmd);

        let mut child = cmd.spawn().map_err(|e| self.spawn_error(e))?;

        // drain stderr on the side so a chatty tool cannot block on a full pipe
        let stderr_reader = child.stderr.take().map(|mut stderr| {
            std::thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf);
                buf
            })
        });

        let copied = match child.stdout.take() {
            Some(mut stdout) => std::io::copy(&mut stdout, out),
            None => Ok(0),
        };

        let status = child.wait()?;
        let stderr = stderr_reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if !status.success() {
            return Err(self.exit_error(status.code(), &stderr));
        }

        Ok(copied?)
    }

    fn add(&self, archive: &Path, workdir: &Path, member: &str) -> Result<()> {
        let mut cmd = self.command(&self.commands.add_args, Some(archive), Some(member))?;
        cmd.current_dir(workdir);
        self.run(cmd).map(|_| ())
    }

    fn add_recursive(&self, archive: &Path, workdir: &Path, member: &str) -> Result<()> {
        let mut cmd = self.command(&self.commands.add_recursive_args, Some(archive), Some(member))?;
        cmd.current_dir(workdir);
        self.run(cmd).map(|_| ())
    }

    fn delete(&self, archive: &Path, member: &str) -> Result<()> {
        let cmd = self.command(&self.commands.delete_args, Some(archive), Some(member))?;
        self.run(cmd).map(|_| ())
    }
}

/// Tool commands run inside the staging dir, so relative archive paths must
/// be anchored first
fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
