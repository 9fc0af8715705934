//! Command system for the host-facing verbs

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use vfs_fs::{Reference, VfsSession};

use crate::AppError;

/// Command identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandId(pub String);

impl CommandId {
    pub fn new(id: &str) -> Self {
        Self(id.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub const LIST: &'static str = "list";
    pub const RM: &'static str = "rm";
    pub const RMDIR: &'static str = "rmdir";
    pub const MKDIR: &'static str = "mkdir";
    pub const COPY_IN: &'static str = "copyin";
    pub const COPY_OUT: &'static str = "copyout";
}

/// Command with its positional arguments
#[derive(Debug, Clone)]
pub struct Command {
    pub id: CommandId,
    pub params: CommandParams,
}

#[derive(Debug, Clone, Default)]
pub struct CommandParams {
    /// Archive path or share URL
    pub reference: String,
    /// Member path inside the reference
    pub path: Option<String>,
    /// Local file for copyin/copyout
    pub local: Option<PathBuf>,
}

impl Command {
    pub fn new(id: &str, reference: &str) -> Self {
        Self {
            id: CommandId::new(id),
            params: CommandParams {
                reference: reference.to_string(),
                ..CommandParams::default()
            },
        }
    }

    pub fn with_path(mut self, path: &str) -> Self {
        self.params.path = Some(path.to_string());
        self
    }

    pub fn with_local(mut self, local: impl Into<PathBuf>) -> Self {
        self.params.local = Some(local.into());
        self
    }

    fn path(&self) -> Result<&str, AppError> {
        self.params
            .path
            .as_deref()
            .ok_or_else(|| AppError::Usage(format!("{}: missing member path", self.id.as_str())))
    }

    fn local(&self) -> Result<&PathBuf, AppError> {
        self.params
            .local
            .as_ref()
            .ok_or_else(|| AppError::Usage(format!("{}: missing local file", self.id.as_str())))
    }
}

/// Command handler trait
pub trait CommandHandler: Send + Sync {
    /// Run the command; listing output goes to `out`
    fn execute(&self, cmd: &Command, out: &mut dyn Write) -> Result<(), AppError>;
    fn can_execute(&self, cmd: &Command) -> bool;
}

/// Command dispatcher
pub struct CommandDispatcher {
    handlers: HashMap<String, Box<dyn CommandHandler>>,
}

impl CommandDispatcher {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Dispatcher with every verb bound to `session`
    pub fn with_session(session: Arc<VfsSession>) -> Self {
        let mut dispatcher = Self::new();
        dispatcher.register(CommandId::LIST, ListHandler(session.clone()));
        dispatcher.register(CommandId::RM, RemoveHandler(session.clone()));
        dispatcher.register(CommandId::RMDIR, RmdirHandler(session.clone()));
        dispatcher.register(CommandId::MKDIR, MkdirHandler(session.clone()));
        dispatcher.register(CommandId::COPY_IN, CopyInHandler(session.clone()));
        dispatcher.register(CommandId::COPY_OUT, CopyOutHandler(session));
        dispatcher
    }

    pub fn register<H: CommandHandler + 'static>(&mut self, command_id: &str, handler: H) {
        self.handlers.insert(command_id.to_string(), Box::new(handler));
    }

    pub fn dispatch(&self, cmd: &Command, out: &mut dyn Write) -> Result<(), AppError> {
        let Some(handler) = self.handlers.get(cmd.id.as_str()) else {
            tracing::warn!("Unknown command: {}", cmd.id.as_str());
            return Err(AppError::Usage(format!("unknown command {}", cmd.id.as_str())));
        };

        if !handler.can_execute(cmd) {
            return Err(AppError::Usage(format!("{}: missing arguments", cmd.id.as_str())));
        }

        tracing::debug!("Dispatching {} on {}", cmd.id.as_str(), cmd.params.reference);
        handler.execute(cmd, out)
    }
}

impl Default for CommandDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn reference(cmd: &Command) -> Result<Reference, AppError> {
    Ok(Reference::parse(&cmd.params.reference)?)
}

struct ListHandler(Arc<VfsSession>);

impl CommandHandler for ListHandler {
    fn execute(&self, cmd: &Command, out: &mut dyn Write) -> Result<(), AppError> {
        let entries = self.0.list(&reference(cmd)?)?;
        for entry in &entries {
            writeln!(out, "{}", entry.to_listing_line())?;
        }
        out.flush()?;
        Ok(())
    }

    fn can_execute(&self, _cmd: &Command) -> bool {
        true
    }
}

struct RemoveHandler(Arc<VfsSession>);

impl CommandHandler for RemoveHandler {
    fn execute(&self, cmd: &Command, _out: &mut dyn Write) -> Result<(), AppError> {
        Ok(self.0.remove(&reference(cmd)?, cmd.path()?)?)
    }

    fn can_execute(&self, cmd: &Command) -> bool {
        cmd.params.path.is_some()
    }
}

struct RmdirHandler(Arc<VfsSession>);

impl CommandHandler for RmdirHandler {
    fn execute(&self, cmd: &Command, _out: &mut dyn Write) -> Result<(), AppError> {
        Ok(self.0.rmdir(&reference(cmd)?, cmd.path()?)?)
    }

    fn can_execute(&self, cmd: &Command) -> bool {
        cmd.params.path.is_some()
    }
}

struct MkdirHandler(Arc<VfsSession>);

impl CommandHandler for MkdirHandler {
    fn execute(&self, cmd: &Command, _out: &mut dyn Write) -> Result<(), AppError> {
        Ok(self.0.mkdir(&reference(cmd)?, cmd.path()?)?)
    }

    fn can_execute(&self, cmd: &Command) -> bool {
        cmd.params.path.is_some()
    }
}

struct CopyInHandler(Arc<VfsSession>);

impl CommandHandler for CopyInHandler {
    fn execute(&self, cmd: &Command, _out: &mut dyn Write) -> Result<(), AppError> {
        Ok(self.0.copy_in(&reference(cmd)?, cmd.path()?, cmd.local()?)?)
    }

    fn can_execute(&self, cmd: &Command) -> bool {
        cmd.params.path.is_some() && cmd.params.local.is_some()
    }
}

struct CopyOutHandler(Arc<VfsSession>);

impl CommandHandler for CopyOutHandler {
    fn execute(&self, cmd: &Command, _out: &mut dyn Write) -> Result<(), AppError> {
        let reference = reference(cmd)?;
        let path = cmd.path()?;
        let destination = cmd.local()?;

        let mut writer = BufWriter::new(File::create(destination)?);
        let result = self
            .0
            .copy_out(&reference, path, &mut writer)
            .map_err(AppError::from)
            .and_then(|n| writer.flush().map(|_| n).map_err(AppError::from));

        match result {
            Ok(n) => {
                tracing::info!("Copied {} bytes of {} to {}", n, path, destination.display());
                Ok(())
            }
            Err(e) => {
                drop(writer);
                if let Err(cleanup) = std::fs::remove_file(destination) {
                    tracing::warn!("Failed to remove partial {}: {}", destination.display(), cleanup);
                }
                Err(e)
            }
        }
    }

    fn can_execute(&self, cmd: &Command) -> bool {
        cmd.params.path.is_some() && cmd.params.local.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{build_session, AppConfig};
    use tempfile::TempDir;

    fn setup() -> (TempDir, CommandDispatcher) {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("mnt/nas/media")).unwrap();

        let mut config = AppConfig::default();
        config.share.mount_root = root.path().join("mnt");
        config.staging.temp_dir = Some(root.path().to_path_buf());
        config.archive.commands.program = "/nonexistent/extvfs-archiver".into();

        let session = Arc::new(build_session(&config));
        (root, CommandDispatcher::with_session(session))
    }

    #[test]
    fn test_unknown_command_is_usage_error() {
        let (_root, dispatcher) = setup();
        let cmd = Command::new("frobnicate", "smb://nas/media");
        assert!(dispatcher.dispatch(&cmd, &mut Vec::<u8>::new()).unwrap_err().is_usage());
    }

    #[test]
    fn test_missing_arguments_is_usage_error() {
        let (_root, dispatcher) = setup();
        let cmd = Command::new(CommandId::COPY_IN, "smb://nas/media").with_path("x");
        assert!(dispatcher.dispatch(&cmd, &mut Vec::<u8>::new()).unwrap_err().is_usage());
    }

    #[test]
    fn test_share_verbs() {
        let (root, dispatcher) = setup();
        let local = root.path().join("upload.txt");
        std::fs::write(&local, b"share me").unwrap();

        let mut out: Vec<u8> = Vec::new();
        let run = |cmd: Command, out: &mut Vec<u8>| dispatcher.dispatch(&cmd, out);

        run(Command::new(CommandId::MKDIR, "smb://nas/media").with_path("dir"), &mut out).unwrap();
        run(
            Command::new(CommandId::COPY_IN, "smb://nas/media")
                .with_path("dir/upload.txt")
                .with_local(&local),
            &mut out,
        )
        .unwrap();

        let back = root.path().join("back.txt");
        run(
            Command::new(CommandId::COPY_OUT, "smb://nas/media")
                .with_path("dir/upload.txt")
                .with_local(&back),
            &mut out,
        )
        .unwrap();
        assert_eq!(std::fs::read(&back).unwrap(), b"share me");

        run(Command::new(CommandId::LIST, "smb://nas/media/dir"), &mut out).unwrap();
        let listing = String::from_utf8(out.clone()).unwrap();
        assert_eq!(listing.lines().count(), 1);
        assert!(listing.starts_with('-'));
        assert!(listing.trim_end().ends_with(" upload.txt"));

        run(Command::new(CommandId::RM, "smb://nas/media").with_path("dir/upload.txt"), &mut out).unwrap();
        run(Command::new(CommandId::RMDIR, "smb://nas/media").with_path("dir"), &mut out).unwrap();
        assert!(!root.path().join("mnt/nas/media/dir").exists());
    }

    #[test]
    fn test_failed_copy_out_leaves_no_partial_file() {
        let (root, dispatcher) = setup();
        let dest = root.path().join("out.bin");

        let cmd = Command::new(CommandId::COPY_OUT, "smb://nas/media")
            .with_path("missing.bin")
            .with_local(&dest);
        let err = dispatcher.dispatch(&cmd, &mut Vec::<u8>::new()).unwrap_err();
        assert!(!err.is_usage());
        assert!(!dest.exists());
    }

    #[test]
    fn test_archive_tool_failure_is_reported() {
        let (root, dispatcher) = setup();
        let archive = root.path().join("a.7z");
        let cmd = Command::new(CommandId::LIST, archive.to_str().unwrap());

        let err = dispatcher.dispatch(&cmd, &mut Vec::<u8>::new()).unwrap_err();
        assert!(!err.is_usage());
        assert_eq!(err.code(), libc::ENOENT);
    }
}
