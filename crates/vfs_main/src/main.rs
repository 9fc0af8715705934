//! extvfs - archive and share contents as plain directories
//!
//! One verb per invocation. Recognized verbs exit 0 even when the backend
//! fails; the failure is printed on stderr. Bad usage exits 1.

use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use vfs_core::{build_session, AppConfig, Command, CommandDispatcher, CommandId};

#[derive(Parser, Debug)]
#[command(name = "extvfs", version, about = "Browse and modify archives and network shares")]
struct Cli {
    #[command(subcommand)]
    verb: Verb,
}

#[derive(Subcommand, Debug)]
enum Verb {
    /// List every entry of an archive, or one directory of a share
    List { reference: String },
    /// Delete a member
    Rm { reference: String, path: String },
    /// Delete a directory member
    Rmdir { reference: String, path: String },
    /// Create a directory member
    Mkdir { reference: String, path: String },
    /// Insert a local file as a member
    Copyin {
        reference: String,
        path: String,
        source: PathBuf,
    },
    /// Extract a member into a local file
    Copyout {
        reference: String,
        path: String,
        destination: PathBuf,
    },
}

impl Verb {
    fn into_command(self) -> Command {
        match self {
            Verb::List { reference } => Command::new(CommandId::LIST, &reference),
            Verb::Rm { reference, path } => Command::new(CommandId::RM, &reference).with_path(&path),
            Verb::Rmdir { reference, path } => Command::new(CommandId::RMDIR, &reference).with_path(&path),
            Verb::Mkdir { reference, path } => Command::new(CommandId::MKDIR, &reference).with_path(&path),
            Verb::Copyin {
                reference,
                path,
                source,
            } => Command::new(CommandId::COPY_IN, &reference)
                .with_path(&path)
                .with_local(source),
            Verb::Copyout {
                reference,
                path,
                destination,
            } => Command::new(CommandId::COPY_OUT, &reference)
                .with_path(&path)
                .with_local(destination),
        }
    }
}

const USAGE_EXIT: u8 = 1;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(USAGE_EXIT)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let (config, config_error) = match AppConfig::load() {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };

    // Keep the guard alive until exit so the log file is flushed
    let _log_guard = match vfs_log::init(&config.general.log_level) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("extvfs: logging disabled: {}", e);
            None
        }
    };

    if let Some(e) = config_error {
        tracing::warn!("Failed to load {:?}, using defaults: {:#}", AppConfig::config_path(), e);
    }

    if let Err(e) = vfs_log::cleanup_old_logs(14) {
        tracing::warn!("Failed to cleanup old logs: {}", e);
    }

    run(cli.verb.into_command(), &config)
}

fn run(cmd: Command, config: &AppConfig) -> ExitCode {
    let dispatcher = CommandDispatcher::with_session(Arc::new(build_session(config)));
    let verb = cmd.id.as_str().to_string();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match dispatcher.dispatch(&cmd, &mut out) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_usage() => {
            eprintln!("extvfs: {}", e);
            ExitCode::from(USAGE_EXIT)
        }
        Err(e) => {
            let _ = out.flush();
            tracing::info!("{} failed: {}", verb, e);
            eprintln!("extvfs: {}: {}", verb, e.user_message());
            ExitCode::SUCCESS
        }
    }
}
