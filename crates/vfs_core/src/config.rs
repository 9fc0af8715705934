//! Application configuration

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use vfs_fs::archive::{RevisionSetting, ToolCommands};

/// Overrides the config file location
pub const CONFIG_ENV: &str = "EXTVFS_CONFIG";

/// Overrides where staging areas are created
pub const TMPDIR_ENV: &str = "EXTVFS_TMPDIR";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub staging: StagingConfig,
    pub archive: ArchiveConfig,
    pub share: ShareConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Filter directive used when `EXTVFS_LOG` is unset
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    pub temp_dir: Option<PathBuf>,
}

impl StagingConfig {
    /// Directory under which staging areas are created
    pub fn root(&self) -> PathBuf {
        self.root_with(std::env::var_os(TMPDIR_ENV))
    }

    fn root_with(&self, env: Option<OsString>) -> PathBuf {
        env.filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| self.temp_dir.clone())
            .unwrap_or_else(std::env::temp_dir)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    #[serde(flatten)]
    pub commands: ToolCommands,
    pub revision: RevisionSetting,
    /// First tool major version that prints the current listing layout
    pub current_since_major: u32,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            commands: ToolCommands::default(),
            revision: RevisionSetting::Auto,
            current_since_major: 9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShareConfig {
    /// `smb://server/share` is reached at `<mount_root>/server/share`
    pub mount_root: PathBuf,
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            mount_root: PathBuf::from("/mnt/smb"),
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &Path) -> anyhow::Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            let config = Self::from_toml(&content)?;
            tracing::debug!("Configuration loaded from {:?}", config_path);
            Ok(config)
        } else {
            tracing::debug!("Using default configuration");
            Ok(Self::default())
        }
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Get the configuration file path
    pub fn config_path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
            return PathBuf::from(path);
        }

        ProjectDirs::from("io", "extvfs", "extvfs")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("./config.toml"))
    }
}
