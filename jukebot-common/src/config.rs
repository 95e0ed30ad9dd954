//! Configuration loading and root folder resolution
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`JUKEBOT_ROOT_FOLDER`)
//! 3. TOML config file (`root_folder` key)
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing TOML file is never fatal: callers get the type's defaults and a
//! warning in the log.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable consulted for the root folder
pub const ROOT_FOLDER_ENV: &str = "JUKEBOT_ROOT_FOLDER";

/// File name of the track catalog inside the root folder
pub const CATALOG_DB_FILE: &str = "media.db";

/// Directory name for saved playlists inside the root folder
pub const PLAYLIST_DIR: &str = "playlists";

/// Logging configuration
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Built-in defaults used when nothing else is configured
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: get_default_root_folder(),
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

/// Get OS-dependent default root folder path
pub fn get_default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/jukebot
        dirs::data_local_dir()
            .map(|d| d.join("jukebot"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/jukebot"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("jukebot"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/jukebot"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("jukebot"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\jukebot"))
    } else {
        PathBuf::from("./jukebot_data")
    }
}

/// Resolves the root folder from CLI, environment, TOML and defaults
#[derive(Debug, Clone, Default)]
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
    toml_value: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value passed on the command line
    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    /// Value read from the TOML file
    pub fn with_toml_value(mut self, path: Option<PathBuf>) -> Self {
        self.toml_value = path;
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            info!("Root folder: {} (command line)", path.display());
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.is_empty() {
                info!("Root folder: {} ({})", path, ROOT_FOLDER_ENV);
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_value {
            info!("Root folder: {} (config file)", path.display());
            return path.clone();
        }

        let path = get_default_root_folder();
        info!("Root folder: {} (default)", path.display());
        path
    }
}

/// Creates the root folder layout on first run
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    /// Create the root folder (and playlist directory) if missing
    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            info!("Created root folder: {}", self.root_folder.display());
        } else if !self.root_folder.is_dir() {
            return Err(Error::Config(format!(
                "Root folder {} is not a directory",
                self.root_folder.display()
            )));
        }

        std::fs::create_dir_all(self.playlist_dir())?;
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(CATALOG_DB_FILE)
    }

    pub fn playlist_dir(&self) -> PathBuf {
        self.root_folder.join(PLAYLIST_DIR)
    }
}

/// Load a TOML file into `T`
///
/// A missing file yields `T::default()` with a warning; an unreadable or
/// malformed file is a configuration error.
pub fn load_toml_or_default<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        warn!(
            "Config file {} not found, using built-in defaults",
            path.display()
        );
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)?;
    let parsed = toml::from_str::<T>(&content).map_err(|e| {
        Error::Config(format!("Failed to parse {}: {}", path.display(), e))
    })?;

    info!("Loaded configuration from {}", path.display());
    Ok(parsed)
}
