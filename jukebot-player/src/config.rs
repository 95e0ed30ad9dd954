//! Configuration for the jukebot player
//!
//! Settings come from a TOML bootstrap file (`jukebot.toml`). Every key is
//! optional; missing keys and a missing file fall back to built-in defaults.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments
//! 2. Environment variables (`JUKEBOT_CONFIG`, `JUKEBOT_ROOT_FOLDER`)
//! 3. TOML configuration file
//! 4. Built-in defaults

use crate::dispatch::BurstPolicy;
use crate::playback::ControllerOptions;
use crate::process::ProcessVoiceConfig;
use jukebot_common::config::{LoggingConfig, RootFolderInitializer, RootFolderResolver};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Bot's own user name
    pub username: String,

    /// Prefix that marks a chat line as a command
    pub command_prefix: String,

    /// Initial volume in [0, 1]
    pub volume: f32,

    /// Rows shown by listing commands
    pub max_lines: usize,

    /// Root folder (optional, see `RootFolderResolver`)
    pub root_folder: Option<PathBuf>,

    /// Track catalog; defaults to `<root>/media.db`
    pub database_path: Option<PathBuf>,

    /// URL prefix allow-list, one prefix per line
    pub whitelist_path: PathBuf,

    /// Saved playlists; defaults to `<root>/playlists`
    pub playlist_dir: Option<PathBuf>,

    /// Name used by `save`/`load` without an argument
    pub playlist_name: String,

    /// Bound on waiting for a session to stop
    pub stop_timeout_ms: u64,

    pub ffmpeg_path: PathBuf,
    pub ytdlp_path: PathBuf,

    /// PCM output file or FIFO (audio is discarded when unset)
    pub pcm_output: Option<PathBuf>,

    pub dispatch: DispatchConfig,
    pub logging: LoggingConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            username: "jukebot".to_string(),
            command_prefix: "!".to_string(),
            volume: 0.25,
            max_lines: 5,
            root_folder: None,
            database_path: None,
            whitelist_path: PathBuf::from("whitelist.txt"),
            playlist_dir: None,
            playlist_name: "default".to_string(),
            stop_timeout_ms: 3000,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ytdlp_path: PathBuf::from("yt-dlp"),
            pcm_output: None,
            dispatch: DispatchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Outbound message throttling
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DispatchConfig {
    pub burst_limit: u32,
    pub burst_window_ms: u64,
    pub burst_pause_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            burst_limit: 5,
            burst_window_ms: 5000,
            burst_pause_ms: 1000,
        }
    }
}

impl DispatchConfig {
    pub fn policy(&self) -> BurstPolicy {
        BurstPolicy {
            limit: self.burst_limit,
            window: Duration::from_millis(self.burst_window_ms),
            pause: Duration::from_millis(self.burst_pause_ms),
        }
    }
}

/// Command-line overrides
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub root_folder: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    pub whitelist_path: Option<PathBuf>,
    pub log_level: Option<String>,
}

/// Fully resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub username: String,
    pub command_prefix: String,
    pub volume: f32,
    pub max_lines: usize,
    pub root_folder: PathBuf,
    pub database_path: PathBuf,
    pub whitelist_path: PathBuf,
    pub playlist_dir: PathBuf,
    pub playlist_name: String,
    pub stop_timeout: Duration,
    pub ffmpeg_path: PathBuf,
    pub ytdlp_path: PathBuf,
    pub pcm_output: Option<PathBuf>,
    pub dispatch: DispatchConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Merge a parsed TOML config with overrides
    pub fn resolve(toml_config: TomlConfig, overrides: ConfigOverrides) -> Self {
        let root_folder = RootFolderResolver::new()
            .with_cli_arg(overrides.root_folder)
            .with_toml_value(toml_config.root_folder)
            .resolve();
        let layout = RootFolderInitializer::new(root_folder.clone());

        let database_path = overrides
            .database_path
            .or(toml_config.database_path)
            .unwrap_or_else(|| layout.database_path());
        let playlist_dir = toml_config
            .playlist_dir
            .unwrap_or_else(|| layout.playlist_dir());

        let mut logging = toml_config.logging;
        if let Some(level) = overrides.log_level {
            logging.level = level;
        }

        let config = Self {
            username: toml_config.username,
            command_prefix: toml_config.command_prefix,
            volume: toml_config.volume.clamp(0.0, 1.0),
            max_lines: toml_config.max_lines.max(1),
            root_folder,
            database_path,
            whitelist_path: overrides.whitelist_path.unwrap_or(toml_config.whitelist_path),
            playlist_dir,
            playlist_name: toml_config.playlist_name,
            stop_timeout: Duration::from_millis(toml_config.stop_timeout_ms),
            ffmpeg_path: toml_config.ffmpeg_path,
            ytdlp_path: toml_config.ytdlp_path,
            pcm_output: toml_config.pcm_output,
            dispatch: toml_config.dispatch,
            logging,
        };
        info!(
            database = %config.database_path.display(),
            whitelist = %config.whitelist_path.display(),
            "Configuration resolved"
        );
        config
    }

    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            stop_timeout: self.stop_timeout,
            initial_volume: self.volume,
        }
    }

    pub fn process_voice(&self) -> ProcessVoiceConfig {
        ProcessVoiceConfig {
            ffmpeg_path: self.ffmpeg_path.clone(),
            ytdlp_path: self.ytdlp_path.clone(),
            output: self.pcm_output.clone(),
        }
    }
}
