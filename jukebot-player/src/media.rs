//! Media source: URL allow-list, title lookup and stream source selection
//!
//! URLs are only ever handed to `yt-dlp` after they match a prefix from the
//! allow-list file. Local paths bypass the allow-list but must exist.

use crate::error::{Error, Result};
use crate::playback::session::SessionSource;
use crate::track::is_url;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Prefix the allow-list must carry before searches are run
pub const YOUTUBE_HOME: &str = "https://www.youtube.com/";

/// Watch URL for a YouTube video id
pub fn youtube_watch_url(video_id: &str) -> String {
    format!("{}watch?v={}", YOUTUBE_HOME, video_id)
}

/// Resolution and source construction for locators
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// True when `url` starts with an allowed prefix
    fn is_allowed(&self, url: &str) -> bool;

    /// Fetch a human-readable title for an allowed URL
    async fn resolve_title(&self, url: &str) -> Result<String>;

    /// Watch URL of the first YouTube result for free text
    ///
    /// # Returns
    /// `NotWhitelisted` unless YouTube is allowed, `TrackNotFound` when the
    /// search comes back empty
    async fn search_url(&self, query: &str) -> Result<String>;

    /// Turn a locator into something a voice session can stream
    ///
    /// # Returns
    /// `NotWhitelisted` for disallowed URLs, `TrackNotFound` for missing files
    fn build_source(&self, locator: &str) -> Result<SessionSource>;
}

/// URL prefixes that may be streamed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    prefixes: Vec<String>,
}

impl AllowList {
    pub fn new(prefixes: Vec<String>) -> Self {
        Self { prefixes }
    }

    /// Parse one prefix per line, skipping blanks and `#` comments
    pub fn parse(content: &str) -> Self {
        let mut prefixes = Vec::new();
        for line in content.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if !is_url(line) {
                warn!("Invalid allow-list entry ({}): must start with http:// or https://", line);
                continue;
            }
            if !line.ends_with('/') {
                warn!("Allow-list entry {} does not end with '/', this may allow URL bypasses", line);
            }
            prefixes.push(line.to_string());
        }
        Self::new(prefixes)
    }

    /// Load from a file; a missing file yields an empty list that rejects every URL
    pub async fn load(path: &Path) -> Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                let list = Self::parse(&content);
                info!("Allowed URL prefixes: {:?}", list.prefixes);
                Ok(list)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Allow-list {} not found, all URLs will be rejected", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn allows(&self, url: &str) -> bool {
        if self.prefixes.is_empty() {
            debug!("Allow-list is empty, rejecting {}", url);
            return false;
        }
        self.prefixes.iter().any(|prefix| url.starts_with(prefix.as_str()))
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }
}

/// `yt-dlp`-backed media source
#[derive(Debug, Clone)]
pub struct YtDlpMediaSource {
    allow_list: AllowList,
    ytdlp_path: PathBuf,
}

impl YtDlpMediaSource {
    pub fn new(allow_list: AllowList, ytdlp_path: impl Into<PathBuf>) -> Self {
        Self {
            allow_list,
            ytdlp_path: ytdlp_path.into(),
        }
    }
}

#[async_trait]
impl MediaSource for YtDlpMediaSource {
    fn is_allowed(&self, url: &str) -> bool {
        self.allow_list.allows(url)
    }

    async fn resolve_title(&self, url: &str) -> Result<String> {
        let output = Command::new(&self.ytdlp_path)
            .args(["--no-playlist", "-e", url])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::ResolutionFailed(format!("failed to run yt-dlp: {}", e)))?;

        if !output.status.success() {
            return Err(Error::ResolutionFailed(format!(
                "yt-dlp failed to get title for {} ({})",
                url, output.status
            )));
        }

        let title = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if title.is_empty() {
            return Ok(url.to_string());
        }
        Ok(title)
    }

    async fn search_url(&self, query: &str) -> Result<String> {
        if !self.is_allowed(YOUTUBE_HOME) {
            return Err(Error::NotWhitelisted(YOUTUBE_HOME.to_string()));
        }

        let output = Command::new(&self.ytdlp_path)
            .args(["--no-playlist", "--get-id", "--default-search", "ytsearch1", query])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::ResolutionFailed(format!("failed to run yt-dlp: {}", e)))?;

        if !output.status.success() {
            return Err(Error::ResolutionFailed(format!(
                "YouTube search failed for {} ({})",
                query, output.status
            )));
        }

        let video_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if video_id.is_empty() {
            return Err(Error::TrackNotFound(format!("no YouTube results for {}", query)));
        }
        debug!(query, video_id = %video_id, "YouTube search hit");
        Ok(youtube_watch_url(&video_id))
    }

    fn build_source(&self, locator: &str) -> Result<SessionSource> {
        if is_url(locator) {
            if !self.is_allowed(locator) {
                return Err(Error::NotWhitelisted(locator.to_string()));
            }
            return Ok(SessionSource::Url(locator.to_string()));
        }

        let path = PathBuf::from(locator);
        if !path.is_file() {
            return Err(Error::TrackNotFound(locator.to_string()));
        }
        Ok(SessionSource::File(path))
    }
}
