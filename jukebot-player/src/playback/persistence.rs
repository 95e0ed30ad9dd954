//! Saved playlists
//!
//! A saved playlist is the remaining part of the queue (current entry
//! onward) written as JSON under the playlist directory.

use crate::error::{Error, Result};
use crate::track::Track;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedPlaylist {
    pub saved_at: DateTime<Utc>,
    pub tracks: Vec<Track>,
}

/// Path of a named playlist; names cannot escape the directory
pub fn playlist_path(dir: &Path, name: &str) -> Result<PathBuf> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && !name.starts_with('.');
    if !valid {
        return Err(Error::Persistence(format!("invalid playlist name: {:?}", name)));
    }
    Ok(dir.join(format!("{}.json", name)))
}

/// Write `tracks` to `<dir>/<name>.json`
///
/// Returns false (and writes nothing) when there is nothing to save.
pub async fn save_playlist(dir: &Path, name: &str, tracks: &[Track]) -> Result<bool> {
    if tracks.is_empty() {
        debug!(name, "Nothing to save");
        return Ok(false);
    }

    let path = playlist_path(dir, name)?;
    tokio::fs::create_dir_all(dir).await?;

    let saved = SavedPlaylist {
        saved_at: Utc::now(),
        tracks: tracks.to_vec(),
    };
    let json = serde_json::to_string_pretty(&saved)
        .map_err(|e| Error::Persistence(e.to_string()))?;
    tokio::fs::write(&path, json).await?;

    info!(path = %path.display(), count = tracks.len(), "Saved playlist");
    Ok(true)
}

/// Read a saved playlist; `None` when it does not exist
pub async fn load_playlist(dir: &Path, name: &str) -> Result<Option<SavedPlaylist>> {
    let path = playlist_path(dir, name)?;
    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let saved: SavedPlaylist = serde_json::from_str(&content)
        .map_err(|e| Error::Persistence(format!("{}: {}", path.display(), e)))?;
    info!(path = %path.display(), count = saved.tracks.len(), "Loaded playlist");
    Ok(Some(saved))
}
