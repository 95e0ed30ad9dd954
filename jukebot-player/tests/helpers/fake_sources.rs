//! In-memory media source and track catalog

use async_trait::async_trait;
use jukebot_player::catalog::TrackCatalog;
use jukebot_player::error::{Error, Result};
use jukebot_player::media::{youtube_watch_url, AllowList, MediaSource, YOUTUBE_HOME};
use jukebot_player::playback::SessionSource;
use jukebot_player::track::{is_url, Track};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Media source with a fixed allow-list and no filesystem access
pub struct FakeMedia {
    allow_list: AllowList,
}

impl FakeMedia {
    pub fn allowing(prefixes: &[&str]) -> Self {
        Self {
            allow_list: AllowList::new(prefixes.iter().map(|p| p.to_string()).collect()),
        }
    }
}

#[async_trait]
impl MediaSource for FakeMedia {
    fn is_allowed(&self, url: &str) -> bool {
        self.allow_list.allows(url)
    }

    async fn resolve_title(&self, url: &str) -> Result<String> {
        if url.contains("broken") {
            return Err(Error::ResolutionFailed(url.to_string()));
        }
        Ok(format!("Title of {}", url))
    }

    /// Query text becomes the video id; "nothing" finds no results
    async fn search_url(&self, query: &str) -> Result<String> {
        if !self.is_allowed(YOUTUBE_HOME) {
            return Err(Error::NotWhitelisted(YOUTUBE_HOME.to_string()));
        }
        if query.contains("nothing") {
            return Err(Error::TrackNotFound(format!("no YouTube results for {}", query)));
        }
        Ok(youtube_watch_url(&query.replace(' ', "-")))
    }

    fn build_source(&self, locator: &str) -> Result<SessionSource> {
        if is_url(locator) {
            if !self.is_allowed(locator) {
                return Err(Error::NotWhitelisted(locator.to_string()));
            }
            return Ok(SessionSource::Url(locator.to_string()));
        }
        if locator.contains("missing") {
            return Err(Error::TrackNotFound(locator.to_string()));
        }
        Ok(SessionSource::File(PathBuf::from(locator)))
    }
}

/// Catalog of `/music/<n>.mp3` tracks with predictable "random" picks
pub struct FakeCatalog {
    tracks: Vec<Track>,
    cursor: AtomicUsize,
    fail_random: AtomicBool,
}

impl FakeCatalog {
    pub fn with_tracks(count: usize) -> Self {
        let tracks = (1..=count)
            .map(|n| Track::new(format!("/music/{}.mp3", n), format!("Artist - Song {}", n)))
            .collect();
        Self {
            tracks,
            cursor: AtomicUsize::new(0),
            fail_random: AtomicBool::new(false),
        }
    }

    /// Track for catalog id `id`, which must exist
    pub fn track(&self, id: usize) -> Track {
        self.tracks[id - 1].clone()
    }

    pub fn fail_random(&self, fail: bool) {
        self.fail_random.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl TrackCatalog for FakeCatalog {
    async fn lookup_by_id(&self, id: i64) -> Result<Track> {
        if id < 1 || id as usize > self.tracks.len() {
            return Err(Error::TrackNotFound(id.to_string()));
        }
        Ok(self.tracks[id as usize - 1].clone())
    }

    /// Walks the catalog backwards from the last id
    async fn random_ids(&self, count: usize) -> Result<Vec<i64>> {
        if self.fail_random.load(Ordering::SeqCst) {
            return Err(Error::TrackNotFound("catalog unavailable".to_string()));
        }
        if self.tracks.is_empty() {
            return Ok(Vec::new());
        }
        let len = self.tracks.len();
        Ok((0..count.min(len))
            .map(|_| {
                let step = self.cursor.fetch_add(1, Ordering::SeqCst) % len;
                (len - step) as i64
            })
            .collect())
    }

    async fn max_id(&self) -> Result<i64> {
        Ok(self.tracks.len() as i64)
    }

    async fn search(&self, query: &str) -> Result<Vec<String>> {
        Ok(self
            .tracks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.display_name.contains(query))
            .map(|(i, t)| format!("#{} | {}", i + 1, t.display_name))
            .collect())
    }
}
