//! Ordered track queue with a current position
//!
//! Entries before the position are history and are never removed; they stay
//! visible to persistence but not to `count()` or `list()`.
//!
//! Invariant: `0 <= position <= entries.len()`.

use crate::catalog::TrackCatalog;
use crate::error::{Error, Result};
use crate::media::MediaSource;
use crate::messages::strip_html_tags;
use crate::track::{is_url, Track};
use tracing::debug;

/// In-memory queue of resolved tracks
#[derive(Debug, Clone, Default)]
pub struct TrackQueue {
    entries: Vec<Track>,
    position: usize,
}

impl TrackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the end
    pub fn push(&mut self, track: Track) {
        self.entries.push(track);
    }

    /// Insert immediately after the current entry
    ///
    /// History is kept; the position does not move. On an empty or exhausted
    /// queue the track lands at the current position.
    pub fn insert_next(&mut self, track: Track) {
        let at = (self.position + 1).min(self.entries.len());
        self.entries.insert(at, track);
    }

    pub fn current(&self) -> Option<&Track> {
        self.entries.get(self.position)
    }

    pub fn has_next(&self) -> bool {
        self.position + 1 < self.entries.len()
    }

    /// Advance one entry if possible and return the new current entry
    pub fn next(&mut self) -> Option<&Track> {
        if !self.has_next() {
            return None;
        }
        self.position += 1;
        self.current()
    }

    /// Move the position by `amount`
    ///
    /// No movement when the result would be negative or there is no next
    /// entry. Overshooting the end advances by exactly one.
    pub fn skip(&mut self, amount: i64) -> Option<&Track> {
        let target = self.position as i64 + amount;
        if target < 0 || !self.has_next() {
            debug!(position = self.position, amount, "Skip rejected");
            return None;
        }

        if target >= self.entries.len() as i64 {
            self.position += 1;
        } else {
            self.position = target as usize;
        }
        self.current()
    }

    /// Entries from the position forward, including the current one
    pub fn count(&self) -> usize {
        self.entries.len() - self.position
    }

    /// Total entries including history
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Display names from the position forward, at most `max` of them
    pub fn list(&self, max: usize) -> Vec<String> {
        self.remaining()
            .iter()
            .take(max)
            .map(|t| t.display_name.clone())
            .collect()
    }

    /// Current and upcoming entries
    pub fn remaining(&self) -> &[Track] {
        &self.entries[self.position..]
    }

    /// Replace all entries and rewind to the start
    pub fn replace(&mut self, entries: Vec<Track>) {
        self.entries = entries;
        self.position = 0;
    }
}

/// Resolve raw user input into a playable track
///
/// # Arguments
/// * `input` - catalog id, URL, or chat text that may carry HTML markup
///
/// # Returns
/// The resolved track, or `NotWhitelisted` / `TrackNotFound` /
/// `ResolutionFailed` describing why nothing can be queued
pub async fn resolve_track(
    input: &str,
    catalog: &dyn TrackCatalog,
    media: &dyn MediaSource,
) -> Result<Track> {
    let cleaned = strip_html_tags(input);
    let locator = cleaned.trim();

    if locator.is_empty() {
        return Err(Error::TrackNotFound("nothing to resolve".to_string()));
    }

    if let Ok(id) = locator.parse::<i64>() {
        return catalog.lookup_by_id(id).await;
    }

    if is_url(locator) {
        if !media.is_allowed(locator) {
            return Err(Error::NotWhitelisted(locator.to_string()));
        }
        let title = media
            .resolve_title(locator)
            .await
            .map_err(|e| match e {
                Error::ResolutionFailed(_) => e,
                other => Error::ResolutionFailed(other.to_string()),
            })?;
        return Ok(Track::new(locator, title));
    }

    Err(Error::TrackNotFound(format!("{} (invalid id?)", locator)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_of(names: &[&str]) -> TrackQueue {
        let mut queue = TrackQueue::new();
        for name in names {
            queue.push(Track::new(format!("/music/{}.mp3", name), *name));
        }
        queue
    }

    #[test]
    fn test_empty_queue() {
        let mut queue = TrackQueue::new();
        assert!(queue.is_empty());
        assert!(queue.current().is_none());
        assert!(!queue.has_next());
        assert!(queue.next().is_none());
        assert_eq!(queue.count(), 0);
        assert!(queue.list(5).is_empty());
    }

    #[test]
    fn test_next_advances_one() {
        let mut queue = queue_of(&["a", "b", "c"]);
        assert_eq!(queue.current().unwrap().display_name, "a");
        assert_eq!(queue.next().unwrap().display_name, "b");
        assert_eq!(queue.count(), 2);
        assert_eq!(queue.size(), 3);
    }

    #[test]
    fn test_next_on_last_entry_stays() {
        let mut queue = queue_of(&["a"]);
        assert!(queue.next().is_none());
        assert_eq!(queue.position(), 0);
    }

    #[test]
    fn test_skip_boundaries() {
        let mut queue = queue_of(&["a", "b", "c"]);

        // Overshoot moves by exactly one
        assert_eq!(queue.skip(10).unwrap().display_name, "b");
        assert_eq!(queue.position(), 1);

        // Negative result is rejected
        assert!(queue.skip(-5).is_none());
        assert_eq!(queue.position(), 1);

        // Going back is allowed while a next entry exists
        assert_eq!(queue.skip(-1).unwrap().display_name, "a");

        queue.skip(2);
        assert_eq!(queue.position(), 2);

        // No next entry: nothing moves
        assert!(queue.skip(1).is_none());
        assert_eq!(queue.position(), 2);
    }

    #[test]
    fn test_skip_exact_target() {
        let mut queue = queue_of(&["a", "b", "c", "d"]);
        assert_eq!(queue.skip(2).unwrap().display_name, "c");
        assert_eq!(queue.count(), 2);
    }

    #[test]
    fn test_insert_next_keeps_history() {
        let mut queue = queue_of(&["a", "b", "c"]);
        queue.next();
        queue.insert_next(Track::new("/music/x.mp3", "x"));

        assert_eq!(queue.position(), 1);
        assert_eq!(queue.size(), 4);
        assert_eq!(queue.list(10), vec!["b", "x", "c"]);
        assert_eq!(queue.next().unwrap().display_name, "x");
    }

    #[test]
    fn test_insert_next_on_empty_queue_becomes_current() {
        let mut queue = TrackQueue::new();
        queue.insert_next(Track::new("/music/x.mp3", "x"));
        assert_eq!(queue.current().unwrap().display_name, "x");
    }

    #[test]
    fn test_list_limits_and_starts_at_position() {
        let mut queue = queue_of(&["a", "b", "c", "d"]);
        queue.next();
        assert_eq!(queue.list(2), vec!["b", "c"]);
        assert_eq!(queue.list(100), vec!["b", "c", "d"]);
    }

    #[test]
    fn test_replace_rewinds() {
        let mut queue = queue_of(&["a", "b"]);
        queue.next();
        queue.replace(vec![Track::new("/music/z.mp3", "z")]);
        assert_eq!(queue.position(), 0);
        assert_eq!(queue.current().unwrap().display_name, "z");
    }
}
