//! Playback controller
//!
//! Owns the track queue and at most one live voice session. Every
//! state-changing operation (play, stop, skip and the completion handling
//! done by the waiter) runs under one async mutex, so they never interleave.
//!
//! A single waiter task per controller watches the live session. Each new
//! session gets a fresh generation number and cancellation token; when the
//! waiter wakes up and the generation has moved on, it re-arms on the newer
//! session instead of acting on a stale one.
//!
//! Volume, radio mode and voice targets live outside the main lock so they
//! stay responsive while a stop is waiting on a slow session.

use super::queue::{resolve_track, TrackQueue};
use super::session::{SessionState, VoiceConnection, VoiceSession};
use super::targets::VoiceTargetSet;
use crate::catalog::TrackCatalog;
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::media::MediaSource;
use crate::messages::{now_playing, NOT_PLAYING};
use crate::track::Track;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, MutexGuard};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard as CoreGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default bound on stop-and-wait
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_millis(3000);

/// Controller tunables
#[derive(Debug, Clone, Copy)]
pub struct ControllerOptions {
    pub stop_timeout: Duration,
    pub initial_volume: f32,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            initial_volume: 0.25,
        }
    }
}

/// Snapshot of internal flags, for logging and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerDiagnostics {
    pub has_session: bool,
    pub generation: u64,
    pub desired_stop: bool,
    pub skip_requested: bool,
    pub transitioning: bool,
    pub waiter_active: bool,
}

/// Cloneable handle to the playback controller
#[derive(Clone)]
pub struct PlaybackController {
    inner: Arc<Inner>,
}

struct Inner {
    core: Mutex<ControllerCore>,
    /// Mirror of the live session for lock-free queries and volume changes
    live: std::sync::Mutex<Option<Arc<dyn VoiceSession>>>,
    volume_bits: AtomicU32,
    radio: AtomicBool,
    targets: Mutex<VoiceTargetSet>,
    voice: Arc<dyn VoiceConnection>,
    media: Arc<dyn MediaSource>,
    catalog: Arc<dyn TrackCatalog>,
    dispatcher: Dispatcher,
    stop_timeout: Duration,
}

struct ActiveSession {
    session: Arc<dyn VoiceSession>,
    cancel: CancellationToken,
    generation: u64,
}

#[derive(Default)]
struct ControllerCore {
    queue: TrackQueue,
    active: Option<ActiveSession>,
    /// Queue position whose entry was last handed to a session
    started_position: Option<usize>,
    generation: u64,
    desired_stop: bool,
    skip_requested: bool,
    transitioning: bool,
    waiter_active: bool,
}

enum StopOutcome {
    Stopped,
    Abandoned,
}

/// Busy lock held for a state transition
///
/// Clears the transition flags when dropped, so a caller that abandons the
/// operation mid-way (e.g. under a timeout) never leaves them set.
struct Transition<'a> {
    core: CoreGuard<'a, ControllerCore>,
}

impl<'a> Transition<'a> {
    fn begin(mut core: CoreGuard<'a, ControllerCore>) -> Self {
        core.transitioning = true;
        Self { core }
    }
}

impl Deref for Transition<'_> {
    type Target = ControllerCore;

    fn deref(&self) -> &ControllerCore {
        &self.core
    }
}

impl DerefMut for Transition<'_> {
    fn deref_mut(&mut self) -> &mut ControllerCore {
        &mut self.core
    }
}

impl Drop for Transition<'_> {
    fn drop(&mut self) {
        self.core.transitioning = false;
        self.core.skip_requested = false;
    }
}

impl PlaybackController {
    pub fn new(
        voice: Arc<dyn VoiceConnection>,
        media: Arc<dyn MediaSource>,
        catalog: Arc<dyn TrackCatalog>,
        dispatcher: Dispatcher,
        options: ControllerOptions,
    ) -> Self {
        let volume = clamp_volume(options.initial_volume);
        Self {
            inner: Arc::new(Inner {
                core: Mutex::new(ControllerCore::default()),
                live: std::sync::Mutex::new(None),
                volume_bits: AtomicU32::new(volume.to_bits()),
                radio: AtomicBool::new(false),
                targets: Mutex::new(VoiceTargetSet::new()),
                voice,
                media,
                catalog,
                dispatcher,
                stop_timeout: options.stop_timeout,
            }),
        }
    }

    /// Start streaming `locator`, replacing any live session
    ///
    /// An empty locator is ignored. Failures are reported to the channel and
    /// leave the controller stopped.
    pub async fn play(&self, locator: &str) -> Result<()> {
        let mut core = Transition::begin(self.inner.core.lock().await);
        self.inner.start_session(&mut core, locator).await
    }

    /// Play the queue's current entry if nothing is playing
    ///
    /// When nothing plays, the current entry has already been played and
    /// exactly one more was queued after it, that new entry is played
    /// instead of repeating the stale one.
    pub async fn play_pending(&self) -> Result<bool> {
        let mut core = Transition::begin(self.inner.core.lock().await);
        if self.inner.session_playing(&core) {
            return Ok(false);
        }
        let stale = core.started_position == Some(core.queue.position());
        if stale && core.queue.count() == 2 {
            core.queue.next();
        }
        let Some(locator) = core.queue.current().map(|t| t.locator.clone()) else {
            return Ok(false);
        };
        self.inner.start_session(&mut core, &locator).await?;
        Ok(true)
    }

    /// Stop the live session
    ///
    /// With `wants_stop` the stop is final and no further tracks start.
    /// Otherwise the waiter treats the end like a natural completion.
    /// Bounded by the stop timeout; idempotent when already stopped.
    pub async fn stop(&self, wants_stop: bool) {
        let mut core = Transition::begin(self.inner.core.lock().await);
        self.inner.stop_locked(&mut core, wants_stop).await;
    }

    /// Move `amount` entries through the queue and play the result
    ///
    /// In radio mode a fresh random track is slotted in and played. With no
    /// next entry outside radio mode this is a final stop.
    pub async fn skip(&self, amount: i64) -> Result<()> {
        let mut core = Transition::begin(self.inner.core.lock().await);
        core.skip_requested = true;
        self.inner.skip_locked(&mut core, amount).await
    }

    /// Resolve `input` and append it to the queue
    pub async fn add_to_queue(&self, input: &str) -> Result<Track> {
        let track = resolve_track(input, self.inner.catalog.as_ref(), self.inner.media.as_ref()).await?;
        let mut core = self.inner.core.lock().await;
        core.queue.push(track.clone());
        debug!(locator = %track.locator, size = core.queue.size(), "Queued track");
        Ok(track)
    }

    /// Search YouTube for `query` and append the first hit
    pub async fn add_from_search(&self, query: &str) -> Result<Track> {
        let url = self.inner.media.search_url(query).await?;
        info!(query, url = %url, "Search resolved");
        self.add_to_queue(&url).await
    }

    /// Resolve `input` and insert it right after the current entry
    pub async fn add_next(&self, input: &str) -> Result<Track> {
        let track = resolve_track(input, self.inner.catalog.as_ref(), self.inner.media.as_ref()).await?;
        let mut core = self.inner.core.lock().await;
        core.queue.insert_next(track.clone());
        debug!(locator = %track.locator, position = core.queue.position(), "Queued track next");
        Ok(track)
    }

    /// Append up to `count` random catalog tracks, returning what was added
    pub async fn add_random(&self, count: usize) -> Result<Vec<Track>> {
        let ids = self.inner.catalog.random_ids(count).await?;
        let mut added = Vec::with_capacity(ids.len());
        for id in ids {
            added.push(self.inner.catalog.lookup_by_id(id).await?);
        }

        let mut core = self.inner.core.lock().await;
        for track in &added {
            core.queue.push(track.clone());
        }
        Ok(added)
    }

    /// Set volume in [0, 1] and apply it to the live session
    pub fn set_volume(&self, volume: f32) -> f32 {
        let volume = clamp_volume(volume);
        self.inner.volume_bits.store(volume.to_bits(), Ordering::SeqCst);
        if let Some(session) = self.inner.live_session() {
            session.set_volume(volume);
        }
        debug!(volume, "Volume changed");
        volume
    }

    pub fn volume(&self) -> f32 {
        self.inner.volume()
    }

    /// Flip radio mode, returning the new setting
    pub fn toggle_radio(&self) -> bool {
        let enabled = !self.inner.radio.fetch_xor(true, Ordering::SeqCst);
        info!(enabled, "Radio mode toggled");
        enabled
    }

    pub fn is_radio(&self) -> bool {
        self.inner.radio.load(Ordering::SeqCst)
    }

    /// Route audio to `user` as well; unknown users are ignored
    ///
    /// Targeting a user twice refreshes their entry and resends the rule.
    pub async fn add_target(&self, user: &str) -> bool {
        let Some(found) = self.inner.voice.find_user(user) else {
            debug!(user, "Target user not found");
            return false;
        };
        let mut targets = self.inner.targets.lock().await;
        if !targets.add(found) {
            debug!(user, "Retargeting user");
        }
        self.inner.push_targets(&targets).await;
        true
    }

    /// Stop routing audio to `user`; an empty set restores broadcast
    pub async fn remove_target(&self, user: &str) -> bool {
        let mut targets = self.inner.targets.lock().await;
        let removed = match self.inner.voice.find_user(user) {
            Some(found) => targets.remove_session(found.session_id),
            None => targets.remove_name(user),
        };
        if removed {
            self.inner.push_targets(&targets).await;
        }
        removed
    }

    pub fn is_playing(&self) -> bool {
        self.inner
            .live_session()
            .map(|s| s.state() == SessionState::Playing)
            .unwrap_or(false)
    }

    pub fn is_stopped(&self) -> bool {
        !self.is_playing()
    }

    /// Entries from the current position forward
    pub async fn playlist_count(&self) -> usize {
        self.inner.core.lock().await.queue.count()
    }

    pub async fn playlist_size(&self) -> usize {
        self.inner.core.lock().await.queue.size()
    }

    pub async fn playlist_list(&self, max: usize) -> Vec<String> {
        self.inner.core.lock().await.queue.list(max)
    }

    pub async fn current_track(&self) -> Option<Track> {
        self.inner.core.lock().await.queue.current().cloned()
    }

    /// Current and upcoming entries, for saving
    pub async fn remaining_tracks(&self) -> Vec<Track> {
        self.inner.core.lock().await.queue.remaining().to_vec()
    }

    /// Replace the queue with saved entries, positioned at the first one
    pub async fn replace_queue(&self, tracks: Vec<Track>) {
        let mut core = self.inner.core.lock().await;
        info!(count = tracks.len(), "Replacing queue");
        core.queue.replace(tracks);
        core.started_position = None;
    }

    pub async fn diagnostics(&self) -> ControllerDiagnostics {
        let core = self.inner.core.lock().await;
        core.diagnostics()
    }

    /// Diagnostics without waiting; `None` while an operation holds the lock
    pub fn try_diagnostics(&self) -> Option<ControllerDiagnostics> {
        self.inner.core.try_lock().ok().map(|core| core.diagnostics())
    }
}

impl ControllerCore {
    fn diagnostics(&self) -> ControllerDiagnostics {
        ControllerDiagnostics {
            has_session: self.active.is_some(),
            generation: self.generation,
            desired_stop: self.desired_stop,
            skip_requested: self.skip_requested,
            transitioning: self.transitioning,
            waiter_active: self.waiter_active,
        }
    }
}

impl Inner {
    fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::SeqCst))
    }

    fn live_guard(&self) -> MutexGuard<'_, Option<Arc<dyn VoiceSession>>> {
        match self.live.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn live_session(&self) -> Option<Arc<dyn VoiceSession>> {
        self.live_guard().clone()
    }

    fn session_playing(&self, core: &ControllerCore) -> bool {
        core.active
            .as_ref()
            .map(|a| a.session.state() == SessionState::Playing)
            .unwrap_or(false)
    }

    fn set_active(&self, core: &mut ControllerCore, active: Option<ActiveSession>) {
        *self.live_guard() = active.as_ref().map(|a| Arc::clone(&a.session));
        if let Some(old) = std::mem::replace(&mut core.active, active) {
            old.cancel.cancel();
        }
    }

    async fn start_session(self: &Arc<Self>, core: &mut ControllerCore, locator: &str) -> Result<()> {
        let locator = locator.trim();
        if locator.is_empty() {
            debug!("Play requested with empty locator, ignoring");
            return Ok(());
        }

        let retired = self.retire_active(core).await;

        let source = match self.media.build_source(locator) {
            Ok(source) => source,
            Err(e) => return Err(self.report_failure(e, retired)),
        };

        let session = match self.voice.start(source, self.volume()).await {
            Ok(session) => session,
            Err(Error::SessionStartFailed(msg)) => {
                return Err(self.report_failure(Error::SessionStartFailed(msg), retired))
            }
            Err(e) => {
                return Err(self.report_failure(Error::SessionStartFailed(e.to_string()), retired))
            }
        };

        core.generation += 1;
        core.desired_stop = false;
        let generation = core.generation;
        self.set_active(
            core,
            Some(ActiveSession {
                session,
                cancel: CancellationToken::new(),
                generation,
            }),
        );

        let current = core.queue.current().filter(|t| t.locator == locator);
        let display_name = current
            .map(|t| t.display_name.clone())
            .unwrap_or_else(|| locator.to_string());
        if current.is_some() {
            core.started_position = Some(core.queue.position());
        }
        info!(%locator, generation, "Now playing {}", display_name);

        let message = now_playing(
            locator,
            &display_name,
            self.radio.load(Ordering::SeqCst),
            core.queue.count(),
        );
        self.dispatcher.to_channel(message.clone());
        self.dispatcher.set_status(message);

        self.launch_waiter(core);
        Ok(())
    }

    /// Terminate and forget the live session before a new one starts
    ///
    /// Returns true when there was a session to retire.
    async fn retire_active(&self, core: &mut ControllerCore) -> bool {
        let Some(active) = core.active.as_ref() else {
            return false;
        };
        active.cancel.cancel();
        let session = Arc::clone(&active.session);
        if let StopOutcome::Abandoned = self.terminate(&session).await {
            debug!(generation = core.generation, "Previous session abandoned");
        }
        self.set_active(core, None);
        true
    }

    async fn stop_locked(&self, core: &mut ControllerCore, wants_stop: bool) {
        core.desired_stop = wants_stop;

        let Some(active) = core.active.as_ref() else {
            debug!(wants_stop, "Stop requested while already stopped");
            return;
        };
        if wants_stop {
            active.cancel.cancel();
        }
        let session = Arc::clone(&active.session);

        match self.terminate(&session).await {
            StopOutcome::Stopped if !wants_stop => {
                // Waiter observes the completion and advances
            }
            _ => {
                self.set_active(core, None);
                self.dispatcher.set_status(NOT_PLAYING);
                info!(generation = core.generation, "Playback stopped");
            }
        }
    }

    /// Request termination and wait, bounded by the stop timeout
    async fn terminate(&self, session: &Arc<dyn VoiceSession>) -> StopOutcome {
        if session.state() == SessionState::Stopped {
            return StopOutcome::Stopped;
        }

        let bounded = tokio::time::timeout(self.stop_timeout, async {
            if let Err(e) = session.stop().await {
                debug!("Stop request failed: {}", e);
            }
            session.wait_for_completion().await;
        })
        .await;

        if bounded.is_err() {
            warn!("{}, abandoning session", Error::StopTimeout(self.stop_timeout));
            return StopOutcome::Abandoned;
        }
        if session.state() == SessionState::Playing {
            warn!("{}, abandoning session", Error::RaceDetected);
            return StopOutcome::Abandoned;
        }
        StopOutcome::Stopped
    }

    async fn skip_locked(self: &Arc<Self>, core: &mut ControllerCore, amount: i64) -> Result<()> {
        if self.radio.load(Ordering::SeqCst) {
            self.stop_locked(core, false).await;
            if let Some(track) = self.fetch_radio_track().await {
                core.queue.insert_next(track);
            }
            if core.queue.next().is_none() {
                self.stop_locked(core, true).await;
                return Ok(());
            }
            return self.play_current(core).await;
        }

        if core.queue.has_next() {
            self.stop_locked(core, false).await;
            core.queue.skip(amount);
            return self.play_current(core).await;
        }

        self.stop_locked(core, true).await;
        Ok(())
    }

    async fn play_current(self: &Arc<Self>, core: &mut ControllerCore) -> Result<()> {
        match core.queue.current().map(|t| t.locator.clone()) {
            Some(locator) => self.start_session(core, &locator).await,
            None => Ok(()),
        }
    }

    /// One random catalog track; failures are reported, not returned
    async fn fetch_radio_track(&self) -> Option<Track> {
        let track = match self.catalog.random_ids(1).await {
            Ok(ids) => match ids.first() {
                Some(&id) => self.catalog.lookup_by_id(id).await,
                None => Err(Error::TrackNotFound("catalog is empty".to_string())),
            },
            Err(e) => Err(e),
        };

        match track {
            Ok(track) => {
                debug!(locator = %track.locator, "Radio track fetched");
                Some(track)
            }
            Err(e) => {
                warn!("Failed to fetch radio track: {}", e);
                self.dispatcher
                    .to_channel(format!("Error adding radio track: {}", e));
                None
            }
        }
    }

    async fn push_targets(&self, targets: &VoiceTargetSet) {
        let rule = targets.routing_rule();
        debug!(users = targets.users().len(), "Applying voice targets");
        if let Err(e) = self.voice.apply_voice_targets(rule).await {
            warn!("Failed to apply voice targets: {}", e);
        }
    }

    /// Report a failed start; `retired` clears the stale now-playing status
    fn report_failure(&self, error: Error, retired: bool) -> Error {
        warn!("Playback failed: {}", error);
        self.dispatcher.to_channel(format!("Error: {}", error));
        if retired {
            self.dispatcher.set_status(NOT_PLAYING);
        }
        error
    }

    fn launch_waiter(self: &Arc<Self>, core: &mut ControllerCore) {
        if core.waiter_active {
            debug!(generation = core.generation, "Waiter already running");
            return;
        }
        core.waiter_active = true;
        tokio::spawn(Arc::clone(self).run_waiter());
    }

    fn run_waiter(self: Arc<Self>) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            loop {
                let (session, cancel, generation) = {
                    let mut core = self.core.lock().await;
                    match core.active.as_ref() {
                        Some(a) => (Arc::clone(&a.session), a.cancel.clone(), a.generation),
                        None => {
                            core.waiter_active = false;
                            return;
                        }
                    }
                };

                let completed = tokio::select! {
                    _ = session.wait_for_completion() => true,
                    _ = cancel.cancelled() => false,
                };

                let mut core = Transition::begin(self.core.lock().await);
                if core.active.as_ref().map(|a| a.generation) != Some(generation) {
                    // Replaced while we slept; re-arm on whatever is live now
                    continue;
                }
                if !completed {
                    // A final stop was abandoned before it cleared the session
                    warn!(generation, "Interrupted stop, finishing it");
                    self.finish(&mut core);
                    core.waiter_active = false;
                    return;
                }

                let started = self.advance_after_completion(&mut core).await;
                if !started {
                    core.waiter_active = false;
                    return;
                }
            }
        })
    }

    /// Decide what follows a finished session; true when a new one started
    async fn advance_after_completion(self: &Arc<Self>, core: &mut ControllerCore) -> bool {
        if core.desired_stop {
            self.finish(core);
            return false;
        }

        if self.radio.load(Ordering::SeqCst) {
            if let Some(track) = self.fetch_radio_track().await {
                core.queue.push(track);
            }
        }

        if core.queue.next().is_some() {
            match self.play_current(core).await {
                Ok(()) if core.active.is_some() => return true,
                Ok(()) => {}
                Err(e) => debug!("Next track failed to start: {}", e),
            }
        }

        self.finish(core);
        false
    }

    fn finish(&self, core: &mut ControllerCore) {
        self.set_active(core, None);
        self.dispatcher.set_status(NOT_PLAYING);
        info!("Queue finished, playback stopped");
    }
}

fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        return 0.0;
    }
    volume.clamp(0.0, 1.0)
}
