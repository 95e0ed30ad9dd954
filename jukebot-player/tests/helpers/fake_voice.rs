//! Scriptable voice connection and sessions

use async_trait::async_trait;
use jukebot_player::error::{Error, Result};
use jukebot_player::playback::{
    SessionSource, SessionState, UserRef, VoiceConnection, VoiceSession, VoiceTargetRule,
};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Shared, ordered record of session events (`start:x`, `stop:x`, `end:x`)
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<String>>,
}

impl EventLog {
    pub fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.events().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

pub struct FakeSession {
    pub label: String,
    playing: AtomicBool,
    ignore_stop: bool,
    volume_bits: AtomicU32,
    done: watch::Sender<bool>,
    log: Arc<EventLog>,
}

impl FakeSession {
    /// End the stream as if the track ran out
    pub fn complete(&self) {
        if self.playing.swap(false, Ordering::SeqCst) {
            self.log.push(format!("end:{}", self.label));
        }
        self.done.send_replace(true);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl VoiceSession for FakeSession {
    async fn stop(&self) -> Result<()> {
        self.log.push(format!("stop:{}", self.label));
        if !self.ignore_stop {
            self.complete();
        }
        Ok(())
    }

    fn set_volume(&self, volume: f32) {
        self.volume_bits.store(volume.to_bits(), Ordering::SeqCst);
    }

    fn state(&self) -> SessionState {
        if self.is_playing() {
            SessionState::Playing
        } else {
            SessionState::Stopped
        }
    }

    async fn wait_for_completion(&self) {
        let mut done = self.done.subscribe();
        let _ = done.wait_for(|finished| *finished).await;
    }
}

#[derive(Default)]
pub struct FakeVoice {
    pub log: Arc<EventLog>,
    sessions: Mutex<Vec<Arc<FakeSession>>>,
    users: Mutex<Vec<UserRef>>,
    rules: Mutex<Vec<Option<VoiceTargetRule>>>,
    fail_next_start: AtomicBool,
    ignore_stop: AtomicBool,
    overlapping_starts: AtomicUsize,
}

impl FakeVoice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Sessions started from now on ignore stop requests
    pub fn ignore_stop(&self, ignore: bool) {
        self.ignore_stop.store(ignore, Ordering::SeqCst);
    }

    pub fn fail_next_start(&self) {
        self.fail_next_start.store(true, Ordering::SeqCst);
    }

    pub fn add_user(&self, session_id: u32, name: &str) {
        self.users.lock().unwrap().push(UserRef {
            session_id,
            name: name.to_string(),
        });
    }

    pub fn sessions(&self) -> Vec<Arc<FakeSession>> {
        self.sessions.lock().unwrap().clone()
    }

    pub fn started(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn latest(&self) -> Option<Arc<FakeSession>> {
        self.sessions.lock().unwrap().last().cloned()
    }

    pub fn started_labels(&self) -> Vec<String> {
        self.sessions().iter().map(|s| s.label.clone()).collect()
    }

    pub fn playing_count(&self) -> usize {
        self.sessions().iter().filter(|s| s.is_playing()).count()
    }

    /// Starts that happened while another session was still playing
    pub fn overlapping_starts(&self) -> usize {
        self.overlapping_starts.load(Ordering::SeqCst)
    }

    pub fn rules(&self) -> Vec<Option<VoiceTargetRule>> {
        self.rules.lock().unwrap().clone()
    }
}

#[async_trait]
impl VoiceConnection for FakeVoice {
    async fn start(&self, source: SessionSource, volume: f32) -> Result<Arc<dyn VoiceSession>> {
        let label = match source {
            SessionSource::File(path) => path.display().to_string(),
            SessionSource::Url(url) => url,
        };
        if self.fail_next_start.swap(false, Ordering::SeqCst) {
            return Err(Error::SessionStartFailed(format!("cannot open {}", label)));
        }

        if self.playing_count() > 0 {
            self.overlapping_starts.fetch_add(1, Ordering::SeqCst);
        }

        let (done, _) = watch::channel(false);
        let session = Arc::new(FakeSession {
            label: label.clone(),
            playing: AtomicBool::new(true),
            ignore_stop: self.ignore_stop.load(Ordering::SeqCst),
            volume_bits: AtomicU32::new(volume.to_bits()),
            done,
            log: Arc::clone(&self.log),
        });
        self.log.push(format!("start:{}", label));
        self.sessions.lock().unwrap().push(Arc::clone(&session));
        Ok(session)
    }

    fn find_user(&self, name: &str) -> Option<UserRef> {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.name == name)
            .cloned()
    }

    async fn apply_voice_targets(&self, rule: Option<VoiceTargetRule>) -> Result<()> {
        self.rules.lock().unwrap().push(rule);
        Ok(())
    }
}
