//! Test helper modules for jukebot-player integration tests
//!
//! Provides reusable test infrastructure components:
//! - FakeVoice / FakeSession: scriptable sessions with an ordered event log
//! - FakeMedia / FakeCatalog: in-memory resolution without processes or SQLite
//! - RecordingTransport: captures dispatcher output with timestamps
//! - Harness: a controller wired to all of the above

#![allow(dead_code)]

pub mod fake_sources;
pub mod fake_voice;
pub mod recording_transport;

pub use fake_sources::{FakeCatalog, FakeMedia};
pub use fake_voice::{EventLog, FakeSession, FakeVoice};
pub use recording_transport::{Delivery, RecordingTransport};

use jukebot_player::dispatch::{BurstPolicy, Dispatcher};
use jukebot_player::playback::{ControllerOptions, PlaybackController};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub const ALLOWED_PREFIX: &str = "https://youtu.be/";

/// Burst policy loose enough that tests never wait on it
pub fn unthrottled() -> BurstPolicy {
    BurstPolicy {
        limit: 10_000,
        window: Duration::from_secs(1),
        pause: Duration::from_millis(1),
    }
}

pub struct Harness {
    pub controller: PlaybackController,
    pub voice: Arc<FakeVoice>,
    pub catalog: Arc<FakeCatalog>,
    pub transport: Arc<RecordingTransport>,
    pub dispatcher: Dispatcher,
    pub worker: JoinHandle<()>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(ControllerOptions::default())
    }

    pub fn with_options(options: ControllerOptions) -> Self {
        Self::build(options, &[ALLOWED_PREFIX])
    }

    /// Harness whose media source allows exactly `prefixes`
    pub fn allowing(prefixes: &[&str]) -> Self {
        Self::build(ControllerOptions::default(), prefixes)
    }

    fn build(options: ControllerOptions, prefixes: &[&str]) -> Self {
        let voice = FakeVoice::new();
        let catalog = Arc::new(FakeCatalog::with_tracks(10));
        let transport = Arc::new(RecordingTransport::new());
        let (dispatcher, worker) = Dispatcher::spawn(transport.clone(), unthrottled());
        let controller = PlaybackController::new(
            voice.clone(),
            Arc::new(FakeMedia::allowing(prefixes)),
            catalog.clone(),
            dispatcher.clone(),
            options,
        );
        Self {
            controller,
            voice,
            catalog,
            transport,
            dispatcher,
            worker,
        }
    }

    /// Queue catalog ids in order
    pub async fn queue_ids(&self, ids: &[i64]) {
        for id in ids {
            self.controller.add_to_queue(&id.to_string()).await.unwrap();
        }
    }

    /// Wait until the fake voice has started `count` sessions
    pub async fn wait_for_starts(&self, count: usize) {
        let voice = self.voice.clone();
        wait_until(move || voice.started() >= count).await;
    }

    /// Wait until the controller has no live session and no waiter
    pub async fn wait_for_idle(&self) {
        loop {
            let diag = self.controller.diagnostics().await;
            if !diag.has_session && !diag.waiter_active {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

/// Poll `condition` every few milliseconds, failing after ten seconds
pub async fn wait_until<F>(condition: F)
where
    F: Fn() -> bool,
{
    let result = tokio::time::timeout(Duration::from_secs(10), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "condition not reached in time");
}

/// Give spawned tasks a moment to run
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Run `future` with a generous timeout
pub async fn within<T>(future: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(10), future)
        .await
        .expect("operation timed out")
}
