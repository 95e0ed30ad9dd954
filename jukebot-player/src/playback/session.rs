//! Voice session and connection abstractions
//!
//! A session is one running audio stream. The controller only ever talks to
//! sessions through these traits, which lets tests drive it with fakes and
//! lets the binary plug in the child-process implementation.

use super::targets::{UserRef, VoiceTargetRule};
use crate::error::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Observable session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Playing,
    Stopped,
}

/// What a session streams from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSource {
    File(PathBuf),
    Url(String),
}

/// One running audio stream
#[async_trait]
pub trait VoiceSession: Send + Sync {
    /// Request termination; completion is observed via `wait_for_completion`
    async fn stop(&self) -> Result<()>;

    /// Apply a new volume while streaming
    fn set_volume(&self, volume: f32);

    fn state(&self) -> SessionState;

    /// Resolves once the stream has ended, naturally or by request
    ///
    /// Safe to call from several tasks; every caller is woken.
    async fn wait_for_completion(&self);
}

/// Connection that can start sessions and route audio to users
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    /// Start streaming `source` at `volume`
    ///
    /// # Returns
    /// The running session, or `SessionStartFailed` when the stream could
    /// not be launched
    async fn start(&self, source: SessionSource, volume: f32) -> Result<Arc<dyn VoiceSession>>;

    /// Look up a connected user by name
    fn find_user(&self, name: &str) -> Option<UserRef>;

    /// Replace the whole routing rule; `None` restores channel broadcast
    async fn apply_voice_targets(&self, rule: Option<VoiceTargetRule>) -> Result<()>;
}
