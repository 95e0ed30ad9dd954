//! Playback: track queue, voice sessions and the controller that ties them together

pub mod controller;
pub mod persistence;
pub mod queue;
pub mod session;
pub mod targets;

pub use controller::{ControllerDiagnostics, ControllerOptions, PlaybackController};
pub use queue::{resolve_track, TrackQueue};
pub use session::{SessionSource, SessionState, VoiceConnection, VoiceSession};
pub use targets::{UserRef, VoiceTargetRule, VoiceTargetSet};
