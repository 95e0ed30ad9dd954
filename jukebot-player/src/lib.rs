//! # Jukebot Player Library
//!
//! Music bot core: a playback controller that keeps at most one voice
//! session alive, a track queue, an ordered and throttled outbound message
//! dispatcher, and the chat commands that drive them.
//!
//! **Architecture:** collaborators (voice connection, media source, track
//! catalog, chat transport) sit behind async traits; the binary wires in a
//! child-process voice connection and a console chat.

pub mod catalog;
pub mod commands;
pub mod config;
pub mod console;
pub mod dispatch;
pub mod error;
pub mod media;
pub mod messages;
pub mod playback;
pub mod process;
pub mod track;

pub use error::{Error, Result};
pub use playback::PlaybackController;
pub use track::Track;
