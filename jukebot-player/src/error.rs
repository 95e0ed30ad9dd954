//! Error types for jukebot-player
//!
//! Resolution and queue errors are returned to the command layer for
//! user-facing reporting. Stop timeouts and detected races are absorbed by
//! the playback controller and only logged.

use std::time::Duration;
use thiserror::Error;

/// Main error type for jukebot-player
#[derive(Error, Debug)]
pub enum Error {
    /// URL does not match any allow-list prefix
    #[error("URL doesn't meet whitelist: {0}")]
    NotWhitelisted(String),

    /// Catalog id is invalid, missing, or the catalog is empty
    #[error("Track not found: {0}")]
    TrackNotFound(String),

    /// Title or metadata lookup failed
    #[error("Resolution failed: {0}")]
    ResolutionFailed(String),

    /// Underlying media process failed to start
    #[error("Session start failed: {0}")]
    SessionStartFailed(String),

    /// Session did not terminate within the stop bound
    #[error("Session did not stop within {0:?}")]
    StopTimeout(Duration),

    /// Session still reports playing after a completed stop
    #[error("Session still playing after stop")]
    RaceDetected,

    /// Track catalog query errors
    #[error("Catalog error: {0}")]
    Catalog(#[from] sqlx::Error),

    /// Configuration loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Saved playlist could not be read or written
    #[error("Playlist persistence error: {0}")]
    Persistence(String),

    /// Outbound transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Private message recipient is not connected
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// Dispatcher worker has shut down
    #[error("Outbound dispatcher is closed")]
    DispatcherClosed,

    /// Chat command could not be parsed
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<jukebot_common::Error> for Error {
    fn from(err: jukebot_common::Error) -> Self {
        match err {
            jukebot_common::Error::Database(e) => Error::Catalog(e),
            jukebot_common::Error::Io(e) => Error::Io(e),
            jukebot_common::Error::Config(msg) => Error::Config(msg),
            jukebot_common::Error::NotFound(msg) => Error::TrackNotFound(msg),
        }
    }
}

/// Convenience Result type using jukebot-player Error
pub type Result<T> = std::result::Result<T, Error>;
