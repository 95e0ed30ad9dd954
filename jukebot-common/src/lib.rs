//! # Jukebot Common Library
//!
//! Shared code for the jukebot crates:
//! - Error type used by configuration and database helpers
//! - Root folder resolution and logging configuration
//! - Track catalog database initialization

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
