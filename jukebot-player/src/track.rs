//! Resolved track value type

use serde::{Deserialize, Serialize};

/// One playable entry: where to fetch it and what to call it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Filesystem path or URL
    pub locator: String,
    /// Human-friendly title
    pub display_name: String,
}

impl Track {
    pub fn new(locator: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            display_name: display_name.into(),
        }
    }
}

/// URL detection used throughout the crate
pub fn is_url(locator: &str) -> bool {
    locator.starts_with("http://") || locator.starts_with("https://")
}
