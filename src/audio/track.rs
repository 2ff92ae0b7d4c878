use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Resolved playable identity of a track.
///
/// Immutable once built: the queue clones it into whichever entry holds it,
/// it is never shared mutably between guilds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackRef {
    locator: String,
    title: String,
    duration_secs: u64,
}

impl TrackRef {
    pub fn new(locator: impl Into<String>, title: impl Into<String>, duration_secs: u64) -> Self {
        Self {
            locator: locator.into(),
            title: title.into(),
            duration_secs,
        }
    }

    /// URL u opaque id que entiende el transporte
    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn duration_secs(&self) -> u64 {
        self.duration_secs
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
}
