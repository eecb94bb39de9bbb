//! Configuration types

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the periodic cache jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// How often the whole cache is invalidated.
    pub invalidate_every: Duration,
    /// How often cached windows are re-fetched to repair drifted records.
    pub refresh_every: Duration,
    /// Whether the periodic jobs run at all.
    pub scheduling_enabled: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            invalidate_every: Duration::from_secs(30 * 60),
            refresh_every: Duration::from_secs(5 * 60),
            scheduling_enabled: true,
        }
    }
}

impl SyncConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the full-invalidation interval.
    pub fn with_invalidate_every(mut self, every: Duration) -> Self {
        self.invalidate_every = every;
        self
    }

    /// Set the refresh interval.
    pub fn with_refresh_every(mut self, every: Duration) -> Self {
        self.refresh_every = every;
        self
    }

    /// Enable or disable the periodic jobs.
    pub fn with_scheduling(mut self, enabled: bool) -> Self {
        self.scheduling_enabled = enabled;
        self
    }
}
