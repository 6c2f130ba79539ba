use std::time::Duration;

use crate::release::UnlockTiming;

/// Process-wide engine defaults, overridable per call where it matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Timing applied when a release does not specify its own.
    pub default_unlock_timing: UnlockTiming,
    /// Whether granted-with-cancellation results should also be routed to
    /// the caller's error handler (as the admission's `reason`), or only
    /// reported through the cancellation list.
    pub surface_cancellation_errors: bool,
    /// Wakeup interval of the release coordinator when nothing is due.
    pub poll_interval: Duration,
}

impl EngineConfig {
    pub fn new() -> Self {
        EngineConfig {
            default_unlock_timing: UnlockTiming::Immediate,
            surface_cancellation_errors: false,
            poll_interval: Duration::from_millis(10),
        }
    }

    pub fn with_default_unlock_timing(mut self, timing: UnlockTiming) -> Self {
        self.default_unlock_timing = timing;
        self
    }

    pub fn with_surface_cancellation_errors(mut self, surface: bool) -> Self {
        self.surface_cancellation_errors = surface;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
