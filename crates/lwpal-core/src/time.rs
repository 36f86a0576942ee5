//! Uptime clock.
//!
//! The engine schedules retransmissions and registration updates in whole
//! seconds relative to an arbitrary origin, so a monotonic clock started with
//! the platform context is all it needs.

use std::time::{Duration, Instant};

/// Monotonic seconds counter.
#[derive(Debug, Clone, Copy)]
pub struct Uptime {
    origin: Instant,
}

impl Uptime {
    /// Starts counting from now.
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Returns the elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    /// Returns whole seconds since start, saturating at `u32::MAX`.
    pub fn secs(&self) -> u32 {
        u32::try_from(self.elapsed().as_secs()).unwrap_or(u32::MAX)
    }
}

impl Default for Uptime {
    fn default() -> Self {
        Self::start()
    }
}
