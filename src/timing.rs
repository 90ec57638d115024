//! Elapsed-time checkpoints.

use std::time::{Duration, Instant};

/// A monotonic checkpoint that reports time since it was last reset.
#[derive(Debug, Clone, Copy)]
pub struct Checkpoint {
    start: Instant,
}

impl Checkpoint {
    /// Starts a checkpoint at the current instant.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Returns time elapsed since the last reset without resetting.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Returns time elapsed since the last reset and resets to now.
    pub fn lap(&mut self) -> Duration {
        let now = Instant::now();
        let elapsed = now.duration_since(self.start);
        self.start = now;
        elapsed
    }
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self::start()
    }
}

/// Formats a duration as `H:MM:SS.mmm`.
pub fn format_elapsed(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!(
        "{}:{:02}:{:02}.{:03}",
        hours,
        minutes,
        seconds,
        duration.subsec_millis()
    )
}
