//! Per-second throughput windows and the recording stop condition
//!
//! The tracker counts decoded frames in 1-second wall-clock windows. Each
//! closed window advances the elapsed-second counter, and the run stops once
//! that counter reaches the target duration. Stopping on elapsed time rather
//! than frame count keeps the duration meaningful when frames are lost.

use std::time::{Duration, Instant};

/// Length of one reporting window
pub const WINDOW: Duration = Duration::from_secs(1);

/// Outcome of one observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerEvent {
    /// Still inside the current window
    None,
    /// A window closed; `count` frames were decoded in it
    SecondElapsed { count: u64, elapsed_secs: u32 },
    /// A window closed and the target duration is reached
    DurationReached { count: u64, elapsed_secs: u32 },
}

impl TrackerEvent {
    /// Frame count of the window that just closed, if any
    pub fn window_count(&self) -> Option<u64> {
        match *self {
            TrackerEvent::None => None,
            TrackerEvent::SecondElapsed { count, .. }
            | TrackerEvent::DurationReached { count, .. } => Some(count),
        }
    }
}

/// Rolling 1-second frame counter with a whole-second stop condition
#[derive(Debug)]
pub struct RateTracker {
    target_secs: u32,
    window_start: Instant,
    window_count: u64,
    elapsed_secs: u32,
    total_count: u64,
}

impl RateTracker {
    /// Start tracking at `start` for a run of `target_secs` seconds
    pub fn new(target_secs: u32, start: Instant) -> Self {
        Self {
            target_secs,
            window_start: start,
            window_count: 0,
            elapsed_secs: 0,
            total_count: 0,
        }
    }

    /// Record one decoder outcome observed at `now`
    ///
    /// A decoded frame is counted into the current window before the window
    /// boundary is checked. When the boundary is crossed the new window starts
    /// at `now`, so sub-second overshoot is never carried over.
    pub fn observe(&mut self, decoded: bool, now: Instant) -> TrackerEvent {
        if decoded {
            self.window_count += 1;
            self.total_count += 1;
        }

        if now.saturating_duration_since(self.window_start) < WINDOW {
            return TrackerEvent::None;
        }

        let count = self.window_count;
        self.window_count = 0;
        self.window_start = now;
        self.elapsed_secs = self.elapsed_secs.saturating_add(1);

        if self.elapsed_secs >= self.target_secs {
            TrackerEvent::DurationReached {
                count,
                elapsed_secs: self.elapsed_secs,
            }
        } else {
            TrackerEvent::SecondElapsed {
                count,
                elapsed_secs: self.elapsed_secs,
            }
        }
    }

    /// Whole seconds elapsed so far
    pub fn elapsed_secs(&self) -> u32 {
        self.elapsed_secs
    }

    /// Frames counted in the still-open window
    pub fn window_count(&self) -> u64 {
        self.window_count
    }

    /// Frames counted since the tracker started
    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn target_secs(&self) -> u32 {
        self.target_secs
    }

    pub fn is_done(&self) -> bool {
        self.elapsed_secs >= self.target_secs
    }
}
