//! Rolling frame-rate estimate over recent successful matches.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// After this long without a match the rate reads zero.
const STALL_AFTER: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct FpsEstimator {
    window: usize,
    instants: VecDeque<Instant>,
}

impl FpsEstimator {
    pub fn new(window: usize) -> Self {
        let window = window.max(2);
        Self {
            window,
            instants: VecDeque::with_capacity(window),
        }
    }

    pub fn record(&mut self, at: Instant) {
        if self.instants.len() == self.window {
            self.instants.pop_front();
        }
        self.instants.push_back(at);
    }

    /// Average rate over the window as seen at `now`.
    pub fn fps_at(&self, now: Instant) -> f32 {
        let (Some(&first), Some(&last)) = (self.instants.front(), self.instants.back()) else {
            return 0.0;
        };
        if self.instants.len() < 2 || now.saturating_duration_since(last) > STALL_AFTER {
            return 0.0;
        }
        let span = last.duration_since(first).as_secs_f32();
        if span <= 0.0 {
            return 0.0;
        }
        (self.instants.len() - 1) as f32 / span
    }

    pub fn reset(&mut self) {
        self.instants.clear();
    }
}
