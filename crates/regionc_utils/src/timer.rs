use std::time::{Duration, Instant};

/// Wall-clock stopwatch used around tool invocations and pipeline stages.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    start: Instant,
}

impl Stopwatch {
    pub fn start_new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn has_exceeded(&self, limit: Duration) -> bool {
        self.elapsed() >= limit
    }
}
