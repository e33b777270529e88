//! Grounded directly on `utils::time::Timer`: elapsed/delta tracking via
//! `std::time::Instant`, with the per-frame `tick()` repurposed here as
//! "mark one reconciliation pass complete".

use std::time::{Duration, Instant};

/// Tracks wall-clock time since creation and since the last `tick()`.
pub struct Timer {
    start_time: Instant,
    last_tick: Instant,
    pub delta: Duration,
    pub elapsed: Duration,
    pub tick_count: u64,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    #[must_use]
    pub fn new() -> Self {
        let now = Instant::now();
        Self { start_time: now, last_tick: now, delta: Duration::ZERO, elapsed: Duration::ZERO, tick_count: 0 }
    }

    pub fn tick(&mut self) {
        let now = Instant::now();
        self.delta = now - self.last_tick;
        self.elapsed = now - self.start_time;
        self.last_tick = now;
        self.tick_count += 1;
    }

    #[must_use]
    pub fn delta_ms(&self) -> f64 {
        self.delta.as_secs_f64() * 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_and_delta_grow_monotonically() {
        let mut timer = Timer::new();
        std::thread::sleep(Duration::from_millis(5));
        timer.tick();
        assert!(timer.elapsed >= Duration::from_millis(5));
        assert!(timer.delta >= Duration::from_millis(5));
        assert_eq!(timer.tick_count, 1);
    }
}
