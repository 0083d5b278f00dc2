use std::time::Instant;

use crate::gesture::history::SlidingWindow;

/// Frames per second over the last few frame intervals.
pub struct FpsCalc {
    last_tick: Instant,
    intervals_ms: SlidingWindow<f64>,
}

impl FpsCalc {
    pub fn new(buffer_len: usize) -> Self {
        Self::starting_at(Instant::now(), buffer_len)
    }

    fn starting_at(start: Instant, buffer_len: usize) -> Self {
        Self {
            last_tick: start,
            intervals_ms: SlidingWindow::new(buffer_len.max(1)),
        }
    }

    pub fn tick(&mut self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;
        self.intervals_ms.push(elapsed.as_secs_f64() * 1_000.0);

        let mean = self.intervals_ms.iter().sum::<f64>() / self.intervals_ms.len() as f64;
        if mean <= 0.0 {
            return 0.0;
        }
        ((1_000.0 / mean) * 100.0).round() / 100.0
    }
}
