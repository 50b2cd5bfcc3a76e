//! Tick timing utilities

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Tick-rate statistics for a time window
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct RateWindow {
    pub avg: f32,
    pub min: f32,
    pub max: f32,
}

/// Rolling tick-rate statistics over multiple time windows
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct TickStats {
    pub one_sec: RateWindow,
    pub five_sec: RateWindow,
    pub current_rate: f32,
    pub tick_count: u64,
}

/// Tracks tick timing and calculates the effective tick rate.
///
/// The external driver is expected to call the engine at 60 Hz; this timer
/// only observes, it does not pace anything.
pub struct TickTimer {
    last_tick: Instant,
    delta: Duration,
    tick_count: u64,
    rate_timer: Instant,
    rate: f32,
    rate_tick_count: u32,
    /// Ring buffer of (timestamp, tick_time_secs) for rolling stats
    tick_history: VecDeque<(Instant, f32)>,
}

impl TickTimer {
    /// Create a new tick timer
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            last_tick: now,
            delta: Duration::ZERO,
            tick_count: 0,
            rate_timer: now,
            rate: 0.0,
            rate_tick_count: 0,
            tick_history: VecDeque::new(),
        }
    }

    /// Call once per tick to update timing
    pub fn tick(&mut self) {
        let now = Instant::now();
        self.delta = now - self.last_tick;
        self.last_tick = now;
        self.tick_count += 1;
        self.rate_tick_count += 1;

        let tick_time = self.delta.as_secs_f32();
        self.tick_history.push_back((now, tick_time));

        // Prune ticks older than 5 seconds
        let cutoff = now - Duration::from_secs(5);
        while let Some(&(timestamp, _)) = self.tick_history.front() {
            if timestamp < cutoff {
                self.tick_history.pop_front();
            } else {
                break;
            }
        }

        // Update the published rate every second
        let rate_elapsed = now - self.rate_timer;
        if rate_elapsed >= Duration::from_secs(1) {
            self.rate = self.rate_tick_count as f32 / rate_elapsed.as_secs_f32();
            self.rate_tick_count = 0;
            self.rate_timer = now;
        }
    }

    /// Get delta time in seconds
    pub fn delta_secs(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    /// Get current tick rate (updated every second)
    pub fn rate(&self) -> f32 {
        self.rate
    }

    /// Get total tick count
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Get rolling tick-rate statistics over 1s and 5s windows
    pub fn stats(&self) -> TickStats {
        let now = Instant::now();

        TickStats {
            one_sec: self.compute_window_stats(now, Duration::from_secs(1)),
            five_sec: self.compute_window_stats(now, Duration::from_secs(5)),
            current_rate: self.rate,
            tick_count: self.tick_count,
        }
    }

    /// Compute tick-rate statistics for a given time window
    fn compute_window_stats(&self, now: Instant, window: Duration) -> RateWindow {
        let cutoff = now - window;

        let mut count = 0;
        let mut total_time = 0.0f32;
        let mut min_rate = f32::INFINITY;
        let mut max_rate = 0.0f32;

        for &(timestamp, tick_time) in self.tick_history.iter() {
            if timestamp >= cutoff {
                count += 1;
                total_time += tick_time;

                let rate = if tick_time > 0.0 { 1.0 / tick_time } else { 0.0 };
                min_rate = min_rate.min(rate);
                max_rate = max_rate.max(rate);
            }
        }

        let avg = if total_time > 0.0 {
            count as f32 / total_time
        } else {
            0.0
        };

        if count == 0 {
            min_rate = 0.0;
            max_rate = 0.0;
        }

        RateWindow {
            avg,
            min: min_rate,
            max: max_rate,
        }
    }
}

impl Default for TickTimer {
    fn default() -> Self {
        Self::new()
    }
}
