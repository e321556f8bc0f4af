//! Wall-clock bookkeeping for the simulation loop.
//!
//! One clock per simulation. Each call to [`SimClock::tick`] measures the
//! time since the previous tick and accumulates it into simulated time, so
//! pausing and time scaling affect the future only, never already-elapsed
//! time.
//!
//! # Example
//!
//! ```ignore
//! let mut clock = SimClock::new();
//!
//! loop {
//!     let (elapsed, delta) = clock.tick();
//!     scheduler.set_uniform(position, "time", elapsed);
//!     scheduler.set_uniform(position, "delta", delta);
//!     scheduler.compute(&device, &queue);
//! }
//! ```

use std::time::{Duration, Instant};

/// Tracks simulated time across ticks.
///
/// Simulated time is the sum of per-tick deltas after scaling, so it can run
/// slower or faster than the wall clock and stops entirely while paused.
#[derive(Debug)]
pub struct SimClock {
    /// When the previous tick happened.
    last_tick: Instant,
    /// Accumulated simulated time in seconds.
    elapsed_secs: f32,
    /// Scaled delta of the most recent tick.
    delta_secs: f32,
    /// Ticks since creation.
    tick_count: u64,
    /// Measured tick rate, refreshed periodically.
    rate: f32,
    rate_tick_count: u64,
    rate_update_time: Instant,
    rate_update_interval: Duration,
    paused: bool,
    /// Overrides measured deltas for deterministic stepping.
    fixed_delta: Option<f32>,
    /// Multiplier applied to every delta. Clamped non-negative.
    time_scale: f32,
}

impl SimClock {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            last_tick: now,
            elapsed_secs: 0.0,
            delta_secs: 0.0,
            tick_count: 0,
            rate: 0.0,
            rate_tick_count: 0,
            rate_update_time: now,
            rate_update_interval: Duration::from_millis(500),
            paused: false,
            fixed_delta: None,
            time_scale: 1.0,
        }
    }

    /// Advance the clock by one tick.
    ///
    /// Returns `(elapsed, delta)` in seconds. While paused, delta is zero
    /// and elapsed holds still.
    pub fn tick(&mut self) -> (f32, f32) {
        let now = Instant::now();

        if self.paused {
            self.delta_secs = 0.0;
            self.last_tick = now;
            return (self.elapsed_secs, 0.0);
        }

        let measured = now.duration_since(self.last_tick).as_secs_f32();
        self.delta_secs = self.fixed_delta.unwrap_or(measured) * self.time_scale;
        self.elapsed_secs += self.delta_secs;
        self.last_tick = now;
        self.tick_count += 1;

        let since_rate_update = now.duration_since(self.rate_update_time);
        if since_rate_update >= self.rate_update_interval {
            let ticks_since = self.tick_count - self.rate_tick_count;
            self.rate = ticks_since as f32 / since_rate_update.as_secs_f32();
            self.rate_tick_count = self.tick_count;
            self.rate_update_time = now;
        }

        (self.elapsed_secs, self.delta_secs)
    }

    /// Simulated seconds accumulated so far.
    #[inline]
    pub fn elapsed(&self) -> f32 {
        self.elapsed_secs
    }

    /// Scaled delta of the most recent tick, in seconds.
    #[inline]
    pub fn delta(&self) -> f32 {
        self.delta_secs
    }

    /// Ticks since the clock was created.
    #[inline]
    pub fn ticks(&self) -> u64 {
        self.tick_count
    }

    /// Measured ticks per second.
    #[inline]
    pub fn rate(&self) -> f32 {
        self.rate
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    #[inline]
    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    /// Stop simulated time. Ticks while paused produce zero deltas.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Resume simulated time from where it stopped.
    ///
    /// The pause gap is not counted: the next tick measures from here.
    pub fn resume(&mut self) {
        if self.paused {
            self.last_tick = Instant::now();
            self.paused = false;
        }
    }

    pub fn toggle_pause(&mut self) {
        if self.paused {
            self.resume();
        } else {
            self.pause();
        }
    }

    /// Replace measured deltas with a constant, for deterministic runs.
    /// `None` returns to wall-clock deltas.
    pub fn set_fixed_delta(&mut self, delta: Option<f32>) {
        self.fixed_delta = delta;
    }

    /// Scale future deltas: `0.5` is half speed, `2.0` double.
    /// Negative values clamp to zero.
    pub fn set_time_scale(&mut self, scale: f32) {
        self.time_scale = scale.max(0.0);
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}
