//! Resumable volume ramps.
//!
//! A ramp is pure state advanced by the engine tick: each tick reads the
//! value for the elapsed wall time and writes it to the track gain. Nothing
//! here sleeps, so fades never stall command intake. Scheduling a new ramp
//! on a channel replaces the old one; its remaining steps are never applied.

use std::time::{Duration, Instant};

use cue_player::gain::clamp01;

/// Default step count for a scheduled fade.
pub const DEFAULT_STEPS: u32 = 20;

/// A linear, stepped volume ramp from `from` to `to` over `total`.
#[derive(Clone, Debug)]
pub struct VolumeRamp {
    from: f32,
    to: f32,
    steps: u32,
    total: Duration,
    started: Instant,
}

impl VolumeRamp {
    pub fn new(from: f32, to: f32, total: Duration, steps: u32) -> Self {
        Self {
            from: clamp01(from),
            to: clamp01(to),
            steps: steps.max(1),
            total,
            started: Instant::now(),
        }
    }

    /// The value the channel should hold once the ramp completes.
    pub fn target(&self) -> f32 {
        self.to
    }

    /// Stepped ramp value after `elapsed`.
    ///
    /// A zero-duration ramp is the target immediately. Otherwise the value
    /// holds `from` until the first step boundary and lands exactly on `to`
    /// at the last one.
    pub fn value_at(&self, elapsed: Duration) -> f32 {
        if self.total.is_zero() || elapsed >= self.total {
            return self.to;
        }
        let progress = elapsed.as_secs_f64() / self.total.as_secs_f64();
        let step = (progress * self.steps as f64).floor() as u32;
        let step = step.min(self.steps);
        clamp01(self.from + (self.to - self.from) * step as f32 / self.steps as f32)
    }

    /// Ramp value for the current wall-clock time.
    pub fn current(&self) -> f32 {
        self.value_at(self.started.elapsed())
    }

    pub fn finished_at(&self, elapsed: Duration) -> bool {
        elapsed >= self.total
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at(self.started.elapsed())
    }
}
