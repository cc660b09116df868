// SPDX-License-Identifier: GPL-3.0-only

//! Frame rate bookkeeping for the processing diagnostics

use serde::Serialize;
use std::time::{Duration, Instant};

/// Frames-per-second over a sliding window of `window` frames
#[derive(Debug, Clone)]
pub struct FpsCounter {
    window: u32,
    started: Instant,
    last_update: Instant,
    last_tick: Option<Instant>,
    frames: u64,
    last_period: Duration,
    last_fps: f32,
    total_fps: f32,
}

impl FpsCounter {
    pub fn new(window: u32) -> Self {
        Self::starting_at(window, Instant::now())
    }

    pub fn starting_at(window: u32, now: Instant) -> Self {
        Self {
            window: window.max(1),
            started: now,
            last_update: now,
            last_tick: None,
            frames: 0,
            last_period: Duration::ZERO,
            last_fps: 0.0,
            total_fps: 0.0,
        }
    }

    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    /// Count one frame at `now`; rates refresh every `window` frames
    pub fn tick_at(&mut self, now: Instant) {
        self.frames += 1;
        self.last_tick = Some(now);
        if self.frames % self.window as u64 != 0 {
            return;
        }
        self.last_period = now
            .duration_since(self.last_update)
            .max(Duration::from_millis(1));
        self.last_fps = self.window as f32 / self.last_period.as_secs_f32();
        let total = now
            .duration_since(self.started)
            .max(Duration::from_millis(1));
        self.total_fps = self.frames as f32 / total.as_secs_f32();
        self.last_update = now;
    }

    /// Zero the current rate when no frame arrived for a second
    pub fn update_at(&mut self, now: Instant) {
        let stale = self
            .last_tick
            .is_none_or(|tick| now.duration_since(tick) > Duration::from_secs(1));
        if stale {
            self.last_fps = 0.0;
            self.last_period = Duration::ZERO;
            self.last_update = now;
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn last_fps(&self) -> f32 {
        self.last_fps
    }

    pub fn total_fps(&self) -> f32 {
        self.total_fps
    }
}

impl std::fmt::Display for FpsCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} s: {} f / {} ms, {:.1} fps, {} ms/f",
            self.last_update.duration_since(self.started).as_secs(),
            self.window,
            self.last_period.as_millis(),
            self.last_fps,
            self.last_period.as_millis() / self.window as u128
        )
    }
}

/// Periodic processing statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FpsReport {
    pub processed_fps: f32,
    pub dropped_fps: f32,
    pub processed_frames: u64,
    pub dropped_frames: u64,
}

impl std::fmt::Display for FpsReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "processed: {:.1} fps ({} frames), dropped: {:.1} fps ({} frames)",
            self.processed_fps, self.processed_frames, self.dropped_fps, self.dropped_frames
        )
    }
}
