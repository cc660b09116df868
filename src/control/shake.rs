// SPDX-License-Identifier: GPL-3.0-only

//! Accelerometer shake detection
//!
//! A low-pass filter tracks gravity; whatever is left over is linear
//! acceleration. A shake is linear acceleration above the threshold.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShakeConfig {
    /// Low-pass weight of the previous gravity estimate
    pub alpha: f32,
    /// Linear acceleration in m/s² that counts as a shake
    pub threshold: f32,
    /// Samples closer together than this are ignored
    pub debounce_ms: u64,
}

impl Default for ShakeConfig {
    fn default() -> Self {
        Self {
            alpha: 0.8,
            threshold: 3.3,
            debounce_ms: 500,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShakeDetector {
    config: ShakeConfig,
    gravity: Option<[f32; 3]>,
    last_sample: Option<Instant>,
}

impl ShakeDetector {
    pub fn new(config: ShakeConfig) -> Self {
        Self {
            config,
            gravity: None,
            last_sample: None,
        }
    }

    /// Feed one accelerometer sample, returns `true` on a shake
    ///
    /// The first sample seeds the gravity estimate and never counts.
    pub fn update(&mut self, values: [f32; 3], now: Instant) -> bool {
        let debounce = Duration::from_millis(self.config.debounce_ms);
        if self
            .last_sample
            .is_some_and(|last| now.saturating_duration_since(last) < debounce)
        {
            return false;
        }
        self.last_sample = Some(now);

        let Some(gravity) = self.gravity.as_mut() else {
            self.gravity = Some(values);
            return false;
        };

        let alpha = self.config.alpha;
        let mut magnitude = 0.0f32;
        for (g, v) in gravity.iter_mut().zip(values) {
            *g = alpha * *g + (1.0 - alpha) * v;
            let linear = v - *g;
            magnitude += linear * linear;
        }
        magnitude.sqrt() > self.config.threshold
    }

    pub fn reset(&mut self) {
        self.gravity = None;
        self.last_sample = None;
    }
}
