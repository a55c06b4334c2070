//! Motion curve shaping
//!
//! Turns an aggregated pointer sample into a right-stick deflection:
//!
//! ```text
//! counts/dt ──► velocity ──► [EMA below threshold] ──► radial magnitude
//!           ──► deadzone ──► anti-deadzone remap ──► [quantize] ──► [-1,1]²
//! ```
//!
//! The processor is stateful only through its smoothing filter.

use crate::config::Settings;
use glam::Vec2;
use tracing::trace;

/// Floor for the remap denominator when the deadzone approaches 1
const REMAP_EPSILON: f32 = 1e-5;

/// Largest deadzone accepted at point of use
const MAX_DEADZONE: f32 = 1.0 - REMAP_EPSILON;

/// Exponential moving average state over velocity
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SmoothingState {
    pub filtered: Vec2,
    pub has_value: bool,
}

/// Stateful curve processor for one session
#[derive(Debug, Clone)]
pub struct CurveProcessor {
    settings: Settings,
    smoothing: SmoothingState,
}

impl CurveProcessor {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            smoothing: SmoothingState::default(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn smoothing_state(&self) -> SmoothingState {
        self.smoothing
    }

    /// Shapes one motion sample into a stick vector with both axes in [-1, 1].
    ///
    /// Returns the zero vector for non-positive or non-finite timing and for
    /// any motion that lands inside the deadzone.
    pub fn process(&mut self, dx: f64, dy: f64, dt_seconds: f64) -> Vec2 {
        if !dt_seconds.is_finite() || dt_seconds <= 0.0 {
            trace!("Rejecting sample with invalid timing: dt={}", dt_seconds);
            return Vec2::ZERO;
        }
        if !dx.is_finite() || !dy.is_finite() {
            return Vec2::ZERO;
        }

        let s = &self.settings;
        let raw = Vec2::new(
            (dx / dt_seconds * s.sensitivity) as f32,
            (dy / dt_seconds * s.sensitivity * s.yx_ratio) as f32,
        );
        let velocity = self.filter(raw, dt_seconds);
        let s = &self.settings;

        let speed = velocity.length();
        if !speed.is_finite() || speed <= f32::EPSILON {
            return Vec2::ZERO;
        }

        let direction = velocity / speed;
        let full_deflection = (s.full_deflection_speed as f32).max(1.0);
        let magnitude = (speed / full_deflection).min(1.0);

        let deadzone = (s.deadzone as f32).clamp(0.0, MAX_DEADZONE);
        if magnitude <= deadzone {
            return Vec2::ZERO;
        }

        let anti_deadzone = (s.anti_deadzone as f32).clamp(0.0, 1.0);
        let remainder = (magnitude - deadzone) / (1.0 - deadzone).max(REMAP_EPSILON);
        let scaled = (anti_deadzone + remainder * (1.0 - anti_deadzone)).clamp(anti_deadzone, 1.0);

        let mut output = direction * scaled;

        if s.quantize_enabled() {
            let step = 2.0 / (s.quantize_levels - 1) as f32;
            output = Vec2::new(quantize(output.x, step), quantize(output.y, step));
        }

        output.clamp(Vec2::NEG_ONE, Vec2::ONE)
    }

    /// Blends slow motion through the EMA; fast motion overwrites the filter
    /// so a later return to slow motion starts without lag.
    fn filter(&mut self, velocity: Vec2, dt_seconds: f64) -> Vec2 {
        let s = &self.settings;
        let speed = velocity.length();

        if s.smoothing_enabled() && f64::from(speed) < s.adaptive_threshold {
            let smoothing_seconds = s.smoothing_ms.max(0.0) / 1000.0;
            let alpha = (dt_seconds / (smoothing_seconds + dt_seconds)) as f32;

            self.smoothing.filtered = if self.smoothing.has_value {
                self.smoothing.filtered.lerp(velocity, alpha)
            } else {
                velocity
            };
            self.smoothing.has_value = true;
            self.smoothing.filtered
        } else {
            self.smoothing = SmoothingState {
                filtered: velocity,
                has_value: true,
            };
            velocity
        }
    }

    pub fn reset(&mut self) {
        self.smoothing = SmoothingState::default();
    }
}

fn quantize(value: f32, step: f32) -> f32 {
    let cells = ((value + 1.0) / step).round();
    (cells * step - 1.0).clamp(-1.0, 1.0)
}
