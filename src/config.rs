//! Session settings for the remapper
//!
//! [`RemapSettings`] is the unified configuration handed to
//! [`RemapHandle::spawn`](crate::controller::handle::RemapHandle::spawn). It is
//! split into [`Settings`] for the motion curve and [`EngineSettings`] for the
//! controller state engine. Values are trusted: nothing is rejected here, the
//! consumers clamp at the point of use.

use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Tuning parameters for the motion curve
///
/// Speeds are expressed in counts per second after sensitivity scaling.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    /// Multiplier applied to raw counts before anything else
    pub sensitivity: f64,

    /// Reported mouse resolution. Informational only, the curve does not use it.
    pub dpi: f64,

    /// Radial deadzone as a fraction of full deflection, in [0, 1)
    pub deadzone: f64,

    /// Smallest output magnitude just outside the deadzone, in [0, 1]
    pub anti_deadzone: f64,

    /// Vertical to horizontal gain ratio
    pub yx_ratio: f64,

    /// EMA time constant in milliseconds; 0 disables smoothing
    pub smoothing_ms: f64,

    /// Speed below which smoothing applies
    pub adaptive_threshold: f64,

    /// Snap output axes to a fixed grid
    pub quantize: bool,

    /// Number of grid points spanning [-1, 1] when `quantize` is set
    pub quantize_levels: u32,

    /// Speed that maps to full stick deflection
    pub full_deflection_speed: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sensitivity: 1.0,
            dpi: 1600.0,
            deadzone: 0.05,
            anti_deadzone: 0.10,
            yx_ratio: 1.0,
            smoothing_ms: 0.0,
            adaptive_threshold: 250.0,
            quantize: false,
            quantize_levels: 32,
            full_deflection_speed: 2500.0,
        }
    }
}

impl Settings {
    pub fn smoothing_enabled(&self) -> bool {
        self.smoothing_ms > 0.0
    }

    /// Quantization is only meaningful with at least two grid points.
    pub fn quantize_enabled(&self) -> bool {
        self.quantize && self.quantize_levels > 1
    }
}

/// Behavior of the controller state engine
#[derive(Clone, Debug, PartialEq)]
pub struct EngineSettings {
    /// How long a wheel tick holds the pulsed button down
    pub pulse_duration: Duration,

    /// Start the session in controller mode
    pub start_in_controller_mode: bool,

    /// Consume pointer motion while in controller mode so the cursor stays put
    pub suppress_pointer_motion: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            pulse_duration: Duration::from_millis(50),
            start_in_controller_mode: true,
            suppress_pointer_motion: true,
        }
    }
}

/// Unified settings for one remapping session
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RemapSettings {
    pub curve: Settings,
    pub engine: EngineSettings,

    /// Replay file to read raw events from; stdin when unset
    pub replay_path: Option<String>,
}

impl RemapSettings {
    /// Defaults overridden by `MNKPAD_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup. Unparseable values are
    /// logged and ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();
        let curve = &mut settings.curve;

        override_with(&lookup, "MNKPAD_SENSITIVITY", &mut curve.sensitivity);
        override_with(&lookup, "MNKPAD_DPI", &mut curve.dpi);
        override_with(&lookup, "MNKPAD_DEADZONE", &mut curve.deadzone);
        override_with(&lookup, "MNKPAD_ANTI_DEADZONE", &mut curve.anti_deadzone);
        override_with(&lookup, "MNKPAD_YX_RATIO", &mut curve.yx_ratio);
        override_with(&lookup, "MNKPAD_SMOOTHING_MS", &mut curve.smoothing_ms);
        override_with(
            &lookup,
            "MNKPAD_ADAPTIVE_THRESHOLD",
            &mut curve.adaptive_threshold,
        );
        override_with(
            &lookup,
            "MNKPAD_FULL_DEFLECTION",
            &mut curve.full_deflection_speed,
        );
        if override_with(&lookup, "MNKPAD_QUANTIZE_LEVELS", &mut curve.quantize_levels) {
            curve.quantize = true;
        }

        settings.replay_path = lookup("MNKPAD_REPLAY").filter(|path| !path.trim().is_empty());

        info!("Loaded remap settings: {:?}", settings);
        settings
    }
}

fn override_with<T, F>(lookup: &F, key: &str, target: &mut T) -> bool
where
    T: FromStr + std::fmt::Debug,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return false;
    };

    match raw.trim().parse::<T>() {
        Ok(value) => {
            debug!("{} overrides default {:?} with {:?}", key, target, value);
            *target = value;
            true
        }
        Err(_) => {
            warn!("Ignoring unparseable value {:?} for {}", raw, key);
            false
        }
    }
}
