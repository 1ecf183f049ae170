//! Machine settings.
//!
//! The [`Settings`] record mirrors the persistent configuration of the
//! controller: axis scaling, pulse timing, planner limits and feature
//! flags. It derives `Deserialize` so host-side builds and tests can load
//! it from TOML; on the target it lives in non-volatile memory behind the
//! [`NonVolatile`] trait as a versioned, checksummed record.

mod record;
mod validation;

pub use record::{load_settings, load_startup_line, store_settings, store_startup_line};
pub use record::{MemoryStore, NonVolatile, NvError, STARTUP_LINE_LEN, STARTUP_LINES};

use serde::Deserialize;

use crate::system::N_AXIS;

/// Persistent machine settings.
///
/// Rates are millimeters per minute and the acceleration is stored in
/// mm/min² (the planner's native unit); the `$8=` interface accepts
/// mm/sec² and scales on the way in, as `$$` scales on the way out.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Steps per millimeter for each axis.
    pub steps_per_mm: [f32; N_AXIS],
    /// Step pulse length in microseconds (minimum 3).
    pub pulse_microseconds: u8,
    /// Feed rate used when a line has never set one, mm/min.
    pub default_feed_rate: f32,
    /// Rapid (seek) rate, mm/min.
    pub default_seek_rate: f32,
    /// Step/direction port invert mask (raw idle polarities).
    pub invert_mask: u8,
    /// Milliseconds to keep the steppers locked after motion stops;
    /// 255 keeps them enabled forever.
    pub stepper_idle_lock_time: u8,
    /// Acceleration in mm/min².
    pub acceleration: f32,
    /// Junction deviation in millimeters (cornering tolerance).
    pub junction_deviation: f32,
    /// Arc interpolation segment length, mm (used by the external arc
    /// generator).
    pub mm_per_arc_segment: f32,
    /// Arc correction interval (iterations between exact recomputes).
    pub n_arc_correction: u8,
    /// Decimal places in printed coordinates.
    pub decimal_places: u8,
    /// Report positions in inches instead of millimeters.
    pub report_inches: bool,
    /// Start the cycle automatically whenever motion is queued.
    pub auto_start: bool,
    /// Invert the stepper-enable output.
    pub invert_step_enable: bool,
    /// Enable hard limit switches.
    pub hard_limit_enable: bool,
    /// Enable homing (and the power-up alarm lock).
    pub homing_enable: bool,
    /// Direction mask for the homing cycle.
    pub homing_dir_mask: u8,
    /// Homing feed (locate) rate, mm/min.
    pub homing_feed_rate: f32,
    /// Homing seek (search) rate, mm/min.
    pub homing_seek_rate: f32,
    /// Homing switch debounce delay, ms.
    pub homing_debounce_delay: u16,
    /// Homing pull-off distance, mm.
    pub homing_pulloff: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            steps_per_mm: [250.0, 250.0, 250.0],
            pulse_microseconds: 10,
            default_feed_rate: 250.0,
            default_seek_rate: 500.0,
            invert_mask: 0,
            stepper_idle_lock_time: 25,
            acceleration: 10.0 * 60.0 * 60.0, // 10 mm/sec²
            junction_deviation: 0.05,
            mm_per_arc_segment: 0.1,
            n_arc_correction: 25,
            decimal_places: 3,
            report_inches: false,
            auto_start: true,
            invert_step_enable: false,
            hard_limit_enable: false,
            homing_enable: false,
            homing_dir_mask: 0,
            homing_feed_rate: 25.0,
            homing_seek_rate: 250.0,
            homing_debounce_delay: 100,
            homing_pulloff: 1.0,
        }
    }
}

/// Millimeters per inch, for inch reporting and G20 input scaling.
pub const MM_PER_INCH: f32 = 25.4;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_sane() {
        let s = Settings::default();
        assert!(s.pulse_microseconds >= 3);
        assert!(s.acceleration > 0.0);
        assert!(s.junction_deviation > 0.0);
        for i in 0..N_AXIS {
            assert!(s.steps_per_mm[i] > 0.0);
        }
    }

    #[test]
    fn test_deserialize_partial_toml() {
        let toml = r#"
steps_per_mm = [100.0, 100.0, 100.0]
acceleration = 36000.0
default_feed_rate = 600.0
"#;
        let s: Settings = toml::from_str(toml).unwrap();
        assert!((s.steps_per_mm[0] - 100.0).abs() < 1e-6);
        assert!((s.acceleration - 36000.0).abs() < 1e-3);
        // unspecified fields fall back to defaults
        assert_eq!(s.decimal_places, 3);
        assert!((s.junction_deviation - 0.05).abs() < 1e-6);
    }
}
