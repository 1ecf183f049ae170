//! `$x=value` setting assignment with range validation.

use crate::error::{Error, ParseError, SettingError};
use crate::system::{X_AXIS, Y_AXIS, Z_AXIS};

use super::Settings;

/// Minimum usable step pulse, microseconds.
const MIN_PULSE_MICROSECONDS: f32 = 3.0;

impl Settings {
    /// Apply a `$index=value` assignment.
    ///
    /// Indices follow the classic numbering printed by `$$`. Boolean flags
    /// treat any non-zero value as true. The caller persists the record
    /// afterwards.
    ///
    /// # Errors
    ///
    /// - [`SettingError::NegativeValue`] for a negative value anywhere.
    /// - [`SettingError::StepPulseTooShort`] for `$3` below 3 µs.
    /// - [`ParseError::InvalidStatement`] for an unknown index.
    pub fn set_value(&mut self, index: u8, value: f32) -> Result<(), Error> {
        if value < 0.0 {
            return Err(SettingError::NegativeValue.into());
        }
        match index {
            0 => self.steps_per_mm[X_AXIS] = value,
            1 => self.steps_per_mm[Y_AXIS] = value,
            2 => self.steps_per_mm[Z_AXIS] = value,
            3 => {
                if value < MIN_PULSE_MICROSECONDS {
                    return Err(SettingError::StepPulseTooShort.into());
                }
                self.pulse_microseconds = value as u8;
            }
            4 => self.default_feed_rate = value,
            5 => self.default_seek_rate = value,
            6 => self.invert_mask = value as u8,
            7 => self.stepper_idle_lock_time = value as u8,
            // Entered in mm/sec², stored in mm/min².
            8 => self.acceleration = value * 60.0 * 60.0,
            9 => self.junction_deviation = value,
            10 => self.mm_per_arc_segment = value,
            11 => self.n_arc_correction = value as u8,
            12 => self.decimal_places = value as u8,
            13 => self.report_inches = value != 0.0,
            14 => self.auto_start = value != 0.0,
            15 => self.invert_step_enable = value != 0.0,
            16 => self.hard_limit_enable = value != 0.0,
            17 => self.homing_enable = value != 0.0,
            18 => self.homing_dir_mask = value as u8,
            19 => self.homing_feed_rate = value,
            20 => self.homing_seek_rate = value,
            21 => self.homing_debounce_delay = value as u16,
            22 => self.homing_pulloff = value,
            _ => return Err(ParseError::InvalidStatement.into()),
        }
        Ok(())
    }
}
