//! Planned motion blocks.
//!
//! A block is one constant-acceleration linear segment. The planner fills
//! in the geometry and speed limits; [`Block::calculate_trapezoid`]
//! derives the step-rate profile the stepper interrupt executes.

use libm::{ceilf, floorf, sqrtf};

use crate::stepper::PortBits;
use crate::system::N_AXIS;

/// A planned constant-acceleration segment between two waypoints.
///
/// Speeds are stored squared (mm/min)² so the look-ahead passes never
/// take a square root; rates are steps/min and only appear where a value
/// is about to be programmed into the step timer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Block {
    /// Step count magnitude per axis.
    pub steps: [u32; N_AXIS],
    /// Direction bits (set = negative travel).
    pub direction_bits: PortBits,
    /// Maximum of `steps`: the number of Bresenham major-axis events.
    pub step_event_count: u32,
    /// Euclidean length of the segment, mm.
    pub millimeters: f32,
    /// Squared nominal (requested) speed, (mm/min)².
    pub nominal_speed_sq: f32,
    /// Step rate at nominal speed, steps/min.
    pub nominal_rate: u32,
    /// Squared speed at block entry; planner-owned.
    pub entry_speed_sq: f32,
    /// Squared junction speed limit with the preceding block.
    pub max_entry_speed_sq: f32,
    /// Acceleration along the segment, mm/min².
    pub acceleration: f32,
    /// Step-rate increment per acceleration tick, steps/min.
    pub rate_delta: u32,
    /// Step rate at block entry, steps/min.
    pub initial_rate: u32,
    /// Step rate at block exit, steps/min.
    pub final_rate: u32,
    /// Step events before acceleration ends.
    pub accelerate_until: u32,
    /// Step events after which deceleration begins.
    pub decelerate_after: u32,
    /// The block is long enough to reach nominal speed from rest; once its
    /// entry speed is settled, earlier blocks need no re-examination.
    pub nominal_length: bool,
    /// Entry speed changed; the trapezoid must be re-derived.
    pub recalculate: bool,
}

impl Block {
    /// An all-zero block, used to initialize buffer slots.
    pub const EMPTY: Block = Block {
        steps: [0; N_AXIS],
        direction_bits: PortBits::empty(),
        step_event_count: 0,
        millimeters: 0.0,
        nominal_speed_sq: 0.0,
        nominal_rate: 0,
        entry_speed_sq: 0.0,
        max_entry_speed_sq: 0.0,
        acceleration: 0.0,
        rate_delta: 0,
        initial_rate: 0,
        final_rate: 0,
        accelerate_until: 0,
        decelerate_after: 0,
        nominal_length: false,
        recalculate: false,
    };

    /// Squared speed reachable from `initial_sq` over `distance` mm at
    /// this block's acceleration.
    #[inline]
    pub fn speed_reachable_sq(&self, initial_sq: f32, distance: f32) -> f32 {
        initial_sq + 2.0 * self.acceleration * distance
    }

    /// Derive the trapezoid parameters from the settled entry speed and
    /// the successor's entry speed.
    ///
    /// Step counts delimiting the three phases come from the
    /// constant-acceleration kinematics; when accelerate and decelerate
    /// ramps overlap, the profile degenerates to a triangle whose apex is
    /// placed at the ramp intersection.
    pub fn calculate_trapezoid(&mut self, exit_speed_sq: f32) {
        if self.step_event_count == 0 || self.millimeters <= 0.0 || self.acceleration <= 0.0 {
            return;
        }
        let steps_per_mm = self.step_event_count as f32 / self.millimeters;

        self.initial_rate = ceilf(sqrtf(self.entry_speed_sq) * steps_per_mm) as u32;
        self.final_rate = ceilf(sqrtf(exit_speed_sq) * steps_per_mm) as u32;

        let twice_acc = 2.0 * self.acceleration;
        let accel_mm = (self.nominal_speed_sq - self.entry_speed_sq) / twice_acc;
        let decel_mm = (self.nominal_speed_sq - exit_speed_sq) / twice_acc;
        let mut accelerate_steps = ceilf(accel_mm * steps_per_mm).max(0.0);
        let decelerate_steps = floorf(decel_mm * steps_per_mm).max(0.0);

        let plateau_steps =
            self.step_event_count as f32 - accelerate_steps - decelerate_steps;
        if plateau_steps < 0.0 {
            // Triangle: ramps meet before nominal speed. Apex from the
            // intersection of the two ramps over the block length.
            let intersect_mm = (exit_speed_sq - self.entry_speed_sq
                + twice_acc * self.millimeters)
                / (2.0 * twice_acc);
            accelerate_steps = ceilf(intersect_mm * steps_per_mm)
                .max(0.0)
                .min(self.step_event_count as f32);
            self.accelerate_until = accelerate_steps as u32;
            self.decelerate_after = self.accelerate_until;
        } else {
            self.accelerate_until = accelerate_steps as u32;
            self.decelerate_after = (accelerate_steps + plateau_steps) as u32;
        }
    }
}
