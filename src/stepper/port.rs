//! Step/direction port abstraction.
//!
//! All six motion signals live in one packed byte so the interrupt can
//! compute the next output in a single value and apply the configured
//! invert mask with one XOR. A set direction bit means travel in the
//! negative direction on that axis.

use bitflags::bitflags;
use embedded_hal::digital::OutputPin;

use crate::system::{N_AXIS, X_AXIS, Y_AXIS, Z_AXIS};

bitflags! {
    /// Packed step and direction output bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PortBits: u8 {
        /// X axis step pulse.
        const X_STEP = 1 << 0;
        /// Y axis step pulse.
        const Y_STEP = 1 << 1;
        /// Z axis step pulse.
        const Z_STEP = 1 << 2;
        /// X axis direction (set = negative travel).
        const X_DIR = 1 << 3;
        /// Y axis direction (set = negative travel).
        const Y_DIR = 1 << 4;
        /// Z axis direction (set = negative travel).
        const Z_DIR = 1 << 5;
    }
}

impl PortBits {
    /// All step bits.
    pub const STEP_MASK: PortBits = PortBits::X_STEP.union(PortBits::Y_STEP).union(PortBits::Z_STEP);

    /// All direction bits.
    pub const DIRECTION_MASK: PortBits =
        PortBits::X_DIR.union(PortBits::Y_DIR).union(PortBits::Z_DIR);

    /// Step bit for an axis index.
    #[inline]
    pub fn step_bit(axis: usize) -> PortBits {
        match axis {
            X_AXIS => PortBits::X_STEP,
            Y_AXIS => PortBits::Y_STEP,
            Z_AXIS => PortBits::Z_STEP,
            _ => PortBits::empty(),
        }
    }

    /// Direction bit for an axis index.
    #[inline]
    pub fn direction_bit(axis: usize) -> PortBits {
        match axis {
            X_AXIS => PortBits::X_DIR,
            Y_AXIS => PortBits::Y_DIR,
            Z_AXIS => PortBits::Z_DIR,
            _ => PortBits::empty(),
        }
    }
}

/// Hardware port for the motion signals.
///
/// Implementations receive raw output levels; polarity inversion has
/// already been applied by the interrupt through the configured invert
/// mask.
pub trait StepPort {
    /// Drive the three direction lines from the direction bits of `bits`.
    fn write_direction(&mut self, bits: PortBits);

    /// Drive the three step lines from the step bits of `bits`.
    fn write_steps(&mut self, bits: PortBits);

    /// Drive the stepper-enable line.
    fn set_enable(&mut self, on: bool);
}

/// [`StepPort`] over six `embedded-hal` output pins plus an enable pin.
pub struct HalStepPort<SP, DP, EN>
where
    SP: OutputPin,
    DP: OutputPin,
    EN: OutputPin,
{
    step_pins: [SP; N_AXIS],
    dir_pins: [DP; N_AXIS],
    enable_pin: EN,
}

impl<SP, DP, EN> HalStepPort<SP, DP, EN>
where
    SP: OutputPin,
    DP: OutputPin,
    EN: OutputPin,
{
    /// Wrap the given pins. Pin errors are ignored at run time: a failed
    /// GPIO write on a dedicated output is not a recoverable condition in
    /// the step interrupt.
    pub fn new(step_pins: [SP; N_AXIS], dir_pins: [DP; N_AXIS], enable_pin: EN) -> Self {
        Self {
            step_pins,
            dir_pins,
            enable_pin,
        }
    }
}

impl<SP, DP, EN> StepPort for HalStepPort<SP, DP, EN>
where
    SP: OutputPin,
    DP: OutputPin,
    EN: OutputPin,
{
    fn write_direction(&mut self, bits: PortBits) {
        for (axis, pin) in self.dir_pins.iter_mut().enumerate() {
            let _ = if bits.contains(PortBits::direction_bit(axis)) {
                pin.set_high()
            } else {
                pin.set_low()
            };
        }
    }

    fn write_steps(&mut self, bits: PortBits) {
        for (axis, pin) in self.step_pins.iter_mut().enumerate() {
            let _ = if bits.contains(PortBits::step_bit(axis)) {
                pin.set_high()
            } else {
                pin.set_low()
            };
        }
    }

    fn set_enable(&mut self, on: bool) {
        let _ = if on {
            self.enable_pin.set_high()
        } else {
            self.enable_pin.set_low()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masks_are_disjoint() {
        assert_eq!(
            PortBits::STEP_MASK & PortBits::DIRECTION_MASK,
            PortBits::empty()
        );
        assert_eq!(
            PortBits::STEP_MASK | PortBits::DIRECTION_MASK,
            PortBits::all()
        );
    }

    #[test]
    fn test_axis_bits() {
        assert_eq!(PortBits::step_bit(X_AXIS), PortBits::X_STEP);
        assert_eq!(PortBits::direction_bit(Z_AXIS), PortBits::Z_DIR);
    }
}
