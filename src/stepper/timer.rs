//! Step timing abstraction and shared timing constants.

/// Acceleration ticks per second. Raising this refines the velocity
/// staircase at the cost of more rate updates per second; numerical
/// round-off bounds how far it usefully goes.
pub const ACCELERATION_TICKS_PER_SECOND: u32 = 120;

/// Floor for the programmed step rate. The step timer never runs slower
/// than this, which also keeps the period arithmetic away from zero.
pub const MINIMUM_STEPS_PER_MINUTE: u32 = 800;

/// The two hardware timers that drive step generation.
///
/// The periodic step timer fires the step interrupt every
/// `cycles_per_step_event` clock cycles; the one-shot pulse timer, armed
/// from inside the step interrupt, fires at a strictly higher priority to
/// end (or, in the pulse-delay variant, begin) the step pulse.
pub trait StepTimer {
    /// Timer input clock, Hz.
    fn clock_hz(&self) -> u32;

    /// Program the step timer period in clock cycles. Implementations
    /// with narrower counters prescale internally; the value is already
    /// saturated to `u32::MAX`.
    fn load_period(&mut self, cycles: u32);

    /// Start the periodic step timer.
    fn start(&mut self);

    /// Stop the periodic step timer.
    fn stop(&mut self);

    /// Arm the one-shot pulse timer to fire after `cycles`.
    fn arm_pulse(&mut self, cycles: u32);
}

/// Convert a step rate to a timer period, clamped below at
/// [`MINIMUM_STEPS_PER_MINUTE`] and saturated above.
#[inline]
pub fn rate_to_cycles(clock_hz: u32, steps_per_minute: u32) -> u32 {
    let rate = steps_per_minute.max(MINIMUM_STEPS_PER_MINUTE);
    // (clock/rate)*60 rather than clock*60/rate: the latter overflows u32
    // for any clock above ~71 MHz.
    (clock_hz / rate).saturating_mul(60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_to_cycles() {
        // 16 MHz, 60000 steps/min (1 kHz): 16e6/1000 = 16000 cycles.
        assert_eq!(rate_to_cycles(16_000_000, 60_000), 16_000);
    }

    #[test]
    fn test_rate_clamped_at_minimum() {
        let floor = rate_to_cycles(16_000_000, MINIMUM_STEPS_PER_MINUTE);
        assert_eq!(rate_to_cycles(16_000_000, 0), floor);
        assert_eq!(rate_to_cycles(16_000_000, 1), floor);
    }

    #[test]
    fn test_no_overflow_at_high_clock() {
        // 80 MHz at the minimum rate must not wrap.
        let cycles = rate_to_cycles(80_000_000, 0);
        assert_eq!(cycles, (80_000_000 / MINIMUM_STEPS_PER_MINUTE) * 60);
    }
}
