//! Simulation doubles for the hardware seams.
//!
//! Lets the motion core run on a host with no target hardware: the port
//! counts pulses, the timer records its programming, and the delay does
//! nothing. Tests drive the interrupt entry points directly, one step
//! interrupt per would-be timer firing.

use embedded_hal::delay::DelayNs;

use crate::stepper::{PortBits, StepPort, StepTimer};

/// Step/direction port that records what was driven.
#[derive(Debug, Default)]
pub struct SimPort {
    /// Number of `write_steps` calls that raised at least one step line.
    pub pulses: u32,
    /// Last direction bits driven.
    pub direction: PortBits,
    /// Last enable level driven, if any.
    pub enable: Option<bool>,
}

impl SimPort {
    /// A port with nothing driven yet.
    pub fn new() -> Self {
        Self::default()
    }
}

impl StepPort for SimPort {
    fn write_direction(&mut self, bits: PortBits) {
        self.direction = bits & PortBits::DIRECTION_MASK;
    }

    fn write_steps(&mut self, bits: PortBits) {
        if bits.intersects(PortBits::STEP_MASK) {
            self.pulses += 1;
        }
    }

    fn set_enable(&mut self, on: bool) {
        self.enable = Some(on);
    }
}

/// Step timer double: records the programmed period and run state.
#[derive(Debug)]
pub struct SimTimer {
    clock_hz: u32,
    /// Step timer currently running.
    pub running: bool,
    /// Last programmed period, cycles.
    pub period: u32,
    /// How many one-shot pulse arms were requested.
    pub pulses_armed: u32,
}

impl SimTimer {
    /// A stopped timer with the given clock.
    pub fn new(clock_hz: u32) -> Self {
        Self {
            clock_hz,
            running: false,
            period: 0,
            pulses_armed: 0,
        }
    }
}

impl Default for SimTimer {
    /// A 1 MHz timer: one cycle per microsecond keeps test arithmetic
    /// readable.
    fn default() -> Self {
        Self::new(1_000_000)
    }
}

impl StepTimer for SimTimer {
    fn clock_hz(&self) -> u32 {
        self.clock_hz
    }

    fn load_period(&mut self, cycles: u32) {
        self.period = cycles;
    }

    fn start(&mut self) {
        self.running = true;
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn arm_pulse(&mut self, _cycles: u32) {
        self.pulses_armed += 1;
    }
}

/// Delay provider that returns immediately.
#[derive(Debug, Default)]
pub struct SimDelay;

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}
