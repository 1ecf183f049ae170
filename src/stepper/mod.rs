//! Stepper executor.
//!
//! Consumes planned blocks and turns them into step/direction pulses. Two
//! cooperating timers drive it: the periodic step timer fires
//! [`Stepper::step_interrupt`], which distributes pulses across the axes
//! with a Bresenham tracer and adjusts the step rate once per
//! acceleration tick; the higher-priority one-shot pulse timer fires
//! [`Stepper::pulse_reset_interrupt`] to end each pulse after the
//! configured width.
//!
//! Output bits computed by one firing are driven at the start of the
//! next. This is deliberate: a direction-line transition always settles
//! at least one full step period before the pulse it applies to.

mod port;
mod timer;

pub use port::{HalStepPort, PortBits, StepPort};
pub use timer::{
    rate_to_cycles, StepTimer, ACCELERATION_TICKS_PER_SECOND, MINIMUM_STEPS_PER_MINUTE,
};

use embedded_hal::delay::DelayNs;

use crate::planner::Planner;
use crate::settings::Settings;
use crate::system::{Exec, MachineState, SystemState, N_AXIS};

/// Keep the steppers energized forever after motion stops.
pub const IDLE_LOCK_KEEP_ENABLED: u8 = 0xFF;

/// Step pulse width in timer cycles. Two cycles of interrupt-entry
/// latency have already elapsed by the time the reset timer is armed.
fn pulse_width_cycles(settings: &Settings, clock_hz: u32) -> u32 {
    let ticks_per_us = (clock_hz / 1_000_000).max(1);
    (u32::from(settings.pulse_microseconds).saturating_sub(2)).max(1) * ticks_per_us
}

/// The stepper executor's runtime state.
///
/// Zeroed on reset; mutated exclusively by the step interrupt while a
/// cycle runs.
#[derive(Debug, Default)]
pub struct Stepper {
    /// Bresenham accumulators per axis.
    counter: [i32; N_AXIS],
    /// Copy of the active block's step event count.
    event_count: u32,
    step_events_completed: u32,
    /// Step timer reload value for the current rate.
    cycles_per_step_event: u32,
    /// Cycles since the last acceleration tick.
    trapezoid_tick_cycle_counter: u32,
    /// Current step rate, steps/min.
    trapezoid_adjusted_rate: u32,
    /// Below this rate deceleration switches to halving; 1.5 × rate_delta.
    min_safe_rate: u32,
    /// Cached `clock / ACCELERATION_TICKS_PER_SECOND`.
    cycles_per_acceleration_tick: u32,
    /// Output bits to drive at the next firing.
    out_bits: PortBits,
    /// Pulse-delay variant: step bits waiting for the delay to elapse.
    pending_step_bits: Option<PortBits>,
    /// Direction-to-step delay in timer cycles; 0 disables the variant.
    pulse_delay_cycles: u32,
    /// Reentry guard for the step interrupt.
    busy: bool,
    /// A block is loaded (survives feed hold so the path can resume).
    block_active: bool,
}

impl Stepper {
    /// A stepper with cleared runtime state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all runtime state and park the step timer at the minimum
    /// rate.
    pub fn reset<T: StepTimer>(&mut self, timer: &mut T) {
        let pulse_delay = self.pulse_delay_cycles;
        *self = Self::default();
        self.pulse_delay_cycles = pulse_delay;
        self.cycles_per_acceleration_tick = timer.clock_hz() / ACCELERATION_TICKS_PER_SECOND;
        self.set_step_events_per_minute(timer, MINIMUM_STEPS_PER_MINUTE);
        timer.stop();
    }

    /// Configure the optional direction-to-step delay. With a non-zero
    /// delay the step interrupt leaves the pulse to the pulse timer: one
    /// firing raises the step lines after the delay, a second lowers them
    /// after the pulse width.
    pub fn set_step_pulse_delay<T: StepTimer>(&mut self, timer: &T, microseconds: u32) {
        let ticks_per_us = (timer.clock_hz() / 1_000_000).max(1);
        self.pulse_delay_cycles = microseconds * ticks_per_us;
    }

    /// Current step rate, steps/min.
    #[inline]
    pub fn rate(&self) -> u32 {
        self.trapezoid_adjusted_rate
    }

    /// Step events completed within the active block.
    #[inline]
    pub fn step_events_completed(&self) -> u32 {
        self.step_events_completed
    }

    /// Programmed step timer period, cycles.
    #[inline]
    pub fn cycles_per_step_event(&self) -> u32 {
        self.cycles_per_step_event
    }

    /// True while a block is loaded (including a held one).
    #[inline]
    pub fn has_active_block(&self) -> bool {
        self.block_active
    }

    /// Energize the steppers and, when a cycle is running, start the step
    /// timer with idle output polarities.
    pub fn wake_up<P: StepPort, T: StepTimer>(
        &mut self,
        sys: &SystemState,
        settings: &Settings,
        port: &mut P,
        timer: &mut T,
    ) {
        self.drive_enable(settings, port, true);
        if sys.state == MachineState::Cycle {
            self.out_bits = PortBits::from_bits_truncate(settings.invert_mask);
            self.cycles_per_acceleration_tick =
                timer.clock_hz() / ACCELERATION_TICKS_PER_SECOND;
            timer.start();
        }
    }

    /// Stop stepping immediately. Interrupt-safe: no dwell, no enable
    /// change; the runtime coordinator finishes the shutdown.
    pub fn halt<T: StepTimer>(&mut self, timer: &mut T) {
        timer.stop();
    }

    /// Full shutdown from the foreground: stop the timer and, unless the
    /// steppers are configured to stay locked, de-energize them after the
    /// idle-lock dwell so residual inertia cannot drift the axes.
    pub fn sleep<P: StepPort, T: StepTimer, D: DelayNs>(
        &mut self,
        settings: &Settings,
        port: &mut P,
        timer: &mut T,
        delay: &mut D,
        alarmed: bool,
    ) {
        self.halt(timer);
        if settings.stepper_idle_lock_time != IDLE_LOCK_KEEP_ENABLED || alarmed {
            delay.delay_ms(u32::from(settings.stepper_idle_lock_time));
            self.drive_enable(settings, port, false);
        }
    }

    fn drive_enable<P: StepPort>(&mut self, settings: &Settings, port: &mut P, energize: bool) {
        port.set_enable(energize != settings.invert_step_enable);
    }

    /// Begin executing queued blocks: `Queued → Cycle`.
    pub fn cycle_start<P: StepPort, T: StepTimer>(
        &mut self,
        sys: &mut SystemState,
        settings: &Settings,
        port: &mut P,
        timer: &mut T,
    ) {
        if sys.state == MachineState::Queued {
            sys.state = MachineState::Cycle;
            self.wake_up(sys, settings, port, timer);
        }
    }

    /// Request a feed hold: `Cycle → Hold`. The interrupt decelerates and
    /// raises `CYCLE_STOP` when the machine has stopped.
    pub fn feed_hold(&mut self, sys: &mut SystemState) {
        if sys.state == MachineState::Cycle {
            sys.state = MachineState::Hold;
            sys.auto_start = false;
        }
    }

    /// Rebuild the plan after a feed hold has fully stopped the machine.
    ///
    /// The held block is shortened to its unexecuted remainder and
    /// re-planned from rest; the Bresenham state is untouched, so on
    /// resume the path continues exactly where it paused.
    pub fn cycle_reinitialize<T: StepTimer>(
        &mut self,
        sys: &mut SystemState,
        planner: &mut Planner,
        timer: &mut T,
    ) {
        if self.block_active {
            let remaining = planner
                .current_block()
                .map(|b| b.step_event_count.saturating_sub(self.step_events_completed))
                .unwrap_or(0);
            planner.cycle_reinitialize(remaining);
            self.trapezoid_adjusted_rate = 0;
            self.set_step_events_per_minute(timer, 0); // clamps to the minimum
            self.trapezoid_tick_cycle_counter = self.cycles_per_acceleration_tick / 2;
            self.step_events_completed = 0;
            sys.state = MachineState::Queued;
        } else {
            sys.state = MachineState::Idle;
        }
    }

    /// The step timer interrupt body.
    ///
    /// Pops blocks from the planner's buffer and executes them: drives
    /// the previously computed output bits, traces the Bresenham line
    /// across the axes, and runs the trapezoid generator once per step
    /// event.
    pub fn step_interrupt<P: StepPort, T: StepTimer>(
        &mut self,
        sys: &mut SystemState,
        planner: &mut Planner,
        settings: &Settings,
        port: &mut P,
        timer: &mut T,
    ) {
        if self.busy {
            return;
        }

        // Direction first, then the pulse for the bits computed by the
        // previous firing.
        port.write_direction(self.out_bits);
        if self.pulse_delay_cycles == 0 {
            port.write_steps(self.out_bits);
            timer.arm_pulse(pulse_width_cycles(settings, timer.clock_hz()));
        } else {
            self.pending_step_bits = Some(self.out_bits);
            timer.arm_pulse(self.pulse_delay_cycles);
        }

        // From here the interrupt may be preempted, but not re-entered.
        self.busy = true;

        if !self.block_active {
            if let Some(block) = planner.current_block() {
                let initial = block.initial_rate;
                let rate_delta = block.rate_delta;
                let event_count = block.step_event_count;
                // During feed hold the rate and tick counter are left
                // alone: the deceleration profile spans block boundaries.
                if sys.state == MachineState::Cycle {
                    self.trapezoid_adjusted_rate = initial;
                    self.set_step_events_per_minute(timer, initial);
                    self.trapezoid_tick_cycle_counter = self.cycles_per_acceleration_tick / 2;
                }
                self.min_safe_rate = rate_delta + (rate_delta >> 1);
                self.counter = [-((event_count >> 1) as i32); N_AXIS];
                self.event_count = event_count;
                self.step_events_completed = 0;
                self.block_active = true;
            } else {
                self.halt(timer);
                sys.pending.set(Exec::CYCLE_STOP);
            }
        }

        let mut finished = false;
        if self.block_active {
            if let Some(block) = planner.current_block() {
                // Bresenham across the axes: every accumulator gains its
                // axis step count each event; a positive accumulator emits
                // a pulse and pays back one full event count.
                self.out_bits = block.direction_bits;
                for axis in 0..N_AXIS {
                    self.counter[axis] += block.steps[axis] as i32;
                    if self.counter[axis] > 0 {
                        self.out_bits |= PortBits::step_bit(axis);
                        self.counter[axis] -= self.event_count as i32;
                        if block.direction_bits.contains(PortBits::direction_bit(axis)) {
                            sys.position[axis] -= 1;
                        } else {
                            sys.position[axis] += 1;
                        }
                    }
                }
                self.step_events_completed += 1;

                if self.step_events_completed < block.step_event_count {
                    if sys.state == MachineState::Hold {
                        self.hold_tick(block.rate_delta, sys, timer);
                    } else {
                        self.trapezoid_tick(
                            block.accelerate_until,
                            block.decelerate_after,
                            block.nominal_rate,
                            block.final_rate,
                            block.rate_delta,
                            timer,
                        );
                    }
                } else {
                    finished = true;
                }
            }
        }
        if finished {
            self.block_active = false;
            planner.discard_current_block();
        }

        self.out_bits ^= PortBits::from_bits_truncate(settings.invert_mask);
        self.busy = false;
    }

    /// The pulse timer interrupt body: ends the step pulse, or in the
    /// pulse-delay variant first begins it and re-arms for the tail end.
    pub fn pulse_reset_interrupt<P: StepPort, T: StepTimer>(
        &mut self,
        settings: &Settings,
        port: &mut P,
        timer: &mut T,
    ) {
        if let Some(bits) = self.pending_step_bits.take() {
            port.write_steps(bits);
            timer.arm_pulse(pulse_width_cycles(settings, timer.clock_hz()));
            return;
        }
        // Step lines back to idle polarity; direction lines stay put.
        port.write_steps(PortBits::from_bits_truncate(settings.invert_mask));
    }

    /// One acceleration tick has elapsed when the accumulated step-event
    /// cycles cross the tick period. Rate updates therefore happen at a
    /// steady pace without a third timer; step events are assumed to be
    /// considerably more frequent than ticks.
    fn acceleration_tick(&mut self) -> bool {
        self.trapezoid_tick_cycle_counter += self.cycles_per_step_event;
        if self.trapezoid_tick_cycle_counter > self.cycles_per_acceleration_tick {
            self.trapezoid_tick_cycle_counter -= self.cycles_per_acceleration_tick;
            true
        } else {
            false
        }
    }

    /// Trapezoid rate policy for a normally executing block.
    #[allow(clippy::too_many_arguments)]
    fn trapezoid_tick<T: StepTimer>(
        &mut self,
        accelerate_until: u32,
        decelerate_after: u32,
        nominal_rate: u32,
        final_rate: u32,
        rate_delta: u32,
        timer: &mut T,
    ) {
        if self.step_events_completed < accelerate_until {
            if self.acceleration_tick() {
                self.trapezoid_adjusted_rate =
                    (self.trapezoid_adjusted_rate + rate_delta).min(nominal_rate);
                let rate = self.trapezoid_adjusted_rate;
                self.set_step_events_per_minute(timer, rate);
            }
        } else if self.step_events_completed >= decelerate_after {
            if self.step_events_completed == decelerate_after {
                // Seed the tick counter on the exact boundary step.
                // Entering from cruise restarts at the midpoint; a
                // triangle continues its phase with the complement.
                self.trapezoid_tick_cycle_counter =
                    if self.trapezoid_adjusted_rate == nominal_rate {
                        self.cycles_per_acceleration_tick / 2
                    } else {
                        self.cycles_per_acceleration_tick
                            .saturating_sub(self.trapezoid_tick_cycle_counter)
                    };
            } else if self.acceleration_tick() {
                // Full decrements while safely above the floor, then
                // halving. The halves never exceed rate_delta, so the
                // acceleration limit holds down to the stop.
                if self.trapezoid_adjusted_rate > self.min_safe_rate {
                    self.trapezoid_adjusted_rate -= rate_delta;
                } else {
                    self.trapezoid_adjusted_rate >>= 1;
                }
                if self.trapezoid_adjusted_rate < final_rate {
                    self.trapezoid_adjusted_rate = final_rate;
                }
                let rate = self.trapezoid_adjusted_rate;
                self.set_step_events_per_minute(timer, rate);
            }
        } else if self.trapezoid_adjusted_rate != nominal_rate {
            // Cruise exactly at nominal.
            self.trapezoid_adjusted_rate = nominal_rate;
            let rate = self.trapezoid_adjusted_rate;
            self.set_step_events_per_minute(timer, rate);
        }
    }

    /// Feed-hold rate policy: steady deceleration at the block's
    /// rate_delta regardless of phase, spanning block boundaries. When
    /// the rate bottoms out, the stepper idles without releasing the
    /// block, since the Bresenham state must survive for the resume.
    fn hold_tick<T: StepTimer>(
        &mut self,
        rate_delta: u32,
        sys: &mut SystemState,
        timer: &mut T,
    ) {
        if self.acceleration_tick() {
            if self.trapezoid_adjusted_rate <= rate_delta {
                self.halt(timer);
                sys.pending.set(Exec::CYCLE_STOP);
            } else {
                self.trapezoid_adjusted_rate -= rate_delta;
                let rate = self.trapezoid_adjusted_rate;
                self.set_step_events_per_minute(timer, rate);
            }
        }
    }

    fn set_step_events_per_minute<T: StepTimer>(&mut self, timer: &mut T, steps_per_minute: u32) {
        self.cycles_per_step_event = rate_to_cycles(timer.clock_hz(), steps_per_minute);
        timer.load_period(self.cycles_per_step_event);
    }
}
