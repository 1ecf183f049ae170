//! Runtime coordinator.
//!
//! [`Machine`] is the foreground face of the controller: it owns the
//! settings, the shared system state, the planner and the stepper, plus
//! the serial front-end. Interrupt handlers call the `*_interrupt`
//! entry points; the main loop feeds serial bytes in and calls
//! [`Machine::poll`] every iteration to consume pending actions.
//!
//! Cooperative waits (a full block buffer, [`Machine::synchronize`])
//! loop over `poll` and an embedder-supplied idle hook; on hardware the
//! hook typically sleeps until the next interrupt; simulations use it to
//! fire the step interrupt. Serial output goes through `core::fmt::Write`
//! and write failures are ignored, as there is nothing a controller can
//! do about a broken console.

use core::fmt::Write;

use embedded_hal::delay::DelayNs;

use crate::error::{Alarm, Error, ParseError, Result, SettingError, StateError};
use crate::gcode::{Motion, Parser};
use crate::planner::{BufferFull, Planner};
use crate::protocol::{self, report, Protocol, SystemCommand};
use crate::settings::{self, NonVolatile, Settings, STARTUP_LINES};
use crate::stepper::{StepPort, StepTimer, Stepper};
use crate::system::{Exec, MachineState, SystemState, N_AXIS};

/// The hardware bundle every foreground entry point needs: motion port,
/// step timers, a delay provider and the non-volatile settings store.
#[derive(Debug)]
pub struct Hal<P, T, D, N> {
    /// Step/direction/enable outputs.
    pub port: P,
    /// Step and pulse timers.
    pub timer: T,
    /// Dwell provider for the idle lock.
    pub delay: D,
    /// Settings storage.
    pub nv: N,
}

/// The controller: shared state plus the foreground coordinator.
pub struct Machine {
    /// Active settings.
    pub settings: Settings,
    /// Shared system state (also touched by the interrupt entry points).
    pub sys: SystemState,
    /// Motion planner and block buffer.
    pub planner: Planner,
    /// Stepper executor.
    pub stepper: Stepper,
    protocol: Protocol,
    parser: Parser,
    /// Work-coordinate offset reported as `G92` (the modal parser that
    /// would set it is an external collaborator, so it stays zero here).
    work_offset: [f32; N_AXIS],
}

impl Machine {
    /// A machine with the given settings, in the power-up state.
    pub fn new(settings: Settings) -> Self {
        let parser = Parser::new(&settings);
        Self {
            settings,
            sys: SystemState::new(),
            planner: Planner::new(),
            stepper: Stepper::new(),
            protocol: Protocol::new(),
            parser,
            work_offset: [0.0; N_AXIS],
        }
    }

    /// Build a machine from stored settings. A version or checksum
    /// mismatch reports the read failure, restores defaults and rewrites
    /// the record.
    pub fn from_storage<N: NonVolatile, W: Write>(nv: &mut N, out: &mut W) -> Self {
        let settings = match settings::load_settings(nv) {
            Ok(settings) => settings,
            Err(e) => {
                let _ = report::status_error(out, &Error::Setting(e));
                let defaults = Settings::default();
                let _ = settings::store_settings(nv, &defaults);
                for n in 0..STARTUP_LINES {
                    let _ = settings::store_startup_line(nv, n, "");
                }
                defaults
            }
        };
        Self::new(settings)
    }

    /// The system reset path. Runs once at power-up and again after
    /// every abort: clears the planner, parser, protocol and stepper,
    /// re-syncs all position shadows to the machine position (which is
    /// deliberately preserved), and either reports the alarm lock or
    /// executes the stored startup lines.
    pub fn startup_reset<P, T, D, N, W>(&mut self, hal: &mut Hal<P, T, D, N>, out: &mut W)
    where
        P: StepPort,
        T: StepTimer,
        D: DelayNs,
        N: NonVolatile,
        W: Write,
    {
        self.protocol.reset();
        self.planner.init();
        self.planner.sync_position(self.sys.position);
        self.parser = Parser::new(&self.settings);
        self.parser.sync_position(self.sys.position, &self.settings);
        self.stepper.reset(&mut hal.timer);
        self.sys.reset(self.settings.auto_start);

        if self.sys.state == MachineState::Init && self.settings.homing_enable {
            // Power-up with homing enabled: position is unknown until a
            // homing cycle runs, so motion starts locked out.
            self.sys.state = MachineState::Alarm;
        } else if self.sys.alarm.is_none() {
            self.sys.state = MachineState::Idle;
        }

        let _ = report::welcome(out);
        if self.sys.state == MachineState::Alarm {
            let _ = report::feedback(out, "'$H'|'$X' to unlock");
        } else {
            self.run_startup_lines(hal, out);
        }
    }

    fn run_startup_lines<P, T, D, N, W>(&mut self, hal: &mut Hal<P, T, D, N>, out: &mut W)
    where
        P: StepPort,
        T: StepTimer,
        D: DelayNs,
        N: NonVolatile,
        W: Write,
    {
        for n in 0..STARTUP_LINES {
            if let Ok(line) = settings::load_startup_line(&mut hal.nv, n) {
                if !line.is_empty() {
                    let _ = report::startup_line(out, n, &line);
                    self.execute_line(&line, hal, out, &mut |_, _| {});
                }
            }
        }
    }

    /// Step timer interrupt entry point.
    pub fn step_interrupt<P: StepPort, T: StepTimer, D, N>(&mut self, hal: &mut Hal<P, T, D, N>) {
        self.stepper.step_interrupt(
            &mut self.sys,
            &mut self.planner,
            &self.settings,
            &mut hal.port,
            &mut hal.timer,
        );
    }

    /// Pulse timer interrupt entry point.
    pub fn pulse_reset_interrupt<P: StepPort, T: StepTimer, D, N>(
        &mut self,
        hal: &mut Hal<P, T, D, N>,
    ) {
        self.stepper
            .pulse_reset_interrupt(&self.settings, &mut hal.port, &mut hal.timer);
    }

    /// Hard-limit interrupt entry point: latch the alarm and request the
    /// abort. The main loop's next `poll` halts the stepper.
    pub fn hard_limit_trigger(&mut self) {
        if self.settings.hard_limit_enable {
            self.sys.raise_alarm(Alarm::HardLimit);
        }
    }

    /// Consume pending runtime actions. Returns `true` when an abort was
    /// taken, in which case the caller must run [`Machine::startup_reset`].
    pub fn poll<P, T, D, N, W>(&mut self, hal: &mut Hal<P, T, D, N>, out: &mut W) -> bool
    where
        P: StepPort,
        T: StepTimer,
        D: DelayNs,
        N: NonVolatile,
        W: Write,
    {
        if self.sys.pending.take(Exec::ABORT) {
            if self.sys.state.is_executing() && self.sys.alarm.is_none() {
                // Killing an active cycle loses steps: latch it.
                self.sys.alarm = Some(Alarm::AbortCycle);
            }
            self.stepper.halt(&mut hal.timer);
            if let Some(alarm) = self.sys.alarm {
                self.sys.state = MachineState::Alarm;
                let _ = report::alarm_message(out, alarm);
                let _ = report::feedback(out, "Reset to continue");
            }
            self.sys.abort = true;
            return true;
        }
        if self.sys.pending.take(Exec::STATUS_REPORT) {
            let _ = report::realtime_status(out, &self.sys, &self.settings, &self.work_offset);
        }
        if self.sys.pending.take(Exec::RESET_ALARM) {
            self.unlock_alarm(out);
        }
        if self.sys.pending.take(Exec::FEED_HOLD) {
            self.stepper.feed_hold(&mut self.sys);
        }
        if self.sys.pending.take(Exec::CYCLE_START) {
            self.stepper
                .cycle_start(&mut self.sys, &self.settings, &mut hal.port, &mut hal.timer);
        }
        if self.sys.pending.take(Exec::CYCLE_STOP) {
            self.stepper
                .cycle_reinitialize(&mut self.sys, &mut self.planner, &mut hal.timer);
            if self.sys.state == MachineState::Idle {
                if self.planner.is_drained() {
                    self.stepper.sleep(
                        &self.settings,
                        &mut hal.port,
                        &mut hal.timer,
                        &mut hal.delay,
                        self.sys.alarm.is_some(),
                    );
                } else {
                    // Blocks arrived between the stepper idling and this
                    // poll: re-arm instead of stranding them.
                    self.sys.state = MachineState::Queued;
                    if self.sys.auto_start {
                        self.sys.pending.set(Exec::CYCLE_START);
                    }
                }
            }
        }
        false
    }

    /// Feed one serial byte through the protocol; completed lines are
    /// executed and acknowledged.
    pub fn process_byte<P, T, D, N, W, F>(
        &mut self,
        byte: u8,
        hal: &mut Hal<P, T, D, N>,
        out: &mut W,
        idle: &mut F,
    ) where
        P: StepPort,
        T: StepTimer,
        D: DelayNs,
        N: NonVolatile,
        W: Write,
        F: FnMut(&mut Machine, &mut Hal<P, T, D, N>),
    {
        if let Some(result) = self.protocol.receive(byte, &self.sys) {
            match result {
                Ok(line) => self.execute_line(&line, hal, out, idle),
                Err(e) => {
                    let _ = report::status_error(out, &e);
                }
            }
        }
    }

    /// Execute one canonical input line and print its acknowledgement.
    pub fn execute_line<P, T, D, N, W, F>(
        &mut self,
        line: &str,
        hal: &mut Hal<P, T, D, N>,
        out: &mut W,
        idle: &mut F,
    ) where
        P: StepPort,
        T: StepTimer,
        D: DelayNs,
        N: NonVolatile,
        W: Write,
        F: FnMut(&mut Machine, &mut Hal<P, T, D, N>),
    {
        let result = self.dispatch_line(line, hal, out, idle);
        if self.sys.abort {
            // Aborted while parked: the reset path owns the console now.
            return;
        }
        match result {
            Ok(()) => {
                let _ = report::status_ok(out);
            }
            Err(e) => {
                let _ = report::status_error(out, &e);
            }
        }
    }

    fn dispatch_line<P, T, D, N, W, F>(
        &mut self,
        line: &str,
        hal: &mut Hal<P, T, D, N>,
        out: &mut W,
        idle: &mut F,
    ) -> Result<()>
    where
        P: StepPort,
        T: StepTimer,
        D: DelayNs,
        N: NonVolatile,
        W: Write,
        F: FnMut(&mut Machine, &mut Hal<P, T, D, N>),
    {
        if line.is_empty() {
            return Ok(());
        }
        if line.starts_with('$') {
            return self.system_command(line, hal, out);
        }
        if self.sys.state == MachineState::Alarm {
            return Err(StateError::AlarmLock.into());
        }
        if let Some(motion) = self.parser.execute_line(line, &self.settings)? {
            if self.sys.state != MachineState::CheckMode {
                self.queue_motion(motion, hal, out, idle)?;
            }
        }
        Ok(())
    }

    fn queue_motion<P, T, D, N, W, F>(
        &mut self,
        motion: Motion,
        hal: &mut Hal<P, T, D, N>,
        out: &mut W,
        idle: &mut F,
    ) -> Result<()>
    where
        P: StepPort,
        T: StepTimer,
        D: DelayNs,
        N: NonVolatile,
        W: Write,
        F: FnMut(&mut Machine, &mut Hal<P, T, D, N>),
    {
        loop {
            let appended = self.planner.append_line(
                &self.settings,
                self.sys.state,
                &motion.target_mm,
                motion.feed_rate,
                false,
            );
            match appended {
                Ok(_) => break,
                Err(BufferFull) => {
                    // Park until the stepper frees a slot, servicing
                    // pending actions the whole time.
                    if self.poll(hal, out) {
                        return Ok(());
                    }
                    idle(self, hal);
                }
            }
        }
        if self.sys.state == MachineState::Idle {
            self.sys.state = MachineState::Queued;
        }
        if self.sys.auto_start {
            self.sys.pending.set(Exec::CYCLE_START);
        }
        Ok(())
    }

    fn system_command<P, T, D, N, W>(
        &mut self,
        line: &str,
        hal: &mut Hal<P, T, D, N>,
        out: &mut W,
    ) -> Result<()>
    where
        P: StepPort,
        T: StepTimer,
        D: DelayNs,
        N: NonVolatile,
        W: Write,
    {
        match protocol::parse_system_command(line)? {
            SystemCommand::Help => {
                let _ = report::help(out);
                Ok(())
            }
            SystemCommand::ViewSettings => {
                let _ = report::settings_dump(out, &self.settings);
                Ok(())
            }
            SystemCommand::ViewParameters => {
                let _ = report::parameters(out, &self.settings, &self.work_offset);
                Ok(())
            }
            SystemCommand::ViewParserState => {
                let _ = report::parser_state(out, &self.parser);
                Ok(())
            }
            SystemCommand::ViewStartupLines => {
                for n in 0..STARTUP_LINES {
                    let text = settings::load_startup_line(&mut hal.nv, n).unwrap_or_default();
                    let _ = report::startup_line(out, n, &text);
                }
                Ok(())
            }
            SystemCommand::ToggleCheckMode => match self.sys.state {
                MachineState::CheckMode => {
                    // Leaving check-mode resets so the simulated modal
                    // state cannot leak into real motion.
                    let _ = report::feedback(out, "Disabled");
                    self.sys.pending.set(Exec::ABORT);
                    Ok(())
                }
                MachineState::Idle => {
                    self.sys.state = MachineState::CheckMode;
                    let _ = report::feedback(out, "Enabled");
                    Ok(())
                }
                _ => Err(StateError::Busy.into()),
            },
            SystemCommand::KillAlarmLock => {
                self.unlock_alarm(out);
                Ok(())
            }
            SystemCommand::RunHoming => {
                if !self.settings.homing_enable {
                    return Err(SettingError::Disabled.into());
                }
                match self.sys.state {
                    MachineState::Idle | MachineState::Alarm => {
                        // The homing cycle itself is an external
                        // collaborator; it finishes through
                        // `homing_complete`.
                        self.sys.state = MachineState::Homing;
                        Ok(())
                    }
                    _ => Err(StateError::Busy.into()),
                }
            }
            SystemCommand::SetSetting { index, value } => {
                self.require_settable()?;
                self.settings.set_value(index, value)?;
                let _ = settings::store_settings(&mut hal.nv, &self.settings);
                Ok(())
            }
            SystemCommand::SetStartupLine { index, line } => {
                self.require_settable()?;
                if index >= STARTUP_LINES {
                    return Err(ParseError::InvalidStatement.into());
                }
                settings::store_startup_line(&mut hal.nv, index, line)
                    .map_err(|_| Error::Parse(ParseError::InvalidStatement))?;
                Ok(())
            }
        }
    }

    fn unlock_alarm<W: Write>(&mut self, out: &mut W) {
        if self.sys.state == MachineState::Alarm {
            self.sys.alarm = None;
            self.sys.state = MachineState::Idle;
            let _ = report::feedback(out, "Caution: Unlocked");
        }
    }

    fn require_settable(&self) -> Result<()> {
        match self.sys.state {
            MachineState::Idle | MachineState::Alarm | MachineState::CheckMode => Ok(()),
            _ => Err(StateError::Busy.into()),
        }
    }

    /// Park the foreground until all queued motion has executed. Used
    /// before operations that depend on the final position.
    pub fn synchronize<P, T, D, N, W, F>(
        &mut self,
        hal: &mut Hal<P, T, D, N>,
        out: &mut W,
        idle: &mut F,
    ) where
        P: StepPort,
        T: StepTimer,
        D: DelayNs,
        N: NonVolatile,
        W: Write,
        F: FnMut(&mut Machine, &mut Hal<P, T, D, N>),
    {
        while !(self.planner.is_drained() && !self.stepper.has_active_block()) {
            if self.poll(hal, out) {
                return;
            }
            idle(self, hal);
        }
    }

    /// The external homing collaborator finished with the machine at
    /// `position`: trust it, clear any alarm, and return to `Idle`.
    pub fn homing_complete(&mut self, position: [i32; N_AXIS]) {
        self.sys.position = position;
        self.planner.sync_position(position);
        self.parser.sync_position(position, &self.settings);
        self.sys.alarm = None;
        self.sys.state = MachineState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MemoryStore;
    use crate::sim::{SimDelay, SimPort, SimTimer};

    type TestHal = Hal<SimPort, SimTimer, SimDelay, MemoryStore>;

    fn test_hal() -> TestHal {
        Hal {
            port: SimPort::new(),
            timer: SimTimer::default(),
            delay: SimDelay,
            nv: MemoryStore::new(),
        }
    }

    fn test_machine() -> Machine {
        Machine::new(Settings {
            steps_per_mm: [100.0, 100.0, 100.0],
            acceleration: 36_000.0,
            auto_start: true,
            ..Settings::default()
        })
    }

    /// Idle hook that fires the step interrupt, standing in for the
    /// hardware timer.
    fn isr_idle(machine: &mut Machine, hal: &mut TestHal) {
        if hal.timer.running {
            machine.step_interrupt(hal);
        }
    }

    fn boot(machine: &mut Machine, hal: &mut TestHal) -> String {
        let mut out = String::new();
        machine.startup_reset(hal, &mut out);
        out
    }

    fn send_line(machine: &mut Machine, hal: &mut TestHal, line: &str) -> String {
        let mut out = String::new();
        for &b in line.as_bytes() {
            machine.process_byte(b, hal, &mut out, &mut isr_idle);
        }
        machine.process_byte(b'\n', hal, &mut out, &mut isr_idle);
        out
    }

    fn drain(machine: &mut Machine, hal: &mut TestHal) -> String {
        let mut out = String::new();
        let mut guard = 0;
        loop {
            if machine.poll(hal, &mut out) {
                machine.startup_reset(hal, &mut out);
            }
            if machine.planner.is_drained()
                && !machine.stepper.has_active_block()
                && !hal.timer.running
                && machine.sys.pending.peek().is_empty()
            {
                break;
            }
            isr_idle(machine, hal);
            guard += 1;
            assert!(guard < 500_000, "machine never drained");
        }
        out
    }

    #[test]
    fn test_boot_reports_welcome_and_goes_idle() {
        let mut machine = test_machine();
        let mut hal = test_hal();
        let out = boot(&mut machine, &mut hal);
        assert!(out.contains("cnc-motion"));
        assert_eq!(machine.sys.state, MachineState::Idle);
    }

    #[test]
    fn test_homing_lock_at_power_up() {
        let mut machine = test_machine();
        machine.settings.homing_enable = true;
        let mut hal = test_hal();
        let out = boot(&mut machine, &mut hal);
        assert_eq!(machine.sys.state, MachineState::Alarm);
        assert!(out.contains("'$H'|'$X' to unlock"));

        // $X clears the lock.
        let out = send_line(&mut machine, &mut hal, "$X");
        assert!(out.contains("[Caution: Unlocked]"));
        assert!(out.ends_with("ok\r\n"));
        assert_eq!(machine.sys.state, MachineState::Idle);
    }

    #[test]
    fn test_motion_line_runs_to_completion() {
        let mut machine = test_machine();
        let mut hal = test_hal();
        boot(&mut machine, &mut hal);

        let out = send_line(&mut machine, &mut hal, "G1 X10 F600");
        assert_eq!(out, "ok\r\n");
        drain(&mut machine, &mut hal);
        assert_eq!(machine.sys.position, [1000, 0, 0]);
        assert_eq!(machine.sys.state, MachineState::Idle);
    }

    #[test]
    fn test_gcode_rejected_while_alarmed() {
        let mut machine = test_machine();
        machine.settings.homing_enable = true;
        let mut hal = test_hal();
        boot(&mut machine, &mut hal);
        assert_eq!(machine.sys.state, MachineState::Alarm);

        let out = send_line(&mut machine, &mut hal, "G1X1F100");
        assert_eq!(out, "error: Alarm lock\r\n");
        // settings are still reachable
        let out = send_line(&mut machine, &mut hal, "$$");
        assert!(out.contains("$0=100.000"));
    }

    #[test]
    fn test_check_mode_parses_without_motion() {
        let mut machine = test_machine();
        let mut hal = test_hal();
        boot(&mut machine, &mut hal);

        let out = send_line(&mut machine, &mut hal, "$C");
        assert!(out.contains("[Enabled]"));
        let out = send_line(&mut machine, &mut hal, "G1X5F100");
        assert_eq!(out, "ok\r\n");
        assert!(machine.planner.is_drained());
        assert_eq!(machine.sys.position, [0, 0, 0]);

        // Toggling off resets the machine.
        let out = send_line(&mut machine, &mut hal, "$C");
        assert!(out.contains("[Disabled]"));
        let mut buf = String::new();
        assert!(machine.poll(&mut hal, &mut buf));
        machine.startup_reset(&mut hal, &mut buf);
        assert_eq!(machine.sys.state, MachineState::Idle);
    }

    #[test]
    fn test_setting_change_persists() {
        let mut machine = test_machine();
        let mut hal = test_hal();
        boot(&mut machine, &mut hal);

        let out = send_line(&mut machine, &mut hal, "$0=80");
        assert_eq!(out, "ok\r\n");
        assert!((machine.settings.steps_per_mm[0] - 80.0).abs() < 1e-6);

        let reloaded = settings::load_settings(&mut hal.nv).unwrap();
        assert!((reloaded.steps_per_mm[0] - 80.0).abs() < 1e-6);
    }

    #[test]
    fn test_setting_rejected_mid_cycle() {
        let mut machine = test_machine();
        let mut hal = test_hal();
        boot(&mut machine, &mut hal);

        send_line(&mut machine, &mut hal, "G1X100F100");
        let mut out = String::new();
        machine.poll(&mut hal, &mut out); // consume cycle start
        assert_eq!(machine.sys.state, MachineState::Cycle);

        let out = send_line(&mut machine, &mut hal, "$0=80");
        assert_eq!(out, "error: Busy or queued\r\n");
        drain(&mut machine, &mut hal);
    }

    #[test]
    fn test_status_report_byte() {
        let mut machine = test_machine();
        let mut hal = test_hal();
        boot(&mut machine, &mut hal);

        let mut out = String::new();
        machine.process_byte(b'?', &mut hal, &mut out, &mut isr_idle);
        machine.poll(&mut hal, &mut out);
        assert!(out.starts_with("<Idle,MPos:0.000,0.000,0.000"));
    }

    #[test]
    fn test_hard_limit_aborts_and_locks() {
        let mut machine = test_machine();
        machine.settings.hard_limit_enable = true;
        let mut hal = test_hal();
        boot(&mut machine, &mut hal);

        send_line(&mut machine, &mut hal, "G1X100F100");
        let mut out = String::new();
        machine.poll(&mut hal, &mut out);
        assert_eq!(machine.sys.state, MachineState::Cycle);

        machine.hard_limit_trigger();
        let mut out = String::new();
        let aborted = machine.poll(&mut hal, &mut out);
        assert!(aborted);
        assert!(!hal.timer.running);
        assert!(out.contains("ALARM: Hard limit. MPos?"));

        machine.startup_reset(&mut hal, &mut out);
        assert_eq!(machine.sys.state, MachineState::Alarm);
        let out = send_line(&mut machine, &mut hal, "G1X1F100");
        assert_eq!(out, "error: Alarm lock\r\n");
    }

    #[test]
    fn test_buffer_backpressure_blocks_until_slot_frees() {
        let mut machine = test_machine();
        machine.settings.auto_start = false;
        let mut hal = test_hal();
        boot(&mut machine, &mut hal);
        machine.sys.auto_start = false;

        // Fill the buffer without a running cycle.
        for i in 0..crate::planner::BLOCK_BUFFER_SIZE - 1 {
            let x = i as f32 + 1.0;
            let out = send_line(&mut machine, &mut hal, &format!("G1X{}F600", x));
            assert_eq!(out, "ok\r\n");
        }
        assert_eq!(machine.planner.block_count(), crate::planner::BLOCK_BUFFER_SIZE - 1);

        // The next line parks until the cycle starts draining; the idle
        // hook runs the stepper once '~' starts the cycle.
        let mut out = String::new();
        machine.process_byte(b'~', &mut hal, &mut out, &mut isr_idle);
        let out = send_line(&mut machine, &mut hal, "G1X100F600");
        assert!(out.ends_with("ok\r\n"));
        drain(&mut machine, &mut hal);
        assert_eq!(machine.sys.position, [10_000, 0, 0]);
    }

    #[test]
    fn test_homing_request_and_completion() {
        let mut machine = test_machine();
        machine.settings.homing_enable = true;
        let mut hal = test_hal();
        boot(&mut machine, &mut hal);
        assert_eq!(machine.sys.state, MachineState::Alarm);

        let out = send_line(&mut machine, &mut hal, "$H");
        assert_eq!(out, "ok\r\n");
        assert_eq!(machine.sys.state, MachineState::Homing);

        machine.homing_complete([0, 0, 0]);
        assert_eq!(machine.sys.state, MachineState::Idle);
        assert!(machine.sys.alarm.is_none());
    }

    #[test]
    fn test_homing_disabled_rejected() {
        let mut machine = test_machine();
        let mut hal = test_hal();
        boot(&mut machine, &mut hal);
        let out = send_line(&mut machine, &mut hal, "$H");
        assert_eq!(out, "error: Setting disabled\r\n");
    }

    #[test]
    fn test_startup_line_stored_and_run() {
        let mut machine = test_machine();
        let mut hal = test_hal();
        boot(&mut machine, &mut hal);

        let out = send_line(&mut machine, &mut hal, "$N0=G91");
        assert_eq!(out, "ok\r\n");

        // A fresh reset executes the stored line.
        machine.sys.pending.set(Exec::ABORT);
        let mut out = String::new();
        assert!(machine.poll(&mut hal, &mut out));
        machine.startup_reset(&mut hal, &mut out);
        assert!(out.contains("$N0=G91"));
        assert_eq!(machine.parser.distance_code(), 91);
    }
}
