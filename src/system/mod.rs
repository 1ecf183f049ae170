//! Shared machine state.
//!
//! The [`SystemState`] singleton is the one structure both execution
//! contexts touch: the stepper interrupt advances `position` while a block
//! executes, interrupt sources raise bits in `pending`, and the foreground
//! coordinator drives `state` through the transitions described on
//! [`MachineState`].

mod exec;

pub use exec::{Exec, Pending};

use crate::error::Alarm;

/// Number of controlled linear axes.
pub const N_AXIS: usize = 3;

/// Axis index for X.
pub const X_AXIS: usize = 0;
/// Axis index for Y.
pub const Y_AXIS: usize = 1;
/// Axis index for Z.
pub const Z_AXIS: usize = 2;

/// Top-level machine state.
///
/// Transitions (driven by the runtime coordinator):
///
/// - `Init → Idle` on boot, or `Init → Alarm` when the homing power-up lock
///   is enabled.
/// - `Idle → Queued` when motion is committed to an idle machine.
/// - `Queued → Cycle` when a cycle-start is consumed.
/// - `Cycle → Hold` on feed hold; `Hold → Queued` once deceleration
///   completes and a cycle-start resumes.
/// - `Cycle → Idle` when the buffer drains.
/// - any → `Alarm` on a hard limit or an abort while moving; `Alarm → Idle`
///   only via explicit unlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MachineState {
    /// Power-up, before the first reset completes.
    #[default]
    Init,
    /// Ready, nothing queued.
    Idle,
    /// Motion queued but the cycle has not been started.
    Queued,
    /// Executing queued motion.
    Cycle,
    /// Decelerating to (or stopped at) a resumable feed hold.
    Hold,
    /// Homing cycle in progress (run by the external homing collaborator).
    Homing,
    /// Latched fault; g-code locked out until unlocked.
    Alarm,
    /// Lines are parsed but not executed.
    CheckMode,
}

impl MachineState {
    /// State name as printed in the real-time status report.
    pub fn name(self) -> &'static str {
        match self {
            MachineState::Init => "Init",
            MachineState::Idle => "Idle",
            MachineState::Queued => "Queue",
            MachineState::Cycle => "Run",
            MachineState::Hold => "Hold",
            MachineState::Homing => "Home",
            MachineState::Alarm => "Alarm",
            MachineState::CheckMode => "Check",
        }
    }

    /// True while a block may be executing (the tail buffer slot is then
    /// owned by the stepper interrupt and must not be re-planned).
    #[inline]
    pub fn is_executing(self) -> bool {
        matches!(self, MachineState::Cycle | MachineState::Hold)
    }
}

/// The shared system singleton.
#[derive(Debug, Default)]
pub struct SystemState {
    /// Current machine state.
    pub state: MachineState,
    /// Authoritative machine position in steps per axis. Written only by
    /// the stepper interrupt while a block executes, and by homing.
    pub position: [i32; N_AXIS],
    /// Pending runtime actions.
    pub pending: Pending,
    /// Start cycles automatically when motion is queued.
    pub auto_start: bool,
    /// Set when the main loop must tear down and re-initialize.
    pub abort: bool,
    /// Latched alarm cause, if any.
    pub alarm: Option<Alarm>,
}

impl SystemState {
    /// Fresh state at power-up.
    pub fn new() -> Self {
        Self {
            state: MachineState::Init,
            position: [0; N_AXIS],
            pending: Pending::new(),
            auto_start: false,
            abort: false,
            alarm: None,
        }
    }

    /// Clear per-session variables for a reset. Position is deliberately
    /// preserved: it is cleared only at power-up, never on reset or abort.
    pub fn reset(&mut self, auto_start: bool) {
        self.pending.clear_all();
        self.abort = false;
        self.auto_start = auto_start;
    }

    /// Latch an alarm: locks out g-code and requests an abort.
    pub fn raise_alarm(&mut self, alarm: Alarm) {
        if self.alarm.is_none() {
            self.alarm = Some(alarm);
        }
        self.state = MachineState::Alarm;
        self.pending.set(Exec::ABORT);
    }

    /// Machine position converted to millimeters.
    pub fn position_mm(&self, steps_per_mm: &[f32; N_AXIS]) -> [f32; N_AXIS] {
        let mut mm = [0.0; N_AXIS];
        for i in 0..N_AXIS {
            mm[i] = self.position[i] as f32 / steps_per_mm[i];
        }
        mm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_names() {
        assert_eq!(MachineState::Cycle.name(), "Run");
        assert_eq!(MachineState::Queued.name(), "Queue");
        assert_eq!(MachineState::CheckMode.name(), "Check");
    }

    #[test]
    fn test_alarm_latches_first_cause() {
        let mut sys = SystemState::new();
        sys.raise_alarm(Alarm::HardLimit);
        sys.raise_alarm(Alarm::AbortCycle);
        assert_eq!(sys.alarm, Some(Alarm::HardLimit));
        assert_eq!(sys.state, MachineState::Alarm);
        assert!(sys.pending.is_set(Exec::ABORT));
    }

    #[test]
    fn test_reset_preserves_position() {
        let mut sys = SystemState::new();
        sys.position = [100, -50, 7];
        sys.pending.set(Exec::FEED_HOLD);
        sys.reset(true);
        assert_eq!(sys.position, [100, -50, 7]);
        assert_eq!(sys.pending.peek(), Exec::empty());
        assert!(sys.auto_start);
    }

    #[test]
    fn test_position_mm() {
        let mut sys = SystemState::new();
        sys.position = [1000, 0, -250];
        let mm = sys.position_mm(&[100.0, 100.0, 100.0]);
        assert!((mm[0] - 10.0).abs() < 1e-6);
        assert!((mm[2] + 2.5).abs() < 1e-6);
    }
}
