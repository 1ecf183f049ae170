//! Outgoing serial messages.
//!
//! Every byte the controller sends originates here, so the exact wire
//! formats live in one place: `ok`/`error:` line responses, bracketed
//! feedback, alarm messages and the real-time status report.

use core::fmt::{self, Write};

use crate::error::{Alarm, Error};
use crate::gcode::Parser;
use crate::settings::{Settings, MM_PER_INCH};
use crate::system::{SystemState, N_AXIS};

/// Greeting printed after every reset.
pub fn welcome<W: Write>(w: &mut W) -> fmt::Result {
    write!(
        w,
        "\r\ncnc-motion {} ['$' for help]\r\n",
        env!("CARGO_PKG_VERSION")
    )
}

/// Positive line acknowledgement.
pub fn status_ok<W: Write>(w: &mut W) -> fmt::Result {
    w.write_str("ok\r\n")
}

/// Negative line acknowledgement.
pub fn status_error<W: Write>(w: &mut W, error: &Error) -> fmt::Result {
    write!(w, "error: {}\r\n", error)
}

/// Asynchronous alarm message. The trailing `MPos?` flags that the
/// reported position can no longer be trusted.
pub fn alarm_message<W: Write>(w: &mut W, alarm: Alarm) -> fmt::Result {
    write!(w, "ALARM: {}. MPos?\r\n", alarm)
}

/// Bracketed feedback message.
pub fn feedback<W: Write>(w: &mut W, text: &str) -> fmt::Result {
    write!(w, "[{}]\r\n", text)
}

/// `$` help summary.
pub fn help<W: Write>(w: &mut W) -> fmt::Result {
    feedback(
        w,
        "'$$' '$x=value' '$#' '$G' '$N' '$C' '$X' '$H' '~' '!' '?' 'ctrl-x'",
    )
}

/// Real-time status report: `<State,MPos:x,y,z,WPos:x,y,z>`.
pub fn realtime_status<W: Write>(
    w: &mut W,
    sys: &SystemState,
    settings: &Settings,
    work_offset: &[f32; N_AXIS],
) -> fmt::Result {
    let mpos = sys.position_mm(&settings.steps_per_mm);
    write!(w, "<{}", sys.state.name())?;
    w.write_str(",MPos:")?;
    write_axes(w, settings, &mpos)?;
    w.write_str(",WPos:")?;
    let mut wpos = mpos;
    for i in 0..N_AXIS {
        wpos[i] -= work_offset[i];
    }
    write_axes(w, settings, &wpos)?;
    w.write_str(">\r\n")
}

fn write_axes<W: Write>(w: &mut W, settings: &Settings, values: &[f32; N_AXIS]) -> fmt::Result {
    let decimals = settings.decimal_places as usize;
    for (i, value) in values.iter().enumerate() {
        let value = if settings.report_inches {
            value / MM_PER_INCH
        } else {
            *value
        };
        if i > 0 {
            w.write_char(',')?;
        }
        write!(w, "{:.*}", decimals, value)?;
    }
    Ok(())
}

/// `$$` settings dump, one `$x=value (description)` line per setting.
pub fn settings_dump<W: Write>(w: &mut W, settings: &Settings) -> fmt::Result {
    write!(w, "$0={:.3} (x, step/mm)\r\n", settings.steps_per_mm[0])?;
    write!(w, "$1={:.3} (y, step/mm)\r\n", settings.steps_per_mm[1])?;
    write!(w, "$2={:.3} (z, step/mm)\r\n", settings.steps_per_mm[2])?;
    write!(w, "$3={} (step pulse, usec)\r\n", settings.pulse_microseconds)?;
    write!(
        w,
        "$4={:.3} (default feed, mm/min)\r\n",
        settings.default_feed_rate
    )?;
    write!(
        w,
        "$5={:.3} (default seek, mm/min)\r\n",
        settings.default_seek_rate
    )?;
    write!(
        w,
        "$6={} (step port invert mask, int:{:08b})\r\n",
        settings.invert_mask, settings.invert_mask
    )?;
    write!(
        w,
        "$7={} (step idle delay, msec)\r\n",
        settings.stepper_idle_lock_time
    )?;
    write!(
        w,
        "$8={:.3} (acceleration, mm/sec^2)\r\n",
        settings.acceleration / (60.0 * 60.0)
    )?;
    write!(
        w,
        "$9={:.3} (junction deviation, mm)\r\n",
        settings.junction_deviation
    )?;
    write!(w, "$10={:.3} (arc, mm/segment)\r\n", settings.mm_per_arc_segment)?;
    write!(w, "$11={} (n-arc correction, int)\r\n", settings.n_arc_correction)?;
    write!(w, "$12={} (n-decimals, int)\r\n", settings.decimal_places)?;
    write!(w, "$13={} (report inches, bool)\r\n", settings.report_inches as u8)?;
    write!(w, "$14={} (auto start, bool)\r\n", settings.auto_start as u8)?;
    write!(
        w,
        "$15={} (invert step enable, bool)\r\n",
        settings.invert_step_enable as u8
    )?;
    write!(w, "$16={} (hard limits, bool)\r\n", settings.hard_limit_enable as u8)?;
    write!(w, "$17={} (homing cycle, bool)\r\n", settings.homing_enable as u8)?;
    write!(
        w,
        "$18={} (homing dir invert mask, int:{:08b})\r\n",
        settings.homing_dir_mask, settings.homing_dir_mask
    )?;
    write!(
        w,
        "$19={:.3} (homing feed, mm/min)\r\n",
        settings.homing_feed_rate
    )?;
    write!(
        w,
        "$20={:.3} (homing seek, mm/min)\r\n",
        settings.homing_seek_rate
    )?;
    write!(
        w,
        "$21={} (homing debounce, msec)\r\n",
        settings.homing_debounce_delay
    )?;
    write!(w, "$22={:.3} (homing pull-off, mm)\r\n", settings.homing_pulloff)
}

/// `$G` parser-state report.
pub fn parser_state<W: Write>(w: &mut W, parser: &Parser) -> fmt::Result {
    write!(
        w,
        "[G{} G{} G{} F{:.3}]\r\n",
        parser.motion_code(),
        parser.units_code(),
        parser.distance_code(),
        parser.feed_rate()
    )
}

/// `$#` coordinate-offset report (the G92 offset record).
pub fn parameters<W: Write>(w: &mut W, settings: &Settings, offset: &[f32; N_AXIS]) -> fmt::Result {
    w.write_str("[G92:")?;
    write_axes(w, settings, offset)?;
    w.write_str("]\r\n")
}

/// One stored startup line.
pub fn startup_line<W: Write>(w: &mut W, n: usize, line: &str) -> fmt::Result {
    write!(w, "$N{}={}\r\n", n, line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseError;
    use crate::system::MachineState;

    #[test]
    fn test_ok_and_error_lines() {
        let mut out = String::new();
        status_ok(&mut out).unwrap();
        status_error(&mut out, &Error::Parse(ParseError::BadNumberFormat)).unwrap();
        assert_eq!(out, "ok\r\nerror: Bad number format\r\n");
    }

    #[test]
    fn test_alarm_format() {
        let mut out = String::new();
        alarm_message(&mut out, Alarm::HardLimit).unwrap();
        assert_eq!(out, "ALARM: Hard limit. MPos?\r\n");
    }

    #[test]
    fn test_status_report_format() {
        let settings = Settings {
            steps_per_mm: [100.0, 100.0, 100.0],
            ..Settings::default()
        };
        let mut sys = SystemState::new();
        sys.state = MachineState::Cycle;
        sys.position = [1000, -250, 0];

        let mut out = String::new();
        realtime_status(&mut out, &sys, &settings, &[0.0; N_AXIS]).unwrap();
        assert_eq!(out, "<Run,MPos:10.000,-2.500,0.000,WPos:10.000,-2.500,0.000>\r\n");
    }

    #[test]
    fn test_status_report_in_inches() {
        let settings = Settings {
            steps_per_mm: [100.0, 100.0, 100.0],
            report_inches: true,
            decimal_places: 4,
            ..Settings::default()
        };
        let mut sys = SystemState::new();
        sys.state = MachineState::Idle;
        sys.position = [2540, 0, 0];

        let mut out = String::new();
        realtime_status(&mut out, &sys, &settings, &[0.0; N_AXIS]).unwrap();
        assert!(out.starts_with("<Idle,MPos:1.0000,"));
    }

    #[test]
    fn test_settings_dump_round_trips_precision() {
        let settings = Settings::default();
        let mut out = String::new();
        settings_dump(&mut out, &settings).unwrap();
        // Acceleration is entered and printed in mm/sec².
        assert!(out.contains("$8=10.000 (acceleration, mm/sec^2)"));
        assert!(out.contains("$0=250.000 (x, step/mm)"));
        assert!(out.contains("$14=1 (auto start, bool)"));
    }

    #[test]
    fn test_feedback_brackets() {
        let mut out = String::new();
        feedback(&mut out, "Caution: Unlocked").unwrap();
        assert_eq!(out, "[Caution: Unlocked]\r\n");
    }
}
