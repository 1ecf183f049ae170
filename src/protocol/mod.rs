//! Serial protocol front-end.
//!
//! Assembles CR/LF-terminated lines from the incoming byte stream and
//! intercepts the single-byte real-time commands out of line: `~`
//! cycle-start, `!` feed-hold, `?` status-report and ctrl-X reset are
//! acted on immediately by raising pending flags, wherever they appear in
//! the stream. Regular characters are upcased and whitespace is dropped,
//! so lines reach the parsers in canonical form.

pub mod report;

use heapless::String;

use crate::error::{Error, ParseError};
use crate::system::{Exec, SystemState};

/// Maximum accepted line length.
pub const LINE_BUFFER_LEN: usize = 128;

/// An assembled input line.
pub type Line = String<LINE_BUFFER_LEN>;

/// Real-time reset byte (ctrl-X).
pub const RESET_BYTE: u8 = 0x18;

/// Serial line assembler.
#[derive(Debug, Default)]
pub struct Protocol {
    line: Line,
    overflow: bool,
}

impl Protocol {
    /// An empty assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop any partially assembled line.
    pub fn reset(&mut self) {
        self.line.clear();
        self.overflow = false;
    }

    /// Feed one byte from the serial link.
    ///
    /// Real-time bytes raise their pending flag and are consumed. A
    /// line terminator yields the completed line (empty lines included;
    /// they are acknowledged like any other), or an error if the line
    /// overflowed the buffer.
    pub fn receive(&mut self, byte: u8, sys: &SystemState) -> Option<Result<Line, Error>> {
        match byte {
            b'?' => {
                sys.pending.set(Exec::STATUS_REPORT);
                None
            }
            b'~' => {
                sys.pending.set(Exec::CYCLE_START);
                None
            }
            b'!' => {
                sys.pending.set(Exec::FEED_HOLD);
                None
            }
            RESET_BYTE => {
                sys.pending.set(Exec::ABORT);
                None
            }
            b'\n' => {
                // CR arrives just before this and is dropped as
                // whitespace, so CRLF input acknowledges once.
                let result = if self.overflow {
                    Err(ParseError::InvalidStatement.into())
                } else {
                    Ok(self.line.clone())
                };
                self.reset();
                Some(result)
            }
            b if b <= b' ' => None, // whitespace and control characters
            b => {
                let c = b.to_ascii_uppercase() as char;
                if self.line.push(c).is_err() {
                    self.overflow = true;
                }
                None
            }
        }
    }
}

/// A parsed `$` system command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SystemCommand<'a> {
    /// `$`: print the help summary.
    Help,
    /// `$$`: print all settings.
    ViewSettings,
    /// `$#`: print coordinate parameters.
    ViewParameters,
    /// `$G`: print the parser's modal state.
    ViewParserState,
    /// `$N`: print the stored startup lines.
    ViewStartupLines,
    /// `$C`: toggle check-mode.
    ToggleCheckMode,
    /// `$X`: clear the alarm lock.
    KillAlarmLock,
    /// `$H`: run the homing cycle.
    RunHoming,
    /// `$x=value`: change a setting.
    SetSetting {
        /// Setting index as printed by `$$`.
        index: u8,
        /// New value.
        value: f32,
    },
    /// `$Nx=line`: store a startup line.
    SetStartupLine {
        /// Startup line slot.
        index: usize,
        /// Line text (stored verbatim).
        line: &'a str,
    },
}

/// Parse a line beginning with `$`.
pub fn parse_system_command(line: &str) -> Result<SystemCommand<'_>, Error> {
    let body = line
        .strip_prefix('$')
        .ok_or(Error::Parse(ParseError::InvalidStatement))?;
    match body {
        "" => Ok(SystemCommand::Help),
        "$" => Ok(SystemCommand::ViewSettings),
        "#" => Ok(SystemCommand::ViewParameters),
        "G" => Ok(SystemCommand::ViewParserState),
        "N" => Ok(SystemCommand::ViewStartupLines),
        "C" => Ok(SystemCommand::ToggleCheckMode),
        "X" => Ok(SystemCommand::KillAlarmLock),
        "H" => Ok(SystemCommand::RunHoming),
        _ => {
            if let Some(rest) = body.strip_prefix('N') {
                let (index, line) = split_assignment(rest)?;
                let index: usize = index
                    .parse()
                    .map_err(|_| Error::from(ParseError::BadNumberFormat))?;
                return Ok(SystemCommand::SetStartupLine { index, line });
            }
            let (index, value) = split_assignment(body)?;
            let index: u8 = index
                .parse()
                .map_err(|_| Error::from(ParseError::BadNumberFormat))?;
            let value: f32 = value
                .parse()
                .map_err(|_| Error::from(ParseError::BadNumberFormat))?;
            Ok(SystemCommand::SetSetting { index, value })
        }
    }
}

fn split_assignment(body: &str) -> Result<(&str, &str), Error> {
    body.split_once('=')
        .ok_or(Error::Parse(ParseError::InvalidStatement))
}
