//! Error types for the motion core.
//!
//! Every line-scoped error maps onto the exact text the protocol prints
//! after `error: `, so `Display` doubles as the wire format.

use core::fmt;

/// Result type alias using the crate's Error type.
pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for all line-scoped failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// G-code line parsing or validation error.
    Parse(ParseError),
    /// Settings record or `$x=value` error.
    Setting(SettingError),
    /// Operation attempted in the wrong machine state.
    State(StateError),
}

/// Errors raised while scanning a g-code line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// A word's number could not be read.
    BadNumberFormat,
    /// A value appeared without a preceding command letter.
    ExpectedCommandLetter,
    /// The command letter or code is not supported by this build.
    UnsupportedStatement,
    /// Two words from the same modal group appeared on one line.
    ModalGroupViolation,
    /// The line is structurally invalid (also used for line overflow).
    InvalidStatement,
}

/// Errors raised by the settings module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingError {
    /// Non-volatile record version or checksum mismatch; defaults restored.
    ReadFail,
    /// A setting value must not be negative.
    NegativeValue,
    /// Step pulse length below the hardware minimum.
    StepPulseTooShort,
    /// The command requires a setting that is disabled.
    Disabled,
}

/// Runtime rejections tied to the machine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    /// The machine is moving or has queued motion.
    Busy,
    /// G-code is locked out until the alarm is cleared.
    AlarmLock,
}

/// Latched fault conditions. Unlike [`Error`], an alarm is global: it
/// locks out motion until the user explicitly acknowledges it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Alarm {
    /// A hard limit switch tripped while moving.
    HardLimit,
    /// The cycle was aborted mid-motion; position is no longer trusted.
    AbortCycle,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Parse(e) => e.fmt(f),
            Error::Setting(e) => e.fmt(f),
            Error::State(e) => e.fmt(f),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::BadNumberFormat => write!(f, "Bad number format"),
            ParseError::ExpectedCommandLetter => write!(f, "Expected command letter"),
            ParseError::UnsupportedStatement => write!(f, "Unsupported statement"),
            ParseError::ModalGroupViolation => write!(f, "Modal group violation"),
            ParseError::InvalidStatement => write!(f, "Invalid statement"),
        }
    }
}

impl fmt::Display for SettingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingError::ReadFail => write!(f, "EEPROM read fail. Using defaults"),
            SettingError::NegativeValue => write!(f, "Value < 0.0"),
            SettingError::StepPulseTooShort => write!(f, "Value < 3 usec"),
            SettingError::Disabled => write!(f, "Setting disabled"),
        }
    }
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateError::Busy => write!(f, "Busy or queued"),
            StateError::AlarmLock => write!(f, "Alarm lock"),
        }
    }
}

impl fmt::Display for Alarm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alarm::HardLimit => write!(f, "Hard limit"),
            Alarm::AbortCycle => write!(f, "Abort during cycle"),
        }
    }
}

// Conversion impls
impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Error::Parse(e)
    }
}

impl From<SettingError> for Error {
    fn from(e: SettingError) -> Self {
        Error::Setting(e)
    }
}

impl From<StateError> for Error {
    fn from(e: StateError) -> Self {
        Error::State(e)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(feature = "std")]
impl std::error::Error for ParseError {}

#[cfg(feature = "std")]
impl std::error::Error for SettingError {}

#[cfg(feature = "std")]
impl std::error::Error for StateError {}
