//! Motion-word line interface.
//!
//! A deliberately small stand-in for a full RS-274/NGC parser: it
//! understands the motion words the motion core needs exercised
//! (`G0`/`G1`, `G20`/`G21`, `G90`/`G91`, `F` and the axis words) and
//! rejects everything else as unsupported. Lines arrive upcased with
//! whitespace stripped, as the serial protocol delivers them.

use crate::error::{Error, ParseError};
use crate::settings::{Settings, MM_PER_INCH};
use crate::system::{N_AXIS, X_AXIS, Y_AXIS, Z_AXIS};

/// Modal motion mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionMode {
    /// `G0`: rapid positioning at the seek rate.
    Seek,
    /// `G1`: linear interpolation at the programmed feed rate.
    Linear,
}

/// Modal distance mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMode {
    /// `G90`: axis words are absolute coordinates.
    Absolute,
    /// `G91`: axis words are offsets from the current position.
    Incremental,
}

/// A motion command produced by one line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Motion {
    /// Target position, mm.
    pub target_mm: [f32; N_AXIS],
    /// Feed rate for the move, mm/min.
    pub feed_rate: f32,
}

/// Modal parser state.
#[derive(Debug)]
pub struct Parser {
    motion_mode: MotionMode,
    distance_mode: DistanceMode,
    inches: bool,
    feed_rate: f32,
    /// Working position in mm, tracked across lines.
    position: [f32; N_AXIS],
}

impl Parser {
    /// Default modal state: `G0 G21 G90` at the default feed rate.
    pub fn new(settings: &Settings) -> Self {
        Self {
            motion_mode: MotionMode::Seek,
            distance_mode: DistanceMode::Absolute,
            inches: false,
            feed_rate: settings.default_feed_rate,
            position: [0.0; N_AXIS],
        }
    }

    /// Align the working position with the machine position.
    pub fn sync_position(&mut self, position_steps: [i32; N_AXIS], settings: &Settings) {
        for i in 0..N_AXIS {
            self.position[i] = position_steps[i] as f32 / settings.steps_per_mm[i];
        }
    }

    /// Current working position, mm.
    #[inline]
    pub fn position_mm(&self) -> [f32; N_AXIS] {
        self.position
    }

    /// Modal motion code (0 or 1), for the parser-state report.
    #[inline]
    pub fn motion_code(&self) -> u8 {
        match self.motion_mode {
            MotionMode::Seek => 0,
            MotionMode::Linear => 1,
        }
    }

    /// Modal units code (20 or 21).
    #[inline]
    pub fn units_code(&self) -> u8 {
        if self.inches {
            20
        } else {
            21
        }
    }

    /// Modal distance code (90 or 91).
    #[inline]
    pub fn distance_code(&self) -> u8 {
        match self.distance_mode {
            DistanceMode::Absolute => 90,
            DistanceMode::Incremental => 91,
        }
    }

    /// Programmed feed rate, mm/min.
    #[inline]
    pub fn feed_rate(&self) -> f32 {
        self.feed_rate
    }

    /// Execute one line: update modal state and return the motion command
    /// it produces, if any.
    pub fn execute_line(
        &mut self,
        line: &str,
        settings: &Settings,
    ) -> Result<Option<Motion>, Error> {
        let mut words = WordScanner { rest: line };
        let mut axis_words: [Option<f32>; N_AXIS] = [None; N_AXIS];
        let mut motion_seen = false;
        let mut units_seen = false;
        let mut distance_seen = false;

        while let Some(word) = words.next()? {
            let (letter, value) = word;
            match letter {
                'G' => {
                    let code = value as i32;
                    if (value - code as f32).abs() > 1e-4 {
                        return Err(ParseError::UnsupportedStatement.into());
                    }
                    match code {
                        0 | 1 => {
                            if motion_seen {
                                return Err(ParseError::ModalGroupViolation.into());
                            }
                            motion_seen = true;
                            self.motion_mode =
                                if code == 0 { MotionMode::Seek } else { MotionMode::Linear };
                        }
                        20 | 21 => {
                            if units_seen {
                                return Err(ParseError::ModalGroupViolation.into());
                            }
                            units_seen = true;
                            self.inches = code == 20;
                        }
                        90 | 91 => {
                            if distance_seen {
                                return Err(ParseError::ModalGroupViolation.into());
                            }
                            distance_seen = true;
                            self.distance_mode = if code == 90 {
                                DistanceMode::Absolute
                            } else {
                                DistanceMode::Incremental
                            };
                        }
                        _ => return Err(ParseError::UnsupportedStatement.into()),
                    }
                }
                'F' => {
                    if value <= 0.0 {
                        return Err(ParseError::InvalidStatement.into());
                    }
                    self.feed_rate = self.to_mm(value);
                }
                'X' => axis_words[X_AXIS] = Some(self.to_mm(value)),
                'Y' => axis_words[Y_AXIS] = Some(self.to_mm(value)),
                'Z' => axis_words[Z_AXIS] = Some(self.to_mm(value)),
                // Line numbers are accepted and ignored.
                'N' => {}
                _ => return Err(ParseError::UnsupportedStatement.into()),
            }
        }

        if axis_words.iter().all(|w| w.is_none()) {
            return Ok(None);
        }

        let mut target = self.position;
        for i in 0..N_AXIS {
            if let Some(value) = axis_words[i] {
                target[i] = match self.distance_mode {
                    DistanceMode::Absolute => value,
                    DistanceMode::Incremental => self.position[i] + value,
                };
            }
        }
        self.position = target;

        let feed_rate = match self.motion_mode {
            MotionMode::Seek => settings.default_seek_rate,
            MotionMode::Linear => self.feed_rate,
        };
        Ok(Some(Motion {
            target_mm: target,
            feed_rate,
        }))
    }

    #[inline]
    fn to_mm(&self, value: f32) -> f32 {
        if self.inches {
            value * MM_PER_INCH
        } else {
            value
        }
    }
}

struct WordScanner<'a> {
    rest: &'a str,
}

impl<'a> WordScanner<'a> {
    /// Next letter/number word, or `None` at end of line.
    fn next(&mut self) -> Result<Option<(char, f32)>, Error> {
        self.rest = self.rest.trim_start();
        let mut chars = self.rest.chars();
        let letter = match chars.next() {
            None => return Ok(None),
            Some(c) => c,
        };
        if !letter.is_ascii_uppercase() {
            return Err(ParseError::ExpectedCommandLetter.into());
        }
        let after_letter = chars.as_str();
        let number_len = after_letter
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
            .unwrap_or(after_letter.len());
        let number = &after_letter[..number_len];
        let value: f32 = number
            .parse()
            .map_err(|_| Error::from(ParseError::BadNumberFormat))?;
        self.rest = &after_letter[number_len..];
        Ok(Some((letter, value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings() -> Settings {
        Settings {
            steps_per_mm: [100.0, 100.0, 100.0],
            default_feed_rate: 250.0,
            default_seek_rate: 500.0,
            ..Settings::default()
        }
    }

    #[test]
    fn test_linear_move_with_feed() {
        let settings = test_settings();
        let mut parser = Parser::new(&settings);
        let motion = parser
            .execute_line("G1X10F600", &settings)
            .unwrap()
            .unwrap();
        assert_eq!(motion.target_mm, [10.0, 0.0, 0.0]);
        assert!((motion.feed_rate - 600.0).abs() < 1e-3);
    }

    #[test]
    fn test_feed_is_modal() {
        let settings = test_settings();
        let mut parser = Parser::new(&settings);
        parser.execute_line("G1X1F600", &settings).unwrap();
        let motion = parser.execute_line("X2", &settings).unwrap().unwrap();
        assert!((motion.feed_rate - 600.0).abs() < 1e-3);
    }

    #[test]
    fn test_seek_uses_seek_rate() {
        let settings = test_settings();
        let mut parser = Parser::new(&settings);
        let motion = parser.execute_line("G0X5", &settings).unwrap().unwrap();
        assert!((motion.feed_rate - 500.0).abs() < 1e-3);
    }

    #[test]
    fn test_incremental_mode() {
        let settings = test_settings();
        let mut parser = Parser::new(&settings);
        parser.execute_line("G1X10F300", &settings).unwrap();
        parser.execute_line("G91", &settings).unwrap();
        let motion = parser.execute_line("X-4Y2", &settings).unwrap().unwrap();
        assert_eq!(motion.target_mm, [6.0, 2.0, 0.0]);
    }

    #[test]
    fn test_inch_mode_scales_words() {
        let settings = test_settings();
        let mut parser = Parser::new(&settings);
        parser.execute_line("G20", &settings).unwrap();
        let motion = parser.execute_line("G1X1F10", &settings).unwrap().unwrap();
        assert!((motion.target_mm[0] - 25.4).abs() < 1e-3);
        assert!((motion.feed_rate - 254.0).abs() < 1e-3);
    }

    #[test]
    fn test_modal_only_line_produces_no_motion() {
        let settings = test_settings();
        let mut parser = Parser::new(&settings);
        assert_eq!(parser.execute_line("G21G90", &settings).unwrap(), None);
        assert_eq!(parser.execute_line("", &settings).unwrap(), None);
    }

    #[test]
    fn test_rejects_unsupported_code() {
        let settings = test_settings();
        let mut parser = Parser::new(&settings);
        assert_eq!(
            parser.execute_line("G2X1", &settings),
            Err(Error::Parse(ParseError::UnsupportedStatement))
        );
        assert_eq!(
            parser.execute_line("M3", &settings),
            Err(Error::Parse(ParseError::UnsupportedStatement))
        );
    }

    #[test]
    fn test_rejects_modal_group_violation() {
        let settings = test_settings();
        let mut parser = Parser::new(&settings);
        assert_eq!(
            parser.execute_line("G0G1X1", &settings),
            Err(Error::Parse(ParseError::ModalGroupViolation))
        );
    }

    #[test]
    fn test_rejects_bad_number() {
        let settings = test_settings();
        let mut parser = Parser::new(&settings);
        assert_eq!(
            parser.execute_line("G1X", &settings),
            Err(Error::Parse(ParseError::BadNumberFormat))
        );
        assert_eq!(
            parser.execute_line("Gx1", &settings),
            Err(Error::Parse(ParseError::BadNumberFormat))
        );
    }

    #[test]
    fn test_rejects_missing_letter() {
        let settings = test_settings();
        let mut parser = Parser::new(&settings);
        assert_eq!(
            parser.execute_line("12X1", &settings),
            Err(Error::Parse(ParseError::ExpectedCommandLetter))
        );
    }

    #[test]
    fn test_line_number_ignored() {
        let settings = test_settings();
        let mut parser = Parser::new(&settings);
        let motion = parser
            .execute_line("N42G1X3F100", &settings)
            .unwrap()
            .unwrap();
        assert_eq!(motion.target_mm, [3.0, 0.0, 0.0]);
    }

    #[test]
    fn test_sync_position() {
        let settings = test_settings();
        let mut parser = Parser::new(&settings);
        parser.sync_position([500, -200, 0], &settings);
        parser.execute_line("G91", &settings).unwrap();
        let motion = parser.execute_line("G1X1F100", &settings).unwrap().unwrap();
        assert!((motion.target_mm[0] - 6.0).abs() < 1e-3);
        assert!((motion.target_mm[1] + 2.0).abs() < 1e-3);
    }
}
