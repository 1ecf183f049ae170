//! Non-volatile settings storage.
//!
//! The record is a fixed binary layout: a version byte, the settings
//! fields in declaration order, and a trailing additive checksum. A
//! version or checksum mismatch on load reports a read failure and the
//! caller restores defaults. Two startup lines live at fixed offsets
//! after the record.

use heapless::String;

use crate::error::SettingError;
use crate::system::N_AXIS;

use super::Settings;

/// Layout version. Bump whenever the field layout changes; old records
/// then fail the version check and defaults are written back.
const SETTINGS_VERSION: u8 = 1;

/// Serialized record length: version + fields + checksum.
const RECORD_LEN: usize = 55;

/// Number of stored startup lines.
pub const STARTUP_LINES: usize = 2;

/// Maximum startup line length, bytes.
pub const STARTUP_LINE_LEN: usize = 80;

const STARTUP_BASE: usize = 128;
const STARTUP_STRIDE: usize = STARTUP_LINE_LEN + 1; // line + checksum

/// Total bytes of non-volatile space the record occupies.
pub const STORE_LEN: usize = STARTUP_BASE + STARTUP_LINES * STARTUP_STRIDE;

/// Non-volatile access failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NvError;

/// Byte-addressed non-volatile memory (EEPROM, flash page, file, ...).
///
/// Implementations only need bounded random-access reads and writes; wear
/// levelling and erase granularity are their concern.
pub trait NonVolatile {
    /// Read `buf.len()` bytes starting at `offset`.
    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), NvError>;
    /// Write `data` starting at `offset`.
    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), NvError>;
}

/// RAM-backed [`NonVolatile`] store, for hosts without an EEPROM and for
/// tests. Fresh instances read as erased (0xFF), like real parts.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    data: [u8; STORE_LEN],
}

impl MemoryStore {
    /// An erased store.
    pub const fn new() -> Self {
        Self {
            data: [0xFF; STORE_LEN],
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NonVolatile for MemoryStore {
    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), NvError> {
        let end = offset.checked_add(buf.len()).ok_or(NvError)?;
        let src = self.data.get(offset..end).ok_or(NvError)?;
        buf.copy_from_slice(src);
        Ok(())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), NvError> {
        let end = offset.checked_add(data.len()).ok_or(NvError)?;
        let dst = self.data.get_mut(offset..end).ok_or(NvError)?;
        dst.copy_from_slice(data);
        Ok(())
    }
}

fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn put(&mut self, bytes: &[u8]) {
        let end = self.pos + bytes.len();
        if let Some(dst) = self.buf.get_mut(self.pos..end) {
            dst.copy_from_slice(bytes);
        }
        self.pos = end;
    }

    fn put_u8(&mut self, v: u8) {
        self.put(&[v]);
    }

    fn put_u16(&mut self, v: u16) {
        self.put(&v.to_le_bytes());
    }

    fn put_f32(&mut self, v: f32) {
        self.put(&v.to_le_bytes());
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn get<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        let end = self.pos + N;
        if let Some(src) = self.buf.get(self.pos..end) {
            out.copy_from_slice(src);
        }
        self.pos = end;
        out
    }

    fn get_u8(&mut self) -> u8 {
        self.get::<1>()[0]
    }

    fn get_u16(&mut self) -> u16 {
        u16::from_le_bytes(self.get::<2>())
    }

    fn get_f32(&mut self) -> f32 {
        f32::from_le_bytes(self.get::<4>())
    }
}

fn encode(settings: &Settings, buf: &mut [u8; RECORD_LEN]) {
    let mut w = Writer::new(&mut buf[..]);
    w.put_u8(SETTINGS_VERSION);
    for i in 0..N_AXIS {
        w.put_f32(settings.steps_per_mm[i]);
    }
    w.put_u8(settings.pulse_microseconds);
    w.put_f32(settings.default_feed_rate);
    w.put_f32(settings.default_seek_rate);
    w.put_u8(settings.invert_mask);
    w.put_u8(settings.stepper_idle_lock_time);
    w.put_f32(settings.acceleration);
    w.put_f32(settings.junction_deviation);
    w.put_f32(settings.mm_per_arc_segment);
    w.put_u8(settings.n_arc_correction);
    w.put_u8(settings.decimal_places);
    w.put_u8(pack_flags(settings));
    w.put_u8(settings.homing_dir_mask);
    w.put_f32(settings.homing_feed_rate);
    w.put_f32(settings.homing_seek_rate);
    w.put_u16(settings.homing_debounce_delay);
    w.put_f32(settings.homing_pulloff);
    buf[RECORD_LEN - 1] = checksum(&buf[..RECORD_LEN - 1]);
}

fn decode(buf: &[u8; RECORD_LEN]) -> Result<Settings, SettingError> {
    if buf[0] != SETTINGS_VERSION {
        return Err(SettingError::ReadFail);
    }
    if buf[RECORD_LEN - 1] != checksum(&buf[..RECORD_LEN - 1]) {
        return Err(SettingError::ReadFail);
    }
    let mut r = Reader::new(&buf[1..]);
    let mut settings = Settings::default();
    for i in 0..N_AXIS {
        settings.steps_per_mm[i] = r.get_f32();
    }
    settings.pulse_microseconds = r.get_u8();
    settings.default_feed_rate = r.get_f32();
    settings.default_seek_rate = r.get_f32();
    settings.invert_mask = r.get_u8();
    settings.stepper_idle_lock_time = r.get_u8();
    settings.acceleration = r.get_f32();
    settings.junction_deviation = r.get_f32();
    settings.mm_per_arc_segment = r.get_f32();
    settings.n_arc_correction = r.get_u8();
    settings.decimal_places = r.get_u8();
    unpack_flags(r.get_u8(), &mut settings);
    settings.homing_dir_mask = r.get_u8();
    settings.homing_feed_rate = r.get_f32();
    settings.homing_seek_rate = r.get_f32();
    settings.homing_debounce_delay = r.get_u16();
    settings.homing_pulloff = r.get_f32();
    Ok(settings)
}

fn pack_flags(settings: &Settings) -> u8 {
    let mut bits = 0u8;
    if settings.report_inches {
        bits |= 1 << 0;
    }
    if settings.auto_start {
        bits |= 1 << 1;
    }
    if settings.invert_step_enable {
        bits |= 1 << 2;
    }
    if settings.hard_limit_enable {
        bits |= 1 << 3;
    }
    if settings.homing_enable {
        bits |= 1 << 4;
    }
    bits
}

fn unpack_flags(bits: u8, settings: &mut Settings) {
    settings.report_inches = bits & (1 << 0) != 0;
    settings.auto_start = bits & (1 << 1) != 0;
    settings.invert_step_enable = bits & (1 << 2) != 0;
    settings.hard_limit_enable = bits & (1 << 3) != 0;
    settings.homing_enable = bits & (1 << 4) != 0;
}

/// Persist the settings record.
pub fn store_settings<N: NonVolatile>(nv: &mut N, settings: &Settings) -> Result<(), NvError> {
    let mut buf = [0u8; RECORD_LEN];
    encode(settings, &mut buf);
    nv.write(0, &buf)
}

/// Load the settings record.
///
/// # Errors
///
/// [`SettingError::ReadFail`] on a storage error, version mismatch or
/// checksum mismatch; the caller falls back to defaults and rewrites.
pub fn load_settings<N: NonVolatile>(nv: &mut N) -> Result<Settings, SettingError> {
    let mut buf = [0u8; RECORD_LEN];
    nv.read(0, &mut buf).map_err(|_| SettingError::ReadFail)?;
    decode(&buf)
}

/// Persist startup line `n` (zero-padded ASCII plus checksum).
pub fn store_startup_line<N: NonVolatile>(nv: &mut N, n: usize, line: &str) -> Result<(), NvError> {
    if n >= STARTUP_LINES || line.len() >= STARTUP_LINE_LEN {
        return Err(NvError);
    }
    let mut buf = [0u8; STARTUP_STRIDE];
    buf[..line.len()].copy_from_slice(line.as_bytes());
    buf[STARTUP_STRIDE - 1] = checksum(&buf[..STARTUP_STRIDE - 1]);
    nv.write(STARTUP_BASE + n * STARTUP_STRIDE, &buf)
}

/// Load startup line `n`. An unreadable or corrupt slot reports
/// [`SettingError::ReadFail`]; the caller treats it as empty after
/// rewriting.
pub fn load_startup_line<N: NonVolatile>(
    nv: &mut N,
    n: usize,
) -> Result<String<STARTUP_LINE_LEN>, SettingError> {
    if n >= STARTUP_LINES {
        return Err(SettingError::ReadFail);
    }
    let mut buf = [0u8; STARTUP_STRIDE];
    nv.read(STARTUP_BASE + n * STARTUP_STRIDE, &mut buf)
        .map_err(|_| SettingError::ReadFail)?;
    if buf[STARTUP_STRIDE - 1] != checksum(&buf[..STARTUP_STRIDE - 1]) {
        return Err(SettingError::ReadFail);
    }
    let len = buf[..STARTUP_LINE_LEN]
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(STARTUP_LINE_LEN);
    let text = core::str::from_utf8(&buf[..len]).map_err(|_| SettingError::ReadFail)?;
    String::try_from(text).map_err(|_| SettingError::ReadFail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let mut nv = MemoryStore::new();
        let mut settings = Settings::default();
        settings.steps_per_mm = [100.0, 200.0, 400.0];
        settings.report_inches = true;
        settings.homing_enable = true;
        settings.homing_debounce_delay = 250;

        store_settings(&mut nv, &settings).unwrap();
        let loaded = load_settings(&mut nv).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_erased_store_fails_version() {
        let mut nv = MemoryStore::new();
        assert_eq!(load_settings(&mut nv), Err(SettingError::ReadFail));
    }

    #[test]
    fn test_corrupt_checksum_fails() {
        let mut nv = MemoryStore::new();
        store_settings(&mut nv, &Settings::default()).unwrap();
        // Flip one payload byte.
        let mut byte = [0u8; 1];
        nv.read(5, &mut byte).unwrap();
        nv.write(5, &[byte[0] ^ 0x40]).unwrap();
        assert_eq!(load_settings(&mut nv), Err(SettingError::ReadFail));
    }

    #[test]
    fn test_startup_lines() {
        let mut nv = MemoryStore::new();
        store_startup_line(&mut nv, 0, "G20 G90").unwrap();
        store_startup_line(&mut nv, 1, "").unwrap();

        assert_eq!(load_startup_line(&mut nv, 0).unwrap().as_str(), "G20 G90");
        assert_eq!(load_startup_line(&mut nv, 1).unwrap().as_str(), "");
    }

    #[test]
    fn test_startup_line_too_long() {
        let mut nv = MemoryStore::new();
        let long = [b'X'; STARTUP_LINE_LEN + 1];
        let long = core::str::from_utf8(&long).unwrap();
        assert!(store_startup_line(&mut nv, 0, long).is_err());
    }
}
