//! Pending runtime actions shared between interrupt and foreground context.

use core::sync::atomic::{AtomicU8, Ordering};

use bitflags::bitflags;

bitflags! {
    /// Runtime actions requested by interrupts or real-time serial bytes.
    ///
    /// The foreground coordinator consumes these once per protocol
    /// iteration; interrupt handlers only ever set bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Exec: u8 {
        /// Print a real-time status report.
        const STATUS_REPORT = 1 << 0;
        /// Start or resume the cycle.
        const CYCLE_START = 1 << 1;
        /// The stepper stopped: buffer drained or feed-hold deceleration
        /// complete.
        const CYCLE_STOP = 1 << 2;
        /// Decelerate the current motion to a resumable stop.
        const FEED_HOLD = 1 << 3;
        /// Clear the alarm lock.
        const RESET_ALARM = 1 << 4;
        /// Tear everything down and re-initialize.
        const ABORT = 1 << 5;
    }
}

/// Atomic bitset of pending [`Exec`] actions.
///
/// Word-wide read-modify-write keeps flag updates consistent across the
/// interrupt/foreground boundary without a critical section.
#[derive(Debug, Default)]
pub struct Pending(AtomicU8);

impl Pending {
    /// Create an empty pending set.
    pub const fn new() -> Self {
        Self(AtomicU8::new(0))
    }

    /// Raise the given flags.
    #[inline]
    pub fn set(&self, flags: Exec) {
        self.0.fetch_or(flags.bits(), Ordering::SeqCst);
    }

    /// Test-and-clear: returns `true` if any of `flags` was set, clearing
    /// exactly those bits.
    #[inline]
    pub fn take(&self, flags: Exec) -> bool {
        self.0.fetch_and(!flags.bits(), Ordering::SeqCst) & flags.bits() != 0
    }

    /// Peek at the currently pending flags without clearing them.
    #[inline]
    pub fn peek(&self) -> Exec {
        Exec::from_bits_truncate(self.0.load(Ordering::SeqCst))
    }

    /// Check whether any of `flags` is pending.
    #[inline]
    pub fn is_set(&self, flags: Exec) -> bool {
        self.peek().intersects(flags)
    }

    /// Drop every pending flag.
    #[inline]
    pub fn clear_all(&self) {
        self.0.store(0, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_take() {
        let pending = Pending::new();
        assert!(!pending.is_set(Exec::CYCLE_START));

        pending.set(Exec::CYCLE_START);
        pending.set(Exec::STATUS_REPORT);
        assert!(pending.is_set(Exec::CYCLE_START));

        // take clears only the requested bits
        assert!(pending.take(Exec::CYCLE_START));
        assert!(!pending.is_set(Exec::CYCLE_START));
        assert!(pending.is_set(Exec::STATUS_REPORT));

        // second take reports nothing pending
        assert!(!pending.take(Exec::CYCLE_START));
    }

    #[test]
    fn test_clear_all() {
        let pending = Pending::new();
        pending.set(Exec::FEED_HOLD | Exec::ABORT);
        pending.clear_all();
        assert_eq!(pending.peek(), Exec::empty());
    }
}
