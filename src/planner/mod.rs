//! Look-ahead motion planner.
//!
//! The planner turns displacement targets into [`Block`]s and keeps the
//! queued chain of blocks velocity-optimal: every junction is entered at
//! the highest speed from which the machine can still decelerate to rest
//! by the end of the buffer, without exceeding the acceleration limit or
//! the cornering limit derived from the junction deviation.

mod block;
mod buffer;

pub use block::Block;
pub use buffer::{next_index, prev_index, BlockBuffer, BLOCK_BUFFER_SIZE};

use libm::{ceilf, roundf, sqrtf};

use crate::settings::Settings;
use crate::stepper::{PortBits, ACCELERATION_TICKS_PER_SECOND};
use crate::system::{MachineState, N_AXIS};

/// The block buffer has no free slot; retry after the stepper discards a
/// block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferFull;

/// The look-ahead planner.
#[derive(Debug, Default)]
pub struct Planner {
    buffer: BlockBuffer,
    /// Planner position shadow in steps: where the machine will be once
    /// everything queued has executed.
    position: [i32; N_AXIS],
    previous_unit_vec: [f32; N_AXIS],
    previous_nominal_speed_sq: f32,
}

impl Planner {
    /// A planner with an empty buffer at the step-count origin.
    pub fn new() -> Self {
        Self {
            buffer: BlockBuffer::new(),
            position: [0; N_AXIS],
            previous_unit_vec: [0.0; N_AXIS],
            previous_nominal_speed_sq: 0.0,
        }
    }

    /// Empty the buffer and forget the junction history. Position is reset
    /// separately through [`Planner::sync_position`].
    pub fn init(&mut self) {
        self.buffer.clear();
        self.previous_unit_vec = [0.0; N_AXIS];
        self.previous_nominal_speed_sq = 0.0;
    }

    /// Align the planner's position shadow with the machine position.
    pub fn sync_position(&mut self, position: [i32; N_AXIS]) {
        self.position = position;
    }

    /// Planner position shadow, steps.
    #[inline]
    pub fn position(&self) -> [i32; N_AXIS] {
        self.position
    }

    /// The block the stepper should execute next, if any.
    #[inline]
    pub fn current_block(&self) -> Option<&Block> {
        self.buffer.current()
    }

    /// Release the executed block's slot.
    #[inline]
    pub fn discard_current_block(&mut self) {
        self.buffer.discard_current();
    }

    /// True when every queued block has been consumed.
    #[inline]
    pub fn is_drained(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Number of queued blocks.
    #[inline]
    pub fn block_count(&self) -> usize {
        self.buffer.len()
    }

    /// Read access to the ring, for state inspection.
    #[inline]
    pub fn buffer(&self) -> &BlockBuffer {
        &self.buffer
    }

    /// Queue a straight-line motion to `target_mm` at `feed_rate`.
    ///
    /// With `invert_feed_rate` the feed value is interpreted as
    /// 1/minutes for the whole move (inverse-time feed) instead of
    /// mm/min. Returns `Ok(false)` when the target rounds to the current
    /// position on every axis (zero-length lines are dropped), and
    /// [`BufferFull`] when no slot is free, in which case the caller parks in a
    /// cooperative wait and retries.
    pub fn append_line(
        &mut self,
        settings: &Settings,
        state: MachineState,
        target_mm: &[f32; N_AXIS],
        feed_rate: f32,
        invert_feed_rate: bool,
    ) -> Result<bool, BufferFull> {
        if self.buffer.is_full() {
            return Err(BufferFull);
        }

        let mut target = [0i32; N_AXIS];
        let mut steps = [0u32; N_AXIS];
        let mut delta_mm = [0.0f32; N_AXIS];
        let mut direction_bits = PortBits::empty();
        for i in 0..N_AXIS {
            target[i] = roundf(target_mm[i] * settings.steps_per_mm[i]) as i32;
            let delta = target[i] - self.position[i];
            steps[i] = delta.unsigned_abs();
            if delta < 0 {
                direction_bits |= PortBits::direction_bit(i);
            }
            delta_mm[i] = delta as f32 / settings.steps_per_mm[i];
        }
        let step_event_count = steps[0].max(steps[1]).max(steps[2]);
        if step_event_count == 0 {
            return Ok(false);
        }

        let millimeters = sqrtf(delta_mm.iter().map(|d| d * d).sum::<f32>());
        let inverse_mm = 1.0 / millimeters;

        let inverse_minute = if invert_feed_rate {
            feed_rate
        } else {
            feed_rate * inverse_mm
        };
        let nominal_speed = millimeters * inverse_minute;
        let nominal_speed_sq = nominal_speed * nominal_speed;
        let nominal_rate = ceilf(step_event_count as f32 * inverse_minute) as u32;

        // The record carries one scalar acceleration, so the per-axis
        // projection clip degenerates to it.
        let acceleration = settings.acceleration;
        let rate_delta = ceilf(
            step_event_count as f32 * inverse_mm * acceleration
                / (60.0 * ACCELERATION_TICKS_PER_SECOND as f32),
        ) as u32;

        let mut unit_vec = [0.0f32; N_AXIS];
        for i in 0..N_AXIS {
            unit_vec[i] = delta_mm[i] * inverse_mm;
        }
        let max_entry_speed_sq = self.junction_speed_sq(
            settings,
            &unit_vec,
            nominal_speed_sq,
            acceleration,
        );

        // Provisional entry: the junction limit, capped by what the block
        // itself can shed before a dead stop.
        let mut entry_speed_sq = max_entry_speed_sq.min(2.0 * acceleration * millimeters);
        // A block appended directly behind the executing block is anchored
        // immediately and can never be re-planned; the executing block's
        // committed profile already decelerates to rest, so this one must
        // start from rest.
        if state.is_executing() && self.buffer.len() == 1 {
            entry_speed_sq = 0.0;
        }
        let nominal_length = nominal_speed_sq <= 2.0 * acceleration * millimeters;

        let slot = self.buffer.write_slot().ok_or(BufferFull)?;
        *slot = Block {
            steps,
            direction_bits,
            step_event_count,
            millimeters,
            nominal_speed_sq,
            nominal_rate,
            entry_speed_sq,
            max_entry_speed_sq,
            acceleration,
            rate_delta,
            initial_rate: 0,
            final_rate: 0,
            accelerate_until: 0,
            decelerate_after: 0,
            nominal_length,
            recalculate: true,
        };
        // Fields are complete before publication.
        self.buffer.commit_write();

        self.previous_unit_vec = unit_vec;
        self.previous_nominal_speed_sq = nominal_speed_sq;
        self.position = target;

        self.recalculate(state);
        Ok(true)
    }

    /// Maximum squared cornering speed between the previous motion and a
    /// new one along `unit_vec`.
    ///
    /// The corner is treated as a circular arc that deviates from the
    /// exact corner by the configured junction deviation δ:
    /// `r = δ·sin(θ/2)/(1−sin(θ/2))`, `v² = a·r`. A first block or a
    /// near-reversal junction must start from rest.
    fn junction_speed_sq(
        &self,
        settings: &Settings,
        unit_vec: &[f32; N_AXIS],
        nominal_speed_sq: f32,
        acceleration: f32,
    ) -> f32 {
        if self.buffer.is_empty() || self.previous_nominal_speed_sq <= 0.0 {
            return 0.0;
        }
        // Negated dot product: -1 for straight-through, +1 for reversal.
        let mut cos_theta = 0.0;
        for i in 0..N_AXIS {
            cos_theta -= self.previous_unit_vec[i] * unit_vec[i];
        }
        if cos_theta >= 0.95 {
            // Near-reversal: come to rest at the corner.
            return 0.0;
        }
        let mut v_sq = nominal_speed_sq.min(self.previous_nominal_speed_sq);
        if cos_theta > -0.95 {
            let sin_theta_d2 = sqrtf(0.5 * (1.0 - cos_theta));
            let radius = settings.junction_deviation * sin_theta_d2 / (1.0 - sin_theta_d2);
            v_sq = v_sq.min(acceleration * radius);
        }
        v_sq
    }

    /// Re-run the two-pass velocity optimizer over the still-optimizable
    /// span of the buffer.
    pub fn recalculate(&mut self, state: MachineState) {
        if self.buffer.is_empty() {
            return;
        }
        // While a block may be executing, the tail slot belongs to the
        // stepper interrupt and is excluded from re-planning.
        if state.is_executing() && self.buffer.planned() == self.buffer.tail() {
            let bumped = next_index(self.buffer.tail());
            if bumped == self.buffer.head() {
                return;
            }
            self.buffer.set_planned(bumped);
        }
        self.reverse_pass();
        self.forward_pass();
        self.update_trapezoids();
    }

    /// Newest to oldest: cap each entry speed by what the chain ahead can
    /// shed before the forced stop at the buffer end.
    fn reverse_pass(&mut self) {
        let planned = self.buffer.planned();
        let mut index = self.buffer.head();
        let mut next_entry_sq = 0.0; // sentinel: the tail of the chain stops
        while index != planned {
            index = prev_index(index);
            if index == planned {
                // Anchor block: its entry speed is already final.
                break;
            }
            let (nominal_length, entry_sq, max_entry_sq, acceleration, millimeters, settled) = {
                let b = self.buffer.block(index);
                (
                    b.nominal_length,
                    b.entry_speed_sq,
                    b.max_entry_speed_sq,
                    b.acceleration,
                    b.millimeters,
                    !b.recalculate,
                )
            };
            if nominal_length && entry_sq >= max_entry_sq && settled {
                // Optimization barrier: this block already enters at its
                // junction limit, can reach nominal on its own, and its
                // profile is committed. Nothing earlier can be improved
                // by later appends.
                self.buffer.set_planned(index);
                break;
            }
            let new_entry =
                max_entry_sq.min(next_entry_sq + 2.0 * acceleration * millimeters);
            if new_entry != entry_sq {
                let b = self.buffer.block_mut(index);
                b.entry_speed_sq = new_entry;
                b.recalculate = true;
            }
            next_entry_sq = new_entry;
        }
    }

    /// Oldest to newest: cap each entry speed by what the predecessor can
    /// gain over its length.
    fn forward_pass(&mut self) {
        let head = self.buffer.head();
        let mut prev = self.buffer.planned();
        if prev == head {
            return;
        }
        let mut index = next_index(prev);
        while index != head {
            let (prev_entry_sq, prev_nominal_length, prev_acceleration, prev_millimeters) = {
                let b = self.buffer.block(prev);
                (
                    b.entry_speed_sq,
                    b.nominal_length,
                    b.acceleration,
                    b.millimeters,
                )
            };
            if !prev_nominal_length {
                let reachable =
                    prev_entry_sq + 2.0 * prev_acceleration * prev_millimeters;
                let block = self.buffer.block_mut(index);
                if block.entry_speed_sq > reachable {
                    block.entry_speed_sq = reachable;
                    block.recalculate = true;
                }
            }
            prev = index;
            index = next_index(index);
        }
    }

    /// Re-derive trapezoids wherever an entry speed moved. Each block's
    /// exit speed is its successor's entry; the newest block always exits
    /// at rest.
    fn update_trapezoids(&mut self) {
        let head = self.buffer.head();
        let mut index = self.buffer.planned();
        while index != head {
            let next = next_index(index);
            let (exit_sq, next_recalculate) = if next == head {
                (0.0, true)
            } else {
                let nb = self.buffer.block(next);
                (nb.entry_speed_sq, nb.recalculate)
            };
            let block = self.buffer.block_mut(index);
            if block.recalculate || next_recalculate {
                block.calculate_trapezoid(exit_sq);
                block.recalculate = false;
            }
            index = next;
        }
    }

    /// Shorten the held block to its unexecuted remainder and re-plan the
    /// chain from rest, for a feed-hold resume. The stepper must be idle.
    ///
    /// The per-axis step counts are deliberately untouched: the stepper's
    /// Bresenham state carries the executed prefix, so the physical path
    /// continues exactly where it paused.
    pub fn cycle_reinitialize(&mut self, step_events_remaining: u32) {
        if self.buffer.is_empty() {
            return;
        }
        let tail = self.buffer.tail();
        {
            let block = self.buffer.block_mut(tail);
            if block.step_event_count > 0 {
                block.millimeters = block.millimeters * step_events_remaining as f32
                    / block.step_event_count as f32;
            }
            block.step_event_count = step_events_remaining;
            block.entry_speed_sq = 0.0;
            block.max_entry_speed_sq = 0.0;
            block.nominal_length = false;
            block.recalculate = true;
        }
        self.buffer.set_planned(tail);
        // The stepper is stopped, so the tail slot is replannable.
        self.recalculate(MachineState::Queued);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings() -> Settings {
        Settings {
            steps_per_mm: [100.0, 100.0, 100.0],
            acceleration: 36_000.0, // 10 mm/s²
            junction_deviation: 0.05,
            ..Settings::default()
        }
    }

    fn append(
        planner: &mut Planner,
        settings: &Settings,
        target: [f32; N_AXIS],
        feed: f32,
    ) -> bool {
        planner
            .append_line(settings, MachineState::Idle, &target, feed, false)
            .unwrap()
    }

    /// Check the chain invariant over all queued blocks: every entry obeys
    /// the junction limit and the predecessor's acceleration limit, and
    /// the newest block can stop by its end.
    fn assert_chain_invariant(planner: &Planner) {
        let buffer = planner.buffer();
        let head = buffer.head();
        let mut index = buffer.tail();
        let mut prev: Option<&Block> = None;
        while index != head {
            let block = buffer.block(index);
            assert!(
                block.entry_speed_sq <= block.max_entry_speed_sq + 1e-3,
                "entry exceeds junction limit"
            );
            if let Some(p) = prev {
                let reachable = p.entry_speed_sq + 2.0 * p.acceleration * p.millimeters;
                assert!(
                    block.entry_speed_sq <= reachable + 1e-3,
                    "entry exceeds predecessor's acceleration limit"
                );
            }
            prev = Some(block);
            index = next_index(index);
        }
        if let Some(last) = prev {
            // The newest block must be able to reach rest at its end.
            let stop_sq = 2.0 * last.acceleration * last.millimeters;
            assert!(last.entry_speed_sq <= stop_sq + 1e-3);
        }
    }

    #[test]
    fn test_single_block_starts_and_ends_at_rest() {
        let settings = test_settings();
        let mut planner = Planner::new();
        assert!(append(&mut planner, &settings, [10.0, 0.0, 0.0], 600.0));

        let block = planner.current_block().unwrap();
        assert_eq!(block.steps, [1000, 0, 0]);
        assert_eq!(block.step_event_count, 1000);
        assert!((block.millimeters - 10.0).abs() < 1e-4);
        assert_eq!(block.entry_speed_sq, 0.0);
        assert_eq!(block.initial_rate, 0);
        assert_eq!(block.final_rate, 0);
        // 600 mm/min at 100 steps/mm
        assert_eq!(block.nominal_rate, 60_000);
    }

    #[test]
    fn test_zero_length_line_dropped() {
        let settings = test_settings();
        let mut planner = Planner::new();
        assert!(!append(&mut planner, &settings, [0.004, 0.0, 0.0], 600.0));
        assert!(planner.is_drained());
    }

    #[test]
    fn test_direction_bits_on_negative_travel() {
        let settings = test_settings();
        let mut planner = Planner::new();
        append(&mut planner, &settings, [10.0, -5.0, 0.0], 600.0);

        let block = planner.current_block().unwrap();
        assert!(!block.direction_bits.contains(PortBits::X_DIR));
        assert!(block.direction_bits.contains(PortBits::Y_DIR));
        assert_eq!(block.steps, [1000, 500, 0]);
    }

    #[test]
    fn test_reversal_junction_stops() {
        let settings = test_settings();
        let mut planner = Planner::new();
        append(&mut planner, &settings, [10.0, 0.0, 0.0], 1000.0);
        append(&mut planner, &settings, [0.0, 0.0, 0.0], 1000.0);

        let buffer = planner.buffer();
        let second = buffer.block(next_index(buffer.tail()));
        assert_eq!(second.max_entry_speed_sq, 0.0);
        assert_eq!(second.entry_speed_sq, 0.0);
    }

    #[test]
    fn test_straight_junction_carries_speed() {
        let settings = test_settings();
        let mut planner = Planner::new();
        append(&mut planner, &settings, [10.0, 0.0, 0.0], 1000.0);
        append(&mut planner, &settings, [20.0, 0.0, 0.0], 1000.0);

        let buffer = planner.buffer();
        let second = buffer.block(next_index(buffer.tail()));
        // Collinear: junction limited only by the nominal speeds.
        assert!((second.max_entry_speed_sq - 1000.0 * 1000.0).abs() < 1.0);
        assert_chain_invariant(&planner);
    }

    #[test]
    fn test_shallow_angle_junction_keeps_nominal() {
        let settings = test_settings();
        let mut planner = Planner::new();
        append(&mut planner, &settings, [10.0, 0.0, 0.0], 3000.0);
        append(&mut planner, &settings, [20.0, 0.1, 0.0], 3000.0);

        // A 0.1-in-10 dogleg sits inside the straight-junction threshold,
        // so only the nominal speeds cap the corner.
        let buffer = planner.buffer();
        let second = buffer.block(next_index(buffer.tail()));
        let expected = 3000.0f32 * 3000.0;
        assert!((second.max_entry_speed_sq - expected).abs() / expected < 1e-3);
        assert_chain_invariant(&planner);
    }

    #[test]
    fn test_corner_junction_matches_arc_model() {
        let settings = test_settings();
        let mut planner = Planner::new();
        append(&mut planner, &settings, [10.0, 0.0, 0.0], 3000.0);
        append(&mut planner, &settings, [20.0, 10.0, 0.0], 3000.0);

        // Recompute the arc model by hand for the 45° corner.
        let dot = 10.0f32 / sqrtf(10.0f32 * 10.0 + 10.0 * 10.0);
        let cos_theta = -dot;
        let sin_theta_d2 = sqrtf(0.5 * (1.0 - cos_theta));
        let radius = settings.junction_deviation * sin_theta_d2 / (1.0 - sin_theta_d2);
        let expected = (settings.acceleration * radius).min(3000.0 * 3000.0);

        let buffer = planner.buffer();
        let second = buffer.block(next_index(buffer.tail()));
        assert!(second.max_entry_speed_sq > 0.0);
        assert!((second.max_entry_speed_sq - expected).abs() / expected < 1e-3);
        assert_chain_invariant(&planner);
    }

    #[test]
    fn test_chain_invariant_over_random_walk() {
        let settings = test_settings();
        let mut planner = Planner::new();
        let targets = [
            [5.0, 0.0, 0.0],
            [10.0, 2.0, 0.0],
            [10.0, 8.0, 1.0],
            [4.0, 8.0, 1.0],
            [4.0, 0.0, 0.0],
            [0.0, 0.0, 0.0],
        ];
        for t in targets {
            append(&mut planner, &settings, t, 1500.0);
            assert_chain_invariant(&planner);
        }
        assert_eq!(planner.block_count(), 6);
    }

    #[test]
    fn test_buffer_backpressure() {
        let settings = test_settings();
        let mut planner = Planner::new();
        for i in 0..BLOCK_BUFFER_SIZE - 1 {
            let x = (i + 1) as f32;
            assert!(append(&mut planner, &settings, [x, 0.0, 0.0], 600.0));
        }
        let overflow = planner.append_line(
            &settings,
            MachineState::Idle,
            &[100.0, 0.0, 0.0],
            600.0,
            false,
        );
        assert_eq!(overflow, Err(BufferFull));

        // One discard frees exactly one slot.
        planner.discard_current_block();
        assert!(planner
            .append_line(&settings, MachineState::Idle, &[100.0, 0.0, 0.0], 600.0, false)
            .unwrap());
    }

    #[test]
    fn test_inverse_time_feed() {
        let settings = test_settings();
        let mut planner = Planner::new();
        // Whole 10 mm move in 1/2 minute: nominal speed 20 mm/min.
        planner
            .append_line(&settings, MachineState::Idle, &[10.0, 0.0, 0.0], 2.0, true)
            .unwrap();
        let block = planner.current_block().unwrap();
        assert!((block.nominal_speed_sq - 400.0).abs() < 1e-2);
    }

    #[test]
    fn test_executing_tail_not_replanned() {
        let settings = test_settings();
        let mut planner = Planner::new();
        append(&mut planner, &settings, [10.0, 0.0, 0.0], 1000.0);
        let before = *planner.current_block().unwrap();

        // Appending collinear motion while the first block executes must
        // leave the executing block untouched.
        planner
            .append_line(
                &settings,
                MachineState::Cycle,
                &[20.0, 0.0, 0.0],
                1000.0,
                false,
            )
            .unwrap();
        let after = planner.current_block().unwrap();
        assert_eq!(before, *after);
    }

    #[test]
    fn test_planned_advances_past_settled_barrier() {
        let settings = test_settings();
        let mut planner = Planner::new();
        // Slow moves: each block reaches nominal from rest, and the
        // reversal pins the middle block's entry at zero.
        append(&mut planner, &settings, [10.0, 0.0, 0.0], 100.0);
        append(&mut planner, &settings, [0.0, 0.0, 0.0], 100.0);
        append(&mut planner, &settings, [10.0, 0.0, 0.0], 100.0);

        // The middle block is a settled barrier: entry at its junction
        // limit, long enough to reach nominal, profile committed.
        let buffer = planner.buffer();
        assert_eq!(buffer.planned(), next_index(buffer.tail()));
        assert_chain_invariant(&planner);
    }

    #[test]
    fn test_cycle_reinitialize_shortens_tail() {
        let settings = test_settings();
        let mut planner = Planner::new();
        append(&mut planner, &settings, [10.0, 0.0, 0.0], 1000.0);

        planner.cycle_reinitialize(800);
        let block = planner.current_block().unwrap();
        assert_eq!(block.step_event_count, 800);
        assert!((block.millimeters - 8.0).abs() < 1e-4);
        assert_eq!(block.entry_speed_sq, 0.0);
        assert_eq!(block.initial_rate, 0);
        // Per-axis counts keep the original totals for the Bresenham state.
        assert_eq!(block.steps, [1000, 0, 0]);
    }
}
