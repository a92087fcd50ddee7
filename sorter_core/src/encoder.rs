//! Quadrature position decoding.
//!
//! Every method takes `&self` and touches only atomics, so the edge handlers
//! can run in interrupt context (or on a GPIO callback thread) while the main
//! loop reads snapshots. Nothing here allocates, blocks or logs.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU8, AtomicU32, Ordering};

use sorter_traits::Channel;

/// Marker for "no levels sampled yet"; never equal to a real two-bit pattern.
const LEVELS_UNKNOWN: u8 = 0xFF;

/// Count direction for an edge on `channel` given the levels sampled after it.
///
/// Forward rotation walks `00 → 10 → 11 → 01 → 00` (A leads B).
#[inline]
pub fn direction(channel: Channel, level_a: bool, level_b: bool) -> i32 {
    match channel {
        Channel::A if level_a != level_b => 1,
        Channel::A => -1,
        Channel::B if level_a == level_b => 1,
        Channel::B => -1,
    }
}

/// `count mod range`, always in `[0, range)`.
#[inline]
pub fn phase_of(count: i32, range: u16) -> u16 {
    count.rem_euclid(i32::from(range.max(1))) as u16
}

#[inline]
fn pack_levels(level_a: bool, level_b: bool) -> u8 {
    u8::from(level_a) | (u8::from(level_b) << 1)
}

#[derive(Debug)]
pub struct PositionEncoder {
    phase_range: u16,
    count: AtomicI32,
    levels: AtomicU8,
    changed: AtomicBool,
    pending_ticks: AtomicU32,
    zero_crossings: AtomicU32,
    drift_events: AtomicU32,
    last_drift_raw: AtomicI32,
}

impl PositionEncoder {
    pub fn new(phase_range: u16) -> Self {
        Self {
            phase_range: phase_range.max(1),
            count: AtomicI32::new(0),
            levels: AtomicU8::new(LEVELS_UNKNOWN),
            changed: AtomicBool::new(false),
            pending_ticks: AtomicU32::new(0),
            zero_crossings: AtomicU32::new(0),
            drift_events: AtomicU32::new(0),
            last_drift_raw: AtomicI32::new(0),
        }
    }

    /// Handle an edge on either quadrature channel.
    ///
    /// Returns the new phase when the count moved. An edge whose sampled
    /// levels equal the previously sampled levels is a glitch and is ignored.
    pub fn on_channel_edge(&self, channel: Channel, level_a: bool, level_b: bool) -> Option<u16> {
        let now = pack_levels(level_a, level_b);
        if self.levels.swap(now, Ordering::AcqRel) == now {
            return None;
        }
        let step = direction(channel, level_a, level_b);
        let new = self.count.fetch_add(step, Ordering::AcqRel).wrapping_add(step);
        self.changed.store(true, Ordering::Release);
        self.pending_ticks.fetch_add(1, Ordering::AcqRel);
        Some(phase_of(new, self.phase_range))
    }

    /// Handle the zero-reference pulse.
    ///
    /// Returns `Some(0)` when the count had drifted and was forced back to zero.
    pub fn on_zero_edge(&self) -> Option<u16> {
        self.zero_crossings.fetch_add(1, Ordering::Relaxed);
        let raw = self.count.load(Ordering::Acquire);
        if phase_of(raw, self.phase_range) == 0 {
            return None;
        }
        self.last_drift_raw.store(raw, Ordering::Relaxed);
        self.count.store(0, Ordering::Release);
        self.drift_events.fetch_add(1, Ordering::Relaxed);
        self.changed.store(true, Ordering::Release);
        Some(0)
    }

    #[inline]
    pub fn phase(&self) -> u16 {
        phase_of(self.raw_count(), self.phase_range)
    }

    #[inline]
    pub fn raw_count(&self) -> i32 {
        self.count.load(Ordering::Acquire)
    }

    #[inline]
    pub fn phase_range(&self) -> u16 {
        self.phase_range
    }

    /// Read and clear the "position changed" flag.
    pub fn take_changed(&self) -> bool {
        self.changed.swap(false, Ordering::AcqRel)
    }

    /// Read and clear the number of count changes since the last call.
    pub fn take_ticks(&self) -> u32 {
        self.pending_ticks.swap(0, Ordering::AcqRel)
    }

    pub fn zero_crossings(&self) -> u32 {
        self.zero_crossings.load(Ordering::Relaxed)
    }

    pub fn drift_events(&self) -> u32 {
        self.drift_events.load(Ordering::Relaxed)
    }

    /// Raw count observed at the most recent drift correction.
    pub fn last_drift_raw(&self) -> i32 {
        self.last_drift_raw.load(Ordering::Relaxed)
    }
}
