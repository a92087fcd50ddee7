//! Transport-delay shift register.
//!
//! Slot 0 is the reading taken at the scan point this cycle; slot `k` is the
//! reading that has travelled `k` conveyor steps since. Contents only ever
//! move toward higher indices and fall off the end.

use std::collections::VecDeque;

/// A measured spear as it travels down the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading {
    pub diameter_mm: u16,
    pub crossings: u8,
}

#[derive(Debug, Clone)]
pub struct TransportQueue {
    slots: VecDeque<Option<Reading>>,
}

impl TransportQueue {
    /// A queue of `length` empty slots (at least one).
    pub fn new(length: usize) -> Self {
        let length = length.max(1);
        let mut slots = VecDeque::with_capacity(length);
        slots.resize(length, None);
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Shift every slot one step and write `reading` to slot 0.
    /// Returns whatever fell off the end.
    pub fn push(&mut self, reading: Reading) -> Option<Reading> {
        self.advance(Some(reading))
    }

    /// Shift without a new measurement; slot 0 becomes empty.
    pub fn shift_only(&mut self) -> Option<Reading> {
        self.advance(None)
    }

    fn advance(&mut self, head: Option<Reading>) -> Option<Reading> {
        let evicted = self.slots.pop_back().flatten();
        self.slots.push_front(head);
        evicted
    }

    /// Reading at `index`; out-of-range and empty slots both give `None`.
    pub fn get(&self, index: usize) -> Option<Reading> {
        self.slots.get(index).copied().flatten()
    }

    pub fn slots(&self) -> impl Iterator<Item = Option<Reading>> + '_ {
        self.slots.iter().copied()
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = None);
    }
}
