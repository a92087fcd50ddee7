//! Phase-triggered action flags.
//!
//! `on_phase` runs in interrupt context and only raises flags. The main loop
//! calls `drain` once per iteration; a flag raised several times before the
//! drain is serviced once.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::config::PhaseCfg;

/// The four actions bound to trigger phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhaseAction {
    /// Clear the scanner and open a fresh measurement window.
    ScanWindowStart,
    /// Close every outlet.
    OutletReset,
    /// Move the pending estimate into the transport queue and re-stage outlets.
    DiameterFinalize,
    /// Drive every outlet to its staged position.
    OutletCommit,
}

impl PhaseAction {
    pub const ALL: [PhaseAction; 4] = [
        PhaseAction::ScanWindowStart,
        PhaseAction::OutletReset,
        PhaseAction::DiameterFinalize,
        PhaseAction::OutletCommit,
    ];

    #[inline]
    fn index(self) -> usize {
        match self {
            PhaseAction::ScanWindowStart => 0,
            PhaseAction::OutletReset => 1,
            PhaseAction::DiameterFinalize => 2,
            PhaseAction::OutletCommit => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PhaseAction::ScanWindowStart => "scan_start",
            PhaseAction::OutletReset => "outlet_reset",
            PhaseAction::DiameterFinalize => "diameter_finalize",
            PhaseAction::OutletCommit => "outlet_commit",
        }
    }
}

/// Actions drained in one main-loop iteration, in ascending trigger-phase order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionSet {
    items: [Option<PhaseAction>; 4],
    len: usize,
}

impl ActionSet {
    fn push(&mut self, action: PhaseAction) {
        if self.len < self.items.len() {
            self.items[self.len] = Some(action);
            self.len += 1;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn contains(&self, action: PhaseAction) -> bool {
        self.iter().any(|a| a == action)
    }

    pub fn iter(&self) -> impl Iterator<Item = PhaseAction> + '_ {
        self.items[..self.len].iter().flatten().copied()
    }
}

#[derive(Debug)]
pub struct PhaseScheduler {
    /// `(phase, action)` sorted by phase.
    triggers: [(u16, PhaseAction); 4],
    flags: [AtomicBool; 4],
    raised: AtomicU32,
}

impl PhaseScheduler {
    pub fn new(cfg: &PhaseCfg) -> Self {
        let mut triggers = [
            (cfg.scan_start, PhaseAction::ScanWindowStart),
            (cfg.outlet_reset, PhaseAction::OutletReset),
            (cfg.diameter_finalize, PhaseAction::DiameterFinalize),
            (cfg.outlet_commit, PhaseAction::OutletCommit),
        ];
        triggers.sort_by_key(|t| t.0);
        Self {
            triggers,
            flags: Default::default(),
            raised: AtomicU32::new(0),
        }
    }

    /// Raise the flag of every trigger bound to `phase`. Interrupt-safe.
    #[inline]
    pub fn on_phase(&self, phase: u16) {
        for &(at, action) in &self.triggers {
            if at == phase {
                self.flags[action.index()].store(true, Ordering::Release);
                self.raised.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Atomically clear and collect all raised flags.
    ///
    /// The set is ordered by trigger phase, not by hit order, so a catch-up
    /// that wraps past phase 0 runs `ScanWindowStart` before later-phase
    /// actions raised in the previous cycle. Servicing at least once per
    /// cycle keeps that from mattering.
    pub fn drain(&self) -> ActionSet {
        let mut set = ActionSet::default();
        for &(_, action) in &self.triggers {
            if self.flags[action.index()].swap(false, Ordering::AcqRel) {
                set.push(action);
            }
        }
        set
    }

    pub fn trigger_phase(&self, action: PhaseAction) -> u16 {
        self.triggers
            .iter()
            .find(|t| t.1 == action)
            .map(|t| t.0)
            .unwrap_or_default()
    }

    /// Total trigger hits since construction, including ones merged before a drain.
    pub fn raised_count(&self) -> u32 {
        self.raised.load(Ordering::Relaxed)
    }
}
