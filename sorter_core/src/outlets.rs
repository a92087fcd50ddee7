//! Outlet open/close decisions.
//!
//! Each outlet looks at exactly one transport-queue slot (its divergence
//! point) and compares the reading there against its own range; no outlet
//! knows about any other. Outlet 0 is the reject lane and only checks the
//! newest reading's crossing count.

use crate::config::{AssignmentCfg, OutletCfg};
use crate::queue::{Reading, TransportQueue};

#[derive(Debug, Clone)]
struct OutletSlot {
    cfg: OutletCfg,
    staged_open: bool,
}

#[derive(Debug, Clone)]
pub struct OutletAssignment {
    outlets: Vec<OutletSlot>,
    /// Grading outlet with the greatest lower bound; its upper bound is ignored.
    topmost: Option<usize>,
    rescan_threshold: u8,
}

impl OutletAssignment {
    pub fn new(outlets: Vec<OutletCfg>, cfg: &AssignmentCfg) -> Self {
        let topmost = outlets
            .iter()
            .enumerate()
            .skip(1)
            .max_by_key(|(_, o)| o.min_mm)
            .map(|(i, _)| i);
        Self {
            outlets: outlets
                .into_iter()
                .map(|cfg| OutletSlot {
                    cfg,
                    staged_open: false,
                })
                .collect(),
            topmost,
            rescan_threshold: cfg.rescan_threshold,
        }
    }

    pub fn len(&self) -> usize {
        self.outlets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outlets.is_empty()
    }

    pub fn topmost(&self) -> Option<usize> {
        self.topmost
    }

    /// Queue index watched by `outlet`; `None` for an unknown outlet.
    pub fn watched_slot(&self, outlet: usize) -> Option<usize> {
        match outlet {
            0 if !self.outlets.is_empty() => Some(0),
            _ => self
                .outlets
                .get(outlet)
                .map(|o| o.cfg.offset.saturating_sub(1)),
        }
    }

    /// The reading `outlet` currently sees.
    pub fn watched_reading(&self, outlet: usize, queue: &TransportQueue) -> Option<Reading> {
        self.watched_slot(outlet).and_then(|slot| queue.get(slot))
    }

    /// Decide one outlet against the queue without staging it.
    pub fn decide(&self, outlet: usize, queue: &TransportQueue) -> bool {
        let Some(slot) = self.outlets.get(outlet) else {
            return false;
        };
        let Some(reading) = self.watched_reading(outlet, queue) else {
            return false;
        };
        if outlet == 0 {
            return reading.crossings > self.rescan_threshold;
        }
        let d = reading.diameter_mm;
        d > slot.cfg.min_mm && (self.topmost == Some(outlet) || d <= slot.cfg.max_mm)
    }

    /// Re-stage every outlet from the queue. Returns how many will open.
    pub fn evaluate(&mut self, queue: &TransportQueue) -> usize {
        for i in 0..self.outlets.len() {
            let open = self.decide(i, queue);
            self.outlets[i].staged_open = open;
        }
        self.outlets.iter().filter(|o| o.staged_open).count()
    }

    /// Staged state of `outlet`; `None` for an unknown outlet.
    pub fn staged(&self, outlet: usize) -> Option<bool> {
        self.outlets.get(outlet).map(|o| o.staged_open)
    }

    /// Servo angle matching the staged state.
    pub fn staged_angle(&self, outlet: usize) -> Option<u8> {
        self.outlets.get(outlet).map(|o| {
            if o.staged_open {
                o.cfg.open_angle
            } else {
                o.cfg.closed_angle
            }
        })
    }

    pub fn closed_angle(&self, outlet: usize) -> Option<u8> {
        self.outlets.get(outlet).map(|o| o.cfg.closed_angle)
    }

    pub fn config(&self, outlet: usize) -> Option<&OutletCfg> {
        self.outlets.get(outlet).map(|o| &o.cfg)
    }

    pub fn clear_staging(&mut self) {
        self.outlets.iter_mut().for_each(|o| o.staged_open = false);
    }
}
