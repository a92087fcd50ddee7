//! `From` implementations bridging `sorter_config` types to `sorter_core` types.

use crate::config::{
    AssignmentCfg, EncoderCfg, OutletCfg, PhaseCfg, QueueCfg, ScannerCfg, SorterCfg,
};

// ── EncoderCfg ───────────────────────────────────────────────────────────────

impl From<&sorter_config::EncoderCfg> for EncoderCfg {
    fn from(c: &sorter_config::EncoderCfg) -> Self {
        Self {
            steps_per_cycle: c.steps_per_cycle,
        }
    }
}

// ── PhaseCfg ─────────────────────────────────────────────────────────────────

impl From<&sorter_config::PhasesCfg> for PhaseCfg {
    fn from(c: &sorter_config::PhasesCfg) -> Self {
        Self {
            scan_start: c.scan_start,
            outlet_reset: c.outlet_reset,
            diameter_finalize: c.diameter_finalize,
            outlet_commit: c.outlet_commit,
        }
    }
}

// ── ScannerCfg ───────────────────────────────────────────────────────────────

impl From<&sorter_config::ScannerCfg> for ScannerCfg {
    fn from(c: &sorter_config::ScannerCfg) -> Self {
        Self {
            weights: c.weights.clone(),
            min_valid_width: c.min_valid_width,
            units_per_mm: c.units_per_mm,
        }
    }
}

// ── QueueCfg / AssignmentCfg ─────────────────────────────────────────────────

impl From<&sorter_config::QueueCfg> for QueueCfg {
    fn from(c: &sorter_config::QueueCfg) -> Self {
        Self { length: c.length }
    }
}

impl From<&sorter_config::AssignmentCfg> for AssignmentCfg {
    fn from(c: &sorter_config::AssignmentCfg) -> Self {
        Self {
            rescan_threshold: c.rescan_threshold,
        }
    }
}

// ── OutletCfg ────────────────────────────────────────────────────────────────

impl From<&sorter_config::OutletRecord> for OutletCfg {
    fn from(o: &sorter_config::OutletRecord) -> Self {
        Self {
            min_mm: u16::from(o.min_mm),
            max_mm: u16::from(o.max_mm),
            offset: usize::from(o.offset),
            closed_angle: o.closed_angle,
            open_angle: o.open_angle,
        }
    }
}

impl From<sorter_config::OutletRecord> for OutletCfg {
    fn from(o: sorter_config::OutletRecord) -> Self {
        Self::from(&o)
    }
}

// ── SorterCfg ────────────────────────────────────────────────────────────────

impl SorterCfg {
    /// Runtime configuration from a validated file config and the outlet table
    /// chosen by `sorter_config::resolve_outlets`.
    pub fn from_config(cfg: &sorter_config::Config, outlets: &[sorter_config::OutletRecord]) -> Self {
        Self {
            encoder: (&cfg.encoder).into(),
            phases: (&cfg.phases).into(),
            scanner: (&cfg.scanner).into(),
            queue: (&cfg.queue).into(),
            outlets: outlets.iter().map(OutletCfg::from).collect(),
            assignment: (&cfg.assignment).into(),
        }
    }
}
