//! Configuration types for the sorting runtime.
//!
//! These are the runtime configuration structs used by `SorterRuntime`.
//! They are separate from the TOML-deserialized config in `sorter_config`.

/// Encoder geometry.
#[derive(Debug, Clone)]
pub struct EncoderCfg {
    /// Encoder steps per conveyor repeat unit; the phase range.
    pub steps_per_cycle: u16,
}

impl Default for EncoderCfg {
    fn default() -> Self {
        Self {
            steps_per_cycle: 200,
        }
    }
}

/// Trigger phases inside one conveyor cycle. All must be `< steps_per_cycle`
/// and pairwise distinct.
#[derive(Debug, Clone)]
pub struct PhaseCfg {
    pub scan_start: u16,
    pub outlet_reset: u16,
    pub diameter_finalize: u16,
    pub outlet_commit: u16,
}

impl Default for PhaseCfg {
    fn default() -> Self {
        Self {
            scan_start: 0,
            outlet_reset: 100,
            diameter_finalize: 150,
            outlet_commit: 180,
        }
    }
}

/// Diameter scanner calibration.
#[derive(Debug, Clone)]
pub struct ScannerCfg {
    /// One weight per sensor channel; compensates for spear taper.
    pub weights: Vec<f32>,
    /// Corrected widths below this (in ticks) are ignored during fusion.
    pub min_valid_width: u16,
    /// Scan units per millimeter; queue and outlet ranges are in millimeters.
    pub units_per_mm: u16,
}

impl Default for ScannerCfg {
    fn default() -> Self {
        Self {
            weights: vec![1.0, 1.05, 1.1, 1.2],
            min_valid_width: 4,
            units_per_mm: 2,
        }
    }
}

/// Transport queue geometry.
#[derive(Debug, Clone)]
pub struct QueueCfg {
    /// Number of conveyor steps tracked between the scanner and the last outlet.
    pub length: usize,
}

impl Default for QueueCfg {
    fn default() -> Self {
        Self { length: 19 }
    }
}

/// One outlet: diameter range `(min_mm, max_mm]`, 1-based divergence offset
/// and servo angles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutletCfg {
    pub min_mm: u16,
    pub max_mm: u16,
    pub offset: usize,
    pub closed_angle: u8,
    pub open_angle: u8,
}

/// Decision parameters shared by all outlets.
#[derive(Debug, Clone)]
pub struct AssignmentCfg {
    /// Outlet 0 opens when the newest reading saw more crossings than this.
    pub rescan_threshold: u8,
}

impl Default for AssignmentCfg {
    fn default() -> Self {
        Self {
            rescan_threshold: 1,
        }
    }
}

/// Everything `SorterRuntime` needs besides its devices.
#[derive(Debug, Clone, Default)]
pub struct SorterCfg {
    pub encoder: EncoderCfg,
    pub phases: PhaseCfg,
    pub scanner: ScannerCfg,
    pub queue: QueueCfg,
    pub outlets: Vec<OutletCfg>,
    pub assignment: AssignmentCfg,
}
