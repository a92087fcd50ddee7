#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas, the persisted outlet-table image and sensor weight CSV parsing.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - The outlet table can also come from a persisted byte image guarded by a
//!   magic marker; anything that does not decode falls back to the defaults.
//! - Sensor calibration weights may be supplied as a strict two-column CSV.
use serde::Deserialize;

pub mod image;

pub use image::{IMAGE_MAGIC, decode_outlet_image, default_outlets, encode_outlet_image};

/// One outlet as configured: diameter range `(min_mm, max_mm]`, 1-based
/// divergence offset into the transport queue, and servo angles.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct OutletRecord {
    pub min_mm: u8,
    pub max_mm: u8,
    pub offset: u8,
    #[serde(default)]
    pub closed_angle: u8,
    #[serde(default = "default_open_angle")]
    pub open_angle: u8,
}

fn default_open_angle() -> u8 {
    90
}

/// Sensor weight CSV schema.
///
/// Expected headers:
/// channel,weight
///
/// Example:
/// channel,weight
/// 0,1.0
/// 1,1.05
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct WeightRow {
    pub channel: usize,
    pub weight: f32,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EncoderCfg {
    /// Encoder steps per conveyor repeat unit (one tray).
    pub steps_per_cycle: u16,
}

impl Default for EncoderCfg {
    fn default() -> Self {
        Self {
            steps_per_cycle: 200,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PhasesCfg {
    pub scan_start: u16,
    pub outlet_reset: u16,
    pub diameter_finalize: u16,
    pub outlet_commit: u16,
}

impl Default for PhasesCfg {
    fn default() -> Self {
        Self {
            scan_start: 0,
            outlet_reset: 100,
            diameter_finalize: 150,
            outlet_commit: 180,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ScannerCfg {
    /// Per-sensor calibration weights, one per channel.
    pub weights: Vec<f32>,
    /// Corrected widths below this many ticks are ignored.
    pub min_valid_width: u16,
    /// Scan units per millimeter (the reference board measures in half millimeters).
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

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct QueueCfg {
    pub length: usize,
}

impl Default for QueueCfg {
    fn default() -> Self {
        Self { length: 19 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AssignmentCfg {
    /// Outlet 0 opens when a slot-0 reading saw more crossings than this.
    pub rescan_threshold: u8,
}

impl Default for AssignmentCfg {
    fn default() -> Self {
        Self {
            rescan_threshold: 1,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct StoreCfg {
    /// File holding the persisted outlet image.
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Pins {
    pub encoder_a: Option<u8>,
    pub encoder_b: Option<u8>,
    pub encoder_index: Option<u8>,
    pub sensors: Vec<u8>,
    /// Sensors pull their line low while an object is present.
    pub sensors_active_low: bool,
    pub outlets: Vec<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SimulationCfg {
    /// Encoder steps per second delivered by the simulated conveyor.
    pub step_hz: u32,
    /// Drop one quadrature edge every N cycles (0 disables).
    pub slip_every_cycles: u32,
    /// Send a second object through the scan window every N cycles (0 disables).
    pub double_every_cycles: u32,
    pub spear_min_mm: u8,
    pub spear_max_mm: u8,
    pub seed: u32,
}

impl Default for SimulationCfg {
    fn default() -> Self {
        Self {
            step_hz: 2000,
            slip_every_cycles: 0,
            double_every_cycles: 0,
            spear_min_mm: 10,
            spear_max_mm: 26,
            seed: 7,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub encoder: EncoderCfg,
    pub phases: PhasesCfg,
    pub scanner: ScannerCfg,
    pub queue: QueueCfg,
    pub assignment: AssignmentCfg,
    /// Explicit outlet table; when empty the persisted store or defaults apply.
    pub outlets: Vec<OutletRecord>,
    pub store: StoreCfg,
    pub pins: Pins,
    pub simulation: SimulationCfg,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Resolve the outlet table: explicit TOML table first, then the persisted
/// image, then the documented defaults. Returns the table and where it came from.
pub fn resolve_outlets(cfg: &Config, stored_image: Option<&[u8]>) -> (Vec<OutletRecord>, OutletSource) {
    if !cfg.outlets.is_empty() {
        return (cfg.outlets.clone(), OutletSource::Config);
    }
    // A stored table must also fit the current queue; otherwise defaults apply.
    if let Some(table) = stored_image.and_then(decode_outlet_image) {
        if validate_outlets(&table, cfg.queue.length).is_ok() {
            return (table, OutletSource::Store);
        }
    }
    (default_outlets(), OutletSource::Defaults)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutletSource {
    Config,
    Store,
    Defaults,
}

impl OutletSource {
    pub fn as_str(self) -> &'static str {
        match self {
            OutletSource::Config => "config",
            OutletSource::Store => "store",
            OutletSource::Defaults => "defaults",
        }
    }
}

/// Validate an outlet table against a queue length.
pub fn validate_outlets(outlets: &[OutletRecord], queue_length: usize) -> eyre::Result<()> {
    if outlets.is_empty() {
        eyre::bail!("outlets must contain at least one entry");
    }
    if outlets.len() > image::MAX_OUTLETS {
        eyre::bail!("at most {} outlets are supported", image::MAX_OUTLETS);
    }
    for (i, o) in outlets.iter().enumerate() {
        if o.min_mm >= o.max_mm {
            eyre::bail!("outlets[{i}]: min_mm must be < max_mm");
        }
        if o.offset == 0 || usize::from(o.offset) > queue_length {
            eyre::bail!("outlets[{i}]: offset must be in [1, {queue_length}]");
        }
        if o.open_angle > 180 || o.closed_angle > 180 {
            eyre::bail!("outlets[{i}]: angles must be <= 180");
        }
    }
    Ok(())
}

pub fn load_weights_csv(path: &std::path::Path) -> eyre::Result<Vec<f32>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open weights CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["channel", "weight"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "weights CSV must have headers 'channel,weight', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<WeightRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => eyre::bail!("invalid CSV row {}: {}", idx + 2, e),
        }
    }
    weights_from_rows(&rows)
}

/// Order rows by channel; channels must be exactly `0..n` with no gaps or repeats.
pub fn weights_from_rows(rows: &[WeightRow]) -> eyre::Result<Vec<f32>> {
    if rows.is_empty() {
        eyre::bail!("weights CSV contains no rows");
    }
    let mut out = vec![None; rows.len()];
    for row in rows {
        let slot = out
            .get_mut(row.channel)
            .ok_or_else(|| eyre::eyre!("channel {} out of range 0..{}", row.channel, rows.len()))?;
        if slot.is_some() {
            eyre::bail!("duplicate weight for channel {}", row.channel);
        }
        if !(row.weight.is_finite() && row.weight > 0.0) {
            eyre::bail!("weight for channel {} must be a positive number", row.channel);
        }
        *slot = Some(row.weight);
    }
    Ok(out.into_iter().flatten().collect())
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Encoder
        let steps = self.encoder.steps_per_cycle;
        if steps < 4 {
            eyre::bail!("encoder.steps_per_cycle must be >= 4");
        }

        // Phases
        let phases = [
            ("scan_start", self.phases.scan_start),
            ("outlet_reset", self.phases.outlet_reset),
            ("diameter_finalize", self.phases.diameter_finalize),
            ("outlet_commit", self.phases.outlet_commit),
        ];
        for (name, value) in phases {
            if value >= steps {
                eyre::bail!("phases.{name} must be < encoder.steps_per_cycle ({steps})");
            }
        }
        for i in 0..phases.len() {
            for j in (i + 1)..phases.len() {
                if phases[i].1 == phases[j].1 {
                    eyre::bail!(
                        "phases.{} and phases.{} must differ",
                        phases[i].0,
                        phases[j].0
                    );
                }
            }
        }

        // Scanner
        if self.scanner.weights.is_empty() || self.scanner.weights.len() > 8 {
            eyre::bail!("scanner.weights must have 1..=8 entries");
        }
        if self
            .scanner
            .weights
            .iter()
            .any(|w| !(w.is_finite() && *w > 0.0))
        {
            eyre::bail!("scanner.weights must be positive finite numbers");
        }
        if self.scanner.units_per_mm == 0 {
            eyre::bail!("scanner.units_per_mm must be >= 1");
        }

        // Queue
        if !(2..=64).contains(&self.queue.length) {
            eyre::bail!("queue.length must be in [2, 64]");
        }

        // Outlets (only when given explicitly; stored/default tables are checked at resolve time)
        if !self.outlets.is_empty() {
            validate_outlets(&self.outlets, self.queue.length)?;
        }

        // Pins
        if !self.pins.sensors.is_empty() && self.pins.sensors.len() != self.scanner.weights.len() {
            eyre::bail!("pins.sensors must list one pin per scanner weight");
        }

        // Simulation
        if self.simulation.step_hz == 0 {
            eyre::bail!("simulation.step_hz must be > 0");
        }
        if self.simulation.spear_min_mm > self.simulation.spear_max_mm {
            eyre::bail!("simulation.spear_min_mm must be <= spear_max_mm");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        Ok(())
    }
}
