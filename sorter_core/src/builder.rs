//! Type-state builder for `Sorter` and generic `build_sorter` constructor.
//!
//! The builder enforces at compile time that a sensor bank and an outlet
//! actuator are provided before `build()` is available. `try_build()` is
//! always available for dynamic checks.

use std::marker::PhantomData;
use std::sync::Arc;

use crossbeam_channel as xch;
use sorter_traits::{OutletActuator, SensorBank};

use crate::config::*;
use crate::error::{BuildError, Result};
use crate::isr::IsrShared;
use crate::outlets::OutletAssignment;
use crate::queue::TransportQueue;
use crate::runtime::{RuntimeState, SortEvent, SorterRuntime};
use crate::scanner::DiameterScanner;

/// Dynamically dispatched runtime, as produced by [`SorterBuilder`].
pub type Sorter = SorterRuntime<Box<dyn SensorBank>, Box<dyn OutletActuator>>;

impl Sorter {
    /// Start building a Sorter.
    pub fn builder() -> SorterBuilder<Missing, Missing> {
        SorterBuilder::default()
    }
}

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Builder for `Sorter`. All fields are validated on `build()`.
pub struct SorterBuilder<S, A> {
    sensors: Option<Box<dyn SensorBank>>,
    actuator: Option<Box<dyn OutletActuator>>,
    cfg: SorterCfg,
    events: Option<xch::Sender<SortEvent>>,
    _s: PhantomData<S>,
    _a: PhantomData<A>,
}

impl Default for SorterBuilder<Missing, Missing> {
    fn default() -> Self {
        Self {
            sensors: None,
            actuator: None,
            cfg: SorterCfg::default(),
            events: None,
            _s: PhantomData,
            _a: PhantomData,
        }
    }
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

/// Validate configuration and construct a `SorterRuntime`.
///
/// Single source of truth for validation, used by both
/// `SorterBuilder::try_build()` and `build_sorter()`.
fn validate_and_build<B: SensorBank, A: OutletActuator>(
    sensors: B,
    actuator: A,
    cfg: SorterCfg,
    events: Option<xch::Sender<SortEvent>>,
) -> Result<SorterRuntime<B, A>> {
    // ── Validation ───────────────────────────────────────────────────────────
    let steps = cfg.encoder.steps_per_cycle;
    if steps < 4 {
        return Err(invalid("steps_per_cycle must be >= 4"));
    }
    let p = &cfg.phases;
    let phases = [p.scan_start, p.outlet_reset, p.diameter_finalize, p.outlet_commit];
    if phases.iter().any(|&ph| ph >= steps) {
        return Err(invalid("trigger phases must be < steps_per_cycle"));
    }
    for (i, a) in phases.iter().enumerate() {
        if phases[i + 1..].contains(a) {
            return Err(invalid("trigger phases must be pairwise distinct"));
        }
    }
    if cfg.scanner.weights.is_empty() {
        return Err(invalid("at least one sensor weight is required"));
    }
    if cfg
        .scanner
        .weights
        .iter()
        .any(|w| !w.is_finite() || *w <= 0.0)
    {
        return Err(invalid("sensor weights must be finite and > 0"));
    }
    if sensors.channels() != cfg.scanner.weights.len() {
        return Err(eyre::Report::new(BuildError::ChannelMismatch {
            bank: sensors.channels(),
            weights: cfg.scanner.weights.len(),
        }));
    }
    if cfg.scanner.units_per_mm == 0 {
        return Err(invalid("units_per_mm must be >= 1"));
    }
    if cfg.queue.length < 2 {
        return Err(invalid("queue length must be >= 2"));
    }
    if cfg.outlets.is_empty() {
        return Err(eyre::Report::new(BuildError::MissingOutlets));
    }
    for o in &cfg.outlets {
        if o.offset == 0 || o.offset > cfg.queue.length {
            return Err(invalid("outlet offset must be within 1..=queue length"));
        }
        if o.min_mm >= o.max_mm {
            return Err(invalid("outlet min_mm must be < max_mm"));
        }
    }

    // ── Construct ────────────────────────────────────────────────────────────
    let channels = cfg.scanner.weights.len();
    Ok(SorterRuntime {
        isr: Arc::new(IsrShared::new(steps, &cfg.phases)),
        scanner: DiameterScanner::new(&cfg.scanner),
        queue: TransportQueue::new(cfg.queue.length),
        assignment: OutletAssignment::new(cfg.outlets, &cfg.assignment),
        sensors,
        actuator,
        state: RuntimeState::Idle,
        presence: vec![false; channels],
        units_per_mm: cfg.scanner.units_per_mm,
        // One full cycle; anything beyond that cannot be attributed to a phase.
        max_catchup_ticks: u32::from(steps),
        events,
        cycles: 0,
        sensor_faults: 0,
        actuator_faults: 0,
        overrun_ticks: 0,
        aged_out: 0,
        dropped_events: 0,
    })
}

impl<S, A> SorterBuilder<S, A> {
    /// Fallible build available in any type-state; returns detailed error for missing pieces.
    pub fn try_build(self) -> Result<Sorter> {
        let sensors = self
            .sensors
            .ok_or_else(|| invalid("sensor bank is required"))?;
        let actuator = self
            .actuator
            .ok_or_else(|| invalid("outlet actuator is required"))?;
        validate_and_build(sensors, actuator, self.cfg, self.events)
    }
}

/// Chainable setters that do not affect type-state.
impl<S, A> SorterBuilder<S, A> {
    pub fn with_config(mut self, cfg: SorterCfg) -> Self {
        self.cfg = cfg;
        self
    }
    pub fn with_encoder(mut self, encoder: EncoderCfg) -> Self {
        self.cfg.encoder = encoder;
        self
    }
    pub fn with_phases(mut self, phases: PhaseCfg) -> Self {
        self.cfg.phases = phases;
        self
    }
    pub fn with_scanner(mut self, scanner: ScannerCfg) -> Self {
        self.cfg.scanner = scanner;
        self
    }
    pub fn with_queue(mut self, queue: QueueCfg) -> Self {
        self.cfg.queue = queue;
        self
    }
    pub fn with_outlets(mut self, outlets: Vec<OutletCfg>) -> Self {
        self.cfg.outlets = outlets;
        self
    }
    pub fn with_assignment(mut self, assignment: AssignmentCfg) -> Self {
        self.cfg.assignment = assignment;
        self
    }
    /// Publish a [`SortEvent`] for every outlet opening. Uses `try_send`;
    /// events that do not fit a bounded channel are counted and dropped.
    pub fn with_event_tap(mut self, tx: xch::Sender<SortEvent>) -> Self {
        self.events = Some(tx);
        self
    }
}

// Setters that advance type-state
impl<A> SorterBuilder<Missing, A> {
    pub fn with_sensors(self, sensors: impl SensorBank + 'static) -> SorterBuilder<Set, A> {
        SorterBuilder {
            sensors: Some(Box::new(sensors)),
            actuator: self.actuator,
            cfg: self.cfg,
            events: self.events,
            _s: PhantomData,
            _a: PhantomData,
        }
    }
}

impl<S> SorterBuilder<S, Missing> {
    pub fn with_actuator(
        self,
        actuator: impl OutletActuator + 'static,
    ) -> SorterBuilder<S, Set> {
        SorterBuilder {
            sensors: self.sensors,
            actuator: Some(Box::new(actuator)),
            cfg: self.cfg,
            events: self.events,
            _s: PhantomData,
            _a: PhantomData,
        }
    }
}

impl SorterBuilder<Set, Set> {
    /// Validate and build the Sorter. Only available when sensors and actuator are set.
    pub fn build(self) -> Result<Sorter> {
        self.try_build()
    }
}

/// Build a statically dispatched runtime from concrete devices.
///
/// Delegates to the shared `validate_and_build`.
pub fn build_sorter<B, A>(
    sensors: B,
    actuator: A,
    cfg: SorterCfg,
    events: Option<xch::Sender<SortEvent>>,
) -> Result<SorterRuntime<B, A>>
where
    B: SensorBank,
    A: OutletActuator,
{
    validate_and_build(sensors, actuator, cfg, events)
}
