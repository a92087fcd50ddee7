//! Simulated conveyor, sensor bank and outlet actuator.
//!
//! The conveyor and the sensor bank share a physical position counter, so the
//! sensors see spears where the belt really is even when the conveyor drops
//! an encoder edge (slip).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sorter_traits::{Channel, EdgeSource, EncoderEdge, HwResult, OutletActuator, SensorBank};

use crate::error::HwError;
use crate::util::MAX_ANGLE;

/// Quadrature level generator.
///
/// Forward rotation walks `00 → 10 → 11 → 01 → 00` (A leads B).
#[derive(Debug, Clone, Copy, Default)]
pub struct Quadrature {
    a: bool,
    b: bool,
}

impl Quadrature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forward(&mut self) -> EncoderEdge {
        let channel = if self.a == self.b {
            self.a = !self.a;
            Channel::A
        } else {
            self.b = !self.b;
            Channel::B
        };
        self.edge(channel)
    }

    pub fn reverse(&mut self) -> EncoderEdge {
        let channel = if self.a == self.b {
            self.b = !self.b;
            Channel::B
        } else {
            self.a = !self.a;
            Channel::A
        };
        self.edge(channel)
    }

    pub fn levels(&self) -> (bool, bool) {
        (self.a, self.b)
    }

    fn edge(&self, channel: Channel) -> EncoderEdge {
        EncoderEdge::Quadrature {
            channel,
            level_a: self.a,
            level_b: self.b,
        }
    }
}

/// Physical belt position in encoder steps, shared by conveyor and sensors.
#[derive(Debug, Clone, Default)]
pub struct ConveyorPosition(Arc<AtomicU64>);

impl ConveyorPosition {
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// Belt with a quadrature encoder and one index pulse per cycle.
#[derive(Debug)]
pub struct SimulatedConveyor {
    quad: Quadrature,
    position: ConveyorPosition,
    steps_per_cycle: u64,
    slip_every_cycles: u64,
    index_pending: bool,
    slips: u64,
}

impl SimulatedConveyor {
    pub fn new(steps_per_cycle: u16) -> Self {
        Self {
            quad: Quadrature::new(),
            position: ConveyorPosition::default(),
            steps_per_cycle: u64::from(steps_per_cycle.max(1)),
            slip_every_cycles: 0,
            index_pending: false,
            slips: 0,
        }
    }

    /// Lose one quadrature edge in the middle of every `cycles`-th cycle
    /// (0 disables).
    pub fn with_slip_every(mut self, cycles: u32) -> Self {
        self.slip_every_cycles = u64::from(cycles);
        self
    }

    pub fn position(&self) -> ConveyorPosition {
        self.position.clone()
    }

    /// Edges lost to slip so far.
    pub fn slips(&self) -> u64 {
        self.slips
    }

    /// Produce the next edge. The index pulse follows the edge that completes
    /// a cycle.
    pub fn step(&mut self) -> EncoderEdge {
        if self.index_pending {
            self.index_pending = false;
            return EncoderEdge::Index;
        }
        let pos = self.position.get();
        let cycle = pos / self.steps_per_cycle;
        let in_cycle = pos % self.steps_per_cycle;
        if self.slip_every_cycles > 0
            && cycle % self.slip_every_cycles == self.slip_every_cycles - 1
            && in_cycle == self.steps_per_cycle / 2
        {
            // The belt moves but the edge never reaches the controller.
            let _ = self.quad.forward();
            self.position.advance();
            self.slips += 1;
            tracing::trace!(cycle, "encoder edge dropped");
        }
        let edge = self.quad.forward();
        if self.position.advance() % self.steps_per_cycle == 0 {
            self.index_pending = true;
        }
        edge
    }
}

impl EdgeSource for SimulatedConveyor {
    fn next_edge(&mut self, _timeout: Duration) -> HwResult<Option<EncoderEdge>> {
        Ok(Some(self.step()))
    }
}

/// Deterministic 64-bit mix (splitmix64 finalizer).
fn mix(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// Presence sensors watching the belt. Every tray carries one spear whose
/// diameter is drawn per cycle from a seeded sequence; each sensor sees it
/// for `diameter * units_per_mm / weight` steps, centred in the scan window.
#[derive(Debug, Clone)]
pub struct SimulatedSensorBank {
    position: ConveyorPosition,
    steps_per_cycle: u64,
    weights: Vec<f32>,
    units_per_mm: u16,
    min_mm: u8,
    max_mm: u8,
    seed: u64,
    center: u64,
    double_every_cycles: u64,
}

impl SimulatedSensorBank {
    pub fn new(
        position: ConveyorPosition,
        steps_per_cycle: u16,
        weights: Vec<f32>,
        units_per_mm: u16,
    ) -> Self {
        let steps = u64::from(steps_per_cycle.max(1));
        Self {
            position,
            steps_per_cycle: steps,
            weights,
            units_per_mm: units_per_mm.max(1),
            min_mm: 10,
            max_mm: 26,
            seed: 7,
            center: steps * 3 / 8,
            double_every_cycles: 0,
        }
    }

    pub fn with_diameters(mut self, min_mm: u8, max_mm: u8, seed: u32) -> Self {
        self.min_mm = min_mm.min(max_mm);
        self.max_mm = max_mm.max(min_mm);
        self.seed = u64::from(seed);
        self
    }

    /// Phase at which spears are centred.
    pub fn with_center(mut self, phase: u16) -> Self {
        self.center = u64::from(phase);
        self
    }

    /// Send a second, smallest-size object through the window every
    /// `cycles`-th cycle (0 disables).
    pub fn with_double_every(mut self, cycles: u32) -> Self {
        self.double_every_cycles = u64::from(cycles);
        self
    }

    /// True diameter of the spear riding in tray `cycle`.
    pub fn diameter_mm(&self, cycle: u64) -> u8 {
        let span = u64::from(self.max_mm - self.min_mm) + 1;
        self.min_mm + (mix(self.seed.rotate_left(32) ^ cycle) % span) as u8
    }

    /// Whether tray `cycle` carries a second object.
    pub fn is_double(&self, cycle: u64) -> bool {
        self.double_every_cycles > 0 && cycle % self.double_every_cycles == self.double_every_cycles - 1
    }

    /// Steps channel `ch` stays occluded by an object of `d_mm`.
    pub fn width_ticks(&self, d_mm: u8, ch: usize) -> u64 {
        let w = self.weights.get(ch).copied().unwrap_or(1.0);
        let nominal = f32::from(d_mm) * f32::from(self.units_per_mm);
        ((nominal / w).round() as u64).max(1)
    }

    fn occluded(&self, phase: u64, center: u64, d_mm: u8, ch: usize) -> bool {
        let w = self.width_ticks(d_mm, ch);
        let start = center.saturating_sub(w / 2);
        phase >= start && phase < start + w
    }
}

impl SensorBank for SimulatedSensorBank {
    fn channels(&self) -> usize {
        self.weights.len()
    }

    fn read_presence(&mut self, out: &mut [bool]) -> HwResult<()> {
        let pos = self.position.get();
        let cycle = pos / self.steps_per_cycle;
        let phase = pos % self.steps_per_cycle;
        let d = self.diameter_mm(cycle);
        let double = self.is_double(cycle);
        // The second object trails the spear by a quarter cycle.
        let second_center = self.center + self.steps_per_cycle / 4;
        for (ch, slot) in out.iter_mut().enumerate() {
            *slot = self.occluded(phase, self.center, d, ch)
                || (double && self.occluded(phase, second_center, self.min_mm, ch));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ActuatorState {
    angles: Vec<u8>,
    moves: Vec<u64>,
    commands: u64,
}

/// Outlet servos that only remember their last commanded angle.
/// Clones share state, so a handle can be kept for reporting.
#[derive(Debug, Clone)]
pub struct SimulatedActuator {
    state: Arc<Mutex<ActuatorState>>,
}

impl SimulatedActuator {
    pub fn new(outlets: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(ActuatorState {
                angles: vec![0; outlets],
                moves: vec![0; outlets],
                commands: 0,
            })),
        }
    }

    pub fn angles(&self) -> Vec<u8> {
        self.state.lock().map(|s| s.angles.clone()).unwrap_or_default()
    }

    /// Commands that changed each outlet's angle.
    pub fn moves(&self) -> Vec<u64> {
        self.state.lock().map(|s| s.moves.clone()).unwrap_or_default()
    }

    pub fn commands(&self) -> u64 {
        self.state.lock().map(|s| s.commands).unwrap_or(0)
    }
}

impl OutletActuator for SimulatedActuator {
    fn set_outlet_angle(&mut self, outlet: usize, angle: u8) -> HwResult<()> {
        if angle > MAX_ANGLE {
            return Err(Box::new(HwError::AngleOutOfRange(angle)));
        }
        let mut s = self
            .state
            .lock()
            .map_err(|_| HwError::Gpio("actuator state poisoned".into()))?;
        s.commands += 1;
        let ActuatorState { angles, moves, .. } = &mut *s;
        let (Some(cur), Some(n)) = (angles.get_mut(outlet), moves.get_mut(outlet)) else {
            return Err(Box::new(HwError::UnknownOutlet(outlet)));
        };
        if *cur != angle {
            *cur = angle;
            *n += 1;
            tracing::trace!(outlet, angle, "outlet moved (simulated)");
        }
        Ok(())
    }
}
