//! The sorter's main-loop half (`SorterRuntime`).
//!
//! Owns the scanner, the transport queue, the outlet assignment and the
//! device handles. Interrupt handlers only ever see the `IsrShared` atomics;
//! `service()` drains what they recorded and performs the scheduled actions.

use std::sync::Arc;

use crossbeam_channel as xch;
use sorter_traits::{OutletActuator, SensorBank, StatusDisplay};

use crate::hw_error::map_hw_error;
use crate::isr::{IsrHandle, IsrShared};
use crate::outlets::OutletAssignment;
use crate::queue::{Reading, TransportQueue};
use crate::scanner::DiameterScanner;
use crate::scheduler::{ActionSet, PhaseAction};
use crate::util::div_round_nearest_u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    /// Built but not yet servicing flags.
    Idle,
    /// Flags are serviced on every `service()` call.
    Armed,
}

/// What one `service()` call did.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceReport {
    /// Encoder ticks sampled by the scanner.
    pub ticks: u32,
    /// Scheduler actions performed, in the order they ran.
    pub actions: ActionSet,
    /// Reading written to slot 0 by a diameter-finalize action.
    pub pushed: Option<Reading>,
    /// Outlets driven open by an outlet-commit action.
    pub opened: usize,
}

impl ServiceReport {
    pub fn is_idle(&self) -> bool {
        self.ticks == 0 && self.actions.is_empty()
    }
}

/// Published when an outlet is driven open for a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortEvent {
    /// Conveyor steps completed when the outlet opened.
    pub cycle: u64,
    pub outlet: usize,
    pub reading: Reading,
}

/// Read-only snapshot for diagnostics and UI polling.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    pub state: RuntimeState,
    pub phase: u16,
    pub raw_count: i32,
    pub cycles: u64,
    pub zero_crossings: u32,
    pub drift_events: u32,
    pub last_drift_raw: i32,
    pub total_objects: u32,
    pub discarded: u32,
    pub raw_widths: Vec<u32>,
    pub corrected_widths: Vec<u32>,
    pub queue: Vec<Option<Reading>>,
    pub staged_open: Vec<bool>,
    pub sensor_faults: u32,
    pub actuator_faults: u32,
    pub overrun_ticks: u32,
    pub aged_out: u32,
    pub dropped_events: u32,
}

pub struct SorterRuntime<B: SensorBank, A: OutletActuator> {
    pub(crate) isr: Arc<IsrShared>,
    pub(crate) scanner: DiameterScanner,
    pub(crate) queue: TransportQueue,
    pub(crate) assignment: OutletAssignment,
    pub(crate) sensors: B,
    pub(crate) actuator: A,
    pub(crate) state: RuntimeState,
    pub(crate) presence: Vec<bool>,
    pub(crate) units_per_mm: u16,
    /// Most ticks sampled in one `service()`; the rest are counted as overrun.
    pub(crate) max_catchup_ticks: u32,
    pub(crate) events: Option<xch::Sender<SortEvent>>,
    pub(crate) cycles: u64,
    pub(crate) sensor_faults: u32,
    pub(crate) actuator_faults: u32,
    pub(crate) overrun_ticks: u32,
    pub(crate) aged_out: u32,
    pub(crate) dropped_events: u32,
}

impl<B: SensorBank, A: OutletActuator> core::fmt::Debug for SorterRuntime<B, A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SorterRuntime")
            .field("state", &self.state)
            .field("phase", &self.isr.encoder.phase())
            .field("cycles", &self.cycles)
            .field("outlets", &self.assignment.len())
            .finish()
    }
}

impl<B: SensorBank, A: OutletActuator> SorterRuntime<B, A> {
    /// Handle to register with the interrupt sources.
    pub fn isr_handle(&self) -> IsrHandle {
        IsrHandle::new(Arc::clone(&self.isr))
    }

    pub fn state(&self) -> RuntimeState {
        self.state
    }

    /// IDLE → ARMED. Discards ticks and flags recorded while idle, opens a
    /// fresh scan window and closes every outlet.
    pub fn arm(&mut self) {
        if self.state == RuntimeState::Armed {
            return;
        }
        let _ = self.isr.encoder.take_ticks();
        let _ = self.isr.encoder.take_changed();
        let _ = self.isr.scheduler.drain();
        self.scanner.start();
        self.assignment.clear_staging();
        self.reset_outlets();
        self.state = RuntimeState::Armed;
        tracing::info!(
            outlets = self.assignment.len(),
            queue_len = self.queue.len(),
            steps_per_cycle = self.isr.encoder.phase_range(),
            "sorter armed"
        );
    }

    /// One main-loop iteration: sample pending ticks, then run every raised
    /// scheduler action once. A no-op while idle.
    pub fn service(&mut self) -> ServiceReport {
        let mut report = ServiceReport::default();
        if self.state != RuntimeState::Armed {
            return report;
        }

        let ticks = self.isr.encoder.take_ticks();
        if ticks > 0 {
            report.ticks = ticks;
            self.sample_ticks(ticks);
        }

        let actions = self.isr.scheduler.drain();
        for action in actions.iter() {
            tracing::trace!(action = action.name(), "phase action");
            match action {
                PhaseAction::ScanWindowStart => self.scanner.start(),
                PhaseAction::DiameterFinalize => report.pushed = self.finalize_step(),
                PhaseAction::OutletReset => self.reset_outlets(),
                PhaseAction::OutletCommit => report.opened = self.commit_outlets(),
            }
        }
        report.actions = actions;
        report
    }

    fn sample_ticks(&mut self, ticks: u32) {
        if let Err(e) = self.sensors.read_presence(&mut self.presence) {
            self.sensor_faults = self.sensor_faults.wrapping_add(1);
            let err = map_hw_error(&*e);
            tracing::warn!(error = %err, ticks, "sensor read failed; ticks skipped");
            return;
        }
        let n = ticks.min(self.max_catchup_ticks);
        if ticks > n {
            self.overrun_ticks = self.overrun_ticks.wrapping_add(ticks - n);
            tracing::warn!(ticks, sampled = n, "main loop fell behind the encoder");
        }
        let phase = self.isr.encoder.phase();
        for _ in 0..n {
            if let Some(est) = self.scanner.sample(phase, &self.presence) {
                tracing::debug!(
                    diameter = est.diameter,
                    crossings = est.crossings,
                    valid = est.valid_channels,
                    "crossing measured"
                );
            }
        }
    }

    fn finalize_step(&mut self) -> Option<Reading> {
        self.cycles = self.cycles.wrapping_add(1);
        let pushed = self.scanner.take_estimate().map(|est| Reading {
            diameter_mm: div_round_nearest_u32(
                u32::from(est.diameter),
                u32::from(self.units_per_mm),
            )
            .min(u32::from(u16::MAX)) as u16,
            crossings: est.crossings,
        });
        let evicted = match pushed {
            Some(reading) => self.queue.push(reading),
            None => self.queue.shift_only(),
        };
        if evicted.is_some() {
            self.aged_out = self.aged_out.wrapping_add(1);
        }
        let opening = self.assignment.evaluate(&self.queue);
        tracing::debug!(
            cycle = self.cycles,
            diameter_mm = pushed.map(|r| r.diameter_mm),
            opening,
            "queue advanced"
        );
        pushed
    }

    fn reset_outlets(&mut self) {
        for outlet in 0..self.assignment.len() {
            if let Some(angle) = self.assignment.closed_angle(outlet) {
                self.command(outlet, angle);
            }
        }
    }

    fn commit_outlets(&mut self) -> usize {
        let mut opened = 0;
        for outlet in 0..self.assignment.len() {
            let Some(angle) = self.assignment.staged_angle(outlet) else {
                continue;
            };
            self.command(outlet, angle);
            if self.assignment.staged(outlet) == Some(true) {
                opened += 1;
                if let Some(reading) = self.assignment.watched_reading(outlet, &self.queue) {
                    self.publish(SortEvent {
                        cycle: self.cycles,
                        outlet,
                        reading,
                    });
                }
            }
        }
        opened
    }

    /// Fire-and-forget actuator command; failures are logged and counted.
    fn command(&mut self, outlet: usize, angle: u8) {
        if let Err(e) = self.actuator.set_outlet_angle(outlet, angle) {
            self.actuator_faults = self.actuator_faults.wrapping_add(1);
            let err = map_hw_error(&*e);
            tracing::warn!(error = %err, outlet, angle, "outlet command failed");
        }
    }

    fn publish(&mut self, event: SortEvent) {
        let Some(tx) = self.events.as_ref() else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(xch::TrySendError::Full(_)) => {
                self.dropped_events = self.dropped_events.wrapping_add(1);
            }
            Err(xch::TrySendError::Disconnected(_)) => {
                tracing::debug!("sort event consumer gone; tap disabled");
                self.events = None;
            }
        }
    }

    /// Close every outlet, e.g. before shutting down.
    pub fn close_all(&mut self) {
        self.assignment.clear_staging();
        self.reset_outlets();
    }

    pub fn phase(&self) -> u16 {
        self.isr.encoder.phase()
    }

    pub fn raw_count(&self) -> i32 {
        self.isr.encoder.raw_count()
    }

    /// Conveyor steps (diameter-finalize actions) performed.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn queue(&self) -> &TransportQueue {
        &self.queue
    }

    pub fn scanner(&self) -> &DiameterScanner {
        &self.scanner
    }

    pub fn assignment(&self) -> &OutletAssignment {
        &self.assignment
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn sensors_mut(&mut self) -> &mut B {
        &mut self.sensors
    }

    pub fn diagnostics(&self) -> Diagnostics {
        let enc = &self.isr.encoder;
        Diagnostics {
            state: self.state,
            phase: enc.phase(),
            raw_count: enc.raw_count(),
            cycles: self.cycles,
            zero_crossings: enc.zero_crossings(),
            drift_events: enc.drift_events(),
            last_drift_raw: enc.last_drift_raw(),
            total_objects: self.scanner.total_object_count(),
            discarded: self.scanner.discarded_count(),
            raw_widths: self.scanner.raw_widths(),
            corrected_widths: self.scanner.corrected_widths(),
            queue: self.queue.slots().collect(),
            staged_open: (0..self.assignment.len())
                .map(|i| self.assignment.staged(i).unwrap_or(false))
                .collect(),
            sensor_faults: self.sensor_faults,
            actuator_faults: self.actuator_faults,
            overrun_ticks: self.overrun_ticks,
            aged_out: self.aged_out,
            dropped_events: self.dropped_events,
        }
    }

    /// Push the current status to a display.
    pub fn report_status<D: StatusDisplay + ?Sized>(&self, display: &mut D) {
        let enc = &self.isr.encoder;
        display.show_position(enc.raw_count(), enc.phase());
        let slots: Vec<Option<(u16, u8)>> = self
            .queue
            .slots()
            .map(|s| s.map(|r| (r.diameter_mm, r.crossings)))
            .collect();
        display.show_queue(&slots);
        display.show_drift(
            enc.zero_crossings(),
            enc.drift_events(),
            enc.last_drift_raw(),
        );
    }
}
