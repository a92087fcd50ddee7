//! Runtime driven edge by edge with scripted sensor levels.
//!
//! A 20-step cycle: scan window opens at 0, outlets reset at 10, the diameter
//! is finalized at 15 and outlets commit at 18.

use crossbeam_channel as xch;
use sorter_core::mocks::{FailingActuator, RecordingActuator, ScriptedSensors};
use sorter_core::{
    AssignmentCfg, EncoderCfg, IsrHandle, OutletCfg, PhaseCfg, QueueCfg, Reading, RuntimeState,
    ScannerCfg, SortEvent, SorterCfg, SorterRuntime, build_sorter,
};
use sorter_hardware::Quadrature;
use sorter_traits::{HwResult, OutletActuator, SensorBank};

const STEPS: u16 = 20;

fn cfg() -> SorterCfg {
    let outlet = |min_mm, max_mm, offset| OutletCfg {
        min_mm,
        max_mm,
        offset,
        closed_angle: 0,
        open_angle: 90,
    };
    SorterCfg {
        encoder: EncoderCfg {
            steps_per_cycle: STEPS,
        },
        phases: PhaseCfg {
            scan_start: 0,
            outlet_reset: 10,
            diameter_finalize: 15,
            outlet_commit: 18,
        },
        scanner: ScannerCfg {
            weights: vec![1.0, 1.0],
            min_valid_width: 1,
            units_per_mm: 1,
        },
        queue: QueueCfg { length: 3 },
        outlets: vec![outlet(0, 255, 1), outlet(6, 255, 2), outlet(0, 6, 3)],
        assignment: AssignmentCfg {
            rescan_threshold: 1,
        },
    }
}

struct Rig<B: SensorBank, A: OutletActuator> {
    rt: SorterRuntime<B, A>,
    isr: IsrHandle,
    quad: Quadrature,
    count: u32,
}

impl<B: SensorBank, A: OutletActuator> Rig<B, A> {
    fn new(rt: SorterRuntime<B, A>) -> Self {
        let isr = rt.isr_handle();
        Self {
            rt,
            isr,
            quad: Quadrature::new(),
            count: 0,
        }
    }

    /// One forward edge, then one main-loop iteration.
    fn step(&mut self) {
        self.isr.dispatch(self.quad.forward());
        self.count += 1;
        self.rt.service();
    }

    fn phase(&self) -> u32 {
        self.count % u32::from(STEPS)
    }
}

/// Run one cycle; `present(phase)` gives the level of both channels.
fn run_cycle(
    rig: &mut Rig<ScriptedSensors, RecordingActuator>,
    sensors: &ScriptedSensors,
    present: impl Fn(u32) -> bool,
) {
    for _ in 0..STEPS {
        let next_phase = (rig.phase() + 1) % u32::from(STEPS);
        let on = present(next_phase);
        sensors.set(&[on, on]);
        rig.step();
    }
}

fn scripted(
    events: Option<xch::Sender<SortEvent>>,
) -> (
    Rig<ScriptedSensors, RecordingActuator>,
    ScriptedSensors,
    RecordingActuator,
) {
    let sensors = ScriptedSensors::new(2);
    let actuator = RecordingActuator::new();
    let rt = build_sorter(sensors.clone(), actuator.clone(), cfg(), events).unwrap();
    (Rig::new(rt), sensors, actuator)
}

#[test]
fn readings_reach_their_outlet_after_the_transport_delay() {
    let (tx, rx) = xch::unbounded();
    let (mut rig, sensors, actuator) = scripted(Some(tx));
    rig.rt.arm();
    assert_eq!(actuator.take(), vec![(0, 0), (1, 0), (2, 0)]);

    run_cycle(&mut rig, &sensors, |p| (3..11).contains(&p)); // 8 ticks
    run_cycle(&mut rig, &sensors, |p| (3..7).contains(&p)); // 4 ticks
    for _ in 0..3 {
        run_cycle(&mut rig, &sensors, |_| false);
    }

    let events: Vec<SortEvent> = rx.try_iter().collect();
    assert_eq!(
        events,
        vec![
            SortEvent {
                cycle: 2,
                outlet: 1,
                reading: Reading {
                    diameter_mm: 8,
                    crossings: 1
                },
            },
            SortEvent {
                cycle: 4,
                outlet: 2,
                reading: Reading {
                    diameter_mm: 4,
                    crossings: 1
                },
            },
        ]
    );

    let opens: Vec<(usize, u8)> = actuator
        .commands()
        .into_iter()
        .filter(|&(_, angle)| angle == 90)
        .collect();
    assert_eq!(opens, vec![(1, 90), (2, 90)]);

    let diag = rig.rt.diagnostics();
    assert_eq!(diag.cycles, 5);
    assert_eq!(diag.total_objects, 2);
    assert_eq!(diag.aged_out, 2);
    assert!(diag.queue.iter().all(Option::is_none));
}

#[test]
fn double_crossing_goes_to_reject_lane() {
    let (tx, rx) = xch::unbounded();
    let (mut rig, sensors, _actuator) = scripted(Some(tx));
    rig.rt.arm();
    run_cycle(&mut rig, &sensors, |p| (2..5).contains(&p) || (6..10).contains(&p));

    let events: Vec<SortEvent> = rx.try_iter().collect();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].outlet, 0);
    assert_eq!(
        events[0].reading,
        Reading {
            diameter_mm: 4,
            crossings: 2
        }
    );
}

#[test]
fn idle_runtime_ignores_flags() {
    let (mut rig, sensors, actuator) = scripted(None);
    assert_eq!(rig.rt.state(), RuntimeState::Idle);
    run_cycle(&mut rig, &sensors, |p| (3..11).contains(&p));
    assert!(actuator.commands().is_empty());
    assert_eq!(rig.rt.cycles(), 0);

    // Arming discards whatever was recorded while idle.
    rig.rt.arm();
    assert_eq!(rig.rt.state(), RuntimeState::Armed);
    assert!(rig.rt.service().is_idle());
}

#[test]
fn index_pulse_realigns_and_restarts_window() {
    let (mut rig, _sensors, _actuator) = scripted(None);
    rig.rt.arm();
    for _ in 0..7 {
        rig.step();
    }
    rig.isr.on_zero_edge();
    let report = rig.rt.service();
    assert!(report.actions.contains(sorter_core::PhaseAction::ScanWindowStart));
    let diag = rig.rt.diagnostics();
    assert_eq!(diag.phase, 0);
    assert_eq!(diag.drift_events, 1);
    assert_eq!(diag.last_drift_raw, 7);
    assert_eq!(diag.zero_crossings, 1);
}

#[test]
fn full_event_channel_drops_instead_of_blocking() {
    let (tx, rx) = xch::bounded(1);
    let (mut rig, sensors, _actuator) = scripted(Some(tx));
    rig.rt.arm();
    run_cycle(&mut rig, &sensors, |p| (3..11).contains(&p));
    run_cycle(&mut rig, &sensors, |p| (3..7).contains(&p));
    for _ in 0..3 {
        run_cycle(&mut rig, &sensors, |_| false);
    }
    assert_eq!(rx.try_iter().count(), 1);
    assert_eq!(rig.rt.diagnostics().dropped_events, 1);
}

struct BrokenSensors;

impl SensorBank for BrokenSensors {
    fn channels(&self) -> usize {
        2
    }
    fn read_presence(&mut self, _out: &mut [bool]) -> HwResult<()> {
        Err(Box::new(std::io::Error::other("bus fault")))
    }
}

#[test]
fn device_faults_are_counted_not_fatal() {
    let rt = build_sorter(BrokenSensors, FailingActuator, cfg(), None).unwrap();
    let mut rig = Rig::new(rt);
    rig.rt.arm();
    for _ in 0..STEPS {
        rig.step();
    }
    let diag = rig.rt.diagnostics();
    assert_eq!(diag.cycles, 1);
    assert_eq!(diag.sensor_faults, u32::from(STEPS));
    // 3 closes at arm, 3 at reset, 3 at commit.
    assert_eq!(diag.actuator_faults, 9);
    assert!(diag.queue.iter().all(Option::is_none));
}
