//! Edge pump thread lifecycle and the `runner::run` main loop.

use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use sorter_core::error::SorterError;
use sorter_core::mocks::{NullActuator, RecordingActuator, ScriptedSensors};
use sorter_core::runner::{self, RunParams};
use sorter_core::{EdgePump, OutletCfg, SorterCfg, build_sorter};
use sorter_hardware::{SimulatedActuator, SimulatedConveyor, SimulatedSensorBank};
use sorter_traits::clock::{ManualClock, MonotonicClock};
use sorter_traits::{EdgeSource, EncoderEdge, HwResult};

fn cfg() -> SorterCfg {
    SorterCfg {
        outlets: sorter_config::default_outlets()
            .iter()
            .map(OutletCfg::from)
            .collect(),
        ..SorterCfg::default()
    }
}

/// Never produces an edge.
struct Silent;

impl EdgeSource for Silent {
    fn next_edge(&mut self, timeout: Duration) -> HwResult<Option<EncoderEdge>> {
        std::thread::sleep(timeout.min(Duration::from_millis(1)));
        Ok(None)
    }
}

#[test]
fn pump_thread_exits_on_drop() {
    let rt = build_sorter(ScriptedSensors::new(4), NullActuator, cfg(), None).unwrap();
    let pump = EdgePump::spawn(Silent, rt.isr_handle(), 1000, MonotonicClock::new());
    std::thread::sleep(Duration::from_millis(10));
    assert!(pump.is_running());
    assert_eq!(pump.edges(), 0);
    drop(pump);
}

#[test]
fn pump_delivers_edges_into_the_encoder() {
    let rt = build_sorter(ScriptedSensors::new(4), NullActuator, cfg(), None).unwrap();
    let pump = EdgePump::spawn(
        SimulatedConveyor::new(200),
        rt.isr_handle(),
        50_000,
        MonotonicClock::new(),
    );
    let deadline = Instant::now() + Duration::from_secs(5);
    while pump.edges() < 50 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(1));
    }
    drop(pump);
    assert!(rt.raw_count() >= 50);
}

/// Fails on every read.
struct Unplugged;

impl EdgeSource for Unplugged {
    fn next_edge(&mut self, _timeout: Duration) -> HwResult<Option<EncoderEdge>> {
        Err(Box::new(std::io::Error::other("encoder unplugged")))
    }
}

#[test]
fn pump_counts_source_errors_and_keeps_running() {
    let rt = build_sorter(ScriptedSensors::new(4), NullActuator, cfg(), None).unwrap();
    let pump = EdgePump::spawn(Unplugged, rt.isr_handle(), 10_000, MonotonicClock::new());
    let deadline = Instant::now() + Duration::from_secs(5);
    while pump.errors() < 3 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(1));
    }
    assert!(pump.errors() >= 3);
    assert!(pump.is_running());
    assert_eq!(pump.edges(), 0);
    drop(pump);
    assert_eq!(rt.raw_count(), 0);
}

#[test]
fn runner_stops_after_requested_cycles() {
    let cfg = cfg();
    let conveyor = SimulatedConveyor::new(cfg.encoder.steps_per_cycle);
    let bank = SimulatedSensorBank::new(
        conveyor.position(),
        cfg.encoder.steps_per_cycle,
        cfg.scanner.weights.clone(),
        cfg.scanner.units_per_mm,
    );
    let actuator = SimulatedActuator::new(cfg.outlets.len());
    let mut rt = build_sorter(bank, actuator.clone(), cfg, None).unwrap();
    let pump = EdgePump::spawn(conveyor, rt.isr_handle(), 100_000, MonotonicClock::new());

    let shutdown = AtomicBool::new(false);
    let params = RunParams {
        max_cycles: Some(3),
        ..RunParams::default()
    };
    let stats = runner::run(&mut rt, &shutdown, &params, &MonotonicClock::new(), None).unwrap();
    drop(pump);

    assert_eq!(stats.cycles, 3);
    assert!(stats.ticks > 0);
    assert!(stats.max_service_us >= stats.mean_service_us);
    // Outlets are closed on the way out.
    assert!(actuator.angles().iter().all(|&a| a == 0));
}

#[test]
fn runner_honours_shutdown_flag() {
    let mut rt = build_sorter(ScriptedSensors::new(4), RecordingActuator::new(), cfg(), None).unwrap();
    let shutdown = AtomicBool::new(true);
    let stats = runner::run(
        &mut rt,
        &shutdown,
        &RunParams::default(),
        &ManualClock::new(),
        None,
    )
    .unwrap();
    assert_eq!(stats.iterations, 0);
    assert_eq!(stats.cycles, 0);
}

#[test]
fn runner_reports_stall_as_timeout() {
    let mut rt = build_sorter(ScriptedSensors::new(4), NullActuator, cfg(), None).unwrap();
    let shutdown = AtomicBool::new(false);
    let params = RunParams {
        stall_timeout: Duration::from_millis(1),
        exit_on_stall: true,
        ..RunParams::default()
    };
    let err = runner::run(&mut rt, &shutdown, &params, &ManualClock::new(), None)
        .expect_err("stall");
    assert!(matches!(
        err.downcast_ref::<SorterError>(),
        Some(SorterError::Timeout)
    ));
}
