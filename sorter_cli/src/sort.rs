//! Line assembly and the `run` / `self-check` commands.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use crossbeam_channel as xch;
use sorter_config::{Config, OutletRecord};
use sorter_core::error::{Result as CoreResult, SorterError};
use sorter_core::runner::{self, RunParams, RunStats};
use sorter_core::{Diagnostics, EdgePump, Sorter, SortEvent, SorterCfg};
use sorter_hardware::{SimulatedActuator, SimulatedConveyor, SimulatedSensorBank};
use sorter_traits::clock::MonotonicClock;
use sorter_traits::{OutletActuator, SensorBank, StatusDisplay};
use sorter_ui::TerminalDisplay;

/// Events that fit between two reads of the tally thread.
const EVENT_BACKLOG: usize = 1024;

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub cycles: Option<u64>,
    pub status_every: Option<u64>,
    pub stats: bool,
    pub force_sim: bool,
    pub exit_on_stall: bool,
    pub stall_ms: u64,
}

#[derive(Debug)]
pub struct RunSummary {
    pub backend: &'static str,
    pub interrupted: bool,
    pub stats: RunStats,
    pub diagnostics: Diagnostics,
    /// Openings per outlet, from the event tap.
    pub per_outlet: Vec<u64>,
}

/// Simulated line: conveyor, tapered spears and a servo bank that just records angles.
pub struct SimLine {
    pub conveyor: SimulatedConveyor,
    pub sensors: SimulatedSensorBank,
    pub actuator: SimulatedActuator,
}

impl SimLine {
    pub fn new(cfg: &Config, outlets: usize) -> Self {
        let steps = cfg.encoder.steps_per_cycle;
        let sim = &cfg.simulation;
        let conveyor = SimulatedConveyor::new(steps).with_slip_every(sim.slip_every_cycles);
        let sensors = SimulatedSensorBank::new(
            conveyor.position(),
            steps,
            cfg.scanner.weights.clone(),
            cfg.scanner.units_per_mm,
        )
        .with_diameters(sim.spear_min_mm, sim.spear_max_mm, sim.seed)
        .with_double_every(sim.double_every_cycles);
        Self {
            conveyor,
            sensors,
            actuator: SimulatedActuator::new(outlets),
        }
    }
}

fn build(
    cfg: &Config,
    outlets: &[OutletRecord],
    sensors: impl SensorBank + 'static,
    actuator: impl OutletActuator + 'static,
    events: Option<xch::Sender<SortEvent>>,
) -> CoreResult<Sorter> {
    let builder = Sorter::builder().with_config(SorterCfg::from_config(cfg, outlets));
    let builder = match events {
        Some(tx) => builder.with_event_tap(tx),
        None => builder,
    };
    builder.with_sensors(sensors).with_actuator(actuator).build()
}

/// Count openings per outlet until every sender is gone.
fn spawn_tally(rx: xch::Receiver<SortEvent>, outlets: usize) -> std::thread::JoinHandle<Vec<u64>> {
    std::thread::spawn(move || {
        let mut counts = vec![0u64; outlets];
        for ev in rx {
            tracing::debug!(
                cycle = ev.cycle,
                outlet = ev.outlet,
                mm = ev.reading.diameter_mm,
                crossings = ev.reading.crossings,
                "spear sorted"
            );
            if let Some(c) = counts.get_mut(ev.outlet) {
                *c += 1;
            }
        }
        counts
    })
}

fn run_params(opts: &RunOptions) -> RunParams {
    RunParams {
        max_cycles: opts.cycles,
        stall_timeout: Duration::from_millis(opts.stall_ms.max(1)),
        exit_on_stall: opts.exit_on_stall,
        status_every_cycles: opts.status_every.unwrap_or(0),
        ..RunParams::default()
    }
}

/// Service `sorter` with edges already flowing, then collect the tally.
fn drive(
    mut sorter: Sorter,
    tally: std::thread::JoinHandle<Vec<u64>>,
    opts: &RunOptions,
    shutdown: &AtomicBool,
    backend: &'static str,
) -> eyre::Result<RunSummary> {
    let params = run_params(opts);
    let mut stdout = TerminalDisplay::new(std::io::stdout());
    let display: Option<&mut dyn StatusDisplay> = if opts.status_every.is_some() {
        Some(&mut stdout)
    } else {
        None
    };
    let result = runner::run(&mut sorter, shutdown, &params, &MonotonicClock::new(), display);
    let diagnostics = sorter.diagnostics();
    // Dropping the runtime closes the event channel and ends the tally thread.
    drop(sorter);
    let per_outlet = tally
        .join()
        .map_err(|_| SorterError::State("event tally thread panicked".into()))?;
    let stats = result?;
    let interrupted = shutdown.load(std::sync::atomic::Ordering::Relaxed);
    Ok(RunSummary {
        backend,
        interrupted,
        stats,
        diagnostics,
        per_outlet,
    })
}

pub fn run_simulated(
    cfg: &Config,
    outlets: &[OutletRecord],
    opts: &RunOptions,
    shutdown: &AtomicBool,
) -> eyre::Result<RunSummary> {
    let line = SimLine::new(cfg, outlets.len());
    let (tx, rx) = xch::bounded(EVENT_BACKLOG);
    let tally = spawn_tally(rx, outlets.len());
    let sorter = build(cfg, outlets, line.sensors, line.actuator, Some(tx))?;
    tracing::info!(
        step_hz = cfg.simulation.step_hz,
        slip_every = cfg.simulation.slip_every_cycles,
        outlets = outlets.len(),
        "simulated line ready"
    );
    let _pump = EdgePump::spawn(
        line.conveyor,
        sorter.isr_handle(),
        cfg.simulation.step_hz,
        MonotonicClock::new(),
    );
    drive(sorter, tally, opts, shutdown, "sim")
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub fn run_hardware(
    cfg: &Config,
    outlets: &[OutletRecord],
    opts: &RunOptions,
    shutdown: &AtomicBool,
) -> eyre::Result<RunSummary> {
    use eyre::WrapErr;
    use sorter_hardware::{EncoderInterrupts, GpioSensorBank, ServoOutlets};

    let pins = &cfg.pins;
    let (Some(a), Some(b)) = (pins.encoder_a, pins.encoder_b) else {
        return Err(SorterError::Config("pins.encoder_a and pins.encoder_b are required".into()).into());
    };
    if pins.sensors.is_empty() || pins.outlets.len() != outlets.len() {
        return Err(SorterError::Config(
            "pins.sensors must be set and pins.outlets must list one pin per outlet".into(),
        )
        .into());
    }
    let sensors = GpioSensorBank::new(&pins.sensors, pins.sensors_active_low)
        .wrap_err("open sensor pins")?;
    let servos = ServoOutlets::new(&pins.outlets).wrap_err("open outlet servo pins")?;

    let (tx, rx) = xch::bounded(EVENT_BACKLOG);
    let tally = spawn_tally(rx, outlets.len());
    let sorter = build(cfg, outlets, sensors, servos, Some(tx))?;
    let isr = sorter.isr_handle();
    let _irq = EncoderInterrupts::attach(a, b, pins.encoder_index, move |edge| isr.dispatch(edge))
        .wrap_err("attach encoder interrupts")?;
    drive(sorter, tally, opts, shutdown, "hardware")
}

pub fn run(
    cfg: &Config,
    outlets: &[OutletRecord],
    opts: &RunOptions,
    shutdown: Arc<AtomicBool>,
) -> eyre::Result<RunSummary> {
    #[cfg(all(feature = "hardware", target_os = "linux"))]
    {
        if !opts.force_sim {
            return run_hardware(cfg, outlets, opts, &shutdown);
        }
    }
    if !opts.force_sim {
        tracing::debug!("built without hardware support; using the simulated line");
    }
    run_simulated(cfg, outlets, opts, &shutdown)
}

/// Result of pushing one tray through a freshly built line.
#[derive(Debug)]
pub struct SelfCheck {
    pub channels: usize,
    pub outlets: usize,
    pub measured_mm: Option<u16>,
    pub expected_mm: u8,
}

/// Step the simulated line edge by edge through one full cycle plus the
/// finalize phase of the next, and compare the queued reading with the
/// simulated spear.
pub fn self_check(cfg: &Config, outlets: &[OutletRecord]) -> eyre::Result<SelfCheck> {
    let mut line = SimLine::new(cfg, outlets.len());
    let expected_mm = line.sensors.diameter_mm(0);
    let channels = line.sensors.channels();
    let mut sorter = build(cfg, outlets, line.sensors, line.actuator, None)?;
    let isr = sorter.isr_handle();
    sorter.arm();
    let steps = u64::from(cfg.encoder.steps_per_cycle);
    while sorter.cycles() == 0 {
        if line.conveyor.position().get() > 2 * steps {
            return Err(SorterError::State("diameter was never finalized".into()).into());
        }
        isr.dispatch(line.conveyor.step());
        sorter.service();
    }
    let measured_mm = sorter.queue().get(0).map(|r| r.diameter_mm);
    sorter.close_all();
    Ok(SelfCheck {
        channels,
        outlets: outlets.len(),
        measured_mm,
        expected_mm,
    })
}

/// Print loop stats to stderr.
pub fn print_stats(summary: &RunSummary) {
    let s = &summary.stats;
    let d = &summary.diagnostics;
    eprintln!("\n--- Sorter Stats ---");
    eprintln!("Iterations: {}", s.iterations);
    eprintln!("Ticks: {} (overrun {})", s.ticks, d.overrun_ticks);
    eprintln!(
        "Service latency max/mean (us): {} / {}",
        s.max_service_us, s.mean_service_us
    );
    eprintln!("Stalls: {}", s.stalls);
    eprintln!(
        "Faults sensor/actuator: {} / {}",
        d.sensor_faults, d.actuator_faults
    );
    eprintln!("Dropped events: {}", d.dropped_events);
    eprintln!("--------------------\n");
}
