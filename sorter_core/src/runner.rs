use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use sorter_traits::clock::Clock;
use sorter_traits::{OutletActuator, SensorBank, StatusDisplay};

use crate::error::{Result as CoreResult, SorterError};
use crate::runtime::SorterRuntime;

/// Main-loop parameters.
#[derive(Debug, Clone)]
pub struct RunParams {
    /// Stop after this many conveyor cycles; `None` runs until shutdown.
    pub max_cycles: Option<u64>,
    /// Sleep when an iteration found nothing to do.
    pub idle_sleep: Duration,
    /// No encoder motion for this long counts as a conveyor stall.
    pub stall_timeout: Duration,
    /// Return `SorterError::Timeout` on a stall instead of only logging it.
    pub exit_on_stall: bool,
    /// Refresh the status display every this many cycles (0 = never).
    pub status_every_cycles: u64,
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            max_cycles: None,
            idle_sleep: Duration::from_micros(100),
            stall_timeout: Duration::from_secs(2),
            exit_on_stall: false,
            status_every_cycles: 0,
        }
    }
}

/// Loop statistics returned by [`run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub iterations: u64,
    pub ticks: u64,
    pub cycles: u64,
    pub outlet_openings: u64,
    pub stalls: u64,
    /// Longest single `service()` call, in microseconds.
    pub max_service_us: u64,
    /// Mean `service()` time over iterations that did work, in microseconds.
    pub mean_service_us: u64,
}

#[inline]
fn stalled_now(elapsed_us: u64, quiet_us: u64, threshold_us: u64) -> bool {
    elapsed_us >= threshold_us && quiet_us > threshold_us
}

/// Arm `runtime` and service it until `shutdown` is set or `max_cycles`
/// conveyor steps have been performed. Outlets are closed on exit.
///
/// Edges must already be flowing into the runtime's `IsrHandle` (GPIO
/// interrupts or an `EdgePump`).
pub fn run<B, A, C>(
    runtime: &mut SorterRuntime<B, A>,
    shutdown: &AtomicBool,
    params: &RunParams,
    clock: &C,
    mut display: Option<&mut dyn StatusDisplay>,
) -> CoreResult<RunStats>
where
    B: SensorBank,
    A: OutletActuator,
    C: Clock + ?Sized,
{
    let mut stats = RunStats::default();
    let threshold_us = u64::try_from(params.stall_timeout.as_micros()).unwrap_or(u64::MAX);
    let epoch = clock.now();
    let mut last_motion_us = 0u64;
    let mut stalled = false;
    let mut busy_iterations = 0u64;
    let mut busy_total_us = 0u64;
    let start_cycles = runtime.cycles();

    runtime.arm();
    tracing::info!(max_cycles = ?params.max_cycles, "sorting started");

    let outcome = loop {
        if shutdown.load(Ordering::Relaxed) {
            tracing::info!("shutdown requested");
            break Ok(());
        }
        if params.max_cycles.is_some_and(|max| stats.cycles >= max) {
            break Ok(());
        }

        let t0 = clock.us_since(epoch);
        let report = runtime.service();
        let t1 = clock.us_since(epoch);
        stats.iterations += 1;

        if report.is_idle() {
            let quiet = t1.saturating_sub(last_motion_us);
            if !stalled && stalled_now(t1, quiet, threshold_us) {
                stalled = true;
                stats.stalls += 1;
                tracing::warn!(quiet_ms = quiet / 1000, "conveyor stalled");
                if params.exit_on_stall {
                    break Err(crate::error::Report::new(SorterError::Timeout));
                }
            }
            clock.sleep(params.idle_sleep);
            continue;
        }

        let took = t1.saturating_sub(t0);
        busy_iterations += 1;
        busy_total_us = busy_total_us.saturating_add(took);
        stats.max_service_us = stats.max_service_us.max(took);
        stats.ticks += u64::from(report.ticks);
        stats.outlet_openings += report.opened as u64;
        if report.ticks > 0 {
            last_motion_us = t1;
            if stalled {
                stalled = false;
                tracing::info!("conveyor moving again");
            }
        }

        let cycles = runtime.cycles().wrapping_sub(start_cycles);
        if cycles != stats.cycles {
            stats.cycles = cycles;
            if params.status_every_cycles > 0 && cycles % params.status_every_cycles == 0 {
                if let Some(d) = display.as_deref_mut() {
                    runtime.report_status(d);
                }
            }
        }
    };

    runtime.close_all();
    if busy_iterations > 0 {
        stats.mean_service_us = busy_total_us / busy_iterations;
    }
    tracing::info!(
        cycles = stats.cycles,
        ticks = stats.ticks,
        openings = stats.outlet_openings,
        stalls = stats.stalls,
        max_service_us = stats.max_service_us,
        "sorting stopped"
    );
    outcome.map(|()| stats)
}
