//! Background edge delivery for builds without a real interrupt controller.
//!
//! Spawns a thread that owns the `EdgeSource`, dispatches each edge through an
//! [`IsrHandle`] exactly as a GPIO interrupt would, and paces quadrature edges
//! at the configured step rate.
//!
//! Each `EdgePump` spawns exactly one thread that is shut down and joined when
//! the pump is dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use sorter_traits::clock::Clock;
use sorter_traits::{EdgeSource, EncoderEdge};

use crate::hw_error::map_hw_error;
use crate::isr::IsrHandle;

/// Per-read timeout handed to the source; bounds shutdown latency.
const EDGE_TIMEOUT: Duration = Duration::from_millis(20);

/// Period between quadrature edges at `step_hz`, in microseconds (at least 1).
#[inline]
pub fn step_period_us(step_hz: u32) -> u64 {
    1_000_000u64.div_ceil(u64::from(step_hz.max(1))).max(1)
}

pub struct EdgePump {
    edges: Arc<AtomicU64>,
    errors: Arc<AtomicU64>,
    /// µs since `epoch` of the last delivered edge.
    last_edge_us: Arc<AtomicU64>,
    epoch: Instant,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl EdgePump {
    /// Start delivering edges from `source` into `isr`, one quadrature edge
    /// every `1 / step_hz` seconds. Index edges are delivered unpaced.
    pub fn spawn<E, C>(mut source: E, isr: IsrHandle, step_hz: u32, clock: C) -> Self
    where
        E: EdgeSource + Send + 'static,
        C: Clock + Send + Sync + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = Arc::clone(&shutdown);
        let edges = Arc::new(AtomicU64::new(0));
        let edges_clone = Arc::clone(&edges);
        let errors = Arc::new(AtomicU64::new(0));
        let errors_clone = Arc::clone(&errors);
        let last_edge_us = Arc::new(AtomicU64::new(0));
        let last_edge_clone = Arc::clone(&last_edge_us);
        let period = Duration::from_micros(step_period_us(step_hz));
        let epoch = clock.now();

        let join_handle = std::thread::spawn(move || {
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!("edge pump received shutdown signal");
                    break;
                }

                match source.next_edge(EDGE_TIMEOUT) {
                    Ok(Some(edge)) => {
                        isr.dispatch(edge);
                        edges_clone.fetch_add(1, Ordering::Relaxed);
                        last_edge_clone.store(clock.us_since(epoch), Ordering::Relaxed);
                        if matches!(edge, EncoderEdge::Quadrature { .. }) {
                            clock.sleep(period);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        errors_clone.fetch_add(1, Ordering::Relaxed);
                        let err = map_hw_error(&*e);
                        tracing::warn!(error = %err, "edge source failed");
                        clock.sleep(period);
                    }
                }
            }
            tracing::trace!("edge pump thread exiting cleanly");
        });

        Self {
            edges,
            errors,
            last_edge_us,
            epoch,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    /// Edges delivered so far.
    pub fn edges(&self) -> u64 {
        self.edges.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Microseconds since the last delivered edge, measured against `now_us`
    /// on the pump's own epoch.
    pub fn quiet_for(&self, now_us: u64) -> u64 {
        now_us.saturating_sub(self.last_edge_us.load(Ordering::Relaxed))
    }

    pub fn epoch(&self) -> Instant {
        self.epoch
    }

    pub fn is_running(&self) -> bool {
        self.join_handle
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl Drop for EdgePump {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);

        // The thread notices the flag after at most one EDGE_TIMEOUT read.
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("edge pump joined"),
                Err(e) => tracing::warn!(?e, "edge pump thread panicked during shutdown"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::step_period_us;

    #[test]
    fn period_rounds_up_and_never_zero() {
        assert_eq!(step_period_us(2000), 500);
        assert_eq!(step_period_us(3), 333_334);
        assert_eq!(step_period_us(0), 1_000_000);
        assert_eq!(step_period_us(u32::MAX), 1);
    }
}
