#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core sorting logic (hardware-agnostic).
//!
//! This crate provides the hardware-independent sorting engine. All hardware
//! interactions go through the `sorter_traits` seams (`SensorBank`,
//! `OutletActuator`, `EdgeSource`, `ConfigStore`, `StatusDisplay`).
//!
//! ## Architecture
//!
//! - **Encoder**: quadrature position and index-pulse drift correction (`encoder`)
//! - **Scheduler**: phase-triggered action flags (`scheduler`)
//! - **Scanner**: per-sensor widths fused into one diameter (`scanner`)
//! - **Queue**: transport-delay shift register (`queue`)
//! - **Outlets**: per-outlet open/close decisions (`outlets`)
//! - **Runtime**: the main-loop owner of all of the above (`runtime`)
//!
//! ## Interrupt boundary
//!
//! Encoder and scheduler state live in [`isr::IsrShared`] and are touched from
//! interrupt context through atomics only. Everything else is owned by
//! [`SorterRuntime`] and mutated only from `service()`.

pub mod builder;
pub mod config;
pub mod conversions;
pub mod encoder;
pub mod error;
pub mod hw_error;
pub mod isr;
pub mod mocks;
pub mod outlets;
pub mod pump;
pub mod queue;
pub mod runner;
pub mod runtime;
pub mod scanner;
pub mod scheduler;
pub mod store;
pub mod util;

pub use builder::{Missing, Set, Sorter, SorterBuilder, build_sorter};
pub use config::{
    AssignmentCfg, EncoderCfg, OutletCfg, PhaseCfg, QueueCfg, ScannerCfg, SorterCfg,
};
pub use encoder::PositionEncoder;
pub use error::{BuildError, Report, Result, SorterError};
pub use isr::{IsrHandle, IsrShared};
pub use outlets::OutletAssignment;
pub use pump::EdgePump;
pub use queue::{Reading, TransportQueue};
pub use runner::{RunParams, RunStats};
pub use runtime::{Diagnostics, RuntimeState, ServiceReport, SortEvent, SorterRuntime};
pub use scanner::{DiameterEstimate, DiameterScanner};
pub use scheduler::{ActionSet, PhaseAction, PhaseScheduler};
pub use store::{FileStore, MemoryStore};

/// Pick the outlet table: `[[outlets]]` from the config, else the image in
/// `store`, else the built-in defaults.
///
/// An unreadable store or an image with a bad marker is logged and skipped.
pub fn resolve_outlets<S: sorter_traits::ConfigStore + ?Sized>(
    cfg: &sorter_config::Config,
    store: Option<&mut S>,
) -> (Vec<sorter_config::OutletRecord>, sorter_config::OutletSource) {
    let image = store.and_then(|s| match s.load() {
        Ok(bytes) if bytes.is_empty() => None,
        Ok(bytes) => Some(bytes),
        Err(e) => {
            let err = hw_error::map_hw_error(&*e);
            tracing::warn!(error = %err, "outlet store unreadable; ignoring");
            None
        }
    });
    let (outlets, source) = sorter_config::resolve_outlets(cfg, image.as_deref());
    if image.is_some() && source == sorter_config::OutletSource::Defaults {
        tracing::warn!("stored outlet table invalid; using defaults");
    }
    tracing::debug!(source = source.as_str(), outlets = outlets.len(), "outlet table resolved");
    (outlets, source)
}

/// Persist `outlets` to `store` in the image format.
pub fn save_outlets<S: sorter_traits::ConfigStore + ?Sized>(
    store: &mut S,
    outlets: &[sorter_config::OutletRecord],
) -> Result<()> {
    let image = sorter_config::encode_outlet_image(outlets);
    store
        .store(&image)
        .map_err(|e| Report::new(hw_error::map_hw_error(&*e)))
}
