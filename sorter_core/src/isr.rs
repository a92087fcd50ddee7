//! The state shared between interrupt handlers and the main loop.
//!
//! `SorterRuntime` owns an `Arc<IsrShared>`; handlers get an [`IsrHandle`]
//! (a clone of that `Arc`) registered once at startup. The handle exposes the
//! two interrupt entry points and nothing else.

use std::sync::Arc;

use sorter_traits::{Channel, EncoderEdge};

use crate::config::PhaseCfg;
use crate::encoder::PositionEncoder;
use crate::scheduler::PhaseScheduler;

#[derive(Debug)]
pub struct IsrShared {
    pub encoder: PositionEncoder,
    pub scheduler: PhaseScheduler,
}

impl IsrShared {
    pub fn new(steps_per_cycle: u16, phases: &PhaseCfg) -> Self {
        Self {
            encoder: PositionEncoder::new(steps_per_cycle),
            scheduler: PhaseScheduler::new(phases),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IsrHandle {
    shared: Arc<IsrShared>,
}

impl IsrHandle {
    pub(crate) fn new(shared: Arc<IsrShared>) -> Self {
        Self { shared }
    }

    /// Quadrature edge entry point.
    ///
    /// Edges must arrive from one context at a time and in the order they
    /// happened; two callers racing on A and B can make a real edge look like
    /// a repeated level.
    #[inline]
    pub fn on_channel_edge(&self, channel: Channel, level_a: bool, level_b: bool) {
        if let Some(phase) = self
            .shared
            .encoder
            .on_channel_edge(channel, level_a, level_b)
        {
            self.shared.scheduler.on_phase(phase);
        }
    }

    /// Index pulse entry point.
    #[inline]
    pub fn on_zero_edge(&self) {
        if let Some(phase) = self.shared.encoder.on_zero_edge() {
            self.shared.scheduler.on_phase(phase);
        }
    }

    /// Route an edge to its entry point. Same single-caller rule as
    /// [`Self::on_channel_edge`].
    #[inline]
    pub fn dispatch(&self, edge: EncoderEdge) {
        match edge {
            EncoderEdge::Quadrature {
                channel,
                level_a,
                level_b,
            } => self.on_channel_edge(channel, level_a, level_b),
            EncoderEdge::Index => self.on_zero_edge(),
        }
    }

    pub fn encoder(&self) -> &PositionEncoder {
        &self.shared.encoder
    }
}
