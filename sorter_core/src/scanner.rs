//! Multi-sensor diameter measurement.
//!
//! Each presence sensor accumulates a width (ticks while continuously
//! present). When the whole bank is clear again the crossing is finalized:
//! widths are weight-corrected, short ones dropped, and the rest fused with a
//! median-family rule so one occluded or double-triggered sensor cannot
//! dominate the estimate.

use crate::config::ScannerCfg;
use crate::util::{apply_weight, avg2_round_nearest_u32, quantize_weight_permille};

/// Result of one completed crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiameterEstimate {
    /// Fused corrected width in scan units.
    pub diameter: u16,
    /// Crossings completed in the current scan window, this one included.
    pub crossings: u8,
    /// Channels that passed the minimum-width filter.
    pub valid_channels: u8,
    /// Phase at which the first sensor of this crossing went active.
    pub start_phase: u16,
}

#[derive(Debug, Clone, Default)]
struct ChannelState {
    weight_permille: u32,
    present: bool,
    /// Went present at least once during the current crossing.
    crossed: bool,
    width: u32,
    last_raw: u32,
    last_corrected: u32,
}

/// Fuse corrected widths: fewer than two → `None`, two → mean, three → median,
/// four or more → median (mean of the middle pair for even counts).
///
/// Sorts `values` in place.
pub fn fuse(values: &mut [u32]) -> Option<u32> {
    values.sort_unstable();
    let n = values.len();
    match n {
        0 | 1 => None,
        2 => Some(avg2_round_nearest_u32(values[0], values[1])),
        _ if n % 2 == 1 => Some(values[n / 2]),
        _ => Some(avg2_round_nearest_u32(values[n / 2 - 1], values[n / 2])),
    }
}

#[derive(Debug)]
pub struct DiameterScanner {
    channels: Vec<ChannelState>,
    min_valid_width: u32,
    /// A channel went active since the last full clear.
    active: bool,
    start_phase: u16,
    window_crossings: u8,
    pending: Option<DiameterEstimate>,
    total_objects: u32,
    discarded: u32,
    // Preallocated so finalizing a crossing never allocates.
    scratch: Vec<u32>,
}

impl DiameterScanner {
    pub fn new(cfg: &ScannerCfg) -> Self {
        let channels: Vec<ChannelState> = cfg
            .weights
            .iter()
            .map(|&w| ChannelState {
                weight_permille: quantize_weight_permille(w),
                ..ChannelState::default()
            })
            .collect();
        let scratch = Vec::with_capacity(channels.len());
        Self {
            channels,
            min_valid_width: u32::from(cfg.min_valid_width),
            active: false,
            start_phase: 0,
            window_crossings: 0,
            pending: None,
            total_objects: 0,
            discarded: 0,
            scratch,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Open a fresh measurement window: accumulators, presence tracking,
    /// the window crossing count and any pending estimate are cleared.
    pub fn start(&mut self) {
        for ch in &mut self.channels {
            ch.present = false;
            ch.crossed = false;
            ch.width = 0;
        }
        self.active = false;
        self.window_crossings = 0;
        self.pending = None;
    }

    /// Process one encoder tick with the bank's presence levels.
    ///
    /// Channels missing from `presence` read as absent. Returns the new
    /// estimate when this tick completed a crossing that produced one.
    pub fn sample(&mut self, phase: u16, presence: &[bool]) -> Option<DiameterEstimate> {
        for (i, ch) in self.channels.iter_mut().enumerate() {
            let now = presence.get(i).copied().unwrap_or(false);
            if now && !ch.present {
                ch.width = 0;
                ch.crossed = true;
                if !self.active {
                    self.active = true;
                    self.start_phase = phase;
                }
            }
            if now {
                ch.width = ch.width.saturating_add(1);
            }
            ch.present = now;
        }

        if self.active && self.channels.iter().all(|c| !c.present) {
            self.active = false;
            return self.finalize();
        }
        None
    }

    fn finalize(&mut self) -> Option<DiameterEstimate> {
        self.total_objects = self.total_objects.wrapping_add(1);
        self.window_crossings = self.window_crossings.saturating_add(1);

        self.scratch.clear();
        for ch in &mut self.channels {
            if !ch.crossed {
                continue;
            }
            ch.crossed = false;
            ch.last_raw = ch.width;
            ch.last_corrected = apply_weight(ch.width, ch.weight_permille);
            if ch.last_corrected >= self.min_valid_width {
                self.scratch.push(ch.last_corrected);
            }
        }
        let valid = self.scratch.len();

        match fuse(&mut self.scratch) {
            Some(d) => {
                let est = DiameterEstimate {
                    diameter: d.min(u32::from(u16::MAX)) as u16,
                    crossings: self.window_crossings,
                    valid_channels: valid.min(usize::from(u8::MAX)) as u8,
                    start_phase: self.start_phase,
                };
                self.pending = Some(est);
                Some(est)
            }
            None => {
                self.discarded = self.discarded.wrapping_add(1);
                // Keep the pending estimate's crossing count current.
                if let Some(p) = self.pending.as_mut() {
                    p.crossings = self.window_crossings;
                }
                None
            }
        }
    }

    /// Take the pending estimate, leaving none.
    pub fn take_estimate(&mut self) -> Option<DiameterEstimate> {
        self.pending.take()
    }

    pub fn pending(&self) -> Option<&DiameterEstimate> {
        self.pending.as_ref()
    }

    /// Completed crossings since construction, valid or not.
    pub fn total_object_count(&self) -> u32 {
        self.total_objects
    }

    /// Crossings that produced no estimate (fewer than two valid channels).
    pub fn discarded_count(&self) -> u32 {
        self.discarded
    }

    pub fn window_crossings(&self) -> u8 {
        self.window_crossings
    }

    /// Raw widths of the last finalized crossing, per channel.
    pub fn raw_widths(&self) -> Vec<u32> {
        self.channels.iter().map(|c| c.last_raw).collect()
    }

    /// Corrected widths of the last finalized crossing, per channel.
    pub fn corrected_widths(&self) -> Vec<u32> {
        self.channels.iter().map(|c| c.last_corrected).collect()
    }
}
