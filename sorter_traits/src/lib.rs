//! Hardware seams for the sorter.
//!
//! Every concrete device (GPIO, servo PWM, EEPROM-like storage, display) sits
//! behind one of these traits so the core can run against simulations and
//! test doubles as well as real pins.

pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

/// Boxed error type used at every trait boundary.
pub type HwResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Which quadrature channel produced an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    A,
    B,
}

/// One interrupt-worthy event from the rotary encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderEdge {
    /// Edge on a quadrature channel with both channel levels sampled right after it.
    Quadrature {
        channel: Channel,
        level_a: bool,
        level_b: bool,
    },
    /// Zero-reference (index) pulse.
    Index,
}

/// Source of encoder edges, used where no real interrupt controller exists.
pub trait EdgeSource {
    /// Block for at most `timeout` waiting for the next edge.
    /// `Ok(None)` means the timeout expired without an edge.
    fn next_edge(&mut self, timeout: std::time::Duration) -> HwResult<Option<EncoderEdge>>;
}

/// Bank of binary "object present" sensors at the scan point.
pub trait SensorBank {
    /// Number of channels in the bank.
    fn channels(&self) -> usize;

    /// Fill `out` with the current presence level of each channel.
    /// `out.len()` equals `channels()`.
    fn read_presence(&mut self, out: &mut [bool]) -> HwResult<()>;
}

/// Outlet flap/servo driver. Commands are fire-and-forget.
pub trait OutletActuator {
    fn set_outlet_angle(&mut self, outlet: usize, angle: u8) -> HwResult<()>;
}

impl<T: OutletActuator + ?Sized> OutletActuator for Box<T> {
    fn set_outlet_angle(&mut self, outlet: usize, angle: u8) -> HwResult<()> {
        (**self).set_outlet_angle(outlet, angle)
    }
}

impl<T: SensorBank + ?Sized> SensorBank for Box<T> {
    fn channels(&self) -> usize {
        (**self).channels()
    }
    fn read_presence(&mut self, out: &mut [bool]) -> HwResult<()> {
        (**self).read_presence(out)
    }
}

/// Persistent storage for the outlet table image (EEPROM on the controller board).
pub trait ConfigStore {
    /// Read the stored image. An empty vector means nothing is stored.
    fn load(&mut self) -> HwResult<Vec<u8>>;
    fn store(&mut self, image: &[u8]) -> HwResult<()>;
}

/// Status outputs the sorter reports to whatever display exists.
pub trait StatusDisplay {
    fn show_position(&mut self, raw_count: i32, phase: u16);
    /// Queue slots, index 0 first; `Some((diameter_mm, crossings))` or empty.
    fn show_queue(&mut self, slots: &[Option<(u16, u8)>]);
    fn show_drift(&mut self, zero_crossings: u32, drift_events: u32, last_drift_raw: i32);
}
