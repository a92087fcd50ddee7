use thiserror::Error;

/// Errors surfaced by the sorter outside the per-tick path.
///
/// Device failures inside `service()` are counted in `Diagnostics` instead;
/// they only become a `SorterError` when logged.
#[derive(Debug, Error, Clone)]
pub enum SorterError {
    /// Untyped device error from a trait boundary.
    #[error("hardware error: {0}")]
    Hardware(String),
    /// Typed `HwError` other than a timeout or I/O failure.
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("configuration error: {0}")]
    Config(String),
    /// A device did not answer in time, or the conveyor stalled.
    #[error("timeout waiting for hardware")]
    Timeout,
    #[error("invalid state: {0}")]
    State(String),
    #[error("io error: {0}")]
    Io(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("no outlets configured")]
    MissingOutlets,
    #[error("sensor bank has {bank} channels but {weights} weights are configured")]
    ChannelMismatch { bank: usize, weights: usize },
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
