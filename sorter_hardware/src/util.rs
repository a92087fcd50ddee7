use std::time::Duration;

use sorter_traits::{Channel, EncoderEdge};

use crate::error::{HwError, Result};

/// Hobby-servo frame period.
pub const SERVO_PERIOD: Duration = Duration::from_millis(20);
pub const SERVO_MIN_PULSE_US: u64 = 500;
pub const SERVO_MAX_PULSE_US: u64 = 2500;
pub const MAX_ANGLE: u8 = 180;

/// Pulse width for `angle` degrees, linear between the min and max pulse.
pub fn servo_pulse(angle: u8) -> Result<Duration> {
    if angle > MAX_ANGLE {
        return Err(HwError::AngleOutOfRange(angle));
    }
    let span = SERVO_MAX_PULSE_US - SERVO_MIN_PULSE_US;
    let us = SERVO_MIN_PULSE_US + (u64::from(angle) * span + u64::from(MAX_ANGLE) / 2) / u64::from(MAX_ANGLE);
    Ok(Duration::from_micros(us))
}

/// Last known levels of both quadrature channels, as seen by the single
/// thread that turns pin events into [`EncoderEdge`]s.
///
/// Each event updates only its own channel, so edges handed out in event
/// order always differ from the previous pair by exactly one level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuadratureLevels {
    pub a: bool,
    pub b: bool,
}

impl QuadratureLevels {
    pub fn new(a: bool, b: bool) -> Self {
        Self { a, b }
    }

    /// Record a level change on `channel` and build the edge for it.
    pub fn on_pin(&mut self, channel: Channel, high: bool) -> EncoderEdge {
        match channel {
            Channel::A => self.a = high,
            Channel::B => self.b = high,
        }
        EncoderEdge::Quadrature {
            channel,
            level_a: self.a,
            level_b: self.b,
        }
    }
}
