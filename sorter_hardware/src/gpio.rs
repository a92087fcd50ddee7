//! Raspberry Pi GPIO devices (`hardware` feature).
//!
//! Encoder edges are collected by one polling thread that watches A, B and
//! the index pin together, so quadrature edges reach the caller's handler
//! one at a time and in order. The handler must not block.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use rppal::gpio::{Gpio, InputPin, Level, OutputPin, Trigger};
use sorter_traits::{Channel, EncoderEdge, HwResult, OutletActuator, SensorBank};

use crate::error::{HwError, Result};
use crate::util::{QuadratureLevels, SERVO_PERIOD, servo_pulse};

/// Presence sensors on plain input pins.
pub struct GpioSensorBank {
    pins: Vec<InputPin>,
    active_low: bool,
}

impl GpioSensorBank {
    /// `active_low`: the sensor pulls its line low while an object is present.
    pub fn new(pins: &[u8], active_low: bool) -> Result<Self> {
        let gpio = Gpio::new()?;
        let pins = pins
            .iter()
            .map(|&p| gpio.get(p).map(|pin| pin.into_input_pullup()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        tracing::info!(channels = pins.len(), active_low, "sensor bank ready");
        Ok(Self { pins, active_low })
    }
}

impl SensorBank for GpioSensorBank {
    fn channels(&self) -> usize {
        self.pins.len()
    }

    fn read_presence(&mut self, out: &mut [bool]) -> HwResult<()> {
        for (slot, pin) in out.iter_mut().zip(&self.pins) {
            *slot = pin.is_high() != self.active_low;
        }
        Ok(())
    }
}

/// Outlet flaps driven by hobby servos using rppal's software PWM.
pub struct ServoOutlets {
    pins: Vec<OutputPin>,
}

impl ServoOutlets {
    pub fn new(pins: &[u8]) -> Result<Self> {
        let gpio = Gpio::new()?;
        let pins = pins
            .iter()
            .map(|&p| gpio.get(p).map(|pin| pin.into_output_low()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        tracing::info!(outlets = pins.len(), "servo outlets ready");
        Ok(Self { pins })
    }
}

impl OutletActuator for ServoOutlets {
    fn set_outlet_angle(&mut self, outlet: usize, angle: u8) -> HwResult<()> {
        let pin = self
            .pins
            .get_mut(outlet)
            .ok_or(HwError::UnknownOutlet(outlet))?;
        let pulse = servo_pulse(angle)?;
        pin.set_pwm(SERVO_PERIOD, pulse).map_err(HwError::from)?;
        Ok(())
    }
}

/// How long one poll waits before rechecking the stop flag.
const POLL_TIMEOUT: Duration = Duration::from_millis(50);

/// Encoder pins watched by a dedicated polling thread. Dropping it stops the
/// thread and clears the pin interrupts.
pub struct EncoderInterrupts {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl EncoderInterrupts {
    /// Watch both quadrature channels (both edges) and, when given, the index
    /// pin (rising edge). `on_edge` runs on the polling thread only.
    pub fn attach<F>(pin_a: u8, pin_b: u8, pin_index: Option<u8>, on_edge: F) -> Result<Self>
    where
        F: Fn(EncoderEdge) + Send + 'static,
    {
        let gpio = Gpio::new()?;
        let mut a = gpio.get(pin_a)?.into_input_pullup();
        let mut b = gpio.get(pin_b)?.into_input_pullup();
        a.set_interrupt(Trigger::Both)?;
        b.set_interrupt(Trigger::Both)?;
        let index = match pin_index {
            Some(p) => {
                let mut z = gpio.get(p)?.into_input_pullup();
                z.set_interrupt(Trigger::RisingEdge)?;
                Some(z)
            }
            None => None,
        };

        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let thread = std::thread::Builder::new()
            .name("encoder-poll".into())
            .spawn(move || poll_loop(&gpio, a, b, index, &flag, &on_edge))?;

        tracing::info!(pin_a, pin_b, index = ?pin_index, "encoder interrupts attached");
        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }
}

fn poll_loop<F>(
    gpio: &Gpio,
    mut a: InputPin,
    mut b: InputPin,
    mut index: Option<InputPin>,
    stop: &AtomicBool,
    on_edge: &F,
) where
    F: Fn(EncoderEdge),
{
    let mut levels = QuadratureLevels::new(a.is_high(), b.is_high());
    let mut errors: u64 = 0;
    {
        let mut watched: Vec<&InputPin> = vec![&a, &b];
        if let Some(z) = index.as_ref() {
            watched.push(z);
        }
        let (pa, pb) = (a.pin(), b.pin());
        while !stop.load(Ordering::Acquire) {
            match gpio.poll_interrupts(&watched, false, Some(POLL_TIMEOUT)) {
                Ok(Some((pin, level))) => {
                    let high = level == Level::High;
                    let edge = if pin.pin() == pa {
                        levels.on_pin(Channel::A, high)
                    } else if pin.pin() == pb {
                        levels.on_pin(Channel::B, high)
                    } else {
                        EncoderEdge::Index
                    };
                    on_edge(edge);
                }
                Ok(None) => {}
                Err(e) => {
                    errors += 1;
                    if errors == 1 {
                        tracing::warn!(error = %e, "encoder poll failed");
                    }
                    std::thread::sleep(POLL_TIMEOUT);
                }
            }
        }
    }
    let _ = a.clear_interrupt();
    let _ = b.clear_interrupt();
    if let Some(z) = index.as_mut() {
        let _ = z.clear_interrupt();
    }
    tracing::debug!(errors, "encoder interrupts detached");
}

impl Drop for EncoderInterrupts {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
    }
}
