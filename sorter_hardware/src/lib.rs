//! Devices behind the `sorter_traits` seams.
//!
//! The simulation is always built; real GPIO devices need the `hardware`
//! feature on Linux.

pub mod error;
pub mod sim;
pub mod util;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;

pub use sim::{ConveyorPosition, Quadrature, SimulatedActuator, SimulatedConveyor, SimulatedSensorBank};

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub use gpio::{EncoderInterrupts, GpioSensorBank, ServoOutlets};

#[cfg(test)]
mod tests {
    use super::*;
    use sorter_traits::{OutletActuator, SensorBank};

    #[test]
    fn simulated_actuator_rejects_unknown_outlet() {
        let mut act = SimulatedActuator::new(2);
        act.set_outlet_angle(1, 90).unwrap();
        assert!(act.set_outlet_angle(2, 90).is_err());
        assert!(act.set_outlet_angle(0, 200).is_err());
        assert_eq!(act.angles(), vec![0, 90]);
    }

    #[test]
    fn sensors_idle_at_phase_zero() {
        let conveyor = SimulatedConveyor::new(200);
        let mut bank = SimulatedSensorBank::new(conveyor.position(), 200, vec![1.0; 3], 2);
        let mut out = [true; 3];
        bank.read_presence(&mut out).unwrap();
        assert_eq!(out, [false; 3]);
    }
}
