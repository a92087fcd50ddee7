//! Test and helper devices for sorter_core

use std::sync::{Arc, Mutex};

use sorter_traits::{HwResult, OutletActuator, SensorBank};

/// An actuator that accepts and forgets every command.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullActuator;

impl OutletActuator for NullActuator {
    fn set_outlet_angle(&mut self, _outlet: usize, _angle: u8) -> HwResult<()> {
        Ok(())
    }
}

/// A sensor bank whose presence levels are set from outside, e.g. by a test
/// between encoder edges. Clones share the same levels.
#[derive(Debug, Clone)]
pub struct ScriptedSensors {
    levels: Arc<Mutex<Vec<bool>>>,
}

impl ScriptedSensors {
    pub fn new(channels: usize) -> Self {
        Self {
            levels: Arc::new(Mutex::new(vec![false; channels])),
        }
    }

    /// Set every channel's level; extra values are ignored.
    pub fn set(&self, levels: &[bool]) {
        if let Ok(mut cur) = self.levels.lock() {
            for (dst, src) in cur.iter_mut().zip(levels) {
                *dst = *src;
            }
        }
    }

    pub fn clear(&self) {
        if let Ok(mut cur) = self.levels.lock() {
            cur.iter_mut().for_each(|l| *l = false);
        }
    }
}

impl SensorBank for ScriptedSensors {
    fn channels(&self) -> usize {
        self.levels.lock().map(|l| l.len()).unwrap_or(0)
    }

    fn read_presence(&mut self, out: &mut [bool]) -> HwResult<()> {
        let cur = self
            .levels
            .lock()
            .map_err(|_| std::io::Error::other("sensor levels poisoned"))?;
        for (dst, src) in out.iter_mut().zip(cur.iter()) {
            *dst = *src;
        }
        Ok(())
    }
}

/// Records every `(outlet, angle)` command. Clones share the log.
#[derive(Debug, Clone, Default)]
pub struct RecordingActuator {
    log: Arc<Mutex<Vec<(usize, u8)>>>,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<(usize, u8)> {
        self.log.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn take(&self) -> Vec<(usize, u8)> {
        self.log
            .lock()
            .map(|mut l| std::mem::take(&mut *l))
            .unwrap_or_default()
    }
}

impl OutletActuator for RecordingActuator {
    fn set_outlet_angle(&mut self, outlet: usize, angle: u8) -> HwResult<()> {
        self.log
            .lock()
            .map_err(|_| std::io::Error::other("command log poisoned"))?
            .push((outlet, angle));
        Ok(())
    }
}

/// An actuator whose every command fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingActuator;

impl OutletActuator for FailingActuator {
    fn set_outlet_angle(&mut self, outlet: usize, _angle: u8) -> HwResult<()> {
        Err(Box::new(std::io::Error::other(format!(
            "outlet {outlet} not responding"
        ))))
    }
}
