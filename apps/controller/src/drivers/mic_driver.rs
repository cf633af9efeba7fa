// [apps/controller/src/drivers/mic_driver.rs]
/*!
 * APARATO: MIC DRIVER CONTRACT
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTERS (ESTRATO L6)
 * RESPONSABILIDAD: LECTURA DE REGISTROS DEL ARREGLO DE MICRÓFONOS
 */

use std::collections::VecDeque;
use std::sync::Mutex;

/// Firmware-register-level access to a circular mic array. If the device
/// is absent at init, the owning module marks itself unavailable and the
/// rest of the system continues — this trait itself never encodes that
/// policy, it only exposes the raw reads.
pub trait MicDriver: Send + Sync {
    fn read_speech_detected(&self) -> bool;
    fn read_doa(&self) -> u16;
    fn read_gain(&self) -> f32;
    fn set_param(&self, name: &str, value: f32);
}

/// A scripted driver for tests and `test://`-style local runs: replays a
/// fixed queue of `(speech_detected, doa, gain)` ticks, repeating the last
/// tick forever once the queue is exhausted.
pub struct ScriptedMicDriver {
    script: Mutex<VecDeque<(bool, u16, f32)>>,
    last: Mutex<(bool, u16, f32)>,
}

impl ScriptedMicDriver {
    pub fn new(ticks: Vec<(bool, u16, f32)>) -> Self {
        Self {
            script: Mutex::new(ticks.into()),
            last: Mutex::new((false, 0, 0.0)),
        }
    }

    fn advance(&self) -> (bool, u16, f32) {
        let mut script = self.script.lock().unwrap();
        let tick = script.pop_front();
        drop(script);
        let mut last = self.last.lock().unwrap();
        if let Some(tick) = tick {
            *last = tick;
        }
        *last
    }
}

impl MicDriver for ScriptedMicDriver {
    fn read_speech_detected(&self) -> bool {
        self.advance().0
    }

    fn read_doa(&self) -> u16 {
        self.last.lock().unwrap().1
    }

    fn read_gain(&self) -> f32 {
        self.last.lock().unwrap().2
    }

    fn set_param(&self, _name: &str, _value: f32) {}
}
