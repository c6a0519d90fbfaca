//! Pointer input: the collaborator the producer samples from.

mod device;
mod script;

pub use device::{DeviceInfo, DeviceKind, EvdevInput, discover_pointers};
pub use script::{Keyframe, ScriptedInput, TraceDevice, TraceScript};

use serde::{Deserialize, Serialize};

/// One report from a precision device, already in device pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceEvent {
    pub x: f64,
    pub y: f64,
    pub pressure: Option<f64>,
    /// Degrees.
    pub tilt: Option<(f64, f64)>,
    /// Degrees.
    pub rotation: Option<f64>,
    /// Device-reported time in milliseconds.
    pub timestamp_ms: Option<f64>,
}

/// A pointer the engine can sample. Cursor polling is the fallback; once a
/// device event has been seen the producer prefers device data.
pub trait InputSource: Send {
    /// Called before each trial leaves Idle.
    fn rearm(&mut self) {}

    /// Current cursor position in device pixels.
    fn cursor(&mut self) -> Option<(f64, f64)>;

    /// Device events that arrived since the previous call, oldest first.
    fn device_events(&mut self) -> Vec<DeviceEvent>;
}

impl<T: InputSource + ?Sized> InputSource for Box<T> {
    fn rearm(&mut self) {
        (**self).rearm()
    }

    fn cursor(&mut self) -> Option<(f64, f64)> {
        (**self).cursor()
    }

    fn device_events(&mut self) -> Vec<DeviceEvent> {
        (**self).device_events()
    }
}
