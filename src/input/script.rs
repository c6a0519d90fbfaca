//! Keyframed pointer traces replayed against the engine clock.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{DeviceEvent, InputSource};
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::frame::CoordinateFrame;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceDevice {
    /// Positions are exposed through cursor polling.
    #[default]
    Cursor,
    /// Positions arrive as device events with pressure.
    Tablet,
}

/// A point on the trace, in physical centimeters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    pub t_ms: f64,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub pressure: Option<f64>,
}

impl Keyframe {
    pub fn new(t_ms: f64, x: f64, y: f64) -> Self {
        Self {
            t_ms,
            x,
            y,
            pressure: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceScript {
    #[serde(default)]
    pub device: TraceDevice,
    pub keyframes: Vec<Keyframe>,
}

impl TraceScript {
    pub fn load(path: &Path) -> Result<Self> {
        let txt = fs::read_to_string(path)?;
        let script: Self = serde_json::from_str(&txt)?;
        script.validate()?;
        Ok(script)
    }

    pub fn validate(&self) -> Result<()> {
        if self.keyframes.is_empty() {
            return Err(Error::config("trace has no keyframes"));
        }
        let ordered = self.keyframes.windows(2).all(|w| w[0].t_ms <= w[1].t_ms);
        if !ordered {
            return Err(Error::config("trace keyframes must be sorted by t_ms"));
        }
        Ok(())
    }

    /// Linear interpolation; holds the end points outside the keyframe span.
    /// An empty trace stays at the origin.
    pub fn at(&self, t_ms: f64) -> Keyframe {
        let ks = &self.keyframes;
        let Some(&first) = ks.first() else {
            return Keyframe::new(t_ms, 0.0, 0.0);
        };
        if t_ms <= first.t_ms {
            return Keyframe { t_ms, ..first };
        }
        for w in ks.windows(2) {
            let (a, b) = (w[0], w[1]);
            if t_ms <= b.t_ms {
                let span = b.t_ms - a.t_ms;
                let f = if span > 0.0 { (t_ms - a.t_ms) / span } else { 1.0 };
                let pressure = match (a.pressure, b.pressure) {
                    (Some(pa), Some(pb)) => Some(pa + (pb - pa) * f),
                    (p, None) | (None, p) => p,
                };
                return Keyframe {
                    t_ms,
                    x: a.x + (b.x - a.x) * f,
                    y: a.y + (b.y - a.y) * f,
                    pressure,
                };
            }
        }
        Keyframe {
            t_ms,
            ..ks[ks.len() - 1]
        }
    }
}

/// Replays a [`TraceScript`]. Script time starts at the first poll after
/// [`InputSource::rearm`].
pub struct ScriptedInput {
    script: TraceScript,
    frame: CoordinateFrame,
    clock: Arc<dyn Clock>,
    epoch: Option<Duration>,
    last_event_ms: Option<f64>,
}

impl ScriptedInput {
    pub fn new(script: TraceScript, frame: CoordinateFrame, clock: Arc<dyn Clock>) -> Result<Self> {
        script.validate()?;
        Ok(Self {
            script,
            frame,
            clock,
            epoch: None,
            last_event_ms: None,
        })
    }

    fn script_ms(&mut self) -> f64 {
        let now = self.clock.now();
        let epoch = *self.epoch.get_or_insert(now);
        now.saturating_sub(epoch).as_secs_f64() * 1000.0
    }

    fn device_point(&mut self) -> (Keyframe, (f64, f64)) {
        let t = self.script_ms();
        let k = self.script.at(t);
        let p = self.frame.to_device(k.x, k.y);
        (k, p)
    }
}

impl InputSource for ScriptedInput {
    fn rearm(&mut self) {
        self.epoch = None;
        self.last_event_ms = None;
    }

    fn cursor(&mut self) -> Option<(f64, f64)> {
        let (_, p) = self.device_point();
        Some(p)
    }

    fn device_events(&mut self) -> Vec<DeviceEvent> {
        if self.script.device != TraceDevice::Tablet {
            return vec![];
        }
        let (k, (x, y)) = self.device_point();
        // one report per distinct instant
        if self.last_event_ms == Some(k.t_ms) {
            return vec![];
        }
        self.last_event_ms = Some(k.t_ms);
        vec![DeviceEvent {
            x,
            y,
            pressure: Some(k.pressure.unwrap_or(1.0)),
            tilt: None,
            rotation: None,
            timestamp_ms: Some(k.t_ms),
        }]
    }
}
