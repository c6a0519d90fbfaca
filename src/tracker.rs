//! Raw evdev axis tracking for pen tablets and relative mice.
//!
//! Both trackers only fold events into state; opening and polling devices is
//! done in `input::device`.

use serde::Deserialize;

use crate::input::DeviceEvent;

/// Raw axis maxima reported by the tablet. Minimums are assumed to be zero
/// except for tilt, which is centered.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct TabletRanges {
    pub x_max: i32,
    pub y_max: i32,
    pub pressure_max: i32,
    /// Tilt is reported in [-tilt_max, tilt_max] and mapped to degrees.
    pub tilt_max: i32,
    pub tilt_degrees: f64,
    pub rotation_max: i32,
}

impl Default for TabletRanges {
    fn default() -> Self {
        Self {
            x_max: 4096,
            y_max: 4096,
            pressure_max: 1023,
            tilt_max: 64,
            tilt_degrees: 64.0,
            rotation_max: 360,
        }
    }
}

#[derive(Debug)]
pub struct PenTracker {
    ranges: TabletRanges,
    width_px: f64,
    height_px: f64,
    x_norm: f64,
    y_norm: f64,
    pressure: Option<f64>,
    tilt: (Option<f64>, Option<f64>),
    rotation: Option<f64>,
    // no event until both axes have reported once
    seen_x: bool,
    seen_y: bool,
    dirty: bool,
}

impl PenTracker {
    pub fn new(ranges: TabletRanges, width_px: f64, height_px: f64) -> Self {
        Self {
            ranges,
            width_px,
            height_px,
            x_norm: 0.0,
            y_norm: 0.0,
            pressure: None,
            tilt: (None, None),
            rotation: None,
            seen_x: false,
            seen_y: false,
            dirty: false,
        }
    }

    fn norm(raw: i32, max: i32) -> f64 {
        (raw as f64 / max.max(1) as f64).clamp(0.0, 1.0)
    }

    pub fn on_pos_x(&mut self, raw: i32) {
        self.x_norm = Self::norm(raw, self.ranges.x_max);
        self.seen_x = true;
        self.dirty = true;
    }

    pub fn on_pos_y(&mut self, raw: i32) {
        self.y_norm = Self::norm(raw, self.ranges.y_max);
        self.seen_y = true;
        self.dirty = true;
    }

    pub fn on_pressure(&mut self, raw: i32) {
        self.pressure = Some(Self::norm(raw, self.ranges.pressure_max));
        self.dirty = true;
    }

    fn tilt_deg(&self, raw: i32) -> f64 {
        let max = self.ranges.tilt_max.max(1) as f64;
        (raw as f64 / max).clamp(-1.0, 1.0) * self.ranges.tilt_degrees
    }

    pub fn on_tilt_x(&mut self, raw: i32) {
        self.tilt.0 = Some(self.tilt_deg(raw));
        self.dirty = true;
    }

    pub fn on_tilt_y(&mut self, raw: i32) {
        self.tilt.1 = Some(self.tilt_deg(raw));
        self.dirty = true;
    }

    pub fn on_rotation(&mut self, raw: i32) {
        self.rotation = Some(Self::norm(raw, self.ranges.rotation_max) * 360.0);
        self.dirty = true;
    }

    /// Closes an evdev frame. Returns an event when the frame changed
    /// something and the position baseline exists.
    pub fn on_syn_report(&mut self, timestamp_ms: Option<f64>) -> Option<DeviceEvent> {
        if !(self.dirty && self.seen_x && self.seen_y) {
            return None;
        }
        self.dirty = false;
        let tilt = match self.tilt {
            (Some(x), Some(y)) => Some((x, y)),
            (Some(x), None) => Some((x, 0.0)),
            (None, Some(y)) => Some((0.0, y)),
            (None, None) => None,
        };
        Some(DeviceEvent {
            x: self.x_norm * self.width_px,
            y: self.y_norm * self.height_px,
            pressure: self.pressure,
            tilt,
            rotation: self.rotation,
            timestamp_ms,
        })
    }
}

/// Integrates relative motion into an absolute cursor clamped to the window.
#[derive(Debug)]
pub struct CursorTracker {
    x: f64,
    y: f64,
    width_px: f64,
    height_px: f64,
}

impl CursorTracker {
    pub fn new(width_px: f64, height_px: f64) -> Self {
        Self {
            x: width_px / 2.0,
            y: height_px / 2.0,
            width_px,
            height_px,
        }
    }

    pub fn on_rel_x(&mut self, dx: i32) {
        self.x = (self.x + dx as f64).clamp(0.0, self.width_px);
    }

    pub fn on_rel_y(&mut self, dy: i32) {
        self.y = (self.y + dy as f64).clamp(0.0, self.height_px);
    }

    pub fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }
}
