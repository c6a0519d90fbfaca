//! Linux evdev pen tablets and mice.

use std::fs;
use std::time::UNIX_EPOCH;

use evdev::{AbsoluteAxisCode, Device, EventType, RelativeAxisCode, SynchronizationCode};
use log::{info, warn};
use serde::Serialize;

use super::{DeviceEvent, InputSource};
use crate::error::{Error, Result};
use crate::tracker::{CursorTracker, PenTracker, TabletRanges};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Tablet,
    Mouse,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub kind: DeviceKind,
}

fn classify(dev: &Device) -> Option<DeviceKind> {
    let events = dev.supported_events();
    if events.contains(EventType::ABSOLUTE) {
        let is_pen = dev.supported_absolute_axes().is_some_and(|a| {
            a.contains(AbsoluteAxisCode::ABS_X)
                && a.contains(AbsoluteAxisCode::ABS_Y)
                && a.contains(AbsoluteAxisCode::ABS_PRESSURE)
        });
        if is_pen {
            return Some(DeviceKind::Tablet);
        }
    }
    if events.contains(EventType::RELATIVE) {
        let is_mouse = dev.supported_relative_axes().is_some_and(|a| {
            a.contains(RelativeAxisCode::REL_X) && a.contains(RelativeAxisCode::REL_Y)
        });
        if is_mouse {
            return Some(DeviceKind::Mouse);
        }
    }
    None
}

pub fn discover_pointers() -> Vec<DeviceInfo> {
    let mut out = vec![];
    if let Ok(rd) = fs::read_dir("/dev/input") {
        for e in rd.flatten() {
            let p = e.path();
            let is_event_node = p
                .file_name()
                .and_then(|s| s.to_str())
                .is_some_and(|s| s.starts_with("event"));
            if !is_event_node {
                continue;
            }
            if let Ok(dev) = Device::open(&p) {
                if let Some(kind) = classify(&dev) {
                    out.push(DeviceInfo {
                        path: p.display().to_string(),
                        name: dev.name().unwrap_or("unknown").to_string(),
                        kind,
                    });
                }
            }
        }
    }
    out.sort_by(|a, b| a.path.cmp(&b.path));
    out
}

/// Reads every detected tablet and mouse without blocking.
pub struct EvdevInput {
    tablets: Vec<Device>,
    mice: Vec<Device>,
    pen: PenTracker,
    cursor: CursorTracker,
}

impl EvdevInput {
    pub fn open(ranges: TabletRanges, width_px: f64, height_px: f64) -> Result<Self> {
        let mut tablets = vec![];
        let mut mice = vec![];
        for d in discover_pointers() {
            match Device::open(&d.path) {
                Ok(dev) => {
                    if let Err(e) = dev.set_nonblocking(true) {
                        warn!("failed to make {} non-blocking: {e}", d.path);
                        continue;
                    }
                    info!("input: using {:?} '{}' ({})", d.kind, d.name, d.path);
                    match d.kind {
                        DeviceKind::Tablet => tablets.push(dev),
                        DeviceKind::Mouse => mice.push(dev),
                    }
                }
                Err(e) => warn!("failed to open {}: {e}", d.path),
            }
        }
        if tablets.is_empty() && mice.is_empty() {
            return Err(Error::Input(
                "no pen tablet or mouse could be opened under /dev/input".into(),
            ));
        }
        Ok(Self {
            tablets,
            mice,
            pen: PenTracker::new(ranges, width_px, height_px),
            cursor: CursorTracker::new(width_px, height_px),
        })
    }
}

impl InputSource for EvdevInput {
    fn cursor(&mut self) -> Option<(f64, f64)> {
        for dev in self.mice.iter_mut() {
            if let Ok(events) = dev.fetch_events() {
                for ev in events {
                    if ev.event_type() != EventType::RELATIVE {
                        continue;
                    }
                    match ev.code() {
                        c if c == RelativeAxisCode::REL_X.0 => self.cursor.on_rel_x(ev.value()),
                        c if c == RelativeAxisCode::REL_Y.0 => self.cursor.on_rel_y(ev.value()),
                        _ => {}
                    }
                }
            }
        }
        if self.mice.is_empty() {
            None
        } else {
            Some(self.cursor.position())
        }
    }

    fn device_events(&mut self) -> Vec<DeviceEvent> {
        let mut out = vec![];
        for dev in self.tablets.iter_mut() {
            let Ok(events) = dev.fetch_events() else {
                continue;
            };
            for ev in events {
                if ev.event_type() == EventType::ABSOLUTE {
                    match ev.code() {
                        c if c == AbsoluteAxisCode::ABS_X.0 => self.pen.on_pos_x(ev.value()),
                        c if c == AbsoluteAxisCode::ABS_Y.0 => self.pen.on_pos_y(ev.value()),
                        c if c == AbsoluteAxisCode::ABS_PRESSURE.0 => {
                            self.pen.on_pressure(ev.value())
                        }
                        c if c == AbsoluteAxisCode::ABS_TILT_X.0 => self.pen.on_tilt_x(ev.value()),
                        c if c == AbsoluteAxisCode::ABS_TILT_Y.0 => self.pen.on_tilt_y(ev.value()),
                        c if c == AbsoluteAxisCode::ABS_Z.0 => self.pen.on_rotation(ev.value()),
                        _ => {}
                    }
                } else if ev.event_type() == EventType::SYNCHRONIZATION
                    && ev.code() == SynchronizationCode::SYN_REPORT.0
                {
                    let ts = ev
                        .timestamp()
                        .duration_since(UNIX_EPOCH)
                        .ok()
                        .map(|d| d.as_secs_f64() * 1000.0);
                    if let Some(e) = self.pen.on_syn_report(ts) {
                        out.push(e);
                    }
                }
            }
        }
        out
    }
}
