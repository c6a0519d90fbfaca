//! Physical (centimeter) <-> device (pixel) coordinate transform.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Supplies the display the trial is shown on.
pub trait ScreenGeometry {
    /// Resolution in device pixels.
    fn resolution_px(&self) -> (u32, u32);
    /// Physical size in millimeters. Zero means "unknown".
    fn physical_size_mm(&self) -> (f64, f64);
}

/// Fixed geometry, typically read from settings.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct StaticScreen {
    pub width_px: u32,
    pub height_px: u32,
    pub width_mm: f64,
    pub height_mm: f64,
}

impl ScreenGeometry for StaticScreen {
    fn resolution_px(&self) -> (u32, u32) {
        (self.width_px, self.height_px)
    }

    fn physical_size_mm(&self) -> (f64, f64) {
        (self.width_mm, self.height_mm)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CoordinateFrame {
    /// Pixels per centimeter, per axis.
    pub scale_x: f64,
    pub scale_y: f64,
    pub width_px: f64,
    pub height_px: f64,
    pub origin_x_cm: f64,
    pub origin_y_cm: f64,
}

impl CoordinateFrame {
    pub fn new(screen: &dyn ScreenGeometry, origin_cm: (f64, f64)) -> Result<Self> {
        let (w_px, h_px) = screen.resolution_px();
        let (w_mm, h_mm) = screen.physical_size_mm();

        if w_px == 0 || h_px == 0 {
            return Err(Error::config(format!(
                "screen resolution unavailable ({w_px}x{h_px} px)"
            )));
        }
        let usable = |v: f64| v.is_finite() && v > 0.0;
        if !usable(w_mm) || !usable(h_mm) {
            return Err(Error::config(format!(
                "physical screen size unavailable ({w_mm}x{h_mm} mm)"
            )));
        }
        if !origin_cm.0.is_finite() || !origin_cm.1.is_finite() {
            return Err(Error::config("origin offset must be finite"));
        }

        let (w_cm, h_cm) = (w_mm / 10.0, h_mm / 10.0);
        Ok(Self {
            scale_x: w_px as f64 / w_cm,
            scale_y: h_px as f64 / h_cm,
            width_px: w_px as f64,
            height_px: h_px as f64,
            origin_x_cm: origin_cm.0,
            origin_y_cm: origin_cm.1,
        })
    }

    pub fn to_device(&self, x_cm: f64, y_cm: f64) -> (f64, f64) {
        let px = self.origin_x_cm * self.scale_x + x_cm * self.scale_x;
        let py = (self.height_px - self.origin_y_cm * self.scale_y) - y_cm * self.scale_y;
        (px, py)
    }

    pub fn to_physical(&self, px: f64, py: f64) -> (f64, f64) {
        let x_cm = (px - self.origin_x_cm * self.scale_x) / self.scale_x;
        let y_cm = ((self.height_px - self.origin_y_cm * self.scale_y) - py) / self.scale_y;
        (x_cm, y_cm)
    }

    /// Converts a physical length along x to device pixels.
    pub fn len_x(&self, cm: f64) -> f64 {
        cm * self.scale_x
    }

    pub fn len_y(&self, cm: f64) -> f64 {
        cm * self.scale_y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn screen() -> StaticScreen {
        StaticScreen {
            width_px: 1920,
            height_px: 1080,
            width_mm: 527.0,
            height_mm: 296.0,
        }
    }

    #[test]
    fn round_trip_is_identity() {
        let f = CoordinateFrame::new(&screen(), (3.5, 7.25)).unwrap();
        for &(x, y) in &[(0.0, 0.0), (10.0, -2.5), (-3.5, 12.0), (48.1, 21.3)] {
            let (px, py) = f.to_device(x, y);
            let (bx, by) = f.to_physical(px, py);
            assert!((bx - x).abs() < 1e-9, "x {x} -> {bx}");
            assert!((by - y).abs() < 1e-9, "y {y} -> {by}");
        }
    }

    #[test]
    fn vertical_axis_is_flipped() {
        let f = CoordinateFrame::new(&screen(), (0.0, 0.0)).unwrap();
        let (_, low) = f.to_device(0.0, 1.0);
        let (_, high) = f.to_device(0.0, 5.0);
        assert!(high < low, "physical up must be device up");
        assert_eq!(f.to_device(0.0, 0.0).1, 1080.0);
    }

    #[test]
    fn origin_offset_shifts_device_position() {
        let s = StaticScreen {
            width_px: 1000,
            height_px: 800,
            width_mm: 500.0,
            height_mm: 400.0,
        };
        let f = CoordinateFrame::new(&s, (5.0, 20.0)).unwrap();
        assert_eq!(f.scale_x, 20.0);
        assert_eq!(f.to_device(0.0, 0.0), (100.0, 400.0));
        assert_eq!(f.to_device(10.0, 0.0), (300.0, 400.0));
    }

    #[test]
    fn missing_physical_size_is_a_configuration_error() {
        let mut s = screen();
        s.width_mm = 0.0;
        let err = CoordinateFrame::new(&s, (0.0, 0.0)).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn zero_resolution_is_rejected() {
        let mut s = screen();
        s.height_px = 0;
        assert!(CoordinateFrame::new(&s, (0.0, 0.0)).is_err());
    }
}
