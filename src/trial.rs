//! Trial configuration: parsing a numeric input row and building the
//! device-space regions for one trial.

use std::time::Duration;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::frame::CoordinateFrame;
use crate::geometry::{Circle, HitModel, Rect, Role};

const CIRCLE_FIELDS: usize = 3;

/// Physical circle as configured, in centimeters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CircleSpec {
    pub x: f64,
    pub y: f64,
    pub r: f64,
}

/// Physical rectangle anchored at its lower-left corner, in centimeters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RectSpec {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub velocity: Option<(f64, f64)>,
}

/// One parsed input row, still in physical units.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialRow {
    pub time_limit_ms: u64,
    pub rate_ms: u64,
    pub source: CircleSpec,
    pub dest: CircleSpec,
    pub circles: Vec<CircleSpec>,
    pub rects: Vec<RectSpec>,
}

struct Fields<'a> {
    data: &'a [f64],
    pos: usize,
}

impl<'a> Fields<'a> {
    fn take(&mut self, n: usize, what: &str) -> Result<&'a [f64]> {
        let end = self.pos + n;
        if end > self.data.len() {
            return Err(Error::config(format!(
                "row ended early: {what} needs fields {}..{} but the row has {}",
                self.pos,
                end,
                self.data.len()
            )));
        }
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    /// Reads a region count and checks that the row still holds `width`
    /// fields for each region.
    fn count(&mut self, what: &str, width: usize) -> Result<usize> {
        let v = self.take(1, what)?[0];
        let n = whole(v, what)? as usize;
        let left = self.data.len() - self.pos;
        match n.checked_mul(width) {
            Some(need) if need <= left => Ok(n),
            _ => Err(Error::config(format!(
                "{what} is {n} but only {left} fields remain"
            ))),
        }
    }
}

fn whole(v: f64, what: &str) -> Result<u64> {
    if v < 0.0 || v.fract() != 0.0 || v > u32::MAX as f64 {
        return Err(Error::config(format!(
            "{what} must be a non-negative integer, got {v}"
        )));
    }
    Ok(v as u64)
}

fn circle(f: &[f64], what: &str) -> Result<CircleSpec> {
    if f[2] < 0.0 {
        return Err(Error::config(format!("{what} radius is negative ({})", f[2])));
    }
    Ok(CircleSpec {
        x: f[0],
        y: f[1],
        r: f[2],
    })
}

impl TrialRow {
    /// Field order: time limit, rate, source (x,y,r), destination (x,y,r),
    /// circle count, circles, rectangle count, rectangles (x,y,w,h and, when
    /// `rect_velocity` is set, dx,dy).
    pub fn parse(data: &[f64], rect_velocity: bool) -> Result<Self> {
        if let Some(i) = data.iter().position(|v| !v.is_finite()) {
            return Err(Error::config(format!("field {i} is not a finite number")));
        }
        let mut f = Fields { data, pos: 0 };

        let time_limit_ms = whole(f.take(1, "time limit")?[0], "time limit")?;
        let rate_ms = whole(f.take(1, "sample rate")?[0], "sample rate")?;
        if time_limit_ms == 0 {
            return Err(Error::config("time limit must be positive"));
        }
        if rate_ms == 0 {
            return Err(Error::config("sample rate must be positive"));
        }

        let source = circle(f.take(CIRCLE_FIELDS, "source")?, "source")?;
        let dest = circle(f.take(CIRCLE_FIELDS, "destination")?, "destination")?;

        let n = f.count("intermediate count", CIRCLE_FIELDS)?;
        let mut circles = Vec::with_capacity(n);
        for i in 0..n {
            let what = format!("intermediate {}", i + 1);
            circles.push(circle(f.take(CIRCLE_FIELDS, &what)?, &what)?);
        }

        let rect_fields = if rect_velocity { 6 } else { 4 };
        let m = f.count("obstacle count", rect_fields)?;
        let mut rects = Vec::with_capacity(m);
        for i in 0..m {
            let what = format!("obstacle {}", i + 1);
            let r = f.take(rect_fields, &what)?;
            if r[2] < 0.0 || r[3] < 0.0 {
                return Err(Error::config(format!("{what} has a negative extent")));
            }
            rects.push(RectSpec {
                x: r[0],
                y: r[1],
                w: r[2],
                h: r[3],
                velocity: rect_velocity.then(|| (r[4], r[5])),
            });
        }

        if f.pos != data.len() {
            return Err(Error::config(format!(
                "row has {} trailing fields",
                data.len() - f.pos
            )));
        }

        Ok(Self {
            time_limit_ms,
            rate_ms,
            source,
            dest,
            circles,
            rects,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrialOptions {
    pub passing_offset_cm: f64,
    pub hit_model: HitModel,
}

impl Default for TrialOptions {
    fn default() -> Self {
        Self {
            passing_offset_cm: 1.0,
            hit_model: HitModel::Ellipse,
        }
    }
}

/// Everything the engine needs to run one trial, in device space.
#[derive(Debug, Clone, Serialize)]
pub struct TrialConfiguration {
    pub time_limit: Duration,
    pub cadence: Duration,
    pub passing_offset_px: f64,
    pub hit_model: HitModel,
    pub source: Circle,
    pub dest: Circle,
    pub circles: Vec<Circle>,
    pub rects: Vec<Rect>,
    pub frame: CoordinateFrame,
}

fn device_circle(frame: &CoordinateFrame, c: &CircleSpec, role: Role) -> Circle {
    let (x, y) = frame.to_device(c.x, c.y);
    Circle::new(x, y, frame.len_x(c.r), frame.len_y(c.r), role)
}

fn device_rect(frame: &CoordinateFrame, r: &RectSpec) -> Rect {
    let (x, y) = frame.to_device(r.x, r.y + r.h);
    Rect {
        x,
        y,
        w: frame.len_x(r.w),
        h: frame.len_y(r.h),
        velocity: r.velocity,
    }
}

impl TrialConfiguration {
    pub fn build(row: &TrialRow, frame: CoordinateFrame, opts: TrialOptions) -> Result<Self> {
        if !(opts.passing_offset_cm.is_finite() && opts.passing_offset_cm >= 0.0) {
            return Err(Error::config("passing offset must be a non-negative distance"));
        }
        Ok(Self {
            time_limit: Duration::from_millis(row.time_limit_ms),
            cadence: Duration::from_millis(row.rate_ms),
            passing_offset_px: frame.len_x(opts.passing_offset_cm),
            hit_model: opts.hit_model,
            source: device_circle(&frame, &row.source, Role::Source),
            dest: device_circle(&frame, &row.dest, Role::Destination),
            circles: row
                .circles
                .iter()
                .map(|c| device_circle(&frame, c, Role::Intermediate))
                .collect(),
            rects: row.rects.iter().map(|r| device_rect(&frame, r)).collect(),
            frame,
        })
    }

    pub fn from_fields(
        data: &[f64],
        rect_velocity: bool,
        frame: CoordinateFrame,
        opts: TrialOptions,
    ) -> Result<Self> {
        let row = TrialRow::parse(data, rect_velocity)?;
        Self::build(&row, frame, opts)
    }

    /// Device x beyond which an unreached destination counts as passed.
    pub fn passing_line_px(&self) -> f64 {
        self.dest.right_edge() + self.passing_offset_px
    }
}
