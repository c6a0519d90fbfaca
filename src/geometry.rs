//! Hit-testing for trial regions in device space.
//!
//! Every function here is pure. The consumer ORs the results into the trial
//! state. A region with a zero (or negative) extent never reports a hit.

use serde::{Deserialize, Serialize};

/// Which circle semantics a trial uses. Applied to both the point and the
/// swept test so they can never disagree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitModel {
    /// Normalized ellipse equation with independent x/y radii.
    #[default]
    Ellipse,
    /// Circle of radius `max(rx, ry)` around the center.
    Circumscribed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Source,
    Destination,
    Intermediate,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Circle {
    pub x: f64,
    pub y: f64,
    pub rx: f64,
    pub ry: f64,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
    /// Top-left corner in device pixels.
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    /// Per-frame motion for a renderer. Not used for hit-testing.
    pub velocity: Option<(f64, f64)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Shape {
    Circle(Circle),
    Rect(Rect),
}

impl Shape {
    pub fn contains(&self, p: (f64, f64), model: HitModel) -> bool {
        match self {
            Shape::Circle(c) => c.contains(p, model),
            Shape::Rect(r) => r.contains(p),
        }
    }

    pub fn crossed_by(&self, from: (f64, f64), to: (f64, f64), model: HitModel) -> bool {
        match self {
            Shape::Circle(c) => c.crossed_by(from, to, model),
            Shape::Rect(r) => r.crossed_by(from, to),
        }
    }

    /// Point test on `to`, plus the swept test from `from` when a previous
    /// sample exists.
    pub fn hit(&self, from: Option<(f64, f64)>, to: (f64, f64), model: HitModel) -> bool {
        self.contains(to, model) || from.is_some_and(|f| self.crossed_by(f, to, model))
    }
}

impl Circle {
    pub fn new(x: f64, y: f64, rx: f64, ry: f64, role: Role) -> Self {
        Self { x, y, rx, ry, role }
    }

    fn radii(&self, model: HitModel) -> Option<(f64, f64)> {
        if !(self.rx > 0.0 && self.ry > 0.0) {
            return None;
        }
        Some(match model {
            HitModel::Ellipse => (self.rx, self.ry),
            HitModel::Circumscribed => {
                let r = self.rx.max(self.ry);
                (r, r)
            }
        })
    }

    pub fn right_edge(&self) -> f64 {
        self.x + self.rx
    }

    pub fn contains(&self, p: (f64, f64), model: HitModel) -> bool {
        let Some((rx, ry)) = self.radii(model) else {
            return false;
        };
        let u = (p.0 - self.x) / rx;
        let v = (p.1 - self.y) / ry;
        u * u + v * v <= 1.0
    }

    /// Segment vs. boundary: substitutes `from + t * (to - from)` into the
    /// normalized equation and accepts a root in [0, 1].
    pub fn crossed_by(&self, from: (f64, f64), to: (f64, f64), model: HitModel) -> bool {
        let Some((rx, ry)) = self.radii(model) else {
            return false;
        };
        let u0 = (from.0 - self.x) / rx;
        let v0 = (from.1 - self.y) / ry;
        let du = (to.0 - from.0) / rx;
        let dv = (to.1 - from.1) / ry;

        let a = du * du + dv * dv;
        if a == 0.0 {
            return self.contains(from, model);
        }
        let b = 2.0 * (u0 * du + v0 * dv);
        let c = u0 * u0 + v0 * v0 - 1.0;

        let disc = b * b - 4.0 * a * c;
        if disc <= 0.0 {
            return false;
        }
        let sq = disc.sqrt();
        let t1 = (-b - sq) / (2.0 * a);
        let t2 = (-b + sq) / (2.0 * a);
        (0.0..=1.0).contains(&t1) || (0.0..=1.0).contains(&t2)
    }
}

impl Rect {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self {
            x,
            y,
            w,
            h,
            velocity: None,
        }
    }

    fn degenerate(&self) -> bool {
        !(self.w > 0.0 && self.h > 0.0)
    }

    pub fn contains(&self, p: (f64, f64)) -> bool {
        if self.degenerate() {
            return false;
        }
        p.0 >= self.x && p.0 <= self.x + self.w && p.1 >= self.y && p.1 <= self.y + self.h
    }

    pub fn crossed_by(&self, from: (f64, f64), to: (f64, f64)) -> bool {
        if self.degenerate() {
            return false;
        }
        let (x0, y0, x1, y1) = (self.x, self.y, self.x + self.w, self.y + self.h);
        let edges = [
            ((x0, y0), (x1, y0)),
            ((x1, y0), (x1, y1)),
            ((x1, y1), (x0, y1)),
            ((x0, y1), (x0, y0)),
        ];
        edges
            .iter()
            .any(|&(a, b)| segments_intersect(from, to, a, b))
    }
}

fn orientation(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> f64 {
    (b.0 - a.0) * (c.1 - a.1) - (b.1 - a.1) * (c.0 - a.0)
}

/// General-position test only: touching or collinear segments report no
/// intersection.
fn segments_intersect(p1: (f64, f64), p2: (f64, f64), q1: (f64, f64), q2: (f64, f64)) -> bool {
    let d1 = orientation(q1, q2, p1);
    let d2 = orientation(q1, q2, p2);
    let d3 = orientation(p1, p2, q1);
    let d4 = orientation(p1, p2, q2);
    d1 * d2 < 0.0 && d3 * d4 < 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn circle(rx: f64, ry: f64) -> Circle {
        Circle::new(100.0, 100.0, rx, ry, Role::Intermediate)
    }

    #[test]
    fn ellipse_uses_independent_radii() {
        let c = circle(40.0, 10.0);
        assert!(c.contains((135.0, 100.0), HitModel::Ellipse));
        assert!(!c.contains((100.0, 115.0), HitModel::Ellipse));
        // the legacy approximation accepts it
        assert!(c.contains((100.0, 115.0), HitModel::Circumscribed));
    }

    #[test]
    fn true_circle_is_reflection_invariant() {
        let c = circle(25.0, 25.0);
        for &(dx, dy) in &[(10.0, 20.0), (24.9, 0.0), (18.0, 18.0), (30.0, 1.0)] {
            for model in [HitModel::Ellipse, HitModel::Circumscribed] {
                let a = c.contains((100.0 + dx, 100.0 + dy), model);
                let b = c.contains((100.0 - dx, 100.0 + dy), model);
                let d = c.contains((100.0 + dx, 100.0 - dy), model);
                assert_eq!(a, b, "x reflection of ({dx},{dy})");
                assert_eq!(a, d, "y reflection of ({dx},{dy})");
            }
        }
    }

    #[test]
    fn boundary_point_is_inside() {
        let c = circle(10.0, 10.0);
        assert!(c.contains((110.0, 100.0), HitModel::Ellipse));
    }

    #[test]
    fn swept_catches_straddling_samples() {
        let c = circle(5.0, 5.0);
        let from = (80.0, 101.0);
        let to = (120.0, 99.0);
        assert!(!c.contains(from, HitModel::Ellipse));
        assert!(!c.contains(to, HitModel::Ellipse));
        assert!(c.crossed_by(from, to, HitModel::Ellipse));
    }

    #[test]
    fn swept_misses_when_segment_stops_short() {
        let c = circle(5.0, 5.0);
        assert!(!c.crossed_by((60.0, 100.0), (90.0, 100.0), HitModel::Ellipse));
        assert!(!c.crossed_by((80.0, 120.0), (120.0, 120.0), HitModel::Ellipse));
    }

    #[test]
    fn degenerate_segment_matches_point_test() {
        let c = circle(12.0, 7.0);
        for &p in &[(100.0, 100.0), (111.0, 100.0), (100.0, 108.0), (150.0, 150.0)] {
            for model in [HitModel::Ellipse, HitModel::Circumscribed] {
                assert_eq!(c.crossed_by(p, p, model), c.contains(p, model), "{p:?}");
            }
        }
    }

    #[test]
    fn zero_radius_never_hits() {
        let c = circle(0.0, 10.0);
        assert!(!c.contains((100.0, 100.0), HitModel::Ellipse));
        assert!(!c.contains((100.0, 100.0), HitModel::Circumscribed));
        assert!(!c.crossed_by((0.0, 100.0), (200.0, 100.0), HitModel::Ellipse));
    }

    #[test]
    fn rect_point_test_is_inclusive() {
        let r = Rect::new(10.0, 10.0, 20.0, 5.0);
        assert!(r.contains((10.0, 10.0)));
        assert!(r.contains((30.0, 15.0)));
        assert!(!r.contains((30.1, 15.0)));
    }

    #[test]
    fn rect_swept_crosses_through() {
        let r = Rect::new(10.0, 10.0, 4.0, 4.0);
        assert!(r.crossed_by((0.0, 12.0), (20.0, 12.0)));
        assert!(!r.crossed_by((0.0, 20.0), (20.0, 20.0)));
    }

    #[test]
    fn rect_collinear_edge_is_not_a_hit() {
        let r = Rect::new(10.0, 10.0, 4.0, 4.0);
        assert!(!r.crossed_by((0.0, 10.0), (20.0, 10.0)));
    }

    #[test]
    fn degenerate_rect_never_hits() {
        let r = Rect::new(10.0, 10.0, 0.0, 4.0);
        assert!(!r.contains((10.0, 11.0)));
        assert!(!r.crossed_by((0.0, 12.0), (20.0, 12.0)));
    }

    #[test]
    fn shape_hit_combines_point_and_swept() {
        let s = Shape::Circle(circle(3.0, 3.0));
        assert!(!s.hit(None, (90.0, 100.0), HitModel::Ellipse));
        assert!(s.hit(Some((90.0, 100.0)), (110.0, 100.0), HitModel::Ellipse));
        assert!(s.hit(None, (101.0, 100.0), HitModel::Ellipse));
    }
}
