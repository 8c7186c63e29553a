use serde::Serialize;

use crate::Point;

/// Cubic Bézier from `start` to `end`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CubicPath {
    pub start: Point,
    pub control1: Point,
    pub control2: Point,
    pub end: Point,
}

impl CubicPath {
    /// SVG path data, e.g. `M0.0,0.0 C50.0,0.0 50.0,20.0 100.0,20.0`.
    pub fn to_svg_path(&self) -> String {
        format!(
            "M{:.1},{:.1} C{:.1},{:.1} {:.1},{:.1} {:.1},{:.1}",
            self.start.x,
            self.start.y,
            self.control1.x,
            self.control1.y,
            self.control2.x,
            self.control2.y,
            self.end.x,
            self.end.y
        )
    }

    /// Point on the curve at parameter `t` in `[0, 1]`.
    pub fn point_at(&self, t: f32) -> Point {
        let t = t.clamp(0.0, 1.0);
        let u = 1.0 - t;
        let b0 = u * u * u;
        let b1 = 3.0 * u * u * t;
        let b2 = 3.0 * u * t * t;
        let b3 = t * t * t;
        Point {
            x: b0 * self.start.x + b1 * self.control1.x + b2 * self.control2.x + b3 * self.end.x,
            y: b0 * self.start.y + b1 * self.control1.y + b2 * self.control2.y + b3 * self.end.y,
        }
    }
}

/// Horizontal S-curve: both control points sit on the vertical line halfway
/// between the endpoints, each at its own endpoint's height.
pub fn route(source: Point, target: Point) -> CubicPath {
    let mid_x = (source.x + target.x) / 2.0;
    CubicPath {
        start: source,
        control1: Point {
            x: mid_x,
            y: source.y,
        },
        control2: Point {
            x: mid_x,
            y: target.y,
        },
        end: target,
    }
}
