// Copyright 2023 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Curve math used to count and emit tessellation segments.

use peniko::kurbo::{Affine, BezPath, CubicBez, ParamCurve, PathEl, Point, Rect, Vec2};
use pls_encoding::{IAabb, MAX_PARAMETRIC_SEGMENTS, MAX_POLAR_SEGMENTS};

/// Maximum distance, in 1/4 pixels, between a curve and its parametric tessellation.
pub(crate) const PARAMETRIC_PRECISION: f64 = 4.0;

/// Maximum distance, in 1/8 pixels, between a stroke's rotation and its polar tessellation.
pub(crate) const POLAR_PRECISION: f64 = 8.0;

/// A contour with every segment raised to a cubic.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct CubicContour {
    pub cubics: Vec<[Point; 4]>,
    pub closed: bool,
    /// Where the contour begins. Contours without cubics are a single point here.
    pub start: Point,
}

impl CubicContour {
    /// Average of the curve endpoints. The midpoint fan of a fill radiates from here.
    pub fn midpoint(&self) -> Point {
        if self.cubics.is_empty() {
            return self.start;
        }
        let sum = self
            .cubics
            .iter()
            .fold(Vec2::ZERO, |sum, c| sum + c[0].to_vec2());
        (sum / self.cubics.len() as f64).to_point()
    }

    /// The contour collapsed to a point, which only strokes keep.
    pub fn is_empty(&self) -> bool {
        self.cubics.is_empty()
    }
}

pub(crate) fn line_as_cubic(p0: Point, p1: Point) -> [Point; 4] {
    [p0, p0.lerp(p1, 1.0 / 3.0), p0.lerp(p1, 2.0 / 3.0), p1]
}

fn is_line(pts: &[Point; 4]) -> bool {
    *pts == line_as_cubic(pts[0], pts[3])
}

/// Accumulates the contours of a path.
struct ContourBuilder {
    contours: Vec<CubicContour>,
    current: CubicContour,
    last: Point,
    /// A zero-length segment or a close was seen in the current contour.
    degenerate: bool,
    keep_points: bool,
}

impl ContourBuilder {
    fn push(&mut self, cubic: [Point; 4]) {
        if cubic.iter().all(|p| *p == cubic[0]) {
            self.degenerate = true;
        } else {
            self.current.cubics.push(cubic);
        }
        self.last = cubic[3];
    }

    fn finish(&mut self, close: bool) {
        let start = self.current.start;
        if close {
            self.degenerate = true;
            if self.last != start {
                self.current.cubics.push(line_as_cubic(self.last, start));
            }
        }
        self.current.closed = close;
        if !self.current.cubics.is_empty() || (self.keep_points && self.degenerate) {
            self.contours.push(std::mem::take(&mut self.current));
        }
        self.current = CubicContour {
            start,
            ..CubicContour::default()
        };
        self.last = start;
        self.degenerate = false;
    }

    fn move_to(&mut self, p: Point) {
        self.current.start = p;
        self.last = p;
    }
}

/// Splits `path` into contours of cubics.
///
/// Lines and quadratics are raised to cubics and zero-length segments are dropped. When
/// `close_all` is set, as it is for fills, every contour gets a closing line. Otherwise contours
/// that collapse to a point are kept, so strokes can draw caps on them.
pub(crate) fn cubic_contours(path: &BezPath, close_all: bool) -> Vec<CubicContour> {
    let mut builder = ContourBuilder {
        contours: Vec::new(),
        current: CubicContour::default(),
        last: Point::ZERO,
        degenerate: false,
        keep_points: !close_all,
    };
    for el in path.elements() {
        match *el {
            PathEl::MoveTo(p) => {
                builder.finish(close_all);
                builder.move_to(p);
            }
            PathEl::LineTo(p) => builder.push(line_as_cubic(builder.last, p)),
            PathEl::QuadTo(p1, p2) => {
                let c = peniko::kurbo::QuadBez::new(builder.last, p1, p2).raise();
                builder.push([c.p0, c.p1, c.p2, c.p3]);
            }
            PathEl::CurveTo(p1, p2, p3) => builder.push([builder.last, p1, p2, p3]),
            PathEl::ClosePath => builder.finish(true),
        }
    }
    builder.finish(close_all);
    builder.contours
}

fn transform_vector(m: &Affine, v: Vec2) -> Vec2 {
    let [a, b, c, d, _, _] = m.as_coeffs();
    Vec2::new(a * v.x + c * v.y, b * v.x + d * v.y)
}

/// Largest factor by which `m` stretches any vector.
pub(crate) fn max_scale(m: &Affine) -> f64 {
    let [a, b, c, d, _, _] = m.as_coeffs();
    let sum_sq = a * a + b * b + c * c + d * d;
    let det = a * d - b * c;
    let disc = (sum_sq * sum_sq - 4.0 * det * det).max(0.0);
    ((sum_sq + disc.sqrt()) * 0.5).sqrt()
}

/// Wang's formula: the number of parametric segments that keep the transformed cubic within
/// [`PARAMETRIC_PRECISION`].
pub(crate) fn wangs_formula(pts: &[Point; 4], m: &Affine) -> f64 {
    let d0 = transform_vector(m, pts[0].to_vec2() - 2.0 * pts[1].to_vec2() + pts[2].to_vec2());
    let d1 = transform_vector(m, pts[1].to_vec2() - 2.0 * pts[2].to_vec2() + pts[3].to_vec2());
    let max_len = d0.hypot2().max(d1.hypot2()).sqrt();
    (0.75 * PARAMETRIC_PRECISION * max_len).sqrt()
}

pub(crate) fn parametric_segment_count(pts: &[Point; 4], m: &Affine) -> u32 {
    if is_line(pts) {
        return 1;
    }
    let n = wangs_formula(pts, m).ceil();
    if n.is_finite() {
        (n as u32).clamp(1, MAX_PARAMETRIC_SEGMENTS)
    } else {
        MAX_PARAMETRIC_SEGMENTS
    }
}

/// Polar segments per radian of rotation for a stroke of `radius` device pixels.
pub(crate) fn polar_segments_per_radian(radius: f64) -> f64 {
    let cos_theta = (1.0 - 1.0 / (POLAR_PRECISION * radius)).max(-1.0);
    0.5 / cos_theta.acos()
}

pub(crate) fn polar_segment_count(radians: f64, segments_per_radian: f64) -> u32 {
    let n = (radians * segments_per_radian).ceil();
    if n.is_finite() {
        (n as u32).clamp(1, MAX_POLAR_SEGMENTS)
    } else {
        MAX_POLAR_SEGMENTS
    }
}

pub(crate) fn start_tangent(pts: &[Point; 4]) -> Vec2 {
    [pts[1], pts[2], pts[3]]
        .into_iter()
        .map(|p| p - pts[0])
        .find(|v| *v != Vec2::ZERO)
        .unwrap_or(Vec2::ZERO)
}

pub(crate) fn end_tangent(pts: &[Point; 4]) -> Vec2 {
    [pts[2], pts[1], pts[0]]
        .into_iter()
        .map(|p| pts[3] - p)
        .find(|v| *v != Vec2::ZERO)
        .unwrap_or(Vec2::ZERO)
}

/// Unsigned angle between two directions, in radians.
pub(crate) fn angle_between(a: Vec2, b: Vec2) -> f64 {
    if a == Vec2::ZERO || b == Vec2::ZERO {
        return 0.0;
    }
    a.cross(b).atan2(a.dot(b)).abs()
}

/// Total rotation along the control polygon of a cubic, which bounds the rotation of the curve.
pub(crate) fn cubic_rotation(pts: &[Point; 4]) -> f64 {
    let legs = [pts[1] - pts[0], pts[2] - pts[1], pts[3] - pts[2]];
    let mut prev = None;
    let mut total = 0.0;
    for leg in legs.into_iter().filter(|v| *v != Vec2::ZERO) {
        if let Some(prev) = prev {
            total += angle_between(prev, leg);
        }
        prev = Some(leg);
    }
    total
}

/// Splits a cubic into `n` pieces of equal parametric length.
pub(crate) fn subdivide_cubic(pts: &[Point; 4], n: u32) -> impl Iterator<Item = [Point; 4]> {
    let c = CubicBez::new(pts[0], pts[1], pts[2], pts[3]);
    let n = n.max(1);
    (0..n).map(move |i| {
        let t0 = i as f64 / n as f64;
        let t1 = (i + 1) as f64 / n as f64;
        let s = c.subsegment(t0..t1);
        [s.p0, s.p1, s.p2, s.p3]
    })
}

/// A triangle of an interior triangulation with its winding direction.
pub(crate) type WeightedTriangle = ([Point; 3], i16);

/// Triangulates a closed polygon as a fan from its first vertex.
///
/// Each triangle is weighted by the sign of its area, so overlapping triangles add up to the
/// polygon's winding number. Degenerate triangles are skipped.
pub(crate) fn fan_triangles(polygon: &[Point]) -> Vec<WeightedTriangle> {
    let Some((&v0, rest)) = polygon.split_first() else {
        return Vec::new();
    };
    rest.windows(2)
        .filter_map(|w| {
            let cross = (w[0] - v0).cross(w[1] - v0);
            if cross == 0.0 {
                None
            } else {
                Some(([v0, w[0], w[1]], if cross > 0.0 { 1 } else { -1 }))
            }
        })
        .collect()
}

/// Device-space bounds of `rect` under `m`, outset by `outset` pixels.
pub(crate) fn pixel_bounds(rect: Rect, m: &Affine, outset: f64) -> IAabb {
    IAabb::round_out(m.transform_rect_bbox(rect).inflate(outset, outset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use peniko::kurbo::Shape;

    #[test]
    fn fills_close_every_contour() {
        let mut path = BezPath::new();
        path.move_to((0.0, 0.0));
        path.line_to((10.0, 0.0));
        path.line_to((10.0, 10.0));
        path.move_to((20.0, 20.0));
        path.line_to((30.0, 20.0));
        path.line_to((20.0, 20.0));
        let fills = cubic_contours(&path, true);
        assert_eq!(fills.len(), 2);
        assert_eq!(fills[0].cubics.len(), 3);
        assert!(fills[0].closed);
        // The second contour already ends where it started.
        assert_eq!(fills[1].cubics.len(), 2);

        let strokes = cubic_contours(&path, false);
        assert_eq!(strokes[0].cubics.len(), 2);
        assert!(!strokes[0].closed);
    }

    #[test]
    fn degenerate_segments_are_dropped() {
        let mut path = BezPath::new();
        path.move_to((5.0, 5.0));
        path.line_to((5.0, 5.0));
        path.curve_to((5.0, 5.0), (5.0, 5.0), (5.0, 5.0));
        path.move_to((1.0, 1.0));
        assert!(cubic_contours(&path, true).is_empty());

        // Strokes keep the collapsed contour for its caps, but not the bare move.
        let strokes = cubic_contours(&path, false);
        assert_eq!(strokes.len(), 1);
        assert!(strokes[0].is_empty());
        assert_eq!(strokes[0].start, Point::new(5.0, 5.0));
        assert_eq!(strokes[0].midpoint(), Point::new(5.0, 5.0));
    }

    #[test]
    fn closed_points_are_stroke_contours() {
        let mut path = BezPath::new();
        path.move_to((3.0, 4.0));
        path.close_path();
        path.line_to((3.0, 8.0));
        let strokes = cubic_contours(&path, false);
        assert_eq!(strokes.len(), 2);
        assert!(strokes[0].closed && strokes[0].is_empty());
        // Drawing on after a close continues from the contour's start.
        assert_eq!(strokes[1].cubics, vec![line_as_cubic((3.0, 4.0).into(), (3.0, 8.0).into())]);
        assert!(!strokes[1].closed);
    }

    #[test]
    fn wang_counts() {
        let line = line_as_cubic(Point::ZERO, Point::new(100.0, 0.0));
        assert_eq!(parametric_segment_count(&line, &Affine::IDENTITY), 1);
        let curve = [
            Point::new(0.0, 0.0),
            Point::new(0.0, 100.0),
            Point::new(100.0, 100.0),
            Point::new(100.0, 0.0),
        ];
        let n = parametric_segment_count(&curve, &Affine::IDENTITY);
        let scaled = parametric_segment_count(&curve, &Affine::scale(4.0));
        assert!(n > 1);
        // Segment counts grow with the square root of scale.
        assert!(scaled >= 2 * n - 1 && scaled <= 2 * n + 1);
    }

    #[test]
    fn scale_and_rotation() {
        assert!((max_scale(&Affine::scale_non_uniform(2.0, 3.0)) - 3.0).abs() < 1e-9);
        assert!((max_scale(&Affine::rotate(1.0)) - 1.0).abs() < 1e-9);
        let corner = [
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(1.0, 1.0),
        ];
        assert!((cubic_rotation(&corner) - std::f64::consts::FRAC_PI_2).abs() < 1e-9);
        assert_eq!(polar_segment_count(0.0, 10.0), 1);
        assert_eq!(polar_segment_count(1e9, 10.0), MAX_POLAR_SEGMENTS);
        assert!(polar_segments_per_radian(100.0) > polar_segments_per_radian(1.0));
    }

    #[test]
    fn subdivision_is_continuous() {
        let curve = [
            Point::new(0.0, 0.0),
            Point::new(10.0, 30.0),
            Point::new(40.0, 30.0),
            Point::new(50.0, 0.0),
        ];
        let pieces: Vec<_> = subdivide_cubic(&curve, 4).collect();
        assert_eq!(pieces.len(), 4);
        assert_eq!(pieces[0][0], curve[0]);
        for w in pieces.windows(2) {
            assert!((w[0][3] - w[1][0]).hypot() < 1e-9);
        }
        assert!((pieces[3][3] - curve[3]).hypot() < 1e-9);
    }

    #[test]
    fn fan_weights_follow_winding() {
        let square = Rect::new(0.0, 0.0, 10.0, 10.0);
        let pts: Vec<Point> = square
            .path_elements(0.1)
            .filter_map(|el| el.end_point())
            .collect();
        let tris = fan_triangles(&pts[..4]);
        assert_eq!(tris.len(), 2);
        assert!(tris.iter().all(|(_, w)| *w == tris[0].1));
        let reversed: Vec<_> = pts[..4].iter().rev().copied().collect();
        assert_eq!(fan_triangles(&reversed)[0].1, -tris[0].1);
    }

    #[test]
    fn bounds_round_out() {
        let bounds = pixel_bounds(
            Rect::new(0.5, 0.5, 9.5, 9.5),
            &Affine::translate((10.0, 0.0)),
            1.0,
        );
        assert_eq!(bounds, IAabb::new(9, -1, 21, 11));
    }
}
