// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Line segments and closest-point routines between them

use nalgebra::{Point3, Vector3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: Point3<f64>,
    pub end: Point3<f64>,
}

impl Segment {
    pub fn new(start: Point3<f64>, end: Point3<f64>) -> Self {
        Self { start, end }
    }

    pub fn delta(&self) -> Vector3<f64> {
        self.end - self.start
    }

    pub fn length(&self) -> f64 {
        self.delta().norm()
    }

    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.start, &self.end)
    }

    pub fn at(&self, t: f64) -> Point3<f64> {
        self.start + self.delta() * t
    }

    /// Segment parameter of the point closest to `point`, clamped to `[0, 1]`
    pub fn closest_point_parameter(&self, point: &Point3<f64>) -> f64 {
        let delta = self.delta();
        let length_sq = delta.norm_squared();
        if length_sq == 0.0 {
            return 0.0;
        }
        ((point - self.start).dot(&delta) / length_sq).clamp(0.0, 1.0)
    }

    pub fn closest_point_to_point(&self, point: &Point3<f64>) -> Point3<f64> {
        self.at(self.closest_point_parameter(point))
    }

    pub fn reversed(&self) -> Segment {
        Segment::new(self.end, self.start)
    }
}

/// Parameters of the closest points between the infinite lines through two segments
fn closest_line_parameters(l1: &Segment, l2: &Segment) -> (f64, f64) {
    let v02 = l1.start - l2.start;
    let v10 = l1.delta();
    let v32 = l2.delta();

    let d0232 = v02.dot(&v32);
    let d3210 = v32.dot(&v10);
    let d3232 = v32.dot(&v32);
    let d0210 = v02.dot(&v10);
    let d1010 = v10.dot(&v10);
    let denom = d1010 * d3232 - d3210 * d3210;

    let d = if denom != 0.0 {
        (d0232 * d3210 - d0210 * d3232) / denom
    } else {
        0.0
    };
    let d2 = if d3232 != 0.0 {
        (d0232 + d * d3210) / d3232
    } else {
        0.0
    };
    (d, d2)
}

/// Closest pair of points between two segments, returned as `(on_first, on_second)`
pub fn closest_points_segment_to_segment(
    l1: &Segment,
    l2: &Segment,
) -> (Point3<f64>, Point3<f64>) {
    let (d, d2) = closest_line_parameters(l1, l2);
    let d_inside = (0.0..=1.0).contains(&d);
    let d2_inside = (0.0..=1.0).contains(&d2);

    if d_inside && d2_inside {
        return (l1.at(d), l2.at(d2));
    }

    if d_inside {
        let target2 = if d2 < 0.0 { l2.start } else { l2.end };
        return (l1.closest_point_to_point(&target2), target2);
    }

    if d2_inside {
        let target1 = if d < 0.0 { l1.start } else { l1.end };
        return (target1, l2.closest_point_to_point(&target1));
    }

    // both parameters are outside, compare the two end point projections
    let p = if d < 0.0 { l1.start } else { l1.end };
    let p2 = if d2 < 0.0 { l2.start } else { l2.end };
    let closest1 = l1.closest_point_to_point(&p2);
    let closest2 = l2.closest_point_to_point(&p);

    if (closest1 - p2).norm_squared() <= (closest2 - p).norm_squared() {
        (closest1, p2)
    } else {
        (p, closest2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_crossing_segments() {
        let a = Segment::new(Point3::new(-1.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0));
        let b = Segment::new(Point3::new(0.0, -1.0, 1.0), Point3::new(0.0, 1.0, 1.0));
        let (p1, p2) = closest_points_segment_to_segment(&a, &b);
        assert_relative_eq!(p1, Point3::origin());
        assert_relative_eq!(p2, Point3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn test_parallel_offset_segments() {
        let a = Segment::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0));
        let b = Segment::new(Point3::new(2.0, 1.0, 0.0), Point3::new(3.0, 1.0, 0.0));
        let (p1, p2) = closest_points_segment_to_segment(&a, &b);
        assert_relative_eq!(p1, Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p2, Point3::new(2.0, 1.0, 0.0));
    }

    #[test]
    fn test_degenerate_segment() {
        let point = Segment::new(Point3::new(0.5, 2.0, 0.0), Point3::new(0.5, 2.0, 0.0));
        let line = Segment::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0));
        let (p1, p2) = closest_points_segment_to_segment(&point, &line);
        assert_relative_eq!(p1, Point3::new(0.5, 2.0, 0.0));
        assert_relative_eq!(p2, Point3::new(0.5, 0.0, 0.0));
    }
}
