// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Infinite plane in Hessian normal form

use nalgebra::{Point3, Vector3};

use super::segment::Segment;

/// Plane `normal . p + constant = 0`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vector3<f64>,
    pub constant: f64,
}

impl Plane {
    pub fn new(normal: Vector3<f64>, constant: f64) -> Self {
        Self { normal, constant }
    }

    pub fn from_normal_and_point(normal: Vector3<f64>, point: &Point3<f64>) -> Self {
        Self {
            normal,
            constant: -normal.dot(&point.coords),
        }
    }

    /// Plane through three points, counter-clockwise winding facing the normal.
    /// Collinear points give a zero normal.
    pub fn from_points(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> Self {
        let normal = (b - a).cross(&(c - a));
        let normal = normal.try_normalize(0.0).unwrap_or_else(Vector3::zeros);
        Self::from_normal_and_point(normal, a)
    }

    pub fn distance_to_point(&self, point: &Point3<f64>) -> f64 {
        self.normal.dot(&point.coords) + self.constant
    }

    pub fn project_point(&self, point: &Point3<f64>) -> Point3<f64> {
        point - self.normal * self.distance_to_point(point)
    }

    /// Intersection of the segment with the plane. A segment lying in the plane
    /// reports its start point.
    pub fn intersect_segment(&self, segment: &Segment) -> Option<Point3<f64>> {
        let direction = segment.delta();
        let denominator = self.normal.dot(&direction);

        if denominator == 0.0 {
            if self.distance_to_point(&segment.start) == 0.0 {
                return Some(segment.start);
            }
            return None;
        }

        let t = -(segment.start.coords.dot(&self.normal) + self.constant) / denominator;
        if !(0.0..=1.0).contains(&t) {
            return None;
        }
        Some(segment.at(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_plane_from_points() {
        let plane = Plane::from_points(
            &Point3::new(0.0, 0.0, 1.0),
            &Point3::new(1.0, 0.0, 1.0),
            &Point3::new(0.0, 1.0, 1.0),
        );
        assert_relative_eq!(plane.normal, Vector3::z());
        assert_relative_eq!(plane.distance_to_point(&Point3::new(3.0, 4.0, 3.0)), 2.0);
    }

    #[test]
    fn test_segment_intersection() {
        let plane = Plane::new(Vector3::x(), 0.0);
        let crossing = Segment::new(Point3::new(-1.0, 0.0, 0.0), Point3::new(3.0, 4.0, 0.0));
        let hit = plane.intersect_segment(&crossing).unwrap();
        assert_relative_eq!(hit, Point3::new(0.0, 1.0, 0.0));

        let short = Segment::new(Point3::new(1.0, 0.0, 0.0), Point3::new(2.0, 0.0, 0.0));
        assert!(plane.intersect_segment(&short).is_none());
    }
}
