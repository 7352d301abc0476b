// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Oriented bounding box with separating-axis tests

use nalgebra::{Matrix4, Point3, Vector3};

use super::bbox::BoundingBox;
use super::triangle::{ExtendedTriangle, SeparatingAxisBounds};

/// A local-space box placed in the world by `matrix`
#[derive(Debug, Clone)]
pub struct OrientedBox {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
    pub matrix: Matrix4<f64>,
    points: [Point3<f64>; 8],
    sat_axes: [Vector3<f64>; 3],
    sat_bounds: [SeparatingAxisBounds; 3],
    aligned_sat_bounds: [SeparatingAxisBounds; 3],
}

impl OrientedBox {
    pub fn new(bbox: &BoundingBox, matrix: Matrix4<f64>) -> Self {
        let local = BoundingBox::new(bbox.min, bbox.max);
        let points = local.corners().map(|p| matrix.transform_point(&p));

        let origin = matrix.transform_point(&Point3::origin());
        let sat_axes = [Vector3::x(), Vector3::y(), Vector3::z()].map(|axis| {
            (matrix.transform_point(&Point3::from(axis)) - origin)
                .try_normalize(0.0)
                .unwrap_or_else(Vector3::zeros)
        });
        let sat_bounds = sat_axes.map(|axis| SeparatingAxisBounds::from_points(&axis, &points));
        let aligned_sat_bounds = [Vector3::x(), Vector3::y(), Vector3::z()]
            .map(|axis| SeparatingAxisBounds::from_points(&axis, &points));

        Self {
            min: bbox.min,
            max: bbox.max,
            matrix,
            points,
            sat_axes,
            sat_bounds,
            aligned_sat_bounds,
        }
    }

    pub fn points(&self) -> &[Point3<f64>; 8] {
        &self.points
    }

    /// Conservative world-space axis-aligned box
    pub fn aabb(&self) -> BoundingBox {
        BoundingBox::from_points(self.points.iter())
    }

    /// Box axes plus world axes; a conservative test that may report
    /// overlap for some disjoint edge-edge configurations
    pub fn intersects_box(&self, bbox: &BoundingBox) -> bool {
        let corners = bbox.corners();
        for i in 0..3 {
            let projected = SeparatingAxisBounds::from_points(&self.sat_axes[i], &corners);
            if self.sat_bounds[i].is_separated(&projected) {
                return false;
            }
        }

        for i in 0..3 {
            let aligned = &self.aligned_sat_bounds[i];
            if bbox.max[i] < aligned.min || bbox.min[i] > aligned.max {
                return false;
            }
        }
        true
    }

    pub fn intersects_triangle(&self, tri: &ExtendedTriangle) -> bool {
        let tri_points = tri.points();

        for i in 0..3 {
            let projected = SeparatingAxisBounds::from_points(&self.sat_axes[i], &tri_points);
            if self.sat_bounds[i].is_separated(&projected) {
                return false;
            }
        }

        for i in 0..4 {
            let projected = SeparatingAxisBounds::from_points(&tri.sat_axes[i], &self.points);
            if tri.sat_bounds[i].is_separated(&projected) {
                return false;
            }
        }

        for axis1 in &self.sat_axes {
            for axis2 in &tri.sat_axes {
                let cross = axis1.cross(axis2);
                let b1 = SeparatingAxisBounds::from_points(&cross, &self.points);
                let b2 = SeparatingAxisBounds::from_points(&cross, &tri_points);
                if b1.is_separated(&b2) {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> BoundingBox {
        BoundingBox::new(Point3::new(-0.5, -0.5, -0.5), Point3::new(0.5, 0.5, 0.5))
    }

    #[test]
    fn test_rotated_box_overlap() {
        let rotation = Matrix4::new_rotation(Vector3::new(0.0, 0.0, std::f64::consts::FRAC_PI_4));
        let obb = OrientedBox::new(&unit_box(), Matrix4::new_translation(&Vector3::new(1.1, 0.0, 0.0)) * rotation);

        // the rotated corner reaches x = 1.1 - 0.707
        let near = BoundingBox::new(Point3::new(0.3, -0.1, -0.1), Point3::new(0.45, 0.1, 0.1));
        let far = BoundingBox::new(Point3::new(-0.5, -0.1, -0.1), Point3::new(0.3, 0.1, 0.1));
        assert!(obb.intersects_box(&near));
        assert!(!obb.intersects_box(&far));
    }

    #[test]
    fn test_triangle_overlap() {
        let obb = OrientedBox::new(&unit_box(), Matrix4::identity());
        let inside = ExtendedTriangle::from_points(
            Point3::new(-0.1, 0.0, 0.0),
            Point3::new(0.1, 0.0, 0.0),
            Point3::new(0.0, 0.1, 0.0),
        );
        let outside = ExtendedTriangle::from_points(
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(3.0, 0.0, 0.0),
            Point3::new(2.0, 1.0, 0.0),
        );
        assert!(obb.intersects_triangle(&inside));
        assert!(!obb.intersects_triangle(&outside));
    }
}
