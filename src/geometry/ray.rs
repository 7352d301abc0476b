// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Rays and the slab / triangle tests used by ray casting

use nalgebra::{Matrix4, Point3, Vector3};
use serde::{Deserialize, Serialize};

use super::bbox::BoundingBox;

/// Which triangle faces a ray may hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Only faces wound counter-clockwise towards the ray origin
    #[default]
    Front,
    Back,
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Point3<f64>,
    /// Unit direction
    pub direction: Vector3<f64>,
}

impl Ray {
    /// Create a ray; the direction is normalized so hit distances are metric
    pub fn new(origin: Point3<f64>, direction: Vector3<f64>) -> Self {
        Self {
            origin,
            direction: direction.try_normalize(0.0).unwrap_or(direction),
        }
    }

    pub fn at(&self, t: f64) -> Point3<f64> {
        self.origin + self.direction * t
    }

    pub fn transform(&self, matrix: &Matrix4<f64>) -> Ray {
        let origin = matrix.transform_point(&self.origin);
        let direction = matrix.transform_vector(&self.direction);
        Ray::new(origin, direction)
    }

    /// Slab test against a box, accepting hits whose entry/exit span overlaps `[near, far]`.
    /// Axis-parallel rays that graze a slab boundary produce NaN spans which are skipped.
    pub fn intersects_box(&self, bbox: &BoundingBox, near: f64, far: f64) -> bool {
        let inv = Vector3::new(
            1.0 / self.direction.x,
            1.0 / self.direction.y,
            1.0 / self.direction.z,
        );
        let o = self.origin;

        let (mut tmin, mut tmax) = if inv.x >= 0.0 {
            ((bbox.min.x - o.x) * inv.x, (bbox.max.x - o.x) * inv.x)
        } else {
            ((bbox.max.x - o.x) * inv.x, (bbox.min.x - o.x) * inv.x)
        };

        let (tymin, tymax) = if inv.y >= 0.0 {
            ((bbox.min.y - o.y) * inv.y, (bbox.max.y - o.y) * inv.y)
        } else {
            ((bbox.max.y - o.y) * inv.y, (bbox.min.y - o.y) * inv.y)
        };

        if tmin > tymax || tymin > tmax {
            return false;
        }
        if tymin > tmin || tmin.is_nan() {
            tmin = tymin;
        }
        if tymax < tmax || tmax.is_nan() {
            tmax = tymax;
        }

        let (tzmin, tzmax) = if inv.z >= 0.0 {
            ((bbox.min.z - o.z) * inv.z, (bbox.max.z - o.z) * inv.z)
        } else {
            ((bbox.max.z - o.z) * inv.z, (bbox.min.z - o.z) * inv.z)
        };

        if tmin > tzmax || tzmin > tmax {
            return false;
        }
        if tzmin > tmin || tmin.is_nan() {
            tmin = tzmin;
        }
        if tzmax < tmax || tmax.is_nan() {
            tmax = tzmax;
        }

        tmin <= far && tmax >= near
    }

    /// Moller-Trumbore style test returning the hit point, if any
    pub fn intersect_triangle(
        &self,
        a: &Point3<f64>,
        b: &Point3<f64>,
        c: &Point3<f64>,
        backface_culling: bool,
    ) -> Option<Point3<f64>> {
        let edge1 = b - a;
        let edge2 = c - a;
        let normal = edge1.cross(&edge2);

        let mut d_dot_n = self.direction.dot(&normal);
        let sign;
        if d_dot_n > 0.0 {
            if backface_culling {
                return None;
            }
            sign = 1.0;
        } else if d_dot_n < 0.0 {
            sign = -1.0;
            d_dot_n = -d_dot_n;
        } else {
            return None;
        }

        let diff = self.origin - a;
        let d_dot_q_x_e2 = sign * self.direction.dot(&diff.cross(&edge2));
        if d_dot_q_x_e2 < 0.0 {
            return None;
        }

        let d_dot_e1_x_q = sign * self.direction.dot(&edge1.cross(&diff));
        if d_dot_e1_x_q < 0.0 {
            return None;
        }

        if d_dot_q_x_e2 + d_dot_e1_x_q > d_dot_n {
            return None;
        }

        let q_dot_n = -sign * diff.dot(&normal);
        if q_dot_n < 0.0 {
            return None;
        }

        Some(self.at(q_dot_n / d_dot_n))
    }

    /// Triangle hit honoring the requested side, as `(point, distance)`
    pub fn intersect_triangle_side(
        &self,
        a: &Point3<f64>,
        b: &Point3<f64>,
        c: &Point3<f64>,
        side: Side,
    ) -> Option<(Point3<f64>, f64)> {
        let point = match side {
            Side::Back => self.intersect_triangle(c, b, a, true),
            Side::Front => self.intersect_triangle(a, b, c, true),
            Side::Double => self.intersect_triangle(a, b, c, false),
        }?;
        Some((point, (point - self.origin).norm()))
    }
}
