// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Incremental splitting of a coplanar triangle set by clipping triangles

use log::warn;
use nalgebra::{Point3, Vector3};

use crate::error::{BvhError, Result};
use crate::geometry::{angle_between, ExtendedTriangle, Plane, Triangle};

/// Distance under which a vertex counts as lying on the split plane
const PLANE_EPSILON: f64 = 1e-10;
/// `1 - |n . n_other|` under which two triangles are coplanar
const PARALLEL_EPSILON: f64 = 1e-10;
const DEGENERATE_EPSILON: f64 = 1e-10;

/// Smallest interior angle
fn min_angle(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    let at_a = angle_between(&(b - a), &(c - a));
    let at_b = angle_between(&(a - b), &(c - b));
    let at_c = angle_between(&(a - c), &(b - c));
    at_a.min(at_b).min(at_c)
}

/// Working set of triangles sharing one normal
#[derive(Debug, Clone, Default)]
pub struct TriangleSplitter {
    triangles: Vec<Triangle>,
    normal: Vector3<f64>,
    coplanar_triangle_used: bool,
}

impl TriangleSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.triangles.clear();
        self.normal = Vector3::zeros();
        self.coplanar_triangle_used = false;
    }

    pub fn initialize(&mut self, triangle: &Triangle) {
        self.reset();
        self.normal = triangle.normal();
        self.triangles.push(*triangle);
    }

    /// Start from several triangles, which must all share a normal
    pub fn initialize_fan(&mut self, fan: &[Triangle]) -> Result<()> {
        self.reset();
        for (i, triangle) in fan.iter().enumerate() {
            let normal = triangle.normal();
            if i == 0 {
                self.normal = normal;
            } else if (1.0 - normal.dot(&self.normal)).abs() > PARALLEL_EPSILON {
                self.reset();
                return Err(BvhError::InvalidGeometry(
                    "cannot split triangles with different normals together".to_string(),
                ));
            }
            self.triangles.push(*triangle);
        }
        Ok(())
    }

    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    pub fn normal(&self) -> &Vector3<f64> {
        &self.normal
    }

    /// Whether any clipping triangle so far was coplanar with the working set
    pub fn coplanar_triangle_used(&self) -> bool {
        self.coplanar_triangle_used
    }

    /// Cut the working set along `clip`: by its edge planes when coplanar,
    /// otherwise by its plane
    pub fn split_by_triangle(&mut self, clip: &ExtendedTriangle) {
        let clip_normal = clip.plane.normal;
        if (1.0 - clip_normal.dot(&self.normal).abs()).abs() < PARALLEL_EPSILON {
            self.coplanar_triangle_used = true;
            let points = clip.points();
            for i in 0..3 {
                let v0 = points[i];
                let v1 = points[(i + 1) % 3];
                let edge = (v1 - v0).try_normalize(0.0).unwrap_or_else(Vector3::zeros);
                // positive side faces the clip triangle's interior
                let plane = Plane::from_normal_and_point(clip_normal.cross(&edge), &v0);
                self.split_by_plane(&plane, clip);
            }
        } else {
            self.split_by_plane(&clip.plane, clip);
        }
    }

    /// Split every working triangle `clip` touches along `plane`
    pub fn split_by_plane(&mut self, plane: &Plane, clip: &ExtendedTriangle) {
        let mut result = Vec::with_capacity(self.triangles.len() + 2);
        for triangle in self.triangles.drain(..) {
            if !clip.intersects_triangle(&ExtendedTriangle::new(triangle)) {
                result.push(triangle);
                continue;
            }
            match split_triangle(&triangle, plane) {
                Some(pieces) => result.extend(
                    pieces
                        .into_iter()
                        .filter(|t| !t.is_degenerate(DEGENERATE_EPSILON)),
                ),
                None => result.push(triangle),
            }
        }
        self.triangles = result;
    }
}

/// Pieces of `triangle` on either side of `plane`, `None` when it is not cut
fn split_triangle(triangle: &Triangle, plane: &Plane) -> Option<Vec<Triangle>> {
    let points = triangle.points();
    let distances = points.map(|p| plane.distance_to_point(&p));
    let on_plane = distances.map(|d| d.abs() < PLANE_EPSILON);

    let on_count = on_plane.iter().filter(|&&on| on).count();
    if on_count >= 2 {
        // an edge lies in the plane; nothing to cut
        if on_count == 3 {
            warn!("split plane contains the whole triangle, leaving it unsplit");
        }
        return None;
    }

    let crossing = |i: usize, j: usize| -> Point3<f64> {
        let t = distances[i] / (distances[i] - distances[j]);
        points[i] + (points[j] - points[i]) * t
    };

    if on_count == 1 {
        let k = on_plane.iter().position(|&on| on)?;
        let (k1, k2) = ((k + 1) % 3, (k + 2) % 3);
        if distances[k1] * distances[k2] >= 0.0 {
            return None;
        }
        let q = crossing(k1, k2);
        return Some(vec![
            Triangle::new(points[k], points[k1], q),
            Triangle::new(points[k], q, points[k2]),
        ]);
    }

    // the vertex alone on its side of the plane
    let positive = distances.map(|d| d > 0.0);
    let k = (0..3).find(|&i| positive[i] != positive[(i + 1) % 3] && positive[i] != positive[(i + 2) % 3])?;
    let (k1, k2) = ((k + 1) % 3, (k + 2) % 3);
    let q1 = crossing(k, k1);
    let q2 = crossing(k2, k);

    let mut pieces = vec![Triangle::new(points[k], q1, q2)];
    // quad q1, p1, p2, q2 split along the diagonal with the larger minimum angle
    let (p1, p2) = (points[k1], points[k2]);
    let through_p2 = min_angle(&q1, &p1, &p2).min(min_angle(&q1, &p2, &q2));
    let through_p1 = min_angle(&q1, &p1, &q2).min(min_angle(&p1, &p2, &q2));
    if through_p2 >= through_p1 {
        pieces.push(Triangle::new(q1, p1, p2));
        pieces.push(Triangle::new(q1, p2, q2));
    } else {
        pieces.push(Triangle::new(q1, p1, q2));
        pieces.push(Triangle::new(p1, p2, q2));
    }
    Some(pieces)
}
