// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Ray queries

use nalgebra::{Point2, Point3, Vector3};
use serde::Serialize;

use crate::bvh::node::{NodeBuffer, PackedNode};
use crate::bvh::MeshBvh;
use crate::geometry::{Mesh, Ray, Side};

/// Ray/triangle hit in the mesh frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RayHit {
    pub point: Point3<f64>,
    pub distance: f64,
    pub face_index: usize,
    /// Geometric normal of the triangle's stored winding
    pub face_normal: Vector3<f64>,
    /// Weights of the triangle's three vertices
    pub barycoord: Vector3<f64>,
    pub uv: Option<Point2<f64>>,
}

fn intersect_triangle(
    mesh: &Mesh,
    tri_index: usize,
    ray: &Ray,
    side: Side,
    near: f64,
    far: f64,
) -> Option<RayHit> {
    let triangle = mesh.triangle(tri_index);
    let (point, distance) = ray.intersect_triangle_side(&triangle.a, &triangle.b, &triangle.c, side)?;
    if distance < near || distance > far {
        return None;
    }

    let barycoord = triangle
        .barycoord(&point)
        .unwrap_or_else(|| Vector3::new(1.0, 0.0, 0.0));
    let uv = mesh.uvs.as_ref().map(|uvs| {
        let [a, b, c] = mesh.triangle_vertex_indices(tri_index);
        Point2::from(
            uvs[a as usize].coords * barycoord.x
                + uvs[b as usize].coords * barycoord.y
                + uvs[c as usize].coords * barycoord.z,
        )
    });

    Some(RayHit {
        point,
        distance,
        face_index: tri_index,
        face_normal: triangle.normal(),
        barycoord,
        uv,
    })
}

struct RayQuery<'a> {
    bvh: &'a MeshBvh,
    mesh: &'a Mesh,
    root: &'a NodeBuffer,
    ray: &'a Ray,
    side: Side,
    near: f64,
    far: f64,
}

impl RayQuery<'_> {
    fn hits_box(&self, word: usize) -> bool {
        self.ray
            .intersects_box(&self.root.bounds(word), self.near, self.far)
    }

    fn collect(&self, word: usize, hits: &mut Vec<RayHit>) {
        match self.root.node(word) {
            PackedNode::Leaf { offset, count } => {
                for slot in offset..offset + count {
                    let tri_index = self.bvh.resolve_triangle_index(slot);
                    if let Some(hit) =
                        intersect_triangle(self.mesh, tri_index, self.ray, self.side, self.near, self.far)
                    {
                        hits.push(hit);
                    }
                }
            }
            PackedNode::Internal { left, right, .. } => {
                if self.hits_box(left) {
                    self.collect(left, hits);
                }
                if self.hits_box(right) {
                    self.collect(right, hits);
                }
            }
        }
    }

    fn first(&self, word: usize) -> Option<RayHit> {
        match self.root.node(word) {
            PackedNode::Leaf { offset, count } => {
                let mut closest: Option<RayHit> = None;
                for slot in offset..offset + count {
                    let tri_index = self.bvh.resolve_triangle_index(slot);
                    if let Some(hit) =
                        intersect_triangle(self.mesh, tri_index, self.ray, self.side, self.near, self.far)
                    {
                        if closest.as_ref().map_or(true, |c| hit.distance < c.distance) {
                            closest = Some(hit);
                        }
                    }
                }
                closest
            }
            PackedNode::Internal {
                left,
                right,
                split_axis,
            } => {
                let left_to_right = self.ray.direction[split_axis] >= 0.0;
                let (near_child, far_child) = if left_to_right {
                    (left, right)
                } else {
                    (right, left)
                };

                let near_hit = if self.hits_box(near_child) {
                    self.first(near_child)
                } else {
                    None
                };

                // the far child cannot hold a closer hit once the near hit lies
                // before its box along the split axis
                if let Some(hit) = &near_hit {
                    let far_box = self.root.bounds(far_child);
                    let coordinate = hit.point[split_axis];
                    let outside = if left_to_right {
                        coordinate <= far_box.min[split_axis]
                    } else {
                        coordinate >= far_box.max[split_axis]
                    };
                    if outside {
                        return near_hit;
                    }
                }

                let far_hit = if self.hits_box(far_child) {
                    self.first(far_child)
                } else {
                    None
                };

                match (near_hit, far_hit) {
                    (Some(a), Some(b)) => Some(if a.distance <= b.distance { a } else { b }),
                    (a, b) => a.or(b),
                }
            }
        }
    }
}

impl MeshBvh {
    /// Every hit between `near` and `far`, sorted by distance
    pub fn raycast(&self, mesh: &Mesh, ray: &Ray, side: Side, near: f64, far: f64) -> Vec<RayHit> {
        let mut hits = Vec::new();
        for root in self.roots() {
            let query = RayQuery {
                bvh: self,
                mesh,
                root,
                ray,
                side,
                near,
                far,
            };
            if query.hits_box(0) {
                query.collect(0, &mut hits);
            }
        }
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits
    }

    /// Closest hit between `near` and `far`
    pub fn raycast_first(
        &self,
        mesh: &Mesh,
        ray: &Ray,
        side: Side,
        near: f64,
        far: f64,
    ) -> Option<RayHit> {
        let mut closest: Option<RayHit> = None;
        for root in self.roots() {
            let query = RayQuery {
                bvh: self,
                mesh,
                root,
                ray,
                side,
                near,
                far,
            };
            if !query.hits_box(0) {
                continue;
            }
            if let Some(hit) = query.first(0) {
                if closest.as_ref().map_or(true, |c| hit.distance < c.distance) {
                    closest = Some(hit);
                }
            }
        }
        closest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BuildOptions, SplitStrategy};
    use crate::geometry::Primitive;
    use approx::assert_relative_eq;

    fn cube_bvh() -> (Mesh, MeshBvh) {
        let mut mesh = Primitive::cube(Vector3::new(1.0, 1.0, 1.0), true).to_mesh();
        let bvh = MeshBvh::build(
            &mut mesh,
            &BuildOptions {
                max_leaf_triangles: 1,
                ..BuildOptions::default()
            },
        )
        .unwrap();
        (mesh, bvh)
    }

    #[test]
    fn test_first_hit_on_unit_cube() {
        let (mesh, bvh) = cube_bvh();
        let ray = Ray::new(Point3::new(0.0, 0.0, 5.0), -Vector3::z());
        let hit = bvh
            .raycast_first(&mesh, &ray, Side::Front, 0.0, f64::INFINITY)
            .unwrap();
        assert_relative_eq!(hit.distance, 4.5, epsilon = 1e-12);
        assert_relative_eq!(hit.point, Point3::new(0.0, 0.0, 0.5), epsilon = 1e-12);
        assert_relative_eq!(hit.face_normal, Vector3::z(), epsilon = 1e-12);
        assert!(hit.uv.is_some());
    }

    #[test]
    fn test_all_hits_double_sided() {
        let (mesh, bvh) = cube_bvh();
        let ray = Ray::new(Point3::new(0.1, 0.2, 5.0), -Vector3::z());
        let hits = bvh.raycast(&mesh, &ray, Side::Double, 0.0, f64::INFINITY);
        assert_eq!(hits.len(), 2);
        assert_relative_eq!(hits[0].distance, 4.5, epsilon = 1e-12);
        assert_relative_eq!(hits[1].distance, 5.5, epsilon = 1e-12);

        let front = bvh.raycast(&mesh, &ray, Side::Front, 0.0, f64::INFINITY);
        assert_eq!(front.len(), 1);
        let back = bvh.raycast(&mesh, &ray, Side::Back, 0.0, f64::INFINITY);
        assert_eq!(back.len(), 1);
        assert_relative_eq!(back[0].distance, 5.5, epsilon = 1e-12);
    }

    #[test]
    fn test_near_far_window() {
        let (mesh, bvh) = cube_bvh();
        let ray = Ray::new(Point3::new(0.1, 0.2, 5.0), -Vector3::z());
        let hit = bvh.raycast_first(&mesh, &ray, Side::Double, 5.0, 10.0).unwrap();
        assert_relative_eq!(hit.distance, 5.5, epsilon = 1e-12);
        assert!(bvh.raycast_first(&mesh, &ray, Side::Double, 0.0, 4.0).is_none());
    }

    #[test]
    fn test_first_matches_minimum_of_all() {
        let mut mesh = Primitive::sphere(1.0, 16).to_mesh();
        let bvh = MeshBvh::build(
            &mut mesh,
            &BuildOptions {
                strategy: SplitStrategy::Sah,
                max_leaf_triangles: 2,
                ..BuildOptions::default()
            },
        )
        .unwrap();

        for i in 0..20 {
            let angle = i as f64 * 0.3;
            let origin = Point3::new(3.0 * angle.cos(), 0.7 * angle.sin(), 3.0 * angle.sin());
            let ray = Ray::new(origin, Point3::origin() - origin + Vector3::new(0.05, 0.0, 0.0));
            let all = bvh.raycast(&mesh, &ray, Side::Double, 0.0, f64::INFINITY);
            let first = bvh.raycast_first(&mesh, &ray, Side::Double, 0.0, f64::INFINITY);
            assert_eq!(all.is_empty(), first.is_none());
            if let Some(first) = first {
                assert_relative_eq!(first.distance, all[0].distance, epsilon = 1e-12);
            }
        }
    }
}
