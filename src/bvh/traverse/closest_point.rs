// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Closest point queries ordered by box distance

use nalgebra::{Matrix4, Point3};
use serde::Serialize;

use super::shapecast::{BoundsTest, LeafRange, ShapecastVisitor};
use crate::bvh::node::NodeId;
use crate::bvh::MeshBvh;
use crate::error::{BvhError, Result};
use crate::geometry::{BoundingBox, ExtendedTriangle, Mesh};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClosestPointHit {
    pub point: Point3<f64>,
    pub distance: f64,
    pub face_index: usize,
}

/// Closest pair between two meshes
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeometryClosestHit {
    /// Point on this mesh, in this mesh's frame
    pub point: Point3<f64>,
    pub face_index: usize,
    /// Point on the other mesh, in the other mesh's frame
    pub other_point: Point3<f64>,
    pub other_face_index: usize,
    pub distance: f64,
}

struct PointVisitor {
    point: Point3<f64>,
    min_threshold_sq: f64,
    max_threshold_sq: f64,
    best_distance_sq: f64,
    best: Option<(Point3<f64>, usize)>,
}

impl ShapecastVisitor for PointVisitor {
    fn bounds_score(&mut self, bounds: &BoundingBox) -> Option<f64> {
        Some(bounds.distance_squared_to_point(&self.point))
    }

    fn intersects_bounds(
        &mut self,
        _bounds: &BoundingBox,
        _is_leaf: bool,
        score: Option<f64>,
        _depth: usize,
        _node: NodeId,
    ) -> BoundsTest {
        let score = score.unwrap_or(0.0);
        (score < self.best_distance_sq && score <= self.max_threshold_sq).into()
    }

    fn intersects_triangle(
        &mut self,
        triangle: &ExtendedTriangle,
        tri_index: usize,
        _contained: bool,
        _depth: usize,
    ) -> bool {
        let closest = triangle.closest_point_to_point(&self.point);
        let distance_sq = (closest - self.point).norm_squared();
        if distance_sq < self.best_distance_sq && distance_sq <= self.max_threshold_sq {
            self.best_distance_sq = distance_sq;
            self.best = Some((closest, tri_index));
        }
        distance_sq < self.min_threshold_sq
    }
}

struct Best {
    distance: f64,
    point: Point3<f64>,
    other_point: Point3<f64>,
    face_index: usize,
    other_face_index: usize,
}

struct GeometryVisitor<'a> {
    other: &'a Mesh,
    other_bvh: Option<&'a MeshBvh>,
    other_to_mesh: &'a Matrix4<f64>,
    mesh_to_other: &'a Matrix4<f64>,
    /// Other mesh bounds in this frame
    other_box: BoundingBox,
    min_threshold: f64,
    max_threshold: f64,
    best: Option<Best>,
}

impl GeometryVisitor<'_> {
    fn best_distance(&self) -> f64 {
        self.best.as_ref().map_or(f64::INFINITY, |b| b.distance)
    }

    /// Test every pair; returns `true` once a pair is under the minimum threshold
    fn test_pair(
        &mut self,
        triangle: &ExtendedTriangle,
        face_index: usize,
        other_triangle: &ExtendedTriangle,
        other_face_index: usize,
    ) -> bool {
        let (distance, point, other_point) = triangle.distance_to_triangle(other_triangle);
        if distance < self.best_distance() && distance <= self.max_threshold {
            self.best = Some(Best {
                distance,
                point,
                other_point,
                face_index,
                other_face_index,
            });
        }
        distance < self.min_threshold
    }
}

/// Other-tree side of a closest geometry query for one leaf range of this tree
struct OtherRangeVisitor<'a, 'b> {
    parent: &'b mut GeometryVisitor<'a>,
    /// This leaf's box in the other frame
    leaf_box: BoundingBox,
    triangles: &'b [(usize, ExtendedTriangle)],
}

impl ShapecastVisitor for OtherRangeVisitor<'_, '_> {
    fn bounds_score(&mut self, bounds: &BoundingBox) -> Option<f64> {
        Some(self.leaf_box.distance_to_box(bounds))
    }

    fn intersects_bounds(
        &mut self,
        _bounds: &BoundingBox,
        _is_leaf: bool,
        score: Option<f64>,
        _depth: usize,
        _node: NodeId,
    ) -> BoundsTest {
        let score = score.unwrap_or(0.0);
        (score < self.parent.best_distance() && score <= self.parent.max_threshold).into()
    }

    fn intersects_triangle(
        &mut self,
        triangle: &ExtendedTriangle,
        tri_index: usize,
        _contained: bool,
        _depth: usize,
    ) -> bool {
        let moved = ExtendedTriangle::new(triangle.triangle.transform(self.parent.other_to_mesh));
        for (face_index, local) in self.triangles {
            if self.parent.test_pair(local, *face_index, &moved, tri_index) {
                return true;
            }
        }
        false
    }
}

impl ShapecastVisitor for GeometryVisitor<'_> {
    fn bounds_score(&mut self, bounds: &BoundingBox) -> Option<f64> {
        Some(self.other_box.distance_to_box(bounds))
    }

    fn intersects_bounds(
        &mut self,
        _bounds: &BoundingBox,
        _is_leaf: bool,
        score: Option<f64>,
        _depth: usize,
        _node: NodeId,
    ) -> BoundsTest {
        let score = score.unwrap_or(0.0);
        (score < self.best_distance() && score <= self.max_threshold).into()
    }

    fn intersects_range(&mut self, range: &LeafRange) -> bool {
        let triangles: Vec<(usize, ExtendedTriangle)> =
            range.slots().map(|slot| range.triangle(slot)).collect();

        match self.other_bvh {
            Some(other_bvh) => {
                let other = self.other;
                let leaf_box = range.bounds.transform(self.mesh_to_other);
                let mut visitor = OtherRangeVisitor {
                    parent: self,
                    leaf_box,
                    triangles: &triangles,
                };
                other_bvh.shapecast(other, &mut visitor)
            }
            None => {
                for other_index in 0..self.other.triangle_count() {
                    let moved = ExtendedTriangle::new(
                        self.other.triangle(other_index).transform(self.other_to_mesh),
                    );
                    for (face_index, local) in &triangles {
                        if self.test_pair(local, *face_index, &moved, other_index) {
                            return true;
                        }
                    }
                }
                false
            }
        }
    }
}

impl MeshBvh {
    /// Closest surface point to `point`. Triangles farther than
    /// `max_threshold` are ignored; the search stops early once a point
    /// closer than `min_threshold` is found.
    pub fn closest_point_to_point(
        &self,
        mesh: &Mesh,
        point: &Point3<f64>,
        min_threshold: f64,
        max_threshold: f64,
    ) -> Option<ClosestPointHit> {
        let mut visitor = PointVisitor {
            point: *point,
            min_threshold_sq: min_threshold * min_threshold,
            max_threshold_sq: max_threshold * max_threshold,
            best_distance_sq: f64::INFINITY,
            best: None,
        };
        self.shapecast(mesh, &mut visitor);

        visitor.best.map(|(closest, face_index)| ClosestPointHit {
            point: closest,
            distance: visitor.best_distance_sq.sqrt(),
            face_index,
        })
    }

    /// Closest pair of points between this mesh and `other` placed by
    /// `other_to_mesh`. `other_bvh` must have been built over `other`.
    pub fn closest_point_to_geometry(
        &self,
        mesh: &Mesh,
        other: &Mesh,
        other_bvh: Option<&MeshBvh>,
        other_to_mesh: &Matrix4<f64>,
        min_threshold: f64,
        max_threshold: f64,
    ) -> Result<Option<GeometryClosestHit>> {
        let mesh_to_other = other_to_mesh.try_inverse().ok_or_else(|| {
            BvhError::InvalidGeometry("geometry transform is not invertible".to_string())
        })?;
        let other_local_box = match other_bvh {
            Some(other_bvh) => other_bvh.bounding_box(),
            None => other.bounding_box(),
        };

        let mut visitor = GeometryVisitor {
            other,
            other_bvh,
            other_to_mesh,
            mesh_to_other: &mesh_to_other,
            other_box: other_local_box.transform(other_to_mesh),
            min_threshold,
            max_threshold,
            best: None,
        };
        self.shapecast(mesh, &mut visitor);

        Ok(visitor.best.map(|best| GeometryClosestHit {
            point: best.point,
            face_index: best.face_index,
            other_point: mesh_to_other.transform_point(&best.other_point),
            other_face_index: best.other_face_index,
            distance: best.distance,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildOptions;
    use crate::geometry::Primitive;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn sphere() -> (Mesh, MeshBvh) {
        let mut mesh = Primitive::sphere(1.0, 12).to_mesh();
        let bvh = MeshBvh::build(
            &mut mesh,
            &BuildOptions {
                max_leaf_triangles: 4,
                ..BuildOptions::default()
            },
        )
        .unwrap();
        (mesh, bvh)
    }

    fn brute_force_point(mesh: &Mesh, point: &Point3<f64>) -> f64 {
        (0..mesh.triangle_count())
            .map(|t| ExtendedTriangle::new(mesh.triangle(t)).distance_to_point(point))
            .fold(f64::INFINITY, f64::min)
    }

    #[test]
    fn test_point_matches_brute_force() {
        let (mesh, bvh) = sphere();
        for i in 0..12 {
            let t = i as f64 * 0.5;
            let query = Point3::new(2.0 * t.cos(), 0.4 * t, 1.5 * t.sin());
            let hit = bvh
                .closest_point_to_point(&mesh, &query, 0.0, f64::INFINITY)
                .unwrap();
            assert_relative_eq!(hit.distance, brute_force_point(&mesh, &query), epsilon = 1e-9);
            assert_relative_eq!((hit.point - query).norm(), hit.distance, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_point_max_threshold() {
        let (mesh, bvh) = sphere();
        let query = Point3::new(5.0, 0.0, 0.0);
        assert!(bvh.closest_point_to_point(&mesh, &query, 0.0, 1.0).is_none());
        assert!(bvh.closest_point_to_point(&mesh, &query, 0.0, 4.5).is_some());
    }

    #[test]
    fn test_geometry_distance_between_cubes() {
        let mut a = Primitive::cube(Vector3::new(1.0, 1.0, 1.0), true).to_mesh();
        let mut b = a.clone();
        let options = BuildOptions {
            max_leaf_triangles: 2,
            ..BuildOptions::default()
        };
        let bvh_a = MeshBvh::build(&mut a, &options).unwrap();
        let bvh_b = MeshBvh::build(&mut b, &options).unwrap();

        let placement = Matrix4::new_translation(&Vector3::new(3.0, 0.0, 0.0));
        for other_tree in [None, Some(&bvh_b)] {
            let hit = bvh_a
                .closest_point_to_geometry(&a, &b, other_tree, &placement, 0.0, f64::INFINITY)
                .unwrap()
                .unwrap();
            assert_relative_eq!(hit.distance, 2.0, epsilon = 1e-9);
            assert_relative_eq!(hit.point.x, 0.5, epsilon = 1e-9);
            // reported in the other cube's own frame
            assert_relative_eq!(hit.other_point.x, -0.5, epsilon = 1e-9);
        }
    }
}
