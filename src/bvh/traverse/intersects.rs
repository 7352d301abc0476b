// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Boolean overlap queries: oriented box, sphere and another mesh

use nalgebra::{Matrix4, Point3};

use super::shapecast::{BoundsTest, ShapecastVisitor};
use crate::bvh::node::{NodeBuffer, NodeId, PackedNode};
use crate::bvh::MeshBvh;
use crate::error::{BvhError, Result};
use crate::geometry::{BoundingBox, ExtendedTriangle, Mesh, OrientedBox};

struct BoxVisitor {
    obb: OrientedBox,
}

impl ShapecastVisitor for BoxVisitor {
    fn intersects_bounds(
        &mut self,
        bounds: &BoundingBox,
        _is_leaf: bool,
        _score: Option<f64>,
        _depth: usize,
        _node: NodeId,
    ) -> BoundsTest {
        self.obb.intersects_box(bounds).into()
    }

    fn intersects_triangle(
        &mut self,
        triangle: &ExtendedTriangle,
        _tri_index: usize,
        _contained: bool,
        _depth: usize,
    ) -> bool {
        self.obb.intersects_triangle(triangle)
    }
}

struct SphereVisitor {
    center: Point3<f64>,
    radius: f64,
}

impl ShapecastVisitor for SphereVisitor {
    fn intersects_bounds(
        &mut self,
        bounds: &BoundingBox,
        _is_leaf: bool,
        _score: Option<f64>,
        _depth: usize,
        _node: NodeId,
    ) -> BoundsTest {
        bounds.intersects_sphere(&self.center, self.radius).into()
    }

    fn intersects_triangle(
        &mut self,
        triangle: &ExtendedTriangle,
        _tri_index: usize,
        _contained: bool,
        _depth: usize,
    ) -> bool {
        triangle.intersects_sphere(&self.center, self.radius)
    }
}

/// Other-mesh triangles (moved into this frame) against one leaf of this tree
struct LeafAgainstOther<'a> {
    leaf_obb: OrientedBox,
    other_to_mesh: &'a Matrix4<f64>,
    leaf_triangles: &'a [ExtendedTriangle],
}

impl ShapecastVisitor for LeafAgainstOther<'_> {
    fn intersects_bounds(
        &mut self,
        bounds: &BoundingBox,
        _is_leaf: bool,
        _score: Option<f64>,
        _depth: usize,
        _node: NodeId,
    ) -> BoundsTest {
        self.leaf_obb.intersects_box(bounds).into()
    }

    fn intersects_triangle(
        &mut self,
        triangle: &ExtendedTriangle,
        _tri_index: usize,
        _contained: bool,
        _depth: usize,
    ) -> bool {
        let moved = ExtendedTriangle::new(triangle.triangle.transform(self.other_to_mesh));
        self.leaf_triangles
            .iter()
            .any(|tri| tri.intersects_triangle(&moved))
    }
}

struct GeometryQuery<'a> {
    bvh: &'a MeshBvh,
    mesh: &'a Mesh,
    root: &'a NodeBuffer,
    other: &'a Mesh,
    other_bvh: Option<&'a MeshBvh>,
    other_to_mesh: &'a Matrix4<f64>,
    mesh_to_other: Matrix4<f64>,
    other_obb: &'a OrientedBox,
}

impl GeometryQuery<'_> {
    fn traverse(&self, word: usize) -> bool {
        if !self.other_obb.intersects_box(&self.root.bounds(word)) {
            return false;
        }

        match self.root.node(word) {
            PackedNode::Internal { left, right, .. } => self.traverse(left) || self.traverse(right),
            PackedNode::Leaf { offset, count } => match self.other_bvh {
                Some(other_bvh) => {
                    let leaf_triangles: Vec<ExtendedTriangle> = (offset..offset + count)
                        .map(|slot| ExtendedTriangle::new(self.bvh.slot_triangle(self.mesh, slot)))
                        .collect();
                    let mut visitor = LeafAgainstOther {
                        leaf_obb: OrientedBox::new(&self.root.bounds(word), self.mesh_to_other),
                        other_to_mesh: self.other_to_mesh,
                        leaf_triangles: &leaf_triangles,
                    };
                    other_bvh.shapecast(self.other, &mut visitor)
                }
                None => (offset..offset + count).any(|slot| {
                    let local = ExtendedTriangle::new(
                        self.bvh
                            .slot_triangle(self.mesh, slot)
                            .transform(&self.mesh_to_other),
                    );
                    (0..self.other.triangle_count()).any(|tri| {
                        local.intersects_triangle(&ExtendedTriangle::new(self.other.triangle(tri)))
                    })
                }),
            },
        }
    }
}

impl MeshBvh {
    /// Whether any triangle overlaps `bbox` placed in the mesh frame by `box_to_mesh`
    pub fn intersects_box(&self, mesh: &Mesh, bbox: &BoundingBox, box_to_mesh: &Matrix4<f64>) -> bool {
        let mut visitor = BoxVisitor {
            obb: OrientedBox::new(bbox, *box_to_mesh),
        };
        self.shapecast(mesh, &mut visitor)
    }

    pub fn intersects_sphere(&self, mesh: &Mesh, center: &Point3<f64>, radius: f64) -> bool {
        let mut visitor = SphereVisitor {
            center: *center,
            radius,
        };
        self.shapecast(mesh, &mut visitor)
    }

    /// Whether any triangle of `other`, placed by `other_to_mesh`, overlaps a
    /// triangle of this mesh. `other_bvh` must have been built over `other`;
    /// without it every triangle of `other` is tested per leaf.
    pub fn intersects_geometry(
        &self,
        mesh: &Mesh,
        other: &Mesh,
        other_bvh: Option<&MeshBvh>,
        other_to_mesh: &Matrix4<f64>,
    ) -> Result<bool> {
        let mesh_to_other = other_to_mesh.try_inverse().ok_or_else(|| {
            BvhError::InvalidGeometry("geometry transform is not invertible".to_string())
        })?;
        let other_box = match other_bvh {
            Some(other_bvh) => other_bvh.bounding_box(),
            None => other.bounding_box(),
        };
        let other_obb = OrientedBox::new(&other_box, *other_to_mesh);

        for root in self.roots() {
            let query = GeometryQuery {
                bvh: self,
                mesh,
                root,
                other,
                other_bvh,
                other_to_mesh,
                mesh_to_other,
                other_obb: &other_obb,
            };
            if query.traverse(0) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildOptions;
    use crate::geometry::Primitive;
    use nalgebra::Vector3;

    fn cube(size: f64) -> (Mesh, MeshBvh) {
        let mut mesh = Primitive::cube(Vector3::new(size, size, size), true).to_mesh();
        let bvh = MeshBvh::build(
            &mut mesh,
            &BuildOptions {
                max_leaf_triangles: 2,
                ..BuildOptions::default()
            },
        )
        .unwrap();
        (mesh, bvh)
    }

    #[test]
    fn test_intersects_box_surface_only() {
        let (mesh, bvh) = cube(2.0);
        let small = BoundingBox::new(Point3::new(-0.1, -0.1, -0.1), Point3::new(0.1, 0.1, 0.1));

        // fully inside the cube: no surface contact
        assert!(!bvh.intersects_box(&mesh, &small, &Matrix4::identity()));

        let on_face = Matrix4::new_translation(&Vector3::new(1.0, 0.0, 0.0));
        assert!(bvh.intersects_box(&mesh, &small, &on_face));
    }

    #[test]
    fn test_intersects_sphere() {
        let (mesh, bvh) = cube(2.0);
        assert!(!bvh.intersects_sphere(&mesh, &Point3::origin(), 0.5));
        assert!(bvh.intersects_sphere(&mesh, &Point3::origin(), 1.2));
        assert!(!bvh.intersects_sphere(&mesh, &Point3::new(5.0, 0.0, 0.0), 1.0));
    }

    #[test]
    fn test_intersects_geometry_with_and_without_bvh() {
        let (mesh, bvh) = cube(2.0);
        let (other, other_bvh) = cube(1.0);

        let overlapping = Matrix4::new_translation(&Vector3::new(1.0, 0.3, 0.2));
        let inside = Matrix4::new_translation(&Vector3::new(0.1, 0.0, 0.0));
        let apart = Matrix4::new_translation(&Vector3::new(4.0, 0.0, 0.0));

        for other_tree in [None, Some(&other_bvh)] {
            assert!(bvh
                .intersects_geometry(&mesh, &other, other_tree, &overlapping)
                .unwrap());
            assert!(!bvh
                .intersects_geometry(&mesh, &other, other_tree, &inside)
                .unwrap());
            assert!(!bvh
                .intersects_geometry(&mesh, &other, other_tree, &apart)
                .unwrap());
        }
    }

    #[test]
    fn test_singular_transform_is_rejected() {
        let (mesh, bvh) = cube(1.0);
        let flat = Matrix4::new_nonuniform_scaling(&Vector3::new(1.0, 1.0, 0.0));
        assert!(bvh.intersects_geometry(&mesh, &mesh, None, &flat).is_err());
    }
}
