// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Bounding volume hierarchy over the triangles of a mesh
//!
//! A [`MeshBvh`] holds one packed tree per material group and answers ray,
//! shape, closest point and mesh-vs-mesh queries against the mesh it was
//! built from. The mesh is not stored; every query takes it as an argument.

pub mod bounds;
mod build;
pub mod debug;
pub mod indexing;
pub mod node;
pub mod serialize;
pub mod split;
pub mod traverse;

use log::debug;

pub use build::root_ranges;
pub use indexing::TriangleIndexing;
pub use node::{NodeBuffer, NodeId, PackedNode};
pub use serialize::{DeserializeOptions, SerializeOptions, SerializedBvh};
pub use traverse::{
    BoundsTest, BvhcastContext, ClosestPointHit, GeometryClosestHit, LeafInfo, LeafRange,
    RayHit, ShapecastVisitor,
};

use crate::config::BuildOptions;
use crate::error::{BvhError, Result};
use crate::geometry::{BoundingBox, Mesh, Triangle};
use bounds::TriangleBounds;

#[derive(Debug, Clone)]
pub struct MeshBvh {
    roots: Vec<NodeBuffer>,
    indexing: TriangleIndexing,
    depth_limit_reached: bool,
}

impl MeshBvh {
    /// Build a BVH for `mesh`.
    ///
    /// In direct mode the mesh index is reordered in place (an unindexed mesh
    /// gets an identity index first). In indirect mode the mesh is left
    /// untouched and the BVH keeps its own triangle table.
    pub fn build(mesh: &mut Mesh, options: &BuildOptions) -> Result<Self> {
        build::validate_options(options)?;
        mesh.validate()?;

        if !options.indirect {
            mesh.ensure_index();
        }

        let (first, count) = mesh.draw_range_triangles();
        let mut ranges = root_ranges(mesh);
        let mut indexing = if options.indirect {
            for range in &mut ranges {
                range.0 -= first;
            }
            TriangleIndexing::Indirect((first as u32..(first + count) as u32).collect())
        } else {
            TriangleIndexing::Direct
        };

        let slot_count = match &indexing {
            TriangleIndexing::Direct => mesh.triangle_count(),
            TriangleIndexing::Indirect(table) => table.len(),
        };
        let mut bounds = TriangleBounds::compute(mesh, &indexing, slot_count);

        let output = {
            let (order, stride): (&mut [u32], usize) = match &mut indexing {
                TriangleIndexing::Indirect(table) => (table.as_mut_slice(), 1),
                TriangleIndexing::Direct => match mesh.index.as_mut() {
                    Some(index) => (index.as_mut_slice(), 3),
                    None => {
                        return Err(BvhError::InvalidGeometry(
                            "direct build requires an index".to_string(),
                        ))
                    }
                },
            };
            build::build_roots(&mut bounds, order, stride, &ranges, options)
        };

        let roots: Vec<NodeBuffer> = output
            .roots
            .into_iter()
            .map(|words| NodeBuffer::new(words, options.shared_buffers))
            .collect();

        debug!(
            "built BVH: {} roots, {} nodes, {} triangles, strategy {:?}",
            roots.len(),
            roots.iter().map(NodeBuffer::node_count).sum::<usize>(),
            slot_count,
            options.strategy
        );

        Ok(Self {
            roots,
            indexing,
            depth_limit_reached: output.depth_limit_reached,
        })
    }

    pub(crate) fn from_parts(roots: Vec<NodeBuffer>, indexing: TriangleIndexing) -> Self {
        Self {
            roots,
            indexing,
            depth_limit_reached: false,
        }
    }

    pub fn roots(&self) -> &[NodeBuffer] {
        &self.roots
    }

    pub(crate) fn roots_mut(&mut self) -> &mut [NodeBuffer] {
        &mut self.roots
    }

    pub fn indexing(&self) -> &TriangleIndexing {
        &self.indexing
    }

    pub fn is_indirect(&self) -> bool {
        self.indexing.is_indirect()
    }

    /// Whether the depth limit forced leaves larger than requested
    pub fn depth_limit_reached(&self) -> bool {
        self.depth_limit_reached
    }

    /// Mesh triangle stored at leaf slot `slot`
    #[inline]
    pub fn resolve_triangle_index(&self, slot: usize) -> usize {
        self.indexing.resolve(slot)
    }

    pub(crate) fn slot_triangle(&self, mesh: &Mesh, slot: usize) -> Triangle {
        mesh.triangle(self.resolve_triangle_index(slot))
    }

    /// Union of the root boxes
    pub fn bounding_box(&self) -> BoundingBox {
        self.roots
            .iter()
            .fold(BoundingBox::empty(), |acc, root| acc.union(&root.bounds(0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SplitStrategy;
    use crate::geometry::{Group, Primitive};
    use nalgebra::{Point3, Vector3};

    fn unit_cube() -> Mesh {
        Primitive::cube(Vector3::new(1.0, 1.0, 1.0), true).to_mesh()
    }

    #[test]
    fn test_unit_cube_root_box_is_exact() {
        let mut mesh = unit_cube();
        let bvh = MeshBvh::build(&mut mesh, &BuildOptions::default()).unwrap();
        assert_eq!(bvh.roots().len(), 1);

        let bbox = bvh.bounding_box();
        assert_eq!(bbox.min, Point3::new(-0.5, -0.5, -0.5));
        assert_eq!(bbox.max, Point3::new(0.5, 0.5, 0.5));
        assert!(!bvh.depth_limit_reached());
    }

    #[test]
    fn test_direct_build_keeps_triangle_set() {
        let original = Primitive::sphere(1.0, 12).to_mesh();
        let mut mesh = original.clone();
        let options = BuildOptions {
            max_leaf_triangles: 2,
            ..BuildOptions::default()
        };
        MeshBvh::build(&mut mesh, &options).unwrap();

        let sorted = |m: &Mesh| {
            let mut tris: Vec<[u32; 3]> = (0..m.triangle_count())
                .map(|t| m.triangle_vertex_indices(t))
                .collect();
            tris.sort_unstable();
            tris
        };
        assert_eq!(sorted(&original), sorted(&mesh));
    }

    #[test]
    fn test_indirect_build_leaves_mesh_untouched() {
        let original = Primitive::sphere(1.0, 12).to_mesh();
        let mut mesh = original.clone();
        let options = BuildOptions {
            indirect: true,
            strategy: SplitStrategy::Sah,
            ..BuildOptions::default()
        };
        let bvh = MeshBvh::build(&mut mesh, &options).unwrap();
        assert_eq!(mesh.index, original.index);

        let mut table = bvh.indexing().table().unwrap().to_vec();
        table.sort_unstable();
        assert_eq!(table, (0..mesh.triangle_count() as u32).collect::<Vec<_>>());
    }

    #[test]
    fn test_one_root_per_group() {
        let mut mesh = unit_cube().with_groups(vec![Group::new(0, 18, 0), Group::new(18, 18, 1)]);
        let bvh = MeshBvh::build(&mut mesh, &BuildOptions::default()).unwrap();
        assert_eq!(bvh.roots().len(), 2);
    }

    #[test]
    fn test_depth_limit_is_flagged() {
        let mut mesh = Primitive::sphere(1.0, 16).to_mesh();
        let options = BuildOptions {
            max_depth: 1,
            max_leaf_triangles: 1,
            ..BuildOptions::default()
        };
        let bvh = MeshBvh::build(&mut mesh, &options).unwrap();
        assert!(bvh.depth_limit_reached());
    }

    #[test]
    fn test_invalid_mesh_is_rejected() {
        let mut mesh = Mesh::new();
        assert!(matches!(
            MeshBvh::build(&mut mesh, &BuildOptions::default()),
            Err(BvhError::InvalidGeometry(_))
        ));
    }
}
