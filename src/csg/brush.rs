// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

use nalgebra::Matrix4;

use super::half_edge::{HalfEdgeMap, HalfEdgeOptions};
use crate::bvh::MeshBvh;
use crate::config::BuildOptions;
use crate::error::{BvhError, Result};
use crate::geometry::Mesh;

#[derive(Debug, Clone)]
struct BrushCache {
    bvh: MeshBvh,
    half_edges: HalfEdgeMap,
    group_indices: Vec<usize>,
}

/// Mesh placed in the world by a matrix, with the acceleration data the CSG
/// evaluator needs. The caches are built by [`Brush::prepare`] and kept
/// until [`Brush::mark_dirty`] is called.
#[derive(Debug, Clone)]
pub struct Brush {
    mesh: Mesh,
    matrix: Matrix4<f64>,
    cache: Option<BrushCache>,
}

/// Borrowed view of a prepared brush
pub(crate) struct PreparedBrush<'a> {
    pub mesh: &'a Mesh,
    pub matrix: &'a Matrix4<f64>,
    pub bvh: &'a MeshBvh,
    pub half_edges: &'a HalfEdgeMap,
    pub group_indices: &'a [usize],
}

/// Build options used for brush trees
pub fn brush_build_options() -> BuildOptions {
    BuildOptions {
        max_leaf_triangles: 3,
        indirect: true,
        ..BuildOptions::default()
    }
}

/// Group slot of every mesh triangle; triangles outside all groups use slot 0
fn group_indices(mesh: &Mesh) -> Vec<usize> {
    let mut indices = vec![0; mesh.triangle_count()];
    for (g, group) in mesh.groups.iter().enumerate() {
        let first = group.start / 3;
        let end = ((group.start + group.count) / 3).min(indices.len());
        for slot in indices.iter_mut().take(end).skip(first) {
            *slot = g;
        }
    }
    indices
}

impl Brush {
    pub fn new(mesh: Mesh) -> Self {
        Self {
            mesh,
            matrix: Matrix4::identity(),
            cache: None,
        }
    }

    pub fn with_matrix(mut self, matrix: Matrix4<f64>) -> Self {
        self.matrix = matrix;
        self
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    /// Caches stay as they are; call [`Brush::mark_dirty`] after editing.
    pub fn mesh_mut(&mut self) -> &mut Mesh {
        &mut self.mesh
    }

    pub fn into_mesh(self) -> Mesh {
        self.mesh
    }

    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.matrix
    }

    /// Caches live in the brush's local frame and survive a move
    pub fn set_matrix(&mut self, matrix: Matrix4<f64>) {
        self.matrix = matrix;
    }

    pub fn is_prepared(&self) -> bool {
        self.cache.is_some()
    }

    /// Build whichever caches are missing
    pub fn prepare(&mut self) -> Result<()> {
        if self.cache.is_some() {
            return Ok(());
        }

        let bvh = MeshBvh::build(&mut self.mesh, &brush_build_options())?;
        let half_edges = HalfEdgeMap::from_mesh(
            &self.mesh,
            &HalfEdgeOptions {
                use_draw_range: true,
                ..HalfEdgeOptions::default()
            },
        );
        self.cache = Some(BrushCache {
            bvh,
            half_edges,
            group_indices: group_indices(&self.mesh),
        });
        Ok(())
    }

    /// Drop the caches after the geometry changed
    pub fn mark_dirty(&mut self) {
        self.cache = None;
    }

    pub fn bvh(&self) -> Option<&MeshBvh> {
        self.cache.as_ref().map(|c| &c.bvh)
    }

    pub fn half_edges(&self) -> Option<&HalfEdgeMap> {
        self.cache.as_ref().map(|c| &c.half_edges)
    }

    pub fn group_indices(&self) -> Option<&[usize]> {
        self.cache.as_ref().map(|c| c.group_indices.as_slice())
    }

    pub(crate) fn prepared(&self) -> Result<PreparedBrush<'_>> {
        let cache = self.cache.as_ref().ok_or_else(|| {
            BvhError::InvalidGeometry("brush caches have not been built".to_string())
        })?;
        Ok(PreparedBrush {
            mesh: &self.mesh,
            matrix: &self.matrix,
            bvh: &cache.bvh,
            half_edges: &cache.half_edges,
            group_indices: &cache.group_indices,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Group, Primitive};
    use nalgebra::Vector3;

    #[test]
    fn test_prepare_keeps_source_index() {
        let mesh = Primitive::sphere(1.0, 8).to_mesh();
        let original = mesh.index.clone();
        let mut brush = Brush::new(mesh);
        assert!(!brush.is_prepared());
        assert!(brush.prepared().is_err());

        brush.prepare().unwrap();
        assert!(brush.is_prepared());
        assert_eq!(brush.mesh().index, original);
        assert!(brush.bvh().unwrap().is_indirect());
        assert!(brush.half_edges().unwrap().is_fully_connected());

        brush.mark_dirty();
        assert!(brush.bvh().is_none());
    }

    #[test]
    fn test_group_indices_follow_groups() {
        let mesh = Primitive::cube(Vector3::new(1.0, 1.0, 1.0), true)
            .to_mesh()
            .with_groups(vec![Group::new(0, 12, 0), Group::new(12, 24, 1)]);
        let mut brush = Brush::new(mesh);
        brush.prepare().unwrap();

        let indices = brush.group_indices().unwrap();
        assert_eq!(indices.len(), 12);
        assert!(indices[..4].iter().all(|&g| g == 0));
        assert!(indices[4..].iter().all(|&g| g == 1));
        // one root per group
        assert_eq!(brush.bvh().unwrap().roots().len(), 2);
    }

    #[test]
    fn test_invalid_mesh_fails_to_prepare() {
        let mut brush = Brush::new(Mesh::new());
        assert!(matches!(brush.prepare(), Err(BvhError::InvalidGeometry(_))));
    }
}
