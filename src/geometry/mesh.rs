// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Indexed triangle mesh with optional vertex attributes and material groups

use nalgebra::{Matrix3, Matrix4, Point2, Point3, Vector3};
use serde::{Deserialize, Serialize};

use super::bbox::BoundingBox;
use super::triangle::Triangle;
use crate::error::{BvhError, Result};

/// Contiguous run of index entries rendered with one material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// First index entry of the group
    pub start: usize,
    /// Number of index entries, a multiple of 3
    pub count: usize,
    pub material_index: usize,
}

impl Group {
    pub fn new(start: usize, count: usize, material_index: usize) -> Self {
        Self {
            start,
            count,
            material_index,
        }
    }
}

/// Portion of the index (or vertex list when unindexed) considered by consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DrawRange {
    pub start: usize,
    /// `None` draws to the end
    pub count: Option<usize>,
}

/// Triangular mesh
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Mesh {
    pub positions: Vec<Point3<f64>>,
    pub normals: Option<Vec<Vector3<f64>>>,
    pub uvs: Option<Vec<Point2<f64>>>,
    pub uv1s: Option<Vec<Point2<f64>>>,
    /// Three entries per triangle; `None` reads vertices as consecutive triples
    pub index: Option<Vec<u32>>,
    pub groups: Vec<Group>,
    pub draw_range: DrawRange,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_positions(positions: Vec<Point3<f64>>) -> Self {
        Self {
            positions,
            ..Self::default()
        }
    }

    pub fn with_index(mut self, index: Vec<u32>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_normals(mut self, normals: Vec<Vector3<f64>>) -> Self {
        self.normals = Some(normals);
        self
    }

    pub fn with_uvs(mut self, uvs: Vec<Point2<f64>>) -> Self {
        self.uvs = Some(uvs);
        self
    }

    pub fn with_groups(mut self, groups: Vec<Group>) -> Self {
        self.groups = groups;
        self
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of entries triangles are read from (index length or vertex count)
    pub fn index_count(&self) -> usize {
        match &self.index {
            Some(index) => index.len(),
            None => self.positions.len(),
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.index_count() / 3
    }

    /// Vertex ids of triangle `tri`
    pub fn triangle_vertex_indices(&self, tri: usize) -> [u32; 3] {
        let i3 = tri * 3;
        match &self.index {
            Some(index) => [index[i3], index[i3 + 1], index[i3 + 2]],
            None => [i3 as u32, i3 as u32 + 1, i3 as u32 + 2],
        }
    }

    pub fn triangle(&self, tri: usize) -> Triangle {
        let [a, b, c] = self.triangle_vertex_indices(tri);
        Triangle::new(
            self.positions[a as usize],
            self.positions[b as usize],
            self.positions[c as usize],
        )
    }

    /// Triangle range `(first, count)` selected by the draw range
    pub fn draw_range_triangles(&self) -> (usize, usize) {
        let total = self.index_count();
        let start = self.draw_range.start.min(total);
        let end = match self.draw_range.count {
            Some(count) => (start + count).min(total),
            None => total,
        };
        (start / 3, (end - start) / 3)
    }

    /// Replace a missing index with the identity ordering
    pub fn ensure_index(&mut self) {
        if self.index.is_none() {
            self.index = Some((0..self.positions.len() as u32).collect());
        }
    }

    /// Check that every buffer agrees with the position count and the index is in range
    pub fn validate(&self) -> Result<()> {
        let vertex_count = self.positions.len();
        if vertex_count == 0 {
            return Err(BvhError::InvalidGeometry(
                "mesh has no position data".to_string(),
            ));
        }

        let check_len = |name: &str, len: Option<usize>| -> Result<()> {
            match len {
                Some(len) if len != vertex_count => Err(BvhError::InvalidGeometry(format!(
                    "{} attribute has {} entries, expected {}",
                    name, len, vertex_count
                ))),
                _ => Ok(()),
            }
        };
        check_len("normal", self.normals.as_ref().map(Vec::len))?;
        check_len("uv", self.uvs.as_ref().map(Vec::len))?;
        check_len("uv1", self.uv1s.as_ref().map(Vec::len))?;

        match &self.index {
            Some(index) => {
                if index.len() % 3 != 0 {
                    return Err(BvhError::InvalidGeometry(format!(
                        "index length {} is not a multiple of 3",
                        index.len()
                    )));
                }
                if let Some(bad) = index.iter().find(|&&i| i as usize >= vertex_count) {
                    return Err(BvhError::InvalidGeometry(format!(
                        "index references vertex {} but the mesh has {} vertices",
                        bad, vertex_count
                    )));
                }
            }
            None => {
                if vertex_count % 3 != 0 {
                    return Err(BvhError::InvalidGeometry(format!(
                        "unindexed mesh has {} vertices, not a multiple of 3",
                        vertex_count
                    )));
                }
            }
        }

        let index_count = self.index_count();
        for group in &self.groups {
            if group.start + group.count > index_count {
                return Err(BvhError::InvalidGeometry(format!(
                    "group [{}, {}) exceeds the {} index entries",
                    group.start,
                    group.start + group.count,
                    index_count
                )));
            }
        }
        if self.draw_range.start > index_count {
            return Err(BvhError::InvalidGeometry(format!(
                "draw range starts at {} past the {} index entries",
                self.draw_range.start, index_count
            )));
        }

        Ok(())
    }

    /// Compute bounding box
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_points(self.positions.iter())
    }

    /// Transform positions and normals by a matrix
    pub fn transform(&mut self, matrix: &Matrix4<f64>) {
        for position in &mut self.positions {
            *position = matrix.transform_point(position);
        }
        if let Some(normals) = &mut self.normals {
            let normal_matrix = normal_matrix(matrix);
            for normal in normals.iter_mut() {
                *normal = (normal_matrix * *normal)
                    .try_normalize(0.0)
                    .unwrap_or(*normal);
            }
        }
    }

    /// Area-weighted vertex normals
    pub fn recompute_normals(&mut self) {
        let mut normals = vec![Vector3::zeros(); self.positions.len()];
        for tri in 0..self.triangle_count() {
            let face = self.triangle(tri).scaled_normal();
            for v in self.triangle_vertex_indices(tri) {
                normals[v as usize] += face;
            }
        }
        for normal in &mut normals {
            *normal = normal.try_normalize(0.0).unwrap_or_else(Vector3::zeros);
        }
        self.normals = Some(normals);
    }

    /// Signed enclosed volume; positive for closed meshes with outward winding
    pub fn volume(&self) -> f64 {
        (0..self.triangle_count())
            .map(|tri| {
                let t = self.triangle(tri);
                t.a.coords.dot(&t.b.coords.cross(&t.c.coords)) / 6.0
            })
            .sum()
    }

    pub fn surface_area(&self) -> f64 {
        (0..self.triangle_count())
            .map(|tri| self.triangle(tri).area())
            .sum()
    }
}

/// Inverse transpose of the upper 3x3 block, identity when singular
pub fn normal_matrix(matrix: &Matrix4<f64>) -> Matrix3<f64> {
    let linear: Matrix3<f64> = matrix.fixed_view::<3, 3>(0, 0).into_owned();
    linear
        .try_inverse()
        .map(|m| m.transpose())
        .unwrap_or_else(Matrix3::identity)
}
