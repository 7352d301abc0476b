// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Accumulation of result vertex attributes per material group

use nalgebra::{Matrix3, Matrix4, Point2, Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{BvhError, Result};
use crate::geometry::{normal_matrix, Group, Mesh};

/// Vertex attribute carried from the input brushes into a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Attribute {
    Position,
    Normal,
    Uv,
    Uv1,
}

impl Attribute {
    pub fn is_present(self, mesh: &Mesh) -> bool {
        match self {
            Attribute::Position => !mesh.positions.is_empty(),
            Attribute::Normal => mesh.normals.is_some(),
            Attribute::Uv => mesh.uvs.is_some(),
            Attribute::Uv1 => mesh.uv1s.is_some(),
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Attribute::Position => "position",
            Attribute::Normal => "normal",
            Attribute::Uv => "uv",
            Attribute::Uv1 => "uv1",
        };
        f.write_str(name)
    }
}

/// Which optional attributes a result carries; positions are always written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct AttributeSet {
    pub normal: bool,
    pub uv: bool,
    pub uv1: bool,
}

impl AttributeSet {
    /// Resolve the requested attributes against the brushes that feed the result.
    /// `None` selects every attribute all brushes carry.
    pub fn resolve(requested: Option<&[Attribute]>, meshes: &[&Mesh]) -> Result<Self> {
        let present = |attribute: Attribute| meshes.iter().all(|m| attribute.is_present(m));
        let Some(requested) = requested else {
            return Ok(Self {
                normal: present(Attribute::Normal),
                uv: present(Attribute::Uv),
                uv1: present(Attribute::Uv1),
            });
        };

        let mut set = Self::default();
        for &attribute in requested {
            if !present(attribute) {
                return Err(BvhError::InvalidGeometry(format!(
                    "attribute {} is not available on every brush",
                    attribute
                )));
            }
            match attribute {
                Attribute::Position => {}
                Attribute::Normal => set.normal = true,
                Attribute::Uv => set.uv = true,
                Attribute::Uv1 => set.uv1 = true,
            }
        }
        Ok(set)
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct GroupBuffers {
    positions: Vec<Point3<f64>>,
    normals: Vec<Vector3<f64>>,
    uvs: Vec<Point2<f64>>,
    uv1s: Vec<Point2<f64>>,
}

impl GroupBuffers {
    fn vertex_count(&self) -> usize {
        self.positions.len()
    }
}

/// World-frame attribute source for the triangles of one brush
pub(crate) struct AttributeSource<'a> {
    mesh: &'a Mesh,
    matrix: Matrix4<f64>,
    normal_matrix: Matrix3<f64>,
    mirrored: bool,
}

fn interpolate<const D: usize>(
    values: [nalgebra::SVector<f64, D>; 3],
    weights: &Vector3<f64>,
) -> nalgebra::SVector<f64, D> {
    values[0] * weights.x + values[1] * weights.y + values[2] * weights.z
}

impl<'a> AttributeSource<'a> {
    pub fn new(mesh: &'a Mesh, matrix: &Matrix4<f64>) -> Self {
        Self {
            mesh,
            matrix: *matrix,
            normal_matrix: normal_matrix(matrix),
            mirrored: matrix.determinant() < 0.0,
        }
    }

    /// Append the triangle whose corners have barycentric `weights` on mesh
    /// triangle `tri`. `invert` reverses the winding and negates normals;
    /// mirrored brushes additionally swap the winding back.
    pub fn append(
        &self,
        tri: usize,
        weights: &[Vector3<f64>; 3],
        set: &AttributeSet,
        out: &mut GroupBuffers,
        invert: bool,
    ) {
        let vertices = self.mesh.triangle_vertex_indices(tri).map(|v| v as usize);
        let order = if invert != self.mirrored {
            [0, 2, 1]
        } else {
            [0, 1, 2]
        };

        let positions = vertices.map(|v| self.mesh.positions[v].coords);
        for &k in &order {
            let local = Point3::from(interpolate(positions, &weights[k]));
            out.positions.push(self.matrix.transform_point(&local));
        }

        if let (true, Some(normals)) = (set.normal, &self.mesh.normals) {
            let sign = if invert { -1.0 } else { 1.0 };
            let values = vertices.map(|v| self.normal_matrix * normals[v] * sign);
            for &k in &order {
                let normal = interpolate(values, &weights[k]);
                out.normals
                    .push(normal.try_normalize(0.0).unwrap_or_else(Vector3::zeros));
            }
        }

        for (enabled, source, target) in [
            (set.uv, &self.mesh.uvs, &mut out.uvs),
            (set.uv1, &self.mesh.uv1s, &mut out.uv1s),
        ] {
            if let (true, Some(uvs)) = (enabled, source) {
                let values = vertices.map(|v| uvs[v].coords);
                for &k in &order {
                    target.push(Point2::from(interpolate(values, &weights[k])));
                }
            }
        }
    }
}

/// Weights selecting the corners of the source triangle itself
pub(crate) fn whole_triangle() -> [Vector3<f64>; 3] {
    [Vector3::x(), Vector3::y(), Vector3::z()]
}

/// Result buffers of one operation, one slot per output group
#[derive(Debug, Clone)]
pub(crate) struct OutputBuffers {
    set: AttributeSet,
    slots: Vec<GroupBuffers>,
}

impl OutputBuffers {
    pub fn new(set: AttributeSet) -> Self {
        Self {
            set,
            slots: Vec::new(),
        }
    }

    pub fn set(&self) -> &AttributeSet {
        &self.set
    }

    pub fn slot_mut(&mut self, slot: usize) -> &mut GroupBuffers {
        if slot >= self.slots.len() {
            self.slots.resize_with(slot + 1, GroupBuffers::default);
        }
        &mut self.slots[slot]
    }

    pub fn triangle_count(&self) -> usize {
        self.slots.iter().map(GroupBuffers::vertex_count).sum::<usize>() / 3
    }

    /// Concatenate the slots into a mesh with an identity index. With
    /// `materials` (material index per slot) one group is emitted per
    /// non-empty slot; `consolidate` orders slots by material and merges
    /// groups sharing one.
    pub fn into_mesh(self, materials: Option<&[usize]>, consolidate: bool) -> Mesh {
        let Self { set, slots } = self;

        let mut order: Vec<usize> = (0..slots.len()).collect();
        if let (Some(materials), true) = (materials, consolidate) {
            order.sort_by_key(|&slot| materials.get(slot).copied().unwrap_or(0));
        }

        let mut mesh = Mesh::new();
        let mut normals = Vec::new();
        let mut uvs = Vec::new();
        let mut uv1s = Vec::new();
        let mut groups: Vec<Group> = Vec::new();

        for slot in order {
            let buffers = &slots[slot];
            if buffers.vertex_count() == 0 {
                continue;
            }
            let start = mesh.positions.len();
            mesh.positions.extend_from_slice(&buffers.positions);
            normals.extend_from_slice(&buffers.normals);
            uvs.extend_from_slice(&buffers.uvs);
            uv1s.extend_from_slice(&buffers.uv1s);

            if let Some(materials) = materials {
                let material_index = materials.get(slot).copied().unwrap_or(0);
                match groups.last_mut() {
                    Some(last) if consolidate && last.material_index == material_index => {
                        last.count += buffers.vertex_count();
                    }
                    _ => groups.push(Group::new(start, buffers.vertex_count(), material_index)),
                }
            }
        }

        mesh.normals = set.normal.then_some(normals);
        mesh.uvs = set.uv.then_some(uvs);
        mesh.uv1s = set.uv1.then_some(uv1s);
        mesh.index = Some((0..mesh.positions.len() as u32).collect());
        mesh.groups = groups;
        mesh
    }
}
