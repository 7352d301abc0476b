// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Geometric primitives generator

use super::Mesh;
use nalgebra::{Point2, Point3, Vector3};
use std::f64::consts::PI;

/// Geometric primitives
pub enum Primitive {
    Cube { size: Vector3<f64>, center: bool },
    Sphere { r: f64, fn_: u32 },
    Cylinder { h: f64, r: f64, fn_: u32 },
    Cone { h: f64, r1: f64, r2: f64, fn_: u32 },
}

impl Primitive {
    pub fn cube(size: Vector3<f64>, center: bool) -> Self {
        Self::Cube { size, center }
    }

    pub fn sphere(r: f64, fn_: u32) -> Self {
        let segments = if fn_ > 2 { fn_ } else { 32 };
        Self::Sphere { r, fn_: segments }
    }

    pub fn cylinder(h: f64, r: f64, fn_: u32) -> Self {
        let segments = if fn_ > 2 { fn_ } else { 32 };
        Self::Cylinder {
            h,
            r,
            fn_: segments,
        }
    }

    pub fn cone(h: f64, r1: f64, r2: f64, fn_: u32) -> Self {
        let segments = if fn_ > 2 { fn_ } else { 32 };
        Self::Cone {
            h,
            r1,
            r2,
            fn_: segments,
        }
    }

    pub fn to_mesh(&self) -> Mesh {
        match self {
            Self::Cube { size, center } => generate_cube_mesh(*size, *center),
            Self::Sphere { r, fn_ } => generate_sphere_mesh(*r, *fn_),
            Self::Cylinder { h, r, fn_ } => generate_cone_mesh(*h, *r, *r, *fn_),
            Self::Cone { h, r1, r2, fn_ } => generate_cone_mesh(*h, *r1, *r2, *fn_),
        }
    }
}

/// Indexed box with 4 vertices per face so normals and uvs stay per face
fn generate_cube_mesh(size: Vector3<f64>, center: bool) -> Mesh {
    let half = size / 2.0;
    let middle = if center {
        Vector3::zeros()
    } else {
        half
    };

    // (outward normal, u axis, v axis) with u x v == normal
    let faces = [
        (Vector3::x(), Vector3::y(), Vector3::z()),
        (-Vector3::x(), Vector3::z(), Vector3::y()),
        (Vector3::y(), Vector3::z(), Vector3::x()),
        (-Vector3::y(), Vector3::x(), Vector3::z()),
        (Vector3::z(), Vector3::x(), Vector3::y()),
        (-Vector3::z(), Vector3::y(), Vector3::x()),
    ];
    let corners = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

    let mut positions = Vec::with_capacity(24);
    let mut normals = Vec::with_capacity(24);
    let mut uvs = Vec::with_capacity(24);
    let mut index = Vec::with_capacity(36);

    for (normal, u, v) in faces {
        let base = positions.len() as u32;
        for (su, sv) in corners {
            let offset = (normal + u * su + v * sv).component_mul(&half);
            positions.push(Point3::from(middle + offset));
            normals.push(normal);
            uvs.push(Point2::new((su + 1.0) / 2.0, (sv + 1.0) / 2.0));
        }
        index.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    Mesh::from_positions(positions)
        .with_normals(normals)
        .with_uvs(uvs)
        .with_index(index)
}

fn generate_sphere_mesh(radius: f64, segments: u32) -> Mesh {
    let stacks = segments;
    let slices = segments;

    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut uvs = Vec::new();

    for i in 0..=stacks {
        let phi = PI * i as f64 / stacks as f64;
        let y = radius * phi.cos();
        let r = radius * phi.sin();

        for j in 0..=slices {
            let theta = 2.0 * PI * j as f64 / slices as f64;
            let x = r * theta.cos();
            let z = r * theta.sin();

            positions.push(Point3::new(x, y, z));
            normals.push(Vector3::new(x, y, z).try_normalize(0.0).unwrap_or_else(Vector3::y));
            uvs.push(Point2::new(
                j as f64 / slices as f64,
                1.0 - i as f64 / stacks as f64,
            ));
        }
    }

    // the pole rows collapse one triangle of each quad
    let mut index = Vec::new();
    for i in 0..stacks {
        for j in 0..slices {
            let first = i * (slices + 1) + j;
            let second = first + slices + 1;

            if i != 0 {
                index.extend_from_slice(&[first, first + 1, second]);
            }
            if i != stacks - 1 {
                index.extend_from_slice(&[second, first + 1, second + 1]);
            }
        }
    }

    Mesh::from_positions(positions)
        .with_normals(normals)
        .with_uvs(uvs)
        .with_index(index)
}

fn generate_cone_mesh(height: f64, r1: f64, r2: f64, segments: u32) -> Mesh {
    let mut positions = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(0.0, 0.0, height)];
    let bottom_center = 0u32;
    let top_center = 1u32;

    let mut bottom_indices = Vec::with_capacity(segments as usize);
    let mut top_indices = Vec::with_capacity(segments as usize);

    for i in 0..segments {
        let angle = 2.0 * PI * i as f64 / segments as f64;
        let (sin, cos) = angle.sin_cos();

        bottom_indices.push(positions.len() as u32);
        positions.push(Point3::new(r1 * cos, r1 * sin, 0.0));

        top_indices.push(positions.len() as u32);
        positions.push(Point3::new(r2 * cos, r2 * sin, height));
    }

    let mut index = Vec::new();
    for i in 0..segments as usize {
        let next = (i + 1) % segments as usize;
        let (bi, bn) = (bottom_indices[i], bottom_indices[next]);
        let (ti, tn) = (top_indices[i], top_indices[next]);

        index.extend_from_slice(&[bottom_center, bn, bi]);
        index.extend_from_slice(&[top_center, ti, tn]);
        index.extend_from_slice(&[bi, bn, ti]);
        index.extend_from_slice(&[ti, bn, tn]);
    }

    let mut mesh = Mesh::from_positions(positions).with_index(index);
    mesh.recompute_normals();
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cube_generation() {
        let mesh = generate_cube_mesh(Vector3::new(10.0, 10.0, 10.0), false);
        assert_eq!(mesh.vertex_count(), 24);
        assert_eq!(mesh.triangle_count(), 12);
        assert!(mesh.validate().is_ok());

        let bbox = mesh.bounding_box();
        assert_relative_eq!(bbox.min, Point3::origin());
        assert_relative_eq!(bbox.max, Point3::new(10.0, 10.0, 10.0));
    }

    #[test]
    fn test_cube_faces_point_outward() {
        let mesh = generate_cube_mesh(Vector3::new(1.0, 1.0, 1.0), true);
        let normals = mesh.normals.as_ref().unwrap();
        for tri in 0..mesh.triangle_count() {
            let [a, _, _] = mesh.triangle_vertex_indices(tri);
            let face = mesh.triangle(tri).normal();
            assert_relative_eq!(face, normals[a as usize], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_sphere_is_closed_and_outward() {
        let mesh = generate_sphere_mesh(1.0, 16);
        assert!(mesh.validate().is_ok());
        let expected = 4.0 / 3.0 * PI;
        // a 16 segment tessellation sits inside the true sphere
        let volume = mesh.volume();
        assert!(volume > 0.9 * expected && volume < expected);
    }

    #[test]
    fn test_cylinder_volume() {
        let mesh = generate_cone_mesh(10.0, 5.0, 5.0, 64);
        let expected = PI * 25.0 * 10.0;
        assert_relative_eq!(mesh.volume(), expected, max_relative = 0.01);
    }
}
