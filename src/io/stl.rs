// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! STL import and export

use anyhow::{bail, Context, Result};
use nalgebra::Point3;
use std::fs::File;
use std::io::{BufWriter, Cursor, Read, Seek, Write};
use std::path::Path;
use stl_io::{Normal, Triangle as StlTriangle, Vertex as StlVertex};

use crate::geometry::Mesh;

/// Read an STL stream (ASCII or binary) into an indexed mesh.
/// Coincident vertices are merged by the reader.
pub fn read_stl<R: Read + Seek>(reader: &mut R) -> Result<Mesh> {
    let stl = stl_io::read_stl(reader).context("Failed to read STL contents")?;

    let positions = stl
        .vertices
        .iter()
        .map(|v| Point3::new(v[0] as f64, v[1] as f64, v[2] as f64))
        .collect();
    let index = stl
        .faces
        .iter()
        .flat_map(|face| face.vertices.map(|v| v as u32))
        .collect();

    Ok(Mesh::from_positions(positions).with_index(index))
}

pub fn load_stl(path: &Path) -> Result<Mesh> {
    if !path.exists() {
        bail!("STL file not found: {}", path.display());
    }
    let mut file =
        File::open(path).with_context(|| format!("Failed to open STL file: {}", path.display()))?;
    let mesh = read_stl(&mut file)?;
    mesh.validate()
        .with_context(|| format!("STL file {} holds an invalid mesh", path.display()))?;
    Ok(mesh)
}

/// Write the triangles in the mesh's draw range as binary STL with face normals
pub fn write_stl<W: Write>(mesh: &Mesh, writer: &mut W) -> Result<()> {
    let (first, count) = mesh.draw_range_triangles();
    let triangles: Vec<StlTriangle> = (first..first + count)
        .map(|tri| {
            let triangle = mesh.triangle(tri);
            let normal = triangle.normal();
            let [a, b, c] = triangle.points().map(|p| StlVertex::new([p.x as f32, p.y as f32, p.z as f32]));
            StlTriangle {
                normal: Normal::new([normal.x as f32, normal.y as f32, normal.z as f32]),
                vertices: [a, b, c],
            }
        })
        .collect();

    stl_io::write_stl(writer, triangles.iter()).context("Failed to write STL data")?;
    Ok(())
}

pub fn save_stl(mesh: &Mesh, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create STL file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    write_stl(mesh, &mut writer)?;
    writer.flush().context("Failed to flush STL file")?;
    Ok(())
}

/// Binary STL bytes of a mesh
pub fn to_stl_bytes(mesh: &Mesh) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    write_stl(mesh, &mut cursor)?;
    Ok(cursor.into_inner())
}
