// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

use anyhow::{Context, Result};
use log::debug;
use std::fs;
use std::path::Path;

use crate::bvh::{DeserializeOptions, MeshBvh, SerializeOptions, SerializedBvh};
use crate::geometry::Mesh;

/// Write `bvh` and the triangle ordering of `mesh` in the binary BVH format
pub fn save_bvh(bvh: &MeshBvh, mesh: &Mesh, path: &Path) -> Result<()> {
    let bytes = bvh.serialize(mesh, &SerializeOptions::default()).to_bytes();
    fs::write(path, &bytes)
        .with_context(|| format!("Failed to write BVH file: {}", path.display()))?;
    debug!("Wrote {} bytes of BVH data to {}", bytes.len(), path.display());
    Ok(())
}

/// Load a BVH saved by [`save_bvh`] for `mesh`, restoring the mesh index
pub fn load_bvh(path: &Path, mesh: &mut Mesh) -> Result<MeshBvh> {
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read BVH file: {}", path.display()))?;
    let data = SerializedBvh::from_bytes(&bytes)
        .with_context(|| format!("{} is not a BVH file", path.display()))?;
    let bvh = MeshBvh::deserialize(data, mesh, &DeserializeOptions::default())?;
    Ok(bvh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildOptions;
    use crate::geometry::Primitive;

    #[test]
    fn test_saved_bvh_reloads_for_fresh_mesh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sphere.bvh");

        let mut mesh = Primitive::sphere(1.0, 16).to_mesh();
        let bvh = MeshBvh::build(&mut mesh, &BuildOptions::default()).unwrap();
        save_bvh(&bvh, &mesh, &path).unwrap();

        // the direct build reordered the index; loading restores it
        let mut fresh = Primitive::sphere(1.0, 16).to_mesh();
        let loaded = load_bvh(&path, &mut fresh).unwrap();
        assert_eq!(fresh.index, mesh.index);
        assert_eq!(loaded.roots().len(), bvh.roots().len());
        assert_eq!(loaded.roots()[0].words(), bvh.roots()[0].words());
    }

    #[test]
    fn test_garbage_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.bvh");
        fs::write(&path, b"not a bvh").unwrap();
        let mut mesh = Primitive::sphere(1.0, 8).to_mesh();
        assert!(load_bvh(&path, &mut mesh).is_err());
    }
}
