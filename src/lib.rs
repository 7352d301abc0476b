// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Polyframe BVH
//!
//! Bounding volume hierarchies over indexed triangle meshes, the spatial
//! queries they accelerate (raycasts, shapecasts, closest points and
//! mesh-vs-mesh traversal) and a CSG evaluator built on top of them.

pub mod bvh;
pub mod config;
pub mod csg;
pub mod error;
pub mod geometry;
pub mod io;

pub use bvh::MeshBvh;
pub use config::{BuildOptions, EvaluatorOptions, KernelConfig, SplitStrategy};
pub use csg::{Brush, Evaluator, HalfEdgeMap, Operation};
pub use error::{BvhError, Result};
pub use geometry::{Mesh, Primitive};

/// Build a BVH for `mesh` with the default options
pub fn build_bvh(mesh: &mut Mesh) -> Result<MeshBvh> {
    MeshBvh::build(mesh, &BuildOptions::default())
}
