// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! I/O module - STL meshes and serialized BVH files

mod bvh_file;
mod stl;

pub use bvh_file::{load_bvh, save_bvh};
pub use stl::{load_stl, read_stl, save_stl, to_stl_bytes, write_stl};
