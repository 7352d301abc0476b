// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Queries over the packed trees of a [`MeshBvh`](crate::bvh::MeshBvh)

mod bvhcast;
mod closest_point;
mod intersects;
mod raycast;
mod refit;
mod shapecast;

pub use bvhcast::{BvhcastContext, LeafInfo};
pub use closest_point::{ClosestPointHit, GeometryClosestHit};
pub use raycast::RayHit;
pub use shapecast::{BoundsTest, LeafRange, ShapecastVisitor};
