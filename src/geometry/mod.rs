// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Geometry module - mesh representation and the primitive shapes queries operate on

mod bbox;
mod mesh;
mod obb;
mod plane;
mod primitives;
mod ray;
mod segment;
mod triangle;

pub use bbox::BoundingBox;
pub use mesh::{normal_matrix, DrawRange, Group, Mesh};
pub use obb::OrientedBox;
pub use plane::Plane;
pub use primitives::Primitive;
pub use ray::{Ray, Side};
pub use segment::{closest_points_segment_to_segment, Segment};
pub use triangle::{angle_between, ExtendedTriangle, SeparatingAxisBounds, Triangle};
