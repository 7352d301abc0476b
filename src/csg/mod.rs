// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Boolean operations between triangle meshes built on the BVH

mod attributes;
mod brush;
mod classify;
mod disjoint_edges;
mod evaluator;
mod half_edge;
mod intersections;
mod operation;
mod splitter;

pub use attributes::Attribute;
pub use brush::{brush_build_options, Brush};
pub use disjoint_edges::{EdgeFragments, EdgeInterval, EdgeLine};
pub use evaluator::Evaluator;
pub use half_edge::{HalfEdgeMap, HalfEdgeOptions};
pub use operation::{Action, FragmentSide, Operation};
pub use splitter::TriangleSplitter;
