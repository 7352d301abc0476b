// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Error types for BVH construction, traversal and CSG evaluation

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BvhError {
    /// Missing or malformed mesh attributes
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// The builder stopped splitting at the depth limit. Queries stay correct
    /// but leaves may hold more triangles than requested.
    #[error("BVH build reached the maximum depth of {max_depth}; some leaves exceed the triangle limit")]
    BuildLimitReached { max_depth: u32 },

    #[error("bvhcast re-entered on a traversal context that is already running")]
    ReentrancyViolation,

    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    #[error("invalid serialized BVH: {0}")]
    InvalidSerializedData(String),
}

pub type Result<T> = std::result::Result<T, BvhError>;
