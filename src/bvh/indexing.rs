// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

use serde::{Deserialize, Serialize};

/// How a leaf slot maps to a mesh triangle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriangleIndexing {
    /// The mesh index was reordered in place; slot `i` is triangle `i`
    Direct,
    /// Slot `i` is triangle `table[i]`; the mesh index keeps its order
    Indirect(Vec<u32>),
}

impl TriangleIndexing {
    #[inline]
    pub fn resolve(&self, slot: usize) -> usize {
        match self {
            Self::Direct => slot,
            Self::Indirect(table) => table[slot] as usize,
        }
    }

    pub fn is_indirect(&self) -> bool {
        matches!(self, Self::Indirect(_))
    }

    pub fn table(&self) -> Option<&[u32]> {
        match self {
            Self::Direct => None,
            Self::Indirect(table) => Some(table),
        }
    }
}
