// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Discovery of intersecting triangle pairs between two brushes

use ahash::AHashMap;
use std::collections::hash_map::Entry;

use super::brush::PreparedBrush;
use crate::bvh::BvhcastContext;
use crate::error::{BvhError, Result};

/// Plane constants closer than this make parallel triangles count as touching
const COPLANAR_EPSILON: f64 = 1e-7;
const PARALLEL_EPSILON: f64 = 1e-10;
const DEGENERATE_EPSILON: f64 = 1e-10;

/// Triangles of one brush and the triangles of the other they intersect, in
/// discovery order
#[derive(Debug, Clone, Default)]
pub(crate) struct IntersectionMap {
    ids: Vec<usize>,
    pairs: AHashMap<usize, Vec<usize>>,
}

impl IntersectionMap {
    pub fn add(&mut self, tri: usize, other: usize) {
        match self.pairs.entry(tri) {
            Entry::Occupied(mut entry) => entry.get_mut().push(other),
            Entry::Vacant(entry) => {
                self.ids.push(tri);
                entry.insert(vec![other]);
            }
        }
    }

    pub fn ids(&self) -> &[usize] {
        &self.ids
    }

    pub fn contains(&self, tri: usize) -> bool {
        self.pairs.contains_key(&tri)
    }

    pub fn intersecting(&self, tri: usize) -> &[usize] {
        self.pairs.get(&tri).map_or(&[], Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }
}

/// Pairs found from both sides: `.0` maps triangles of `a`, `.1` those of `b`
pub(crate) fn collect_intersections(
    context: &BvhcastContext,
    a: &PreparedBrush<'_>,
    b: &PreparedBrush<'_>,
) -> Result<(IntersectionMap, IntersectionMap)> {
    let a_inverse = a
        .matrix
        .try_inverse()
        .ok_or_else(|| BvhError::InvalidGeometry("brush matrix is not invertible".to_string()))?;
    let b_to_a = a_inverse * b.matrix;

    let mut a_map = IntersectionMap::default();
    let mut b_map = IntersectionMap::default();

    a.bvh
        .bvhcast_triangles(context, a.mesh, b.bvh, b.mesh, &b_to_a, |ta, tb, ia, ib| {
            if ta.triangle.is_degenerate(DEGENERATE_EPSILON)
                || tb.triangle.is_degenerate(DEGENERATE_EPSILON)
            {
                return false;
            }

            // coplanar faces a rounding error apart still need splitting
            let touching = ta.intersects_triangle(tb) || {
                let (pa, pb) = (&ta.plane, &tb.plane);
                pa.normal.dot(&pb.normal) >= 1.0 - PARALLEL_EPSILON
                    && (pa.constant - pb.constant).abs() < COPLANAR_EPSILON
            };
            if touching {
                a_map.add(ia, ib);
                b_map.add(ib, ia);
            }
            false
        })?;

    Ok((a_map, b_map))
}
