// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Dual-tree traversal of two BVHs living in different frames
//!
//! Both trees are descended together. The box of the node currently held on
//! one side is carried in the frame of the other tree; whenever that other
//! side reaches a leaf, or only one of its children overlaps, the roles swap
//! and the box is re-expressed through the opposite matrix.

use nalgebra::Matrix4;
use serde::Serialize;
use std::cell::Cell;

use crate::bvh::node::{NodeBuffer, NodeId, PackedNode};
use crate::bvh::MeshBvh;
use crate::error::{BvhError, Result};
use crate::geometry::{BoundingBox, ExtendedTriangle, Mesh};

/// Guards a dual-tree traversal against re-entry. Calls sharing a context
/// run one at a time; independent contexts nest freely.
#[derive(Debug, Default)]
pub struct BvhcastContext {
    active: Cell<bool>,
}

impl BvhcastContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    fn enter(&self) -> Result<ActiveGuard<'_>> {
        if self.active.replace(true) {
            return Err(BvhError::ReentrancyViolation);
        }
        Ok(ActiveGuard { context: self })
    }
}

struct ActiveGuard<'a> {
    context: &'a BvhcastContext,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.context.active.set(false);
    }
}

/// One leaf taking part in a range pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LeafInfo {
    pub offset: usize,
    pub count: usize,
    pub depth: usize,
    pub node: NodeId,
}

impl LeafInfo {
    pub fn slots(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.count
    }
}

#[derive(Clone, Copy)]
struct Side<'a> {
    root: &'a NodeBuffer,
    root_index: usize,
}

struct DualTraversal<'a, F> {
    sides: [Side<'a>; 2],
    /// `to_first[0]` maps the other tree into this one, `to_first[1]` the inverse
    matrices: [Matrix4<f64>; 2],
    callback: &'a mut F,
}

impl<F> DualTraversal<'_, F>
where
    F: FnMut(&LeafInfo, &LeafInfo) -> bool,
{
    fn leaf(&self, side: usize, word: usize, depth: usize) -> Option<LeafInfo> {
        let tree = self.sides[side];
        match tree.root.node(word) {
            PackedNode::Leaf { offset, count } => Some(LeafInfo {
                offset,
                count,
                depth,
                node: NodeId::from_word(tree.root_index, word),
            }),
            PackedNode::Internal { .. } => None,
        }
    }

    /// Children of an internal node, `None` for leaves
    fn children(&self, side: usize, word: usize) -> Option<(usize, usize)> {
        match self.sides[side].root.node(word) {
            PackedNode::Internal { left, right, .. } => Some((left, right)),
            PackedNode::Leaf { .. } => None,
        }
    }

    /// `node1` belongs to the tree on side `first` and `current` is its box in
    /// the frame of the other side's tree, which holds `node2`.
    #[allow(clippy::too_many_arguments)]
    fn traverse(
        &mut self,
        node1: usize,
        node2: usize,
        depth1: usize,
        depth2: usize,
        current: &BoundingBox,
        reversed: bool,
    ) -> bool {
        let first = usize::from(reversed);
        let second = 1 - first;
        // box of a node on the second side, expressed in the first side's frame
        let second_to_first = self.matrices[first];

        let leaf1 = self.leaf(first, node1, depth1);
        let leaf2 = self.leaf(second, node2, depth2);

        match (leaf1, leaf2, self.children(second, node2)) {
            (Some(leaf1), Some(leaf2), _) => {
                if reversed {
                    (self.callback)(&leaf2, &leaf1)
                } else {
                    (self.callback)(&leaf1, &leaf2)
                }
            }
            (None, Some(_), _) => {
                let swapped = self.sides[second]
                    .root
                    .bounds(node2)
                    .transform(&second_to_first);
                self.descend_first(node1, node2, depth1, depth2, &swapped, reversed)
            }
            (_, None, Some((left2, right2))) => {
                let left_box = self.sides[second].root.bounds(left2);
                let right_box = self.sides[second].root.bounds(right2);
                let left_hits = current.intersects_box(&left_box);
                let right_hits = current.intersects_box(&right_box);

                if left_hits && right_hits {
                    self.traverse(node1, left2, depth1, depth2 + 1, current, reversed)
                        || self.traverse(node1, right2, depth1, depth2 + 1, current, reversed)
                } else if left_hits || right_hits {
                    let (child2, child_box) = if left_hits {
                        (left2, left_box)
                    } else {
                        (right2, right_box)
                    };
                    if leaf1.is_some() {
                        self.traverse(node1, child2, depth1, depth2 + 1, current, reversed)
                    } else {
                        let swapped = child_box.transform(&second_to_first);
                        self.descend_first(node1, child2, depth1, depth2 + 1, &swapped, reversed)
                    }
                } else {
                    false
                }
            }
            (_, None, None) => false,
        }
    }

    /// Swap roles: descend the children of `node1` against `node2`, whose box
    /// in the first side's frame is `node2_box`
    fn descend_first(
        &mut self,
        node1: usize,
        node2: usize,
        depth1: usize,
        depth2: usize,
        node2_box: &BoundingBox,
        reversed: bool,
    ) -> bool {
        let first = usize::from(reversed);
        let Some((left1, right1)) = self.children(first, node1) else {
            return false;
        };
        let tree = self.sides[first].root;
        let left_hits = node2_box.intersects_box(&tree.bounds(left1));
        let right_hits = node2_box.intersects_box(&tree.bounds(right1));

        (left_hits && self.traverse(node2, left1, depth2, depth1 + 1, node2_box, !reversed))
            || (right_hits && self.traverse(node2, right1, depth2, depth1 + 1, node2_box, !reversed))
    }
}

impl MeshBvh {
    /// Visit every pair of leaves, one from each tree, whose boxes overlap.
    /// `other_to_local` maps `other`'s frame into this BVH's frame. The
    /// callback receives this tree's leaf first and returns `true` to stop.
    pub fn bvhcast<F>(
        &self,
        context: &BvhcastContext,
        other: &MeshBvh,
        other_to_local: &Matrix4<f64>,
        mut callback: F,
    ) -> Result<bool>
    where
        F: FnMut(&LeafInfo, &LeafInfo) -> bool,
    {
        let _guard = context.enter()?;
        let local_to_other = other_to_local.try_inverse().ok_or_else(|| {
            BvhError::InvalidGeometry("bvhcast transform is not invertible".to_string())
        })?;

        for (i, root) in self.roots().iter().enumerate() {
            let local_box = root.bounds(0).transform(&local_to_other);
            for (j, other_root) in other.roots().iter().enumerate() {
                let mut traversal = DualTraversal {
                    sides: [
                        Side {
                            root,
                            root_index: i,
                        },
                        Side {
                            root: other_root,
                            root_index: j,
                        },
                    ],
                    matrices: [*other_to_local, local_to_other],
                    callback: &mut callback,
                };
                if traversal.traverse(0, 0, 0, 0, &local_box, false) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Triangle-pair form of [`MeshBvh::bvhcast`]. The callback receives this
    /// mesh's triangle, the other triangle moved into this frame, and both
    /// mesh triangle indices.
    #[allow(clippy::too_many_arguments)]
    pub fn bvhcast_triangles<F>(
        &self,
        context: &BvhcastContext,
        mesh: &Mesh,
        other: &MeshBvh,
        other_mesh: &Mesh,
        other_to_local: &Matrix4<f64>,
        mut callback: F,
    ) -> Result<bool>
    where
        F: FnMut(&ExtendedTriangle, &ExtendedTriangle, usize, usize) -> bool,
    {
        self.bvhcast(context, other, other_to_local, |leaf, other_leaf| {
            for other_slot in other_leaf.slots() {
                let other_index = other.resolve_triangle_index(other_slot);
                let other_tri = ExtendedTriangle::new(
                    other_mesh.triangle(other_index).transform(other_to_local),
                );
                for slot in leaf.slots() {
                    let index = self.resolve_triangle_index(slot);
                    let tri = ExtendedTriangle::new(mesh.triangle(index));
                    if callback(&tri, &other_tri, index, other_index) {
                        return true;
                    }
                }
            }
            false
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildOptions;
    use crate::geometry::Primitive;
    use nalgebra::Vector3;
    use std::collections::HashSet;

    fn sphere(segments: u32) -> (Mesh, MeshBvh) {
        let mut mesh = Primitive::sphere(1.0, segments).to_mesh();
        let bvh = MeshBvh::build(
            &mut mesh,
            &BuildOptions {
                max_leaf_triangles: 3,
                indirect: true,
                ..BuildOptions::default()
            },
        )
        .unwrap();
        (mesh, bvh)
    }

    fn brute_force_pairs(a: &Mesh, b: &Mesh, b_to_a: &Matrix4<f64>) -> HashSet<(usize, usize)> {
        let mut pairs = HashSet::new();
        for i in 0..a.triangle_count() {
            let ta = ExtendedTriangle::new(a.triangle(i));
            for j in 0..b.triangle_count() {
                let tb = ExtendedTriangle::new(b.triangle(j).transform(b_to_a));
                if ta.intersects_triangle(&tb) {
                    pairs.insert((i, j));
                }
            }
        }
        pairs
    }

    #[test]
    fn test_triangle_pairs_match_brute_force() {
        let (a, bvh_a) = sphere(10);
        let (b, bvh_b) = sphere(8);
        let b_to_a = Matrix4::new_translation(&Vector3::new(0.7, 0.2, 0.1))
            * Matrix4::new_rotation(Vector3::new(0.3, 0.5, 0.0));

        let context = BvhcastContext::new();
        let mut found = HashSet::new();
        let stopped = bvh_a
            .bvhcast_triangles(&context, &a, &bvh_b, &b, &b_to_a, |ta, tb, i, j| {
                if ta.intersects_triangle(tb) {
                    found.insert((i, j));
                }
                false
            })
            .unwrap();

        assert!(!stopped);
        assert!(!found.is_empty());
        assert_eq!(found, brute_force_pairs(&a, &b, &b_to_a));
        assert!(!context.is_active());
    }

    #[test]
    fn test_disjoint_trees_never_call_back() {
        let (a, bvh_a) = sphere(8);
        let (b, bvh_b) = sphere(8);
        let far = Matrix4::new_translation(&Vector3::new(10.0, 0.0, 0.0));
        let context = BvhcastContext::new();
        let mut calls = 0;
        bvh_a
            .bvhcast_triangles(&context, &a, &bvh_b, &b, &far, |_, _, _, _| {
                calls += 1;
                false
            })
            .unwrap();
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_reentry_on_shared_context_fails() {
        let (_, bvh_a) = sphere(8);
        let (_, bvh_b) = sphere(8);
        let context = BvhcastContext::new();
        let identity = Matrix4::identity();

        let mut nested = None;
        bvh_a
            .bvhcast(&context, &bvh_b, &identity, |_, _| {
                nested = Some(bvh_a.bvhcast(&context, &bvh_b, &identity, |_, _| false));
                true
            })
            .unwrap();
        assert_eq!(nested, Some(Err(BvhError::ReentrancyViolation)));

        // a separate context may nest
        let inner = BvhcastContext::new();
        let mut nested_ok = None;
        bvh_a
            .bvhcast(&context, &bvh_b, &identity, |_, _| {
                nested_ok = Some(bvh_a.bvhcast(&inner, &bvh_b, &identity, |_, _| true));
                true
            })
            .unwrap();
        assert_eq!(nested_ok, Some(Ok(true)));
    }
}
