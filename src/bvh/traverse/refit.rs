// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

use std::collections::HashSet;

use crate::bvh::bounds::{entry_box, pack_box, triangle_entry};
use crate::bvh::node::{NodeBuffer, NodeId, PackedNode};
use crate::bvh::{MeshBvh, TriangleIndexing};
use crate::geometry::{BoundingBox, Mesh};

fn union_packed(a: &[f32; 6], b: &[f32; 6]) -> [f32; 6] {
    [
        a[0].min(b[0]),
        a[1].min(b[1]),
        a[2].min(b[2]),
        a[3].max(b[3]),
        a[4].max(b[4]),
        a[5].max(b[5]),
    ]
}

struct Refit<'a> {
    indexing: &'a TriangleIndexing,
    mesh: &'a Mesh,
    root_index: usize,
    dirty: Option<&'a HashSet<NodeId>>,
}

impl Refit<'_> {
    /// Returns whether the box of `word` changed
    fn node(&self, root: &mut NodeBuffer, word: usize) -> bool {
        match root.node(word) {
            PackedNode::Leaf { offset, count } => {
                let mut bbox = BoundingBox::empty();
                for slot in offset..offset + count {
                    let tri = self.mesh.triangle(self.indexing.resolve(slot));
                    bbox.expand_by_box(&entry_box(&triangle_entry(&tri)));
                }
                let packed = pack_box(&bbox);
                if packed == root.packed_bounds(word) {
                    return false;
                }
                root.set_packed_bounds(word, &packed);
                true
            }
            PackedNode::Internal { left, right, .. } => {
                let (visit_left, visit_right) = match self.dirty {
                    None => (true, true),
                    Some(dirty) => (
                        dirty.contains(&NodeId::from_word(self.root_index, left)),
                        dirty.contains(&NodeId::from_word(self.root_index, right)),
                    ),
                };

                let left_changed = visit_left && self.node(root, left);
                let right_changed = visit_right && self.node(root, right);
                if !(left_changed || right_changed) {
                    return false;
                }

                let packed = union_packed(&root.packed_bounds(left), &root.packed_bounds(right));
                if packed == root.packed_bounds(word) {
                    return false;
                }
                root.set_packed_bounds(word, &packed);
                true
            }
        }
    }
}

impl MeshBvh {
    /// Recompute node boxes after vertex positions moved. The triangle
    /// order and tree shape stay as built.
    ///
    /// With `dirty`, only the listed nodes are descended into: a child is
    /// visited when its id is in the set, and a node with no listed child is
    /// left as is. Listing a node requires listing its ancestors (roots excepted).
    pub fn refit(&mut self, mesh: &Mesh, dirty: Option<&HashSet<NodeId>>) {
        let indexing = self.indexing().clone();
        for (root_index, root) in self.roots_mut().iter_mut().enumerate() {
            let refit = Refit {
                indexing: &indexing,
                mesh,
                root_index,
                dirty,
            };
            refit.node(root, 0);
        }
    }
}
