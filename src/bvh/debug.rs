// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Tree inspection: statistics, bound validation and a JSON dump

use serde::Serialize;
use serde_json::{json, Value};

use super::bounds::{entry_box, triangle_entry};
use super::node::{NodeBuffer, NodeId, PackedNode};
use super::split::{TRAVERSAL_COST, TRIANGLE_INTERSECT_COST};
use super::MeshBvh;
use crate::geometry::{BoundingBox, Mesh};

/// Node handed to [`MeshBvh::traverse`]
#[derive(Debug, Clone, Copy)]
pub struct NodeVisit {
    pub depth: usize,
    pub id: NodeId,
    pub bounds: BoundingBox,
    pub node: PackedNode,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Range<T> {
    pub min: T,
    pub max: T,
}

/// Shape statistics of one root
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeExtremes {
    pub node_count: usize,
    pub leaf_node_count: usize,
    pub depth: Range<usize>,
    pub triangles: Range<usize>,
    /// Internal nodes per split axis
    pub splits: [usize; 3],
    /// SAH cost of the tree, weighted by absolute surface area
    pub surface_area_score: f64,
}

impl MeshBvh {
    /// Depth-first, left before right. Returning `true` from `callback`
    /// skips the children of that node.
    pub fn traverse<F>(&self, root_index: usize, mut callback: F)
    where
        F: FnMut(&NodeVisit) -> bool,
    {
        let Some(root) = self.roots().get(root_index) else {
            return;
        };
        let mut stack = vec![(0usize, 0usize)];
        while let Some((word, depth)) = stack.pop() {
            let visit = NodeVisit {
                depth,
                id: NodeId::from_word(root_index, word),
                bounds: root.bounds(word),
                node: root.node(word),
            };
            if callback(&visit) {
                continue;
            }
            if let PackedNode::Internal { left, right, .. } = visit.node {
                stack.push((right, depth + 1));
                stack.push((left, depth + 1));
            }
        }
    }
}

/// Per-root node counts, depth and leaf size ranges, split axes and SAH score
pub fn extremes(bvh: &MeshBvh) -> Vec<TreeExtremes> {
    (0..bvh.roots().len())
        .map(|root_index| {
            let mut result = TreeExtremes {
                node_count: 0,
                leaf_node_count: 0,
                depth: Range {
                    min: usize::MAX,
                    max: 0,
                },
                triangles: Range {
                    min: usize::MAX,
                    max: 0,
                },
                splits: [0; 3],
                surface_area_score: 0.0,
            };

            bvh.traverse(root_index, |visit| {
                let area = visit.bounds.surface_area();
                result.node_count += 1;
                match visit.node {
                    PackedNode::Leaf { count, .. } => {
                        result.leaf_node_count += 1;
                        result.depth.min = result.depth.min.min(visit.depth);
                        result.depth.max = result.depth.max.max(visit.depth);
                        result.triangles.min = result.triangles.min.min(count);
                        result.triangles.max = result.triangles.max.max(count);
                        result.surface_area_score += area * TRIANGLE_INTERSECT_COST * count as f64;
                    }
                    PackedNode::Internal { split_axis, .. } => {
                        result.splits[split_axis] += 1;
                        result.surface_area_score += area * TRAVERSAL_COST;
                    }
                }
                false
            });

            if result.leaf_node_count == 0 {
                result.depth.min = 0;
                result.triangles.min = 0;
            }
            result
        })
        .collect()
}

/// Whether every node box contains its children and every leaf box contains
/// the current positions of its triangles
pub fn validate_bounds(bvh: &MeshBvh, mesh: &Mesh) -> bool {
    let mut passes = true;
    for root_index in 0..bvh.roots().len() {
        let root = &bvh.roots()[root_index];
        bvh.traverse(root_index, |visit| {
            match visit.node {
                PackedNode::Leaf { offset, count } => {
                    for slot in offset..offset + count {
                        let tri = bvh.slot_triangle(mesh, slot);
                        let exact = BoundingBox::from_points(tri.points().iter());
                        if !visit.bounds.contains_box(&exact)
                            || !visit.bounds.contains_box(&entry_box(&triangle_entry(&tri)))
                        {
                            passes = false;
                        }
                    }
                }
                PackedNode::Internal { left, right, .. } => {
                    if !visit.bounds.contains_box(&root.bounds(left))
                        || !visit.bounds.contains_box(&root.bounds(right))
                    {
                        passes = false;
                    }
                }
            }
            !passes
        });
    }
    passes
}

fn node_json(root: &NodeBuffer, word: usize) -> Value {
    let b = root.packed_bounds(word);
    let bounds = json!({ "min": [b[0], b[1], b[2]], "max": [b[3], b[4], b[5]] });
    match root.node(word) {
        PackedNode::Leaf { offset, count } => json!({
            "bounds": bounds,
            "offset": offset,
            "count": count,
        }),
        PackedNode::Internal {
            left,
            right,
            split_axis,
        } => json!({
            "bounds": bounds,
            "split_axis": split_axis,
            "left": node_json(root, left),
            "right": node_json(root, right),
        }),
    }
}

/// Nested JSON description of every root
pub fn json_structure(bvh: &MeshBvh) -> Value {
    Value::Array(bvh.roots().iter().map(|root| node_json(root, 0)).collect())
}

/// Bytes held by node buffers and the indirect table
pub fn estimate_memory_in_bytes(bvh: &MeshBvh) -> usize {
    let nodes: usize = bvh.roots().iter().map(NodeBuffer::byte_len).sum();
    let table = bvh
        .indexing()
        .table()
        .map_or(0, |t| std::mem::size_of_val(t));
    nodes + table
}
