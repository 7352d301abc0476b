// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Generic box/range traversal every other query is built on

use log::trace;

use crate::bvh::node::{NodeBuffer, NodeId, PackedNode};
use crate::bvh::MeshBvh;
use crate::geometry::{BoundingBox, ExtendedTriangle, Mesh};

/// Result of a node box test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundsTest {
    NotIntersected,
    Intersected,
    /// Everything beneath the node passes; its whole range is handed over at once
    Contained,
}

impl From<bool> for BoundsTest {
    fn from(hit: bool) -> Self {
        if hit {
            BoundsTest::Intersected
        } else {
            BoundsTest::NotIntersected
        }
    }
}

/// Contiguous run of leaf slots handed to [`ShapecastVisitor::intersects_range`]
#[derive(Debug, Clone, Copy)]
pub struct LeafRange<'a> {
    pub mesh: &'a Mesh,
    pub bvh: &'a MeshBvh,
    pub offset: usize,
    pub count: usize,
    pub contained: bool,
    pub depth: usize,
    pub node: NodeId,
    pub bounds: BoundingBox,
}

impl LeafRange<'_> {
    pub fn slots(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.count
    }

    /// Mesh triangle index and triangle stored at `slot`
    pub fn triangle(&self, slot: usize) -> (usize, ExtendedTriangle) {
        let tri_index = self.bvh.resolve_triangle_index(slot);
        (
            tri_index,
            ExtendedTriangle::new(self.mesh.triangle(tri_index)),
        )
    }
}

pub trait ShapecastVisitor {
    /// Ordering score for a child box; lower scores are visited first
    fn bounds_score(&mut self, _bounds: &BoundingBox) -> Option<f64> {
        None
    }

    fn intersects_bounds(
        &mut self,
        bounds: &BoundingBox,
        is_leaf: bool,
        score: Option<f64>,
        depth: usize,
        node: NodeId,
    ) -> BoundsTest;

    /// Return `true` to stop the traversal
    fn intersects_range(&mut self, range: &LeafRange) -> bool {
        for slot in range.slots() {
            let (tri_index, tri) = range.triangle(slot);
            if self.intersects_triangle(&tri, tri_index, range.contained, range.depth) {
                return true;
            }
        }
        false
    }

    /// Return `true` to stop the traversal
    fn intersects_triangle(
        &mut self,
        _triangle: &ExtendedTriangle,
        _tri_index: usize,
        _contained: bool,
        _depth: usize,
    ) -> bool {
        false
    }
}

struct Shapecast<'a, V: ?Sized> {
    bvh: &'a MeshBvh,
    mesh: &'a Mesh,
    root: &'a NodeBuffer,
    root_index: usize,
    visitor: &'a mut V,
}

impl<'a, V: ShapecastVisitor + ?Sized> Shapecast<'a, V> {
    fn range(
        &self,
        offset: usize,
        count: usize,
        contained: bool,
        depth: usize,
        word: usize,
    ) -> LeafRange<'a> {
        LeafRange {
            mesh: self.mesh,
            bvh: self.bvh,
            offset,
            count,
            contained,
            depth,
            node: NodeId::from_word(self.root_index, word),
            bounds: self.root.bounds(word),
        }
    }

    fn visit_child(&mut self, child: usize, score: Option<f64>, depth: usize) -> bool {
        let bounds = self.root.bounds(child);
        let is_leaf = self.root.node(child).is_leaf();
        let node = NodeId::from_word(self.root_index, child);
        match self
            .visitor
            .intersects_bounds(&bounds, is_leaf, score, depth, node)
        {
            BoundsTest::NotIntersected => false,
            BoundsTest::Intersected => self.traverse(child, depth),
            BoundsTest::Contained => {
                let (start, end) = self.root.subtree_range(child);
                let range = self.range(start, end - start, true, depth, child);
                self.visitor.intersects_range(&range)
            }
        }
    }

    fn traverse(&mut self, word: usize, depth: usize) -> bool {
        match self.root.node(word) {
            PackedNode::Leaf { offset, count } => {
                let range = self.range(offset, count, false, depth, word);
                self.visitor.intersects_range(&range)
            }
            PackedNode::Internal { left, right, .. } => {
                let mut first = (left, self.visitor.bounds_score(&self.root.bounds(left)));
                let mut second = (right, self.visitor.bounds_score(&self.root.bounds(right)));
                if let (Some(s1), Some(s2)) = (first.1, second.1) {
                    if s2 < s1 {
                        std::mem::swap(&mut first, &mut second);
                    }
                }

                self.visit_child(first.0, first.1, depth + 1)
                    || self.visit_child(second.0, second.1, depth + 1)
            }
        }
    }
}

impl MeshBvh {
    /// Walk every root with `visitor`. Returns `true` when the visitor stopped
    /// the traversal early. Root boxes are not tested.
    pub fn shapecast<V: ShapecastVisitor + ?Sized>(&self, mesh: &Mesh, visitor: &mut V) -> bool {
        for (root_index, root) in self.roots().iter().enumerate() {
            trace!("shapecast root {}", root_index);
            let mut cast = Shapecast {
                bvh: self,
                mesh,
                root,
                root_index,
                visitor: &mut *visitor,
            };
            if cast.traverse(0, 0) {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildOptions;
    use crate::geometry::Primitive;
    use nalgebra::Vector3;
    use std::collections::HashSet;

    struct CollectAll {
        seen: HashSet<usize>,
        contained_ranges: usize,
    }

    impl ShapecastVisitor for CollectAll {
        fn intersects_bounds(
            &mut self,
            _bounds: &BoundingBox,
            _is_leaf: bool,
            _score: Option<f64>,
            _depth: usize,
            _node: NodeId,
        ) -> BoundsTest {
            BoundsTest::Contained
        }

        fn intersects_triangle(
            &mut self,
            _triangle: &ExtendedTriangle,
            tri_index: usize,
            contained: bool,
            _depth: usize,
        ) -> bool {
            if contained {
                self.contained_ranges += 1;
            }
            self.seen.insert(tri_index);
            false
        }
    }

    #[test]
    fn test_contained_visits_every_triangle_once() {
        let mut mesh = Primitive::sphere(1.0, 10).to_mesh();
        let options = BuildOptions {
            max_leaf_triangles: 4,
            indirect: true,
            ..BuildOptions::default()
        };
        let bvh = MeshBvh::build(&mut mesh, &options).unwrap();

        let mut visitor = CollectAll {
            seen: HashSet::new(),
            contained_ranges: 0,
        };
        assert!(!bvh.shapecast(&mesh, &mut visitor));
        assert_eq!(visitor.seen.len(), mesh.triangle_count());
        assert_eq!(visitor.contained_ranges, mesh.triangle_count());
    }

    struct StopAtFirst {
        visited: usize,
    }

    impl ShapecastVisitor for StopAtFirst {
        fn intersects_bounds(
            &mut self,
            _bounds: &BoundingBox,
            _is_leaf: bool,
            _score: Option<f64>,
            _depth: usize,
            _node: NodeId,
        ) -> BoundsTest {
            BoundsTest::Intersected
        }

        fn intersects_triangle(
            &mut self,
            _triangle: &ExtendedTriangle,
            _tri_index: usize,
            _contained: bool,
            _depth: usize,
        ) -> bool {
            self.visited += 1;
            true
        }
    }

    #[test]
    fn test_early_exit() {
        let mut mesh = Primitive::cube(Vector3::new(1.0, 1.0, 1.0), true).to_mesh();
        let bvh = MeshBvh::build(
            &mut mesh,
            &BuildOptions {
                max_leaf_triangles: 1,
                ..BuildOptions::default()
            },
        )
        .unwrap();
        let mut visitor = StopAtFirst { visited: 0 };
        assert!(bvh.shapecast(&mesh, &mut visitor));
        assert_eq!(visitor.visited, 1);
    }
}
