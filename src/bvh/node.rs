// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Packed node store
//!
//! Each node is eight `u32` words. Words 0-5 hold the box as f32 bits
//! (min xyz, max xyz). A leaf stores its first triangle slot in word 6 and
//! `count | 0xFFFF << 16` in word 7. An internal node stores the word offset
//! of its right child in word 6 and the split axis in word 7; its left child
//! always follows it directly at `word + 8`.

use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{BvhError, Result};
use crate::geometry::BoundingBox;

pub const NODE_WORDS: usize = 8;
pub const LEAF_MARK: u32 = 0xFFFF;
/// Largest triangle count the 16 bit leaf field holds
pub const MAX_LEAF_COUNT: usize = 0xFFFF;

/// Identifies a node across all roots of a BVH
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    pub root: usize,
    /// Word offset of the node divided by [`NODE_WORDS`]
    pub node: usize,
}

impl NodeId {
    pub fn new(root: usize, node: usize) -> Self {
        Self { root, node }
    }

    pub(crate) fn from_word(root: usize, word: usize) -> Self {
        Self {
            root,
            node: word / NODE_WORDS,
        }
    }

    pub fn word(&self) -> usize {
        self.node * NODE_WORDS
    }
}

/// Decoded view of one packed node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackedNode {
    Leaf {
        offset: usize,
        count: usize,
    },
    Internal {
        left: usize,
        right: usize,
        split_axis: usize,
    },
}

impl PackedNode {
    pub fn is_leaf(&self) -> bool {
        matches!(self, PackedNode::Leaf { .. })
    }
}

#[derive(Debug, Clone)]
enum NodeStorage {
    Owned(Vec<u32>),
    Shared(Arc<Vec<u32>>),
}

/// Word buffer of one root tree
#[derive(Debug, Clone)]
pub struct NodeBuffer {
    storage: NodeStorage,
}

impl NodeBuffer {
    pub fn new(words: Vec<u32>, shared: bool) -> Self {
        let storage = if shared {
            NodeStorage::Shared(Arc::new(words))
        } else {
            NodeStorage::Owned(words)
        };
        Self { storage }
    }

    pub fn from_shared(words: Arc<Vec<u32>>) -> Self {
        Self {
            storage: NodeStorage::Shared(words),
        }
    }

    pub fn words(&self) -> &[u32] {
        match &self.storage {
            NodeStorage::Owned(words) => words,
            NodeStorage::Shared(words) => words,
        }
    }

    /// Copy-on-write access; a shared buffer still referenced elsewhere is cloned first
    fn words_mut(&mut self) -> &mut Vec<u32> {
        match &mut self.storage {
            NodeStorage::Owned(words) => words,
            NodeStorage::Shared(words) => Arc::make_mut(words),
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self.storage, NodeStorage::Shared(_))
    }

    pub fn shared_words(&self) -> Option<&Arc<Vec<u32>>> {
        match &self.storage {
            NodeStorage::Owned(_) => None,
            NodeStorage::Shared(words) => Some(words),
        }
    }

    pub fn node_count(&self) -> usize {
        self.words().len() / NODE_WORDS
    }

    pub fn byte_len(&self) -> usize {
        self.words().len() * std::mem::size_of::<u32>()
    }

    #[inline]
    pub fn node(&self, word: usize) -> PackedNode {
        let words = self.words();
        let tag = words[word + 7];
        if tag >> 16 == LEAF_MARK {
            PackedNode::Leaf {
                offset: words[word + 6] as usize,
                count: (tag & 0xFFFF) as usize,
            }
        } else {
            PackedNode::Internal {
                left: word + NODE_WORDS,
                right: words[word + 6] as usize,
                split_axis: tag as usize,
            }
        }
    }

    pub fn packed_bounds(&self, word: usize) -> [f32; 6] {
        let words = self.words();
        let mut packed = [0.0; 6];
        for (i, value) in packed.iter_mut().enumerate() {
            *value = f32::from_bits(words[word + i]);
        }
        packed
    }

    #[inline]
    pub fn bounds(&self, word: usize) -> BoundingBox {
        let p = self.packed_bounds(word);
        BoundingBox::new(
            Point3::new(p[0] as f64, p[1] as f64, p[2] as f64),
            Point3::new(p[3] as f64, p[4] as f64, p[5] as f64),
        )
    }

    pub fn set_packed_bounds(&mut self, word: usize, packed: &[f32; 6]) {
        write_bounds(self.words_mut(), word, packed);
    }

    /// First slot and end slot of every triangle beneath `word`
    pub fn subtree_range(&self, word: usize) -> (usize, usize) {
        let mut left = word;
        let start = loop {
            match self.node(left) {
                PackedNode::Leaf { offset, .. } => break offset,
                PackedNode::Internal { left: next, .. } => left = next,
            }
        };
        let mut right = word;
        let end = loop {
            match self.node(right) {
                PackedNode::Leaf { offset, count } => break offset + count,
                PackedNode::Internal { right: next, .. } => right = next,
            }
        };
        (start, end)
    }

    /// Structural check of a buffer that did not come from the builder
    pub fn validate(&self, slot_count: usize) -> Result<()> {
        let words = self.words();
        if words.is_empty() || words.len() % NODE_WORDS != 0 {
            return Err(BvhError::InvalidSerializedData(format!(
                "root buffer of {} words is not a whole number of nodes",
                words.len()
            )));
        }

        let mut seen = vec![false; self.node_count()];
        let mut visited = 0usize;
        let mut stack = vec![0usize];
        while let Some(word) = stack.pop() {
            let slot = &mut seen[word / NODE_WORDS];
            if *slot {
                return Err(BvhError::InvalidSerializedData(format!(
                    "node at word {} is reachable twice",
                    word
                )));
            }
            *slot = true;
            visited += 1;
            match self.node(word) {
                PackedNode::Leaf { offset, count } => {
                    if offset + count > slot_count {
                        return Err(BvhError::InvalidSerializedData(format!(
                            "leaf at word {} references slots [{}, {}) of {}",
                            word,
                            offset,
                            offset + count,
                            slot_count
                        )));
                    }
                }
                PackedNode::Internal {
                    left,
                    right,
                    split_axis,
                } => {
                    let in_range = |child: usize| child < words.len() && child % NODE_WORDS == 0;
                    if split_axis > 2 || !in_range(left) || !in_range(right) || right <= left {
                        return Err(BvhError::InvalidSerializedData(format!(
                            "malformed internal node at word {}",
                            word
                        )));
                    }
                    stack.push(right);
                    stack.push(left);
                }
            }
        }

        if visited != self.node_count() {
            return Err(BvhError::InvalidSerializedData(format!(
                "{} nodes reachable but the buffer holds {}",
                visited,
                self.node_count()
            )));
        }
        Ok(())
    }
}

pub(crate) fn write_bounds(words: &mut [u32], word: usize, packed: &[f32; 6]) {
    for (i, value) in packed.iter().enumerate() {
        words[word + i] = value.to_bits();
    }
}

pub(crate) fn write_leaf(words: &mut [u32], word: usize, offset: usize, count: usize) {
    words[word + 6] = offset as u32;
    words[word + 7] = (count as u32 & 0xFFFF) | (LEAF_MARK << 16);
}

pub(crate) fn write_internal(words: &mut [u32], word: usize, right: usize, split_axis: usize) {
    words[word + 6] = right as u32;
    words[word + 7] = split_axis as u32;
}
