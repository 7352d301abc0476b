// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Recursive BVH construction into packed node buffers

use log::{debug, warn};

use super::bounds::{pack_box, TriangleBounds};
use super::node::{write_bounds, write_internal, write_leaf, MAX_LEAF_COUNT, NODE_WORDS};
use super::split::{median_split, partition, Splitter};
use crate::config::BuildOptions;
use crate::error::{BvhError, Result};
use crate::geometry::Mesh;

pub(crate) fn validate_options(options: &BuildOptions) -> Result<()> {
    if options.max_leaf_triangles == 0 {
        return Err(BvhError::UnsupportedConfiguration(
            "max_leaf_triangles must be at least 1".to_string(),
        ));
    }
    if options.max_depth == 0 {
        return Err(BvhError::UnsupportedConfiguration(
            "max_depth must be at least 1".to_string(),
        ));
    }
    if options.shared_buffers && !cfg!(target_has_atomic = "ptr") {
        return Err(BvhError::UnsupportedConfiguration(
            "shared buffers need atomic reference counting on this target".to_string(),
        ));
    }
    Ok(())
}

/// Triangle ranges `(first, count)` that each get their own root: the draw
/// range cut at every group boundary
pub fn root_ranges(mesh: &Mesh) -> Vec<(usize, usize)> {
    let (first, count) = mesh.draw_range_triangles();
    let end = first + count;

    let mut cuts = vec![first, end];
    for group in &mesh.groups {
        cuts.push((group.start / 3).clamp(first, end));
        cuts.push(((group.start + group.count) / 3).clamp(first, end));
    }
    cuts.sort_unstable();
    cuts.dedup();

    cuts.windows(2)
        .filter(|w| w[1] > w[0])
        .map(|w| (w[0], w[1] - w[0]))
        .collect()
}

pub(crate) struct BuildOutput {
    pub roots: Vec<Vec<u32>>,
    pub depth_limit_reached: bool,
}

struct Builder<'a> {
    bounds: &'a mut TriangleBounds,
    order: &'a mut [u32],
    stride: usize,
    options: &'a BuildOptions,
    splitter: Splitter,
    depth_limit_reached: bool,
}

impl Builder<'_> {
    fn build_node(&mut self, words: &mut Vec<u32>, offset: usize, count: usize, depth: u32) {
        let (node_box, centroid_box) = self.bounds.range_bounds(offset, count);
        let word = words.len();
        words.resize(word + NODE_WORDS, 0);
        write_bounds(words, word, &pack_box(&node_box));

        let oversized = count > MAX_LEAF_COUNT;
        if count <= self.options.max_leaf_triangles as usize {
            write_leaf(words, word, offset, count);
            return;
        }

        let at_depth_limit = depth >= self.options.max_depth;
        if at_depth_limit && !oversized {
            self.depth_limit_reached = true;
            write_leaf(words, word, offset, count);
            return;
        }

        let mut split_offset = None;
        if !at_depth_limit {
            if let Some(split) =
                self.splitter
                    .choose(self.bounds, offset, count, &node_box, &centroid_box)
            {
                let mid = partition(self.bounds, self.order, self.stride, offset, count, split);
                if mid != offset && mid != offset + count {
                    split_offset = Some((mid, split.axis));
                }
            }
        }

        let (mid, axis) = match split_offset {
            Some(found) => found,
            None if oversized => {
                let mid = median_split(
                    self.bounds,
                    self.order,
                    self.stride,
                    offset,
                    count,
                    &centroid_box,
                );
                (mid, centroid_box.longest_axis())
            }
            None => {
                write_leaf(words, word, offset, count);
                return;
            }
        };

        self.build_node(words, offset, mid - offset, depth + 1);
        let right = words.len();
        write_internal(words, word, right, axis);
        self.build_node(words, mid, offset + count - mid, depth + 1);
    }
}

/// Build one packed tree per slot range. `order` holds `stride` entries per
/// slot and is permuted together with `bounds`.
pub(crate) fn build_roots(
    bounds: &mut TriangleBounds,
    order: &mut [u32],
    stride: usize,
    ranges: &[(usize, usize)],
    options: &BuildOptions,
) -> BuildOutput {
    let mut builder = Builder {
        bounds,
        order,
        stride,
        options,
        splitter: Splitter::new(options.strategy),
        depth_limit_reached: false,
    };

    let mut roots = Vec::with_capacity(ranges.len());
    for &(offset, count) in ranges {
        let leaves = count / options.max_leaf_triangles as usize;
        let mut words = Vec::with_capacity(NODE_WORDS * (2 * leaves + 1));
        builder.build_node(&mut words, offset, count, 0);
        debug!(
            "built root over slots [{}, {}) with {} nodes",
            offset,
            offset + count,
            words.len() / NODE_WORDS
        );
        roots.push(words);
    }

    if builder.depth_limit_reached && options.verbose {
        warn!(
            "{}; consider raising max_depth",
            BvhError::BuildLimitReached {
                max_depth: options.max_depth
            }
        );
    }

    BuildOutput {
        roots,
        depth_limit_reached: builder.depth_limit_reached,
    }
}
