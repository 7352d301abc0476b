// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Split plane selection

use super::bounds::TriangleBounds;
use crate::config::SplitStrategy;
use crate::geometry::BoundingBox;

pub const BIN_COUNT: usize = 32;
pub const TRAVERSAL_COST: f64 = 1.25;
pub const TRIANGLE_INTERSECT_COST: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Split {
    pub axis: usize,
    pub pos: f64,
}

#[derive(Debug, Clone, Copy)]
struct SahBin {
    candidate: f64,
    count: usize,
    bounds: BoundingBox,
    right_cache: BoundingBox,
}

impl Default for SahBin {
    fn default() -> Self {
        Self {
            candidate: 0.0,
            count: 0,
            bounds: BoundingBox::empty(),
            right_cache: BoundingBox::empty(),
        }
    }
}

/// Reusable scratch for split evaluation
#[derive(Debug, Clone)]
pub struct Splitter {
    strategy: SplitStrategy,
    bins: Vec<SahBin>,
}

impl Splitter {
    pub fn new(strategy: SplitStrategy) -> Self {
        Self {
            strategy,
            bins: vec![SahBin::default(); BIN_COUNT],
        }
    }

    /// Split for a slot range, `None` when the range should stay a leaf
    pub fn choose(
        &mut self,
        bounds: &TriangleBounds,
        offset: usize,
        count: usize,
        node_box: &BoundingBox,
        centroid_box: &BoundingBox,
    ) -> Option<Split> {
        match self.strategy {
            SplitStrategy::Center => {
                let axis = centroid_box.longest_axis();
                if centroid_box.size()[axis] <= 0.0 {
                    return None;
                }
                Some(Split {
                    axis,
                    pos: (centroid_box.min[axis] + centroid_box.max[axis]) / 2.0,
                })
            }
            SplitStrategy::Average => {
                let axis = node_box.longest_axis();
                let sum: f64 = (offset..offset + count)
                    .map(|slot| bounds.center(slot, axis))
                    .sum();
                Some(Split {
                    axis,
                    pos: sum / count as f64,
                })
            }
            SplitStrategy::Sah => self.sah(bounds, offset, count, node_box, centroid_box),
        }
    }

    fn sah(
        &mut self,
        bounds: &TriangleBounds,
        offset: usize,
        count: usize,
        node_box: &BoundingBox,
        centroid_box: &BoundingBox,
    ) -> Option<Split> {
        let root_area = node_box.surface_area();
        let mut best_cost = TRIANGLE_INTERSECT_COST * count as f64;
        let mut best = None;

        let cost = |left_area: f64, left_count: usize, right_area: f64, right_count: usize| {
            let left_prob = if left_count != 0 && root_area > 0.0 {
                left_area / root_area
            } else {
                0.0
            };
            let right_prob = if right_count != 0 && root_area > 0.0 {
                right_area / root_area
            } else {
                0.0
            };
            TRAVERSAL_COST
                + TRIANGLE_INTERSECT_COST
                    * (left_prob * left_count as f64 + right_prob * right_count as f64)
        };

        for axis in 0..3 {
            let axis_left = centroid_box.min[axis];
            let axis_length = centroid_box.max[axis] - axis_left;
            if axis_length <= 0.0 {
                continue;
            }

            if count < BIN_COUNT / 4 {
                // few triangles: every center is a candidate
                let mut candidates: Vec<f64> = (offset..offset + count)
                    .map(|slot| bounds.center(slot, axis))
                    .collect();
                candidates.sort_by(f64::total_cmp);
                candidates.dedup();

                for &candidate in &candidates {
                    let mut left = BoundingBox::empty();
                    let mut right = BoundingBox::empty();
                    let mut left_count = 0;
                    for slot in offset..offset + count {
                        if bounds.center(slot, axis) >= candidate {
                            right.expand_by_box(&bounds.triangle_box(slot));
                        } else {
                            left.expand_by_box(&bounds.triangle_box(slot));
                            left_count += 1;
                        }
                    }

                    let c = cost(
                        left.surface_area(),
                        left_count,
                        right.surface_area(),
                        count - left_count,
                    );
                    if c < best_cost {
                        best_cost = c;
                        best = Some(Split {
                            axis,
                            pos: candidate,
                        });
                    }
                }
            } else {
                let bin_width = axis_length / BIN_COUNT as f64;
                for (i, bin) in self.bins.iter_mut().enumerate() {
                    *bin = SahBin {
                        candidate: axis_left + bin_width + i as f64 * bin_width,
                        ..SahBin::default()
                    };
                }

                for slot in offset..offset + count {
                    let relative = bounds.center(slot, axis) - axis_left;
                    let index = ((relative / bin_width) as usize).min(BIN_COUNT - 1);
                    let bin = &mut self.bins[index];
                    bin.count += 1;
                    bin.bounds.expand_by_box(&bounds.triangle_box(slot));
                }

                // unions of every bin to the right, built once
                self.bins[BIN_COUNT - 1].right_cache = self.bins[BIN_COUNT - 1].bounds;
                for i in (0..BIN_COUNT - 1).rev() {
                    self.bins[i].right_cache = self.bins[i].bounds.union(&self.bins[i + 1].right_cache);
                }

                let mut left_bounds = BoundingBox::empty();
                let mut left_count = 0;
                for i in 0..BIN_COUNT - 1 {
                    let bin = self.bins[i];
                    if bin.count != 0 {
                        left_bounds.expand_by_box(&bin.bounds);
                    }
                    left_count += bin.count;

                    let right_bounds = self.bins[i + 1].right_cache;
                    let c = cost(
                        left_bounds.surface_area(),
                        left_count,
                        right_bounds.surface_area(),
                        count - left_count,
                    );
                    if c < best_cost {
                        best_cost = c;
                        best = Some(Split {
                            axis,
                            pos: bin.candidate,
                        });
                    }
                }
            }
        }

        best
    }
}

/// Two pointer partition of `[offset, offset + count)`; centers below `split.pos`
/// move left. Returns the first slot of the right side.
pub fn partition(
    bounds: &mut TriangleBounds,
    order: &mut [u32],
    stride: usize,
    offset: usize,
    count: usize,
    split: Split,
) -> usize {
    if count == 0 {
        return offset;
    }
    let mut left = offset as isize;
    let mut right = (offset + count) as isize - 1;

    loop {
        while left <= right && bounds.center(left as usize, split.axis) < split.pos {
            left += 1;
        }
        while left <= right && bounds.center(right as usize, split.axis) >= split.pos {
            right -= 1;
        }

        if left < right {
            let (l, r) = (left as usize, right as usize);
            for i in 0..stride {
                order.swap(l * stride + i, r * stride + i);
            }
            bounds.swap(l, r);
            left += 1;
            right -= 1;
        } else {
            return left as usize;
        }
    }
}

/// Sort the range by center along the longest centroid axis and return the
/// midpoint. Used when a range is too large for a leaf but no plane separates it.
pub fn median_split(
    bounds: &mut TriangleBounds,
    order: &mut [u32],
    stride: usize,
    offset: usize,
    count: usize,
    centroid_box: &BoundingBox,
) -> usize {
    let axis = centroid_box.longest_axis();
    let mut permutation: Vec<usize> = (0..count).collect();
    permutation.sort_by(|&a, &b| {
        bounds
            .center(offset + a, axis)
            .total_cmp(&bounds.center(offset + b, axis))
    });

    let source: Vec<u32> = order[offset * stride..(offset + count) * stride].to_vec();
    for (i, &from) in permutation.iter().enumerate() {
        let dst = (offset + i) * stride;
        order[dst..dst + stride].copy_from_slice(&source[from * stride..from * stride + stride]);
    }
    bounds.permute(offset, &permutation);

    offset + count / 2
}
