// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Per-triangle bounds table and the f32 rounding used when boxes are packed

use nalgebra::Point3;

use super::indexing::TriangleIndexing;
use crate::geometry::{BoundingBox, Mesh, Triangle};

/// Center and half extent per axis: `[cx, hx, cy, hy, cz, hz]`
pub type BoundsEntry = [f64; 6];

/// Bounds entry of a single triangle
pub fn triangle_entry(triangle: &Triangle) -> BoundsEntry {
    let mut entry = [0.0; 6];
    let points = triangle.points();
    for axis in 0..3 {
        let a = points[0][axis];
        let b = points[1][axis];
        let c = points[2][axis];
        let min = a.min(b).min(c);
        let max = a.max(b).max(c);
        let half = (max - min) / 2.0;
        entry[axis * 2] = min + half;
        entry[axis * 2 + 1] = half;
    }
    entry
}

pub fn entry_box(entry: &BoundsEntry) -> BoundingBox {
    BoundingBox::new(
        Point3::new(entry[0] - entry[1], entry[2] - entry[3], entry[4] - entry[5]),
        Point3::new(entry[0] + entry[1], entry[2] + entry[3], entry[4] + entry[5]),
    )
}

/// Bounds of every triangle slot, reordered alongside the triangles during the build
#[derive(Debug, Clone)]
pub struct TriangleBounds {
    data: Vec<f64>,
}

impl TriangleBounds {
    /// Compute entries for `slot_count` slots resolved through `indexing`
    pub fn compute(mesh: &Mesh, indexing: &TriangleIndexing, slot_count: usize) -> Self {
        let mut data = Vec::with_capacity(slot_count * 6);
        for slot in 0..slot_count {
            let tri = indexing.resolve(slot);
            data.extend_from_slice(&triangle_entry(&mesh.triangle(tri)));
        }
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len() / 6
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn center(&self, slot: usize, axis: usize) -> f64 {
        self.data[slot * 6 + axis * 2]
    }

    pub fn entry(&self, slot: usize) -> BoundsEntry {
        let mut entry = [0.0; 6];
        entry.copy_from_slice(&self.data[slot * 6..slot * 6 + 6]);
        entry
    }

    pub fn triangle_box(&self, slot: usize) -> BoundingBox {
        entry_box(&self.entry(slot))
    }

    /// Union of the triangle boxes and the box of the triangle centers over a slot range
    pub fn range_bounds(&self, offset: usize, count: usize) -> (BoundingBox, BoundingBox) {
        let mut bounds = BoundingBox::empty();
        let mut centroids = BoundingBox::empty();
        for slot in offset..offset + count {
            bounds.expand_by_box(&self.triangle_box(slot));
            centroids.expand_to_include(&Point3::new(
                self.center(slot, 0),
                self.center(slot, 1),
                self.center(slot, 2),
            ));
        }
        (bounds, centroids)
    }

    pub fn swap(&mut self, a: usize, b: usize) {
        for i in 0..6 {
            self.data.swap(a * 6 + i, b * 6 + i);
        }
    }

    /// Rewrite a slot range in the order given by `order`, relative to `offset`
    pub fn permute(&mut self, offset: usize, order: &[usize]) {
        let source: Vec<f64> = self.data[offset * 6..(offset + order.len()) * 6].to_vec();
        for (i, &from) in order.iter().enumerate() {
            let dst = (offset + i) * 6;
            self.data[dst..dst + 6].copy_from_slice(&source[from * 6..from * 6 + 6]);
        }
    }
}

fn next_up(value: f32) -> f32 {
    if value.is_nan() || value == f32::INFINITY {
        return value;
    }
    if value == 0.0 {
        return f32::from_bits(1);
    }
    let bits = value.to_bits();
    if value > 0.0 {
        f32::from_bits(bits + 1)
    } else {
        f32::from_bits(bits - 1)
    }
}

fn next_down(value: f32) -> f32 {
    -next_up(-value)
}

/// Largest f32 not above `value`
pub fn round_down(value: f64) -> f32 {
    let rounded = value as f32;
    if (rounded as f64) > value {
        next_down(rounded)
    } else {
        rounded
    }
}

/// Smallest f32 not below `value`
pub fn round_up(value: f64) -> f32 {
    let rounded = value as f32;
    if (rounded as f64) < value {
        next_up(rounded)
    } else {
        rounded
    }
}

/// Box as six f32 values rounded outward, `[min xyz, max xyz]`
pub fn pack_box(bbox: &BoundingBox) -> [f32; 6] {
    [
        round_down(bbox.min.x),
        round_down(bbox.min.y),
        round_down(bbox.min.z),
        round_up(bbox.max.x),
        round_up(bbox.max.y),
        round_up(bbox.max.z),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounding_is_outward() {
        let value = 0.1f64;
        assert!((round_down(value) as f64) <= value);
        assert!((round_up(value) as f64) >= value);
        assert!(round_down(value) < round_up(value));

        assert_eq!(round_down(0.5), 0.5);
        assert_eq!(round_up(-0.5), -0.5);
        assert_eq!(round_down(1e300), f32::MAX);
        assert_eq!(round_up(-1e300), -f32::MAX);
    }

    #[test]
    fn test_rounding_near_zero() {
        assert_eq!(round_down(0.0), 0.0);
        assert!(round_down(-1e-60) < 0.0);
        assert!(round_up(1e-60) > 0.0);
    }

    #[test]
    fn test_triangle_entry() {
        let tri = Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 1.0, 0.0),
            Point3::new(1.0, 3.0, 0.0),
        );
        let entry = triangle_entry(&tri);
        assert_eq!(entry, [1.0, 1.0, 1.5, 1.5, 0.0, 0.0]);
        let bbox = entry_box(&entry);
        assert_eq!(bbox.min, Point3::new(0.0, 0.0, 0.0));
        assert_eq!(bbox.max, Point3::new(2.0, 3.0, 0.0));
    }

    #[test]
    fn test_swap_and_permute() {
        let mut bounds = TriangleBounds {
            data: (0..18).map(|v| v as f64).collect(),
        };
        bounds.swap(0, 2);
        assert_eq!(bounds.center(0, 0), 12.0);
        assert_eq!(bounds.center(2, 0), 0.0);

        bounds.permute(0, &[2, 0, 1]);
        assert_eq!(bounds.center(0, 0), 0.0);
        assert_eq!(bounds.center(1, 0), 12.0);
        assert_eq!(bounds.center(2, 0), 6.0);
    }
}
