// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Triangle adjacency through shared edges
//!
//! Edges are matched by hashing quantized endpoint positions, so vertices
//! duplicated for per-face normals or uvs still connect. Entry `3 * t + e`
//! of the map holds the half edge running opposite to edge `e` of triangle
//! `t` (edge `e` goes from vertex `e` to vertex `(e + 1) % 3`).

use ahash::AHashMap;
use log::trace;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use super::disjoint_edges::{compute_disjoint_edges, EdgeFragments};
use crate::geometry::Mesh;

const HASH_MULTIPLIER: f64 = (1.0 + 1e-10) * 1e2;

type VertexKey = [i64; 3];

fn vertex_key(p: &Point3<f64>) -> VertexKey {
    [
        (p.x * HASH_MULTIPLIER) as i64,
        (p.y * HASH_MULTIPLIER) as i64,
        (p.z * HASH_MULTIPLIER) as i64,
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HalfEdgeOptions {
    /// Only map the triangles inside the mesh's draw range
    pub use_draw_range: bool,
    /// Pair up collinear edges whose endpoints differ (T-junctions)
    pub match_disjoint_edges: bool,
    pub degenerate_epsilon: f64,
}

impl Default for HalfEdgeOptions {
    fn default() -> Self {
        Self {
            use_draw_range: false,
            match_disjoint_edges: false,
            degenerate_epsilon: 1e-10,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HalfEdgeMap {
    data: Vec<i32>,
    first_triangle: usize,
    disjoint_connections: AHashMap<usize, Vec<usize>>,
    unmatched_disjoint_edges: Vec<EdgeFragments>,
    matched_edges: usize,
    unmatched_edges: usize,
}

impl HalfEdgeMap {
    pub fn from_mesh(mesh: &Mesh, options: &HalfEdgeOptions) -> Self {
        let (first_triangle, triangle_count) = if options.use_draw_range {
            mesh.draw_range_triangles()
        } else {
            (0, mesh.triangle_count())
        };

        let mut data = vec![-1i32; triangle_count * 3];
        let mut open: AHashMap<(VertexKey, VertexKey), usize> = AHashMap::new();
        let mut unmatched: Vec<bool> = vec![false; triangle_count * 3];
        let mut unmatched_count = 0usize;

        for tri in 0..triangle_count {
            let vertices = mesh.triangle_vertex_indices(first_triangle + tri);
            let keys = vertices.map(|v| vertex_key(&mesh.positions[v as usize]));
            for edge in 0..3 {
                let k0 = keys[edge];
                let k1 = keys[(edge + 1) % 3];
                let index = 3 * tri + edge;
                match open.remove(&(k1, k0)) {
                    Some(other) => {
                        data[index] = other as i32;
                        data[other] = index as i32;
                        unmatched[other] = false;
                        unmatched_count -= 1;
                    }
                    None => {
                        open.insert((k0, k1), index);
                        unmatched[index] = true;
                        unmatched_count += 1;
                    }
                }
            }
        }

        let mut map = Self {
            data,
            first_triangle,
            ..Self::default()
        };

        if options.match_disjoint_edges {
            let edges: Vec<usize> = (0..unmatched.len()).filter(|&i| unmatched[i]).collect();
            let disjoint =
                compute_disjoint_edges(mesh, first_triangle, &edges, options.degenerate_epsilon);
            let mut still_unmatched: Vec<usize> = disjoint
                .fragments
                .iter()
                .flat_map(|f| f.forward.iter().chain(f.reverse.iter()).map(|e| e.index))
                .collect();
            still_unmatched.sort_unstable();
            still_unmatched.dedup();
            unmatched_count = still_unmatched.len();
            map.disjoint_connections = disjoint.connections;
            map.unmatched_disjoint_edges = disjoint.fragments;
        }

        map.unmatched_edges = unmatched_count;
        map.matched_edges = triangle_count * 3 - unmatched_count;
        trace!(
            "half edge map: {} triangles, {} matched, {} unmatched",
            triangle_count,
            map.matched_edges,
            map.unmatched_edges
        );
        map
    }

    /// Number of mapped triangles
    pub fn triangle_count(&self) -> usize {
        self.data.len() / 3
    }

    /// Mesh triangle index of the first mapped triangle
    pub fn first_triangle(&self) -> usize {
        self.first_triangle
    }

    fn linear(&self, tri: usize, edge: usize) -> Option<usize> {
        let local = tri.checked_sub(self.first_triangle)?;
        let index = 3 * local + edge;
        (edge < 3 && index < self.data.len()).then_some(index)
    }

    /// Mesh triangle across edge `edge` of triangle `tri`
    pub fn sibling_triangle_index(&self, tri: usize, edge: usize) -> Option<usize> {
        let index = self.linear(tri, edge)?;
        let sibling = self.data[index];
        (sibling >= 0).then(|| sibling as usize / 3 + self.first_triangle)
    }

    /// Edge of the sibling triangle that runs opposite to `edge`
    pub fn sibling_edge_index(&self, tri: usize, edge: usize) -> Option<usize> {
        let index = self.linear(tri, edge)?;
        let sibling = self.data[index];
        (sibling >= 0).then(|| sibling as usize % 3)
    }

    fn disjoint_siblings(&self, tri: usize, edge: usize) -> &[usize] {
        self.linear(tri, edge)
            .and_then(|index| self.disjoint_connections.get(&index))
            .map_or(&[], Vec::as_slice)
    }

    /// Triangles partially sharing edge `edge` of `tri` along a common line
    pub fn disjoint_sibling_triangle_indices(&self, tri: usize, edge: usize) -> Vec<usize> {
        self.disjoint_siblings(tri, edge)
            .iter()
            .map(|&i| i / 3 + self.first_triangle)
            .collect()
    }

    pub fn disjoint_sibling_edge_indices(&self, tri: usize, edge: usize) -> Vec<usize> {
        self.disjoint_siblings(tri, edge)
            .iter()
            .map(|&i| i % 3)
            .collect()
    }

    /// Collinear fragments still unmatched after disjoint matching
    pub fn unmatched_disjoint_edges(&self) -> &[EdgeFragments] {
        &self.unmatched_disjoint_edges
    }

    pub fn matched_edges(&self) -> usize {
        self.matched_edges
    }

    pub fn unmatched_edges(&self) -> usize {
        self.unmatched_edges
    }

    pub fn is_fully_connected(&self) -> bool {
        self.unmatched_edges == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{DrawRange, Primitive};
    use nalgebra::Vector3;

    fn quad() -> Mesh {
        Mesh::from_positions(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ])
        .with_index(vec![0, 1, 2, 0, 2, 3])
    }

    fn assert_symmetric(map: &HalfEdgeMap) {
        let first = map.first_triangle();
        for tri in first..first + map.triangle_count() {
            for edge in 0..3 {
                if let Some(sibling) = map.sibling_triangle_index(tri, edge) {
                    let sibling_edge = map.sibling_edge_index(tri, edge).unwrap();
                    assert_eq!(map.sibling_triangle_index(sibling, sibling_edge), Some(tri));
                    assert_eq!(map.sibling_edge_index(sibling, sibling_edge), Some(edge));
                }
            }
        }
    }

    #[test]
    fn test_quad_shares_its_diagonal() {
        let map = HalfEdgeMap::from_mesh(&quad(), &HalfEdgeOptions::default());
        // the diagonal is edge 2 of the first triangle and edge 0 of the second
        assert_eq!(map.sibling_triangle_index(0, 2), Some(1));
        assert_eq!(map.sibling_edge_index(0, 2), Some(0));
        assert_eq!(map.sibling_triangle_index(1, 0), Some(0));
        assert_eq!(map.sibling_edge_index(1, 0), Some(2));
        assert_eq!(map.sibling_triangle_index(0, 0), None);
        assert_eq!(map.matched_edges(), 2);
        assert_eq!(map.unmatched_edges(), 4);
        assert!(!map.is_fully_connected());
    }

    #[test]
    fn test_closed_meshes_are_fully_connected() {
        for mesh in [
            Primitive::cube(Vector3::new(1.0, 2.0, 3.0), true).to_mesh(),
            Primitive::sphere(1.0, 12).to_mesh(),
            Primitive::cylinder(2.0, 0.5, 10).to_mesh(),
        ] {
            let map = HalfEdgeMap::from_mesh(&mesh, &HalfEdgeOptions::default());
            assert!(map.is_fully_connected());
            assert_eq!(map.matched_edges(), mesh.triangle_count() * 3);
            assert_symmetric(&map);
        }
    }

    #[test]
    fn test_draw_range_offsets_triangle_indices() {
        let mut mesh = Primitive::cube(Vector3::new(1.0, 1.0, 1.0), true).to_mesh();
        mesh.draw_range = DrawRange {
            start: 6,
            count: Some(6),
        };
        let map = HalfEdgeMap::from_mesh(
            &mesh,
            &HalfEdgeOptions {
                use_draw_range: true,
                ..HalfEdgeOptions::default()
            },
        );
        assert_eq!(map.first_triangle(), 2);
        assert_eq!(map.triangle_count(), 2);
        assert_eq!(map.sibling_triangle_index(0, 0), None);
        // the two triangles of one cube face share only their diagonal
        assert_eq!(map.sibling_triangle_index(2, 2), Some(3));
        assert_eq!(map.matched_edges(), 2);
        assert_eq!(map.unmatched_edges(), 4);
        assert_symmetric(&map);
    }

    #[test]
    fn test_t_junction_matches_disjoint_edges() {
        // one large triangle below y = 1, two smaller ones above sharing its top edge
        let mesh = Mesh::from_positions(vec![
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 1.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(2.0, 1.0, 0.0),
            Point3::new(1.5, 2.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.5, 2.0, 0.0),
        ]);

        let plain = HalfEdgeMap::from_mesh(&mesh, &HalfEdgeOptions::default());
        assert_eq!(plain.matched_edges(), 0);

        let map = HalfEdgeMap::from_mesh(
            &mesh,
            &HalfEdgeOptions {
                match_disjoint_edges: true,
                ..HalfEdgeOptions::default()
            },
        );
        let mut siblings = map.disjoint_sibling_triangle_indices(0, 2);
        siblings.sort_unstable();
        assert_eq!(siblings, vec![1, 2]);
        assert_eq!(map.disjoint_sibling_triangle_indices(1, 0), vec![0]);
        assert_eq!(map.disjoint_sibling_edge_indices(1, 0), vec![2]);
        assert_eq!(map.matched_edges(), 3);
        assert_eq!(map.matched_edges() + map.unmatched_edges(), 9);
    }
}
