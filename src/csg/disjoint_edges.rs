// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Matching of unmatched half edges that share a line but not their endpoints
//!
//! Edges left over by exact endpoint hashing are grouped by the infinite line
//! they lie on. Each edge becomes an interval along that line, stored as
//! forward or reverse depending on its direction relative to the group line.
//! Overlapping forward and reverse intervals are cut against each other and
//! every overlap links the two edges.

use ahash::AHashMap;
use nalgebra::{Point3, Vector3};
use serde::Serialize;

use crate::geometry::Mesh;

const DIST_EPSILON: f64 = 1e-5;
const ANGLE_EPSILON: f64 = 1e-4;

/// Line through `origin` (its closest point to the world origin) along a unit direction
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EdgeLine {
    pub origin: Point3<f64>,
    pub direction: Vector3<f64>,
}

impl EdgeLine {
    fn through(v0: &Point3<f64>, v1: &Point3<f64>) -> Option<Self> {
        let direction = (v1 - v0).try_normalize(0.0)?;
        let along = v0.coords.dot(&direction);
        Some(Self {
            origin: v0 - direction * along,
            direction,
        })
    }

    fn is_equivalent(&self, other: &EdgeLine) -> bool {
        (self.origin - other.origin).norm() < DIST_EPSILON
            && self.direction.dot(&other.direction).abs() >= 1.0 - ANGLE_EPSILON
    }

    fn project(&self, point: &Point3<f64>) -> f64 {
        (point - self.origin).dot(&self.direction)
    }
}

/// Portion of a half edge along its group line
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EdgeInterval {
    pub start: f64,
    pub end: f64,
    /// Linear half edge index, `3 * triangle + edge`
    pub index: usize,
}

impl EdgeInterval {
    fn length(&self) -> f64 {
        (self.end - self.start).abs()
    }
}

/// Unmatched edges on one line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeFragments {
    pub line: EdgeLine,
    pub forward: Vec<EdgeInterval>,
    pub reverse: Vec<EdgeInterval>,
}

#[derive(Debug, Default)]
pub(crate) struct DisjointEdges {
    pub connections: AHashMap<usize, Vec<usize>>,
    /// Groups that still hold fragments after matching
    pub fragments: Vec<EdgeFragments>,
}

/// Match `edges` (linear half edge indices of triangles starting at
/// `first_triangle`) along shared lines
pub(crate) fn compute_disjoint_edges(
    mesh: &Mesh,
    first_triangle: usize,
    edges: &[usize],
    epsilon: f64,
) -> DisjointEdges {
    let mut groups: Vec<EdgeFragments> = Vec::new();

    for &index in edges {
        let (tri, edge) = (index / 3, index % 3);
        let vertices = mesh.triangle_vertex_indices(first_triangle + tri);
        let v0 = mesh.positions[vertices[edge] as usize];
        let v1 = mesh.positions[vertices[(edge + 1) % 3] as usize];
        let Some(line) = EdgeLine::through(&v0, &v1) else {
            // zero length edges cannot be placed on a line and stay unmatched
            groups.push(EdgeFragments {
                line: EdgeLine {
                    origin: v0,
                    direction: Vector3::zeros(),
                },
                forward: vec![EdgeInterval {
                    start: 0.0,
                    end: f64::INFINITY,
                    index,
                }],
                reverse: Vec::new(),
            });
            continue;
        };

        let group_index = match groups
            .iter()
            .position(|g| g.direction_is_set() && g.line.is_equivalent(&line))
        {
            Some(i) => i,
            None => {
                groups.push(EdgeFragments {
                    line,
                    forward: Vec::new(),
                    reverse: Vec::new(),
                });
                groups.len() - 1
            }
        };
        let group = &mut groups[group_index];

        let a = group.line.project(&v0);
        let b = group.line.project(&v1);
        let interval = EdgeInterval {
            start: a.min(b),
            end: a.max(b),
            index,
        };
        if line.direction.dot(&group.line.direction) < 0.0 {
            group.reverse.push(interval);
        } else {
            group.forward.push(interval);
        }
    }

    let mut connections: AHashMap<usize, Vec<usize>> = AHashMap::new();
    for group in &mut groups {
        match_intervals(&mut group.forward, &mut group.reverse, &mut connections, epsilon);
    }
    groups.retain(|g| !g.forward.is_empty() || !g.reverse.is_empty());

    DisjointEdges {
        connections,
        fragments: groups,
    }
}

impl EdgeFragments {
    fn direction_is_set(&self) -> bool {
        self.line.direction != Vector3::zeros()
    }
}

/// Cut overlapping forward and reverse intervals against each other. Every
/// overlap records a two-way connection; fragments shorter than `epsilon`
/// are dropped.
fn match_intervals(
    forward: &mut Vec<EdgeInterval>,
    reverse: &mut Vec<EdgeInterval>,
    connections: &mut AHashMap<usize, Vec<usize>>,
    epsilon: f64,
) {
    let by_start = |a: &EdgeInterval, b: &EdgeInterval| a.start.total_cmp(&b.start);
    forward.sort_by(by_start);
    reverse.sort_by(by_start);

    let mut i = 0;
    while i < forward.len() {
        let mut o = 0;
        let mut removed_forward = false;
        while o < reverse.len() {
            let e0 = forward[i];
            let e1 = reverse[o];
            if e0.end - epsilon <= e1.start || e1.end - epsilon <= e0.start {
                o += 1;
                continue;
            }

            if e0.start <= e1.start && e0.end >= e1.end {
                // reverse interval inside the forward one
                if (e0.end - e1.end).abs() >= epsilon {
                    forward.insert(
                        i + 1,
                        EdgeInterval {
                            start: e1.end,
                            end: e0.end,
                            index: e0.index,
                        },
                    );
                }
                forward[i].end = e1.start;
                reverse[o].start = 0.0;
                reverse[o].end = 0.0;
            } else if e0.start >= e1.start && e0.end <= e1.end {
                // forward interval inside the reverse one
                if (e0.end - e1.end).abs() >= epsilon {
                    reverse.insert(
                        o + 1,
                        EdgeInterval {
                            start: e0.end,
                            end: e1.end,
                            index: e1.index,
                        },
                    );
                }
                reverse[o].end = e0.start;
                forward[i].start = 0.0;
                forward[i].end = 0.0;
            } else if e0.start <= e1.start {
                // forward interval overlaps the start of the reverse one
                forward[i].end = e1.start;
                reverse[o].start = e0.end;
            } else {
                reverse[o].end = e0.start;
                forward[i].start = e1.end;
            }

            connections.entry(e0.index).or_default().push(e1.index);
            connections.entry(e1.index).or_default().push(e0.index);

            if reverse[o].length() < epsilon {
                reverse.remove(o);
            } else {
                o += 1;
            }
            if forward[i].length() < epsilon {
                forward.remove(i);
                removed_forward = true;
                break;
            }
        }
        if !removed_forward {
            i += 1;
        }
    }

    forward.retain(|e| e.length() >= epsilon);
    reverse.retain(|e| e.length() >= epsilon);
}
