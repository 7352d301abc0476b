// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Boolean evaluation of two brushes
//!
//! Triangles touching the other brush are cut along its surface and every
//! fragment is classified on its own. The remaining triangles form islands
//! bounded by the cut; each island is classified once through a flood fill
//! over the half-edge map and written out whole.

use log::debug;
use nalgebra::{Matrix4, Vector3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Instant;

use super::attributes::{whole_triangle, AttributeSet, AttributeSource, OutputBuffers};
use super::brush::{Brush, PreparedBrush};
use super::classify::{hit_side, hit_side_with_coplanar_check};
use super::intersections::{collect_intersections, IntersectionMap};
use super::operation::{Action, FragmentSide, Operation};
use super::splitter::TriangleSplitter;
use crate::bvh::BvhcastContext;
use crate::config::EvaluatorOptions;
use crate::error::{BvhError, Result};
use crate::geometry::{ExtendedTriangle, Mesh, Triangle};

const DEGENERATE_EPSILON: f64 = 1e-10;

/// Reusable CSG evaluator. The splitter and traversal context are kept
/// between calls.
#[derive(Debug, Default)]
pub struct Evaluator {
    options: EvaluatorOptions,
    splitter: TriangleSplitter,
    context: BvhcastContext,
}

impl Evaluator {
    pub fn new(options: EvaluatorOptions) -> Self {
        Self {
            options,
            splitter: TriangleSplitter::new(),
            context: BvhcastContext::new(),
        }
    }

    pub fn options(&self) -> &EvaluatorOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut EvaluatorOptions {
        &mut self.options
    }

    /// Combine `a` with `b`. Both brushes are prepared if needed.
    pub fn evaluate(&mut self, a: &mut Brush, b: &mut Brush, operation: Operation) -> Result<Mesh> {
        self.evaluate_many(a, b, &[operation])?
            .pop()
            .ok_or_else(|| BvhError::InvalidGeometry("evaluation produced no result".to_string()))
    }

    /// Evaluate several operations over one shared split of the brushes,
    /// returning one mesh per operation in order
    pub fn evaluate_many(
        &mut self,
        a: &mut Brush,
        b: &mut Brush,
        operations: &[Operation],
    ) -> Result<Vec<Mesh>> {
        if operations.is_empty() {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        a.prepare()?;
        b.prepare()?;
        let a = a.prepared()?;
        let b = b.prepared()?;

        let uses_b = operations.iter().any(|op| !op.is_hollow());
        let sources: Vec<&Mesh> = if uses_b {
            vec![a.mesh, b.mesh]
        } else {
            vec![a.mesh]
        };
        let set = AttributeSet::resolve(self.options.attributes.as_deref(), &sources)?;

        let (a_hits, b_hits) = collect_intersections(&self.context, &a, &b)?;
        debug!(
            "CSG intersections: {} triangles of a, {} of b ({:.2}ms)",
            a_hits.len(),
            b_hits.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );

        let mut rng = StdRng::seed_from_u64(self.options.jitter_seed);
        let mut outputs = vec![OutputBuffers::new(set); operations.len()];
        let use_groups = self.options.use_groups;
        let a_slots = a.mesh.groups.len().max(1);

        let pass = Pass::new(&a, &b, &a_hits, operations, false, use_groups.then_some(0))?;
        pass.split(&mut self.splitter, &mut rng, &mut outputs);
        pass.whole(&mut outputs);

        if uses_b {
            let pass = Pass::new(&b, &a, &b_hits, operations, true, use_groups.then_some(a_slots))?;
            pass.split(&mut self.splitter, &mut rng, &mut outputs);
            pass.whole(&mut outputs);
        }

        let emitted: Vec<usize> = outputs.iter().map(OutputBuffers::triangle_count).collect();
        debug!("CSG emitted triangles per operation: {:?}", emitted);

        let materials = use_groups.then(|| slot_materials(a.mesh, b.mesh));
        let consolidate = self.options.consolidate_groups;
        let meshes: Vec<Mesh> = outputs
            .into_iter()
            .map(|out| out.into_mesh(materials.as_deref(), consolidate))
            .collect();

        debug!(
            "CSG evaluated {} operation(s) in {:.2}ms",
            operations.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(meshes)
    }
}

/// Material index of every output slot: the groups of `a` followed by the
/// groups of `b`, whose materials are shifted past those of `a`
fn slot_materials(a: &Mesh, b: &Mesh) -> Vec<usize> {
    let materials = |mesh: &Mesh, offset: usize| -> Vec<usize> {
        if mesh.groups.is_empty() {
            vec![offset]
        } else {
            mesh.groups.iter().map(|g| g.material_index + offset).collect()
        }
    };

    let a_materials = materials(a, 0);
    let offset = a_materials.iter().max().map_or(1, |m| m + 1);
    let mut slots = a_materials;
    slots.extend(materials(b, offset));
    slots
}

/// One side of an evaluation: triangles of `source` classified against `target`
struct Pass<'a> {
    source: &'a PreparedBrush<'a>,
    target: &'a PreparedBrush<'a>,
    intersections: &'a IntersectionMap,
    operations: &'a [Operation],
    invert: bool,
    group_offset: Option<usize>,
    to_target: Matrix4<f64>,
    attributes: AttributeSource<'a>,
}

impl<'a> Pass<'a> {
    fn new(
        source: &'a PreparedBrush<'a>,
        target: &'a PreparedBrush<'a>,
        intersections: &'a IntersectionMap,
        operations: &'a [Operation],
        invert: bool,
        group_offset: Option<usize>,
    ) -> Result<Self> {
        let target_inverse = target
            .matrix
            .try_inverse()
            .ok_or_else(|| BvhError::InvalidGeometry("brush matrix is not invertible".to_string()))?;
        Ok(Self {
            source,
            target,
            intersections,
            operations,
            invert,
            group_offset,
            to_target: target_inverse * source.matrix,
            attributes: AttributeSource::new(source.mesh, source.matrix),
        })
    }

    fn slot(&self, tri: usize) -> usize {
        match self.group_offset {
            Some(offset) => offset + self.source.group_indices.get(tri).copied().unwrap_or(0),
            None => 0,
        }
    }

    /// Non-skipped actions per output for a triangle on `side`
    fn actions(&self, side: FragmentSide) -> Vec<(usize, Action)> {
        self.operations
            .iter()
            .enumerate()
            .map(|(o, op)| (o, op.action(side, self.invert)))
            .filter(|(_, action)| *action != Action::Skip)
            .collect()
    }

    fn emit(
        &self,
        tri: usize,
        weights: &[Vector3<f64>; 3],
        actions: &[(usize, Action)],
        outputs: &mut [OutputBuffers],
    ) {
        let slot = self.slot(tri);
        for &(o, action) in actions {
            let set = *outputs[o].set();
            let invert = action == Action::Invert;
            self.attributes
                .append(tri, weights, &set, outputs[o].slot_mut(slot), invert);
        }
    }

    /// Cut every intersected triangle by the triangles it touches and emit
    /// the fragments
    fn split(
        &self,
        splitter: &mut TriangleSplitter,
        rng: &mut StdRng,
        outputs: &mut [OutputBuffers],
    ) {
        for &tri in self.intersections.ids() {
            let local = self.source.mesh.triangle(tri).transform(&self.to_target);
            splitter.initialize(&local);
            for &other in self.intersections.intersecting(tri) {
                splitter.split_by_triangle(&ExtendedTriangle::new(self.target.mesh.triangle(other)));
            }

            let coplanar = splitter.coplanar_triangle_used();
            for fragment in splitter.triangles() {
                let side = if coplanar {
                    hit_side_with_coplanar_check(fragment, self.target.bvh, self.target.mesh, rng)
                } else {
                    hit_side(fragment, self.target.bvh, self.target.mesh)
                };
                let actions = self.actions(side);
                if actions.is_empty() {
                    continue;
                }
                if let Some(weights) = fragment_weights(&local, fragment) {
                    self.emit(tri, &weights, &actions, outputs);
                }
            }
        }
    }

    /// Flood fill the triangles left untouched by the cut, classifying one
    /// triangle per island
    fn whole(&self, outputs: &mut [OutputBuffers]) {
        let (first, count) = self.source.mesh.draw_range_triangles();
        let mut pending: Vec<bool> = (first..first + count)
            .map(|tri| !self.intersections.contains(tri))
            .collect();
        let half_edges = self.source.half_edges;
        let mut stack = Vec::new();
        let mut islands = 0;

        for seed in first..first + count {
            if !pending[seed - first] {
                continue;
            }
            pending[seed - first] = false;

            let local = self.source.mesh.triangle(seed).transform(&self.to_target);
            if local.is_degenerate(DEGENERATE_EPSILON) {
                continue;
            }
            islands += 1;
            let actions = self.actions(hit_side(&local, self.target.bvh, self.target.mesh));

            stack.push(seed);
            while let Some(tri) = stack.pop() {
                for edge in 0..3 {
                    let siblings = half_edges
                        .sibling_triangle_index(tri, edge)
                        .into_iter()
                        .chain(half_edges.disjoint_sibling_triangle_indices(tri, edge));
                    for sibling in siblings {
                        let Some(local) = sibling.checked_sub(first) else {
                            continue;
                        };
                        if let Some(flag) = pending.get_mut(local) {
                            if *flag {
                                *flag = false;
                                stack.push(sibling);
                            }
                        }
                    }
                }

                if !actions.is_empty() && !self.source.mesh.triangle(tri).is_degenerate(DEGENERATE_EPSILON) {
                    self.emit(tri, &whole_triangle(), &actions, outputs);
                }
            }
        }

        debug!(
            "CSG {} pass: {} untouched island(s)",
            if self.invert { "b" } else { "a" },
            islands
        );
    }
}

/// Barycentric weights of the fragment corners on the triangle it was cut from
fn fragment_weights(source: &Triangle, fragment: &Triangle) -> Option<[Vector3<f64>; 3]> {
    Some([
        source.barycoord(&fragment.a)?,
        source.barycoord(&fragment.b)?,
        source.barycoord(&fragment.c)?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Group, Primitive};
    use approx::assert_relative_eq;

    fn cube(size: f64, offset: Vector3<f64>) -> Brush {
        Brush::new(Primitive::cube(Vector3::new(size, size, size), true).to_mesh())
            .with_matrix(Matrix4::new_translation(&offset))
    }

    #[test]
    fn test_nested_subtraction_keeps_both_shells() {
        let mut a = cube(2.0, Vector3::zeros());
        let mut b = cube(1.0, Vector3::zeros());
        let mut evaluator = Evaluator::default();

        let result = evaluator.evaluate(&mut a, &mut b, Operation::Subtraction).unwrap();
        assert_eq!(result.triangle_count(), 24);
        assert_relative_eq!(result.volume(), 7.0, epsilon = 1e-9);
        assert!(result.normals.is_some());
        assert!(result.uvs.is_some());
    }

    #[test]
    fn test_nested_cubes_all_operations() {
        let mut a = cube(2.0, Vector3::zeros());
        let mut b = cube(1.0, Vector3::zeros());
        let mut evaluator = Evaluator::default();

        let results = evaluator
            .evaluate_many(
                &mut a,
                &mut b,
                &[Operation::Addition, Operation::Intersection, Operation::ReverseSubtraction],
            )
            .unwrap();
        assert_relative_eq!(results[0].volume(), 8.0, epsilon = 1e-9);
        assert_relative_eq!(results[1].volume(), 1.0, epsilon = 1e-9);
        // nothing of b lies outside a
        assert_eq!(results[2].triangle_count(), 0);
    }

    #[test]
    fn test_overlapping_cubes_volumes() {
        let mut a = cube(1.0, Vector3::zeros());
        let mut b = cube(1.0, Vector3::new(0.5, 0.3, 0.2));
        let mut evaluator = Evaluator::default();

        let results = evaluator
            .evaluate_many(
                &mut a,
                &mut b,
                &[Operation::Addition, Operation::Subtraction, Operation::Intersection],
            )
            .unwrap();
        let shared = 0.5 * 0.7 * 0.8;
        assert_relative_eq!(results[0].volume(), 2.0 - shared, epsilon = 1e-6);
        assert_relative_eq!(results[1].volume(), 1.0 - shared, epsilon = 1e-6);
        assert_relative_eq!(results[2].volume(), shared, epsilon = 1e-6);
    }

    #[test]
    fn test_coincident_intersection_keeps_one_copy() {
        let mut a = cube(1.0, Vector3::zeros());
        let mut b = cube(1.0, Vector3::zeros());
        let mut evaluator = Evaluator::default();

        let result = evaluator.evaluate(&mut a, &mut b, Operation::Intersection).unwrap();
        assert_relative_eq!(result.volume(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_hollow_operation_ignores_b_attributes() {
        let mut a = cube(2.0, Vector3::zeros());
        let mut b = cube(1.0, Vector3::new(5.0, 0.0, 0.0));
        b.mesh_mut().uvs = None;
        b.mark_dirty();

        let mut evaluator = Evaluator::new(EvaluatorOptions {
            attributes: Some(vec![crate::csg::Attribute::Uv]),
            ..EvaluatorOptions::default()
        });
        let hollow = evaluator
            .evaluate(&mut a, &mut b, Operation::HollowSubtraction)
            .unwrap();
        assert_eq!(hollow.triangle_count(), 12);
        assert!(hollow.uvs.is_some());

        let err = evaluator.evaluate(&mut a, &mut b, Operation::Addition);
        assert!(matches!(err, Err(BvhError::InvalidGeometry(_))));
    }

    #[test]
    fn test_groups_carry_materials() {
        let grouped = Primitive::cube(Vector3::new(2.0, 2.0, 2.0), true)
            .to_mesh()
            .with_groups(vec![Group::new(0, 12, 0), Group::new(12, 24, 1)]);
        let mut a = Brush::new(grouped);
        let mut b = cube(1.0, Vector3::zeros());
        let mut evaluator = Evaluator::default();

        let result = evaluator.evaluate(&mut a, &mut b, Operation::Subtraction).unwrap();
        assert_eq!(
            result.groups,
            vec![Group::new(0, 12, 0), Group::new(12, 24, 1), Group::new(36, 36, 2)]
        );

        evaluator.options_mut().use_groups = false;
        let plain = evaluator.evaluate(&mut a, &mut b, Operation::Subtraction).unwrap();
        assert!(plain.groups.is_empty());
        assert_eq!(plain.triangle_count(), 24);
    }

    #[test]
    fn test_repeated_evaluation_is_deterministic() {
        let mut a = cube(1.0, Vector3::zeros());
        let mut b = Brush::new(Primitive::sphere(0.6, 12).to_mesh())
            .with_matrix(Matrix4::new_translation(&Vector3::new(0.4, 0.1, 0.0)));
        let mut evaluator = Evaluator::default();

        let first = evaluator.evaluate(&mut a, &mut b, Operation::Difference).unwrap();
        let second = evaluator.evaluate(&mut a, &mut b, Operation::Difference).unwrap();
        assert_eq!(first.positions, second.positions);
        assert!(first.triangle_count() > 0);
    }

    #[test]
    fn test_empty_operation_list() {
        let mut a = cube(1.0, Vector3::zeros());
        let mut b = cube(1.0, Vector3::zeros());
        let results = Evaluator::default().evaluate_many(&mut a, &mut b, &[]).unwrap();
        assert!(results.is_empty());
    }
}
