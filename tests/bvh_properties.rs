// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Structural properties of built trees across strategies and layouts

use approx::assert_relative_eq;
use nalgebra::{Matrix4, Point3, Vector3};
use polyframe_bvh::bvh::debug::validate_bounds;
use polyframe_bvh::bvh::{DeserializeOptions, SerializeOptions, SerializedBvh};
use polyframe_bvh::geometry::{BoundingBox, Ray, Side};
use polyframe_bvh::{BuildOptions, Mesh, MeshBvh, Primitive, SplitStrategy};
use proptest::prelude::*;

const STRATEGIES: [SplitStrategy; 3] = [
    SplitStrategy::Center,
    SplitStrategy::Average,
    SplitStrategy::Sah,
];

fn triangle_soup(coords: &[[f64; 9]]) -> Mesh {
    let positions = coords
        .iter()
        .flat_map(|c| {
            [
                Point3::new(c[0], c[1], c[2]),
                Point3::new(c[3], c[4], c[5]),
                Point3::new(c[6], c[7], c[8]),
            ]
        })
        .collect();
    Mesh::from_positions(positions)
}

fn words(bvh: &MeshBvh) -> Vec<Vec<u32>> {
    bvh.roots().iter().map(|r| r.words().to_vec()).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_nodes_contain_their_triangles(
        coords in prop::collection::vec(prop::array::uniform9(-10.0f64..10.0), 1..80),
        strategy in 0usize..3,
        max_leaf in 1u32..8,
        indirect in any::<bool>(),
    ) {
        let mut mesh = triangle_soup(&coords);
        let options = BuildOptions {
            strategy: STRATEGIES[strategy],
            max_leaf_triangles: max_leaf,
            indirect,
            ..BuildOptions::default()
        };
        let bvh = MeshBvh::build(&mut mesh, &options).unwrap();
        prop_assert!(validate_bounds(&bvh, &mesh));
    }

    #[test]
    fn prop_first_hit_is_nearest_hit(
        origin in prop::array::uniform3(-3.0f64..3.0),
        direction in prop::array::uniform3(-1.0f64..1.0),
    ) {
        let direction = Vector3::from(direction);
        prop_assume!(direction.norm() > 1e-3);

        let mut mesh = Primitive::sphere(1.5, 16).to_mesh();
        let bvh = MeshBvh::build(&mut mesh, &BuildOptions::default()).unwrap();
        let ray = Ray::new(Point3::from(origin), direction);

        let all = bvh.raycast(&mesh, &ray, Side::Double, 0.0, f64::INFINITY);
        let first = bvh.raycast_first(&mesh, &ray, Side::Double, 0.0, f64::INFINITY);
        match first {
            None => prop_assert!(all.is_empty()),
            Some(hit) => {
                let nearest = all.iter().map(|h| h.distance).fold(f64::INFINITY, f64::min);
                prop_assert!((hit.distance - nearest).abs() < 1e-12);
            }
        }
    }
}

#[test]
fn test_refit_is_idempotent_for_every_strategy() {
    for strategy in STRATEGIES {
        for indirect in [false, true] {
            let mut mesh = Primitive::sphere(2.0, 20).to_mesh();
            let options = BuildOptions {
                strategy,
                indirect,
                max_leaf_triangles: 4,
                ..BuildOptions::default()
            };
            let mut bvh = MeshBvh::build(&mut mesh, &options).unwrap();
            let built = words(&bvh);

            bvh.refit(&mesh, None);
            assert_eq!(words(&bvh), built, "{:?} indirect={}", strategy, indirect);
            bvh.refit(&mesh, None);
            assert_eq!(words(&bvh), built);
        }
    }
}

#[test]
fn test_refit_follows_deformation() {
    let mut mesh = Primitive::sphere(1.0, 16).to_mesh();
    let mut bvh = MeshBvh::build(&mut mesh, &BuildOptions::default()).unwrap();

    for p in &mut mesh.positions {
        p.x *= 3.0;
        p.z += p.y * 0.5;
    }
    assert!(!validate_bounds(&bvh, &mesh));
    bvh.refit(&mesh, None);
    assert!(validate_bounds(&bvh, &mesh));
    assert_relative_eq!(bvh.bounding_box().max.x, 3.0, epsilon = 1e-6);
}

fn ray_battery() -> Vec<Ray> {
    (0..24)
        .map(|i| {
            let t = i as f64 * 0.7;
            Ray::new(
                Point3::new(4.0 * t.cos(), 0.3 * (i as f64 - 12.0), 4.0 * t.sin()),
                Vector3::new(-t.cos(), 0.05 * (i % 5) as f64, -t.sin()),
            )
        })
        .collect()
}

fn box_battery() -> Vec<BoundingBox> {
    (0..8)
        .map(|i| {
            let c = -1.6 + i as f64 * 0.45;
            BoundingBox::new(Point3::new(c, -0.2, -0.2), Point3::new(c + 0.3, 0.2, 0.2))
        })
        .collect()
}

fn assert_same_answers(a: (&Mesh, &MeshBvh), b: (&Mesh, &MeshBvh)) {
    for ray in ray_battery() {
        let ha = a.1.raycast_first(a.0, &ray, Side::Double, 0.0, f64::INFINITY);
        let hb = b.1.raycast_first(b.0, &ray, Side::Double, 0.0, f64::INFINITY);
        assert_eq!(ha, hb);
    }
    for bbox in box_battery() {
        let identity = Matrix4::identity();
        assert_eq!(
            a.1.intersects_box(a.0, &bbox, &identity),
            b.1.intersects_box(b.0, &bbox, &identity)
        );
    }
}

#[test]
fn test_serialized_tree_answers_like_the_original() {
    for indirect in [false, true] {
        let mut mesh = Primitive::sphere(1.5, 18).to_mesh();
        let options = BuildOptions {
            indirect,
            shared_buffers: true,
            ..BuildOptions::default()
        };
        let bvh = MeshBvh::build(&mut mesh, &options).unwrap();

        for clone_buffers in [true, false] {
            let data = bvh.serialize(&mesh, &SerializeOptions { clone_buffers });
            let mut fresh = Primitive::sphere(1.5, 18).to_mesh();
            let restored =
                MeshBvh::deserialize(data, &mut fresh, &DeserializeOptions::default()).unwrap();
            assert_same_answers((&mesh, &bvh), (&fresh, &restored));
        }

        let bytes = bvh.serialize(&mesh, &SerializeOptions::default()).to_bytes();
        let data = SerializedBvh::from_bytes(&bytes).unwrap();
        let mut fresh = Primitive::sphere(1.5, 18).to_mesh();
        let restored = MeshBvh::deserialize(data, &mut fresh, &DeserializeOptions::default()).unwrap();
        assert_same_answers((&mesh, &bvh), (&fresh, &restored));
    }
}

#[test]
fn test_grouped_mesh_queries_span_all_roots() {
    let mut mesh = Primitive::cube(Vector3::new(1.0, 1.0, 1.0), true)
        .to_mesh()
        .with_groups(vec![
            polyframe_bvh::geometry::Group::new(0, 18, 0),
            polyframe_bvh::geometry::Group::new(18, 18, 1),
        ]);
    let bvh = MeshBvh::build(&mut mesh, &BuildOptions::default()).unwrap();
    assert_eq!(bvh.roots().len(), 2);
    assert!(validate_bounds(&bvh, &mesh));

    // a ray through the cube crosses two faces, whichever root holds them
    for axis in [Vector3::x(), Vector3::y(), Vector3::z()] {
        let ray = Ray::new(Point3::from(axis * -3.0 + Vector3::new(0.11, 0.13, 0.17)), axis);
        let hits = bvh.raycast(&mesh, &ray, Side::Double, 0.0, f64::INFINITY);
        assert_eq!(hits.len(), 2);
    }
}
