// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Inside / outside classification of triangles against a brush surface

use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::Rng;

use super::operation::FragmentSide;
use crate::bvh::MeshBvh;
use crate::geometry::{Mesh, Ray, Side, Triangle};

const JITTER_EPSILON: f64 = 1e-8;
/// Hits closer than this put the triangle on the other surface
const OFFSET_EPSILON: f64 = 1e-15;
const VOTES: usize = 3;

/// Cast from the triangle midpoint along its normal; the triangle is inside
/// when the first surface hit faces away from the ray origin
pub(crate) fn hit_side(tri: &Triangle, bvh: &MeshBvh, mesh: &Mesh) -> FragmentSide {
    let ray = Ray::new(tri.midpoint(), tri.normal());
    match bvh.raycast_first(mesh, &ray, Side::Double, 0.0, f64::INFINITY) {
        Some(hit) if ray.direction.dot(&hit.face_normal) > 0.0 => FragmentSide::Back,
        _ => FragmentSide::Front,
    }
}

/// [`hit_side`] for fragments that may lie on the other surface. Up to three
/// jittered rays alternate direction; a hit at the origin decides the
/// coplanar orientation, otherwise the majority of back hits wins.
pub(crate) fn hit_side_with_coplanar_check(
    tri: &Triangle,
    bvh: &MeshBvh,
    mesh: &Mesh,
    rng: &mut StdRng,
) -> FragmentSide {
    let normal = tri.normal();
    let origin = tri.midpoint();
    let mut direction = normal;
    let mut back_hits = 0;

    for i in 0..VOTES {
        let jitter = Vector3::new(
            rng.gen::<f64>() - 0.5,
            rng.gen::<f64>() - 0.5,
            rng.gen::<f64>() - 0.5,
        );
        direction = -(direction + jitter * JITTER_EPSILON);

        let ray = Ray::new(origin, direction);
        let hit = bvh.raycast_first(mesh, &ray, Side::Double, 0.0, f64::INFINITY);
        if let Some(hit) = &hit {
            if hit.distance <= OFFSET_EPSILON {
                return if hit.face_normal.dot(&normal) > 0.0 {
                    FragmentSide::CoplanarAligned
                } else {
                    FragmentSide::CoplanarOpposite
                };
            }
            if ray.direction.dot(&hit.face_normal) > 0.0 {
                back_hits += 1;
            }
        }

        let front_hits = i + 1 - back_hits;
        if back_hits * 2 > VOTES || front_hits * 2 > VOTES {
            break;
        }
    }

    if back_hits * 2 > VOTES {
        FragmentSide::Back
    } else {
        FragmentSide::Front
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildOptions;
    use crate::geometry::Primitive;
    use nalgebra::Point3;
    use rand::SeedableRng;

    fn unit_cube() -> (Mesh, MeshBvh) {
        let mut mesh = Primitive::cube(Vector3::new(1.0, 1.0, 1.0), true).to_mesh();
        let bvh = MeshBvh::build(
            &mut mesh,
            &BuildOptions {
                indirect: true,
                max_leaf_triangles: 3,
                ..BuildOptions::default()
            },
        )
        .unwrap();
        (mesh, bvh)
    }

    fn facing(z: f64, up: bool) -> Triangle {
        let (a, b, c) = (
            Point3::new(-0.1, -0.2, z),
            Point3::new(0.3, -0.1, z),
            Point3::new(-0.1, 0.25, z),
        );
        if up {
            Triangle::new(a, b, c)
        } else {
            Triangle::new(a, c, b)
        }
    }

    #[test]
    fn test_inside_and_outside() {
        let (mesh, bvh) = unit_cube();
        assert_eq!(hit_side(&facing(0.0, true), &bvh, &mesh), FragmentSide::Back);
        assert_eq!(hit_side(&facing(0.0, false), &bvh, &mesh), FragmentSide::Back);
        assert_eq!(hit_side(&facing(2.0, true), &bvh, &mesh), FragmentSide::Front);
        // outside, looking at the cube
        assert_eq!(hit_side(&facing(2.0, false), &bvh, &mesh), FragmentSide::Front);
    }

    #[test]
    fn test_coplanar_orientation() {
        let (mesh, bvh) = unit_cube();
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(
            hit_side_with_coplanar_check(&facing(0.5, true), &bvh, &mesh, &mut rng),
            FragmentSide::CoplanarAligned
        );
        assert_eq!(
            hit_side_with_coplanar_check(&facing(0.5, false), &bvh, &mesh, &mut rng),
            FragmentSide::CoplanarOpposite
        );
    }

    #[test]
    fn test_vote_without_coplanar_contact() {
        let (mesh, bvh) = unit_cube();
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(
            hit_side_with_coplanar_check(&facing(0.1, true), &bvh, &mesh, &mut rng),
            FragmentSide::Back
        );
        assert_eq!(
            hit_side_with_coplanar_check(&facing(3.0, true), &bvh, &mesh, &mut rng),
            FragmentSide::Front
        );
    }
}
