// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Triangles and the cached separating-axis data used by intersection tests

use nalgebra::{Matrix4, Point3, Vector3};

use super::plane::Plane;
use super::segment::{closest_points_segment_to_segment, Segment};

/// Threshold under which plane distances and dot products count as zero
const NEAR_ZERO: f64 = 1e-10;

fn is_near_zero(value: f64) -> bool {
    value.abs() < NEAR_ZERO
}

/// Angle between two vectors, `PI / 2` when either is zero
pub fn angle_between(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    let denominator = (a.norm_squared() * b.norm_squared()).sqrt();
    if denominator == 0.0 {
        return std::f64::consts::FRAC_PI_2;
    }
    (a.dot(b) / denominator).clamp(-1.0, 1.0).acos()
}

/// Plain triangle defined by its three corners
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub a: Point3<f64>,
    pub b: Point3<f64>,
    pub c: Point3<f64>,
}

impl Triangle {
    pub fn new(a: Point3<f64>, b: Point3<f64>, c: Point3<f64>) -> Self {
        Self { a, b, c }
    }

    pub fn points(&self) -> [Point3<f64>; 3] {
        [self.a, self.b, self.c]
    }

    pub fn edges(&self) -> [Segment; 3] {
        [
            Segment::new(self.a, self.b),
            Segment::new(self.b, self.c),
            Segment::new(self.c, self.a),
        ]
    }

    /// Unnormalized normal, its length is twice the area
    pub fn scaled_normal(&self) -> Vector3<f64> {
        (self.b - self.a).cross(&(self.c - self.a))
    }

    /// Unit normal following counter-clockwise winding, zero for degenerate triangles
    pub fn normal(&self) -> Vector3<f64> {
        self.scaled_normal()
            .try_normalize(0.0)
            .unwrap_or_else(Vector3::zeros)
    }

    pub fn area(&self) -> f64 {
        self.scaled_normal().norm() * 0.5
    }

    pub fn midpoint(&self) -> Point3<f64> {
        Point3::from((self.a.coords + self.b.coords + self.c.coords) / 3.0)
    }

    pub fn plane(&self) -> Plane {
        Plane::from_points(&self.a, &self.b, &self.c)
    }

    pub fn transform(&self, matrix: &Matrix4<f64>) -> Triangle {
        Triangle::new(
            matrix.transform_point(&self.a),
            matrix.transform_point(&self.b),
            matrix.transform_point(&self.c),
        )
    }

    /// Barycentric weights of `point` projected onto the triangle plane
    pub fn barycoord(&self, point: &Point3<f64>) -> Option<Vector3<f64>> {
        let v0 = self.c - self.a;
        let v1 = self.b - self.a;
        let v2 = point - self.a;

        let dot00 = v0.dot(&v0);
        let dot01 = v0.dot(&v1);
        let dot02 = v0.dot(&v2);
        let dot11 = v1.dot(&v1);
        let dot12 = v1.dot(&v2);

        let denom = dot00 * dot11 - dot01 * dot01;
        if denom == 0.0 {
            return None;
        }

        let inv_denom = 1.0 / denom;
        let u = (dot11 * dot02 - dot01 * dot12) * inv_denom;
        let v = (dot00 * dot12 - dot01 * dot02) * inv_denom;
        Some(Vector3::new(1.0 - u - v, v, u))
    }

    pub fn contains_point(&self, point: &Point3<f64>) -> bool {
        match self.barycoord(point) {
            Some(w) => w.x >= 0.0 && w.y >= 0.0 && (w.x + w.y) <= 1.0,
            None => false,
        }
    }

    /// Closest point on the triangle (interior or boundary) to `point`
    pub fn closest_point_to_point(&self, point: &Point3<f64>) -> Point3<f64> {
        let (a, b, c) = (self.a, self.b, self.c);
        let ab = b - a;
        let ac = c - a;
        let ap = point - a;

        let d1 = ab.dot(&ap);
        let d2 = ac.dot(&ap);
        if d1 <= 0.0 && d2 <= 0.0 {
            return a;
        }

        let bp = point - b;
        let d3 = ab.dot(&bp);
        let d4 = ac.dot(&bp);
        if d3 >= 0.0 && d4 <= d3 {
            return b;
        }

        let vc = d1 * d4 - d3 * d2;
        if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
            let v = d1 / (d1 - d3);
            return a + ab * v;
        }

        let cp = point - c;
        let d5 = ab.dot(&cp);
        let d6 = ac.dot(&cp);
        if d6 >= 0.0 && d5 <= d6 {
            return c;
        }

        let vb = d5 * d2 - d1 * d6;
        if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
            let w = d2 / (d2 - d6);
            return a + ac * w;
        }

        let va = d3 * d6 - d5 * d4;
        if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
            let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
            return b + (c - b) * w;
        }

        let sum = va + vb + vc;
        if sum == 0.0 {
            return a;
        }
        let denom = 1.0 / sum;
        let v = vb * denom;
        let w = vc * denom;
        a + ab * v + ac * w
    }

    /// True when an interior angle or a squared edge length falls below `eps`
    pub fn is_degenerate(&self, eps: f64) -> bool {
        let ab = self.b - self.a;
        let ac = self.c - self.a;
        let cb = self.b - self.c;

        let angle1 = angle_between(&ab, &ac);
        let angle2 = angle_between(&ab, &cb);
        let angle3 = std::f64::consts::PI - angle1 - angle2;

        angle1.abs() < eps
            || angle2.abs() < eps
            || angle3.abs() < eps
            || (self.a - self.b).norm_squared() < eps
            || (self.a - self.c).norm_squared() < eps
            || (self.b - self.c).norm_squared() < eps
    }
}

/// Interval of points projected onto a separating axis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeparatingAxisBounds {
    pub min: f64,
    pub max: f64,
}

impl SeparatingAxisBounds {
    pub fn from_points(axis: &Vector3<f64>, points: &[Point3<f64>]) -> Self {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for p in points {
            let v = axis.dot(&p.coords);
            min = min.min(v);
            max = max.max(v);
        }
        Self { min, max }
    }

    pub fn is_separated(&self, other: &SeparatingAxisBounds) -> bool {
        self.min > other.max || other.min > self.max
    }
}

/// Triangle with its plane and separating axes precomputed
#[derive(Debug, Clone, Copy)]
pub struct ExtendedTriangle {
    pub triangle: Triangle,
    pub plane: Plane,
    pub is_degenerate: bool,
    pub sat_axes: [Vector3<f64>; 4],
    pub sat_bounds: [SeparatingAxisBounds; 4],
    degenerate_segment: Segment,
}

impl ExtendedTriangle {
    pub fn new(triangle: Triangle) -> Self {
        let points = triangle.points();
        let scaled = triangle.scaled_normal();
        let longest_sq = triangle
            .edges()
            .iter()
            .map(|e| e.delta().norm_squared())
            .fold(0.0, f64::max);
        let is_degenerate = scaled.norm() <= 1e-12 * longest_sq || longest_sq == 0.0;

        let normal = scaled.try_normalize(0.0).unwrap_or_else(Vector3::zeros);
        let plane = Plane::from_normal_and_point(normal, &triangle.a);

        let mut sat_axes = [normal; 4];
        for (i, edge) in triangle.edges().iter().enumerate() {
            sat_axes[i + 1] = normal.cross(&edge.delta()).try_normalize(0.0).unwrap_or_else(Vector3::zeros);
        }
        let sat_bounds = sat_axes.map(|axis| SeparatingAxisBounds::from_points(&axis, &points));

        let degenerate_segment = triangle
            .edges()
            .into_iter()
            .fold(Segment::new(triangle.a, triangle.a), |best, edge| {
                if edge.delta().norm_squared() > best.delta().norm_squared() {
                    edge
                } else {
                    best
                }
            });

        Self {
            triangle,
            plane,
            is_degenerate,
            sat_axes,
            sat_bounds,
            degenerate_segment,
        }
    }

    pub fn from_points(a: Point3<f64>, b: Point3<f64>, c: Point3<f64>) -> Self {
        Self::new(Triangle::new(a, b, c))
    }

    pub fn points(&self) -> [Point3<f64>; 3] {
        self.triangle.points()
    }

    pub fn closest_point_to_point(&self, point: &Point3<f64>) -> Point3<f64> {
        self.triangle.closest_point_to_point(point)
    }

    pub fn distance_to_point(&self, point: &Point3<f64>) -> f64 {
        (self.closest_point_to_point(point) - point).norm()
    }

    pub fn intersects_sphere(&self, center: &Point3<f64>, radius: f64) -> bool {
        (self.closest_point_to_point(center) - center).norm_squared() <= radius * radius
    }

    pub fn intersects_triangle(&self, other: &ExtendedTriangle) -> bool {
        self.intersect_triangle(other).is_some()
    }

    /// Intersection with another triangle. The returned segment is the shared
    /// span of both triangles on the intersection line; for overlapping
    /// coplanar triangles it collapses to a single contact point.
    pub fn intersect_triangle(&self, other: &ExtendedTriangle) -> Option<Segment> {
        if self.is_degenerate || other.is_degenerate {
            return self.intersect_degenerate(other);
        }

        let plane1 = &self.plane;
        let plane2 = &other.plane;

        if plane1.normal.dot(&plane2.normal).abs() > 1.0 - NEAR_ZERO {
            if !is_near_zero(plane1.distance_to_point(&other.triangle.a)) {
                return None;
            }
            return self.intersect_coplanar(other);
        }

        let edge1 = match Self::plane_crossing(self, other)? {
            Crossing::Point(p) => return Some(Segment::new(p, p)),
            Crossing::Edge(segment) => segment,
        };
        let mut edge2 = match Self::plane_crossing(other, self)? {
            Crossing::Point(p) => return Some(Segment::new(p, p)),
            Crossing::Edge(segment) => segment,
        };

        // run both spans in the same direction before comparing them
        let dir1 = edge1.delta();
        if dir1.dot(&edge2.delta()) < 0.0 {
            edge2 = edge2.reversed();
        }

        let s1 = edge1.start.coords.dot(&dir1);
        let e1 = edge1.end.coords.dot(&dir1);
        let s2 = edge2.start.coords.dot(&dir1);
        let e2 = edge2.end.coords.dot(&dir1);
        let separated1 = e1 < s2;
        let separated2 = s1 < e2;

        if s1 != e2 && s2 != e1 && separated1 == separated2 {
            return None;
        }

        let start = if (edge1.start - edge2.start).dot(&dir1) > 0.0 {
            edge1.start
        } else {
            edge2.start
        };
        let end = if (edge1.end - edge2.end).dot(&dir1) < 0.0 {
            edge1.end
        } else {
            edge2.end
        };
        Some(Segment::new(start, end))
    }

    /// Where the edges of `tri` cross the plane of `other`
    fn plane_crossing(tri: &ExtendedTriangle, other: &ExtendedTriangle) -> Option<Crossing> {
        let plane = &other.plane;
        let points = tri.points();
        let mut found: [Option<Point3<f64>>; 2] = [None, None];
        let mut count = 0;

        for i in 0..3 {
            let p = points[i];
            let p_next = points[(i + 1) % 3];
            let edge = Segment::new(p, p_next);
            let start_on_plane = is_near_zero(plane.distance_to_point(&p));

            if is_near_zero(plane.normal.dot(&edge.delta())) && start_on_plane {
                return Some(Crossing::Edge(edge));
            }

            let hit = plane
                .intersect_segment(&edge)
                .or(if start_on_plane { Some(p) } else { None });
            if let Some(point) = hit {
                if !is_near_zero((point - p_next).norm()) {
                    found[count] = Some(point);
                    count += 1;
                    if count == 2 {
                        break;
                    }
                }
            }
        }

        match (count, found) {
            (1, [Some(p), _]) => {
                if other.triangle.contains_point(&p) {
                    Some(Crossing::Point(p))
                } else {
                    None
                }
            }
            (2, [Some(end), Some(start)]) => Some(Crossing::Edge(Segment::new(start, end))),
            _ => None,
        }
    }

    fn intersect_coplanar(&self, other: &ExtendedTriangle) -> Option<Segment> {
        let other_points = other.points();
        for i in 0..4 {
            let projected = SeparatingAxisBounds::from_points(&self.sat_axes[i], &other_points);
            if self.sat_bounds[i].is_separated(&projected) {
                return None;
            }
        }

        let self_points = self.points();
        for i in 0..4 {
            let projected = SeparatingAxisBounds::from_points(&other.sat_axes[i], &self_points);
            if other.sat_bounds[i].is_separated(&projected) {
                return None;
            }
        }

        let contact = coplanar_contact_point(&self.triangle, &other.triangle);
        Some(Segment::new(contact, contact))
    }

    fn intersect_degenerate(&self, other: &ExtendedTriangle) -> Option<Segment> {
        match (self.is_degenerate, other.is_degenerate) {
            (true, true) => {
                let (p1, p2) = closest_points_segment_to_segment(
                    &self.degenerate_segment,
                    &other.degenerate_segment,
                );
                if is_near_zero((p1 - p2).norm()) {
                    Some(Segment::new(p1, p1))
                } else {
                    None
                }
            }
            (true, false) => segment_triangle_contact(&self.degenerate_segment, other),
            (false, true) => segment_triangle_contact(&other.degenerate_segment, self),
            (false, false) => None,
        }
    }

    /// Minimum distance to another triangle, with the closest point on each
    pub fn distance_to_triangle(&self, other: &ExtendedTriangle) -> (f64, Point3<f64>, Point3<f64>) {
        if let Some(segment) = self.intersect_triangle(other) {
            let center = segment.center();
            return (0.0, center, center);
        }

        let mut closest_sq = f64::INFINITY;
        let mut target1 = self.triangle.a;
        let mut target2 = other.triangle.a;

        let self_points = self.points();
        let other_points = other.points();
        for i in 0..3 {
            let other_vertex = other_points[i];
            let closest = self.closest_point_to_point(&other_vertex);
            let dist = (other_vertex - closest).norm_squared();
            if dist < closest_sq {
                closest_sq = dist;
                target1 = closest;
                target2 = other_vertex;
            }

            let self_vertex = self_points[i];
            let closest = other.closest_point_to_point(&self_vertex);
            let dist = (self_vertex - closest).norm_squared();
            if dist < closest_sq {
                closest_sq = dist;
                target1 = self_vertex;
                target2 = closest;
            }
        }

        for line1 in self.triangle.edges() {
            for line2 in other.triangle.edges() {
                let (p1, p2) = closest_points_segment_to_segment(&line1, &line2);
                let dist = (p1 - p2).norm_squared();
                if dist < closest_sq {
                    closest_sq = dist;
                    target1 = p1;
                    target2 = p2;
                }
            }
        }

        (closest_sq.sqrt(), target1, target2)
    }
}

enum Crossing {
    /// A single crossing point already known to lie inside the other triangle
    Point(Point3<f64>),
    Edge(Segment),
}

/// Contact between a segment and a non-degenerate triangle
fn segment_triangle_contact(segment: &Segment, tri: &ExtendedTriangle) -> Option<Segment> {
    let plane = &tri.plane;
    let start_dist = plane.distance_to_point(&segment.start);
    let end_dist = plane.distance_to_point(&segment.end);

    if is_near_zero(start_dist) && is_near_zero(end_dist) {
        for p in [segment.start, segment.end] {
            if tri.triangle.contains_point(&p) {
                return Some(Segment::new(p, p));
            }
        }
        for edge in tri.triangle.edges() {
            let (p1, p2) = closest_points_segment_to_segment(segment, &edge);
            if is_near_zero((p1 - p2).norm()) {
                return Some(Segment::new(p1, p1));
            }
        }
        return None;
    }

    let point = plane.intersect_segment(segment)?;
    if tri.triangle.contains_point(&point) {
        Some(Segment::new(point, point))
    } else {
        None
    }
}

/// A point shared by two overlapping coplanar triangles
fn coplanar_contact_point(t1: &Triangle, t2: &Triangle) -> Point3<f64> {
    for p in t2.points() {
        if t1.contains_point(&p) {
            return p;
        }
    }
    for p in t1.points() {
        if t2.contains_point(&p) {
            return p;
        }
    }

    let mut best = (f64::INFINITY, t1.a);
    for e1 in t1.edges() {
        for e2 in t2.edges() {
            let (p1, p2) = closest_points_segment_to_segment(&e1, &e2);
            let dist = (p1 - p2).norm_squared();
            if dist < best.0 {
                best = (dist, nalgebra::center(&p1, &p2));
            }
        }
    }
    best.1
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tri(a: [f64; 3], b: [f64; 3], c: [f64; 3]) -> ExtendedTriangle {
        ExtendedTriangle::from_points(
            Point3::from(a),
            Point3::from(b),
            Point3::from(c),
        )
    }

    #[test]
    fn test_normal_and_area() {
        let t = Triangle::new(Point3::origin(), Point3::new(2.0, 0.0, 0.0), Point3::new(0.0, 2.0, 0.0));
        assert_relative_eq!(t.normal(), Vector3::z());
        assert_relative_eq!(t.area(), 2.0);
        assert_relative_eq!(t.midpoint(), Point3::new(2.0 / 3.0, 2.0 / 3.0, 0.0));
    }

    #[test]
    fn test_barycoord_round_trip() {
        let t = Triangle::new(Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0));
        let w = t.barycoord(&Point3::new(0.25, 0.5, 0.0)).unwrap();
        let rebuilt = t.a.coords * w.x + t.b.coords * w.y + t.c.coords * w.z;
        assert_relative_eq!(rebuilt, Vector3::new(0.25, 0.5, 0.0), epsilon = 1e-12);
        assert!(t.contains_point(&Point3::new(0.25, 0.5, 0.0)));
        assert!(!t.contains_point(&Point3::new(0.75, 0.5, 0.0)));
    }

    #[test]
    fn test_closest_point_regions() {
        let t = Triangle::new(Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0));
        assert_relative_eq!(t.closest_point_to_point(&Point3::new(-1.0, -1.0, 0.0)), t.a);
        assert_relative_eq!(
            t.closest_point_to_point(&Point3::new(0.5, -1.0, 0.0)),
            Point3::new(0.5, 0.0, 0.0)
        );
        assert_relative_eq!(
            t.closest_point_to_point(&Point3::new(0.2, 0.2, 3.0)),
            Point3::new(0.2, 0.2, 0.0)
        );
        assert_relative_eq!(
            t.closest_point_to_point(&Point3::new(1.0, 1.0, 0.0)),
            Point3::new(0.5, 0.5, 0.0)
        );
    }

    #[test]
    fn test_crossing_triangles_intersect() {
        let flat = tri([-1.0, -1.0, 0.0], [1.0, -1.0, 0.0], [0.0, 1.0, 0.0]);
        let upright = tri([0.0, 0.0, -1.0], [0.0, 0.0, 1.0], [0.0, 0.5, 0.0]);
        let segment = flat.intersect_triangle(&upright).expect("triangles cross");
        assert!(segment.start.z.abs() < 1e-9 && segment.end.z.abs() < 1e-9);
        assert!(upright.intersects_triangle(&flat));
    }

    #[test]
    fn test_separated_triangles() {
        let a = tri([0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]);
        let b = tri([0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [0.0, 1.0, 1.0]);
        assert!(!a.intersects_triangle(&b));

        let (dist, p1, p2) = a.distance_to_triangle(&b);
        assert_relative_eq!(dist, 1.0, epsilon = 1e-12);
        assert_relative_eq!((p2 - p1).norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_coplanar_overlap() {
        let a = tri([0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]);
        let b = tri([0.2, 0.2, 0.0], [1.2, 0.2, 0.0], [0.2, 1.2, 0.0]);
        let far = tri([5.0, 5.0, 0.0], [6.0, 5.0, 0.0], [5.0, 6.0, 0.0]);
        assert!(a.intersects_triangle(&b));
        assert!(!a.intersects_triangle(&far));
    }

    #[test]
    fn test_degenerate_detection() {
        let sliver = Triangle::new(Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(2.0, 0.0, 0.0));
        assert!(sliver.is_degenerate(1e-10));
        assert!(ExtendedTriangle::new(sliver).is_degenerate);

        let good = Triangle::new(Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0));
        assert!(!good.is_degenerate(1e-10));
    }
}
