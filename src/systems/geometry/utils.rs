// UTILS

use bevy::math::DVec2;
use geo::{Area, BooleanOps, Buffer};

use super::{Envelope, Polygon, intersect_segments};

/// Computes the signed area of a polygon, positive for counter-clockwise rings
/// # Returns the polygon's area. Returns 0.0 for polygons with fewer than 3 vertices.
pub fn polygon_area(polygon: &[DVec2]) -> f64 {
    if polygon.len() < 3 {
        return 0.0;
    }

    // relative to the first vertex, raw lon/lat products lose the low digits
    let origin = polygon[0];
    let n = polygon.len();
    let mut area = 0.0;

    for i in 0..n {
        let j = (i + 1) % n;
        area += (polygon[i] - origin).perp_dot(polygon[j] - origin);
    }

    area / 2.0
}

/// Calculates the centroid of a polygon
/// Returns the area-weighted centroid, or the vertex average for degenerate (zero-area) polygons.
pub fn polygon_centroid(polygon: &[DVec2]) -> DVec2 {
    if polygon.is_empty() {
        return DVec2::ZERO;
    }

    let area = polygon_area(polygon);
    if polygon.len() < 3 || area == 0.0 {
        return polygon.iter().copied().sum::<DVec2>() / polygon.len() as f64;
    }

    // shift towards the first vertex so large geographic offsets do not eat precision
    let origin = polygon[0];
    let n = polygon.len();
    let mut centroid = DVec2::ZERO;

    for i in 0..n {
        let a = polygon[i] - origin;
        let b = polygon[(i + 1) % n] - origin;
        let p = a.perp_dot(b);
        centroid += (a + b) * p;
    }

    origin + centroid / (6.0 * area)
}

/// Determines whether a point is inside a polygon using the ray-casting algorithm.
/// # Returns `true` if the point is inside the polygon, otherwise `false`.
pub fn point_in_polygon(point: DVec2, polygon: &[DVec2]) -> bool {
    if polygon.len() < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = polygon.len() - 1;

    for i in 0..polygon.len() {
        let (pi, pj) = (polygon[i], polygon[j]);

        if ((pi.y > point.y) != (pj.y > point.y))
            && (point.x < (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x)
        {
            inside = !inside;
        }
        j = i;
    }

    inside
}

/// Calculates shortest distance from a point to a line segment 2D
pub fn point_to_segment_distance(point: DVec2, start: DVec2, end: DVec2) -> f64 {
    let line_vec = end - start;
    let len_sq = line_vec.length_squared();

    if len_sq == 0.0 {
        return point.distance(start);
    }

    let t = ((point - start).dot(line_vec) / len_sq).clamp(0.0, 1.0);
    point.distance(start + line_vec * t)
}

/// Distance between a polygon (as an area) and a segment.
/// # Returns 0.0 when the segment crosses the boundary or lies inside the polygon.
pub fn polygon_to_segment_distance(polygon: &[DVec2], start: DVec2, end: DVec2) -> f64 {
    if polygon.is_empty() {
        return f64::INFINITY;
    }
    if point_in_polygon(start, polygon) || point_in_polygon(end, polygon) {
        return 0.0;
    }

    let n = polygon.len();
    let mut best = f64::INFINITY;

    for i in 0..n {
        let a = polygon[i];
        let b = polygon[(i + 1) % n];

        if intersect_segments(a, b, start, end).is_some() {
            return 0.0;
        }

        best = best
            .min(point_to_segment_distance(start, a, b))
            .min(point_to_segment_distance(end, a, b))
            .min(point_to_segment_distance(a, start, end));
    }

    best
}

pub fn envelope(polygon: &[DVec2]) -> Option<Envelope> {
    Envelope::from_points(polygon)
}

/// Folds holes into their shell as one ring: each hole is entered and left through a
/// zero-width slit from the nearest shell vertex that can see it.
///
/// # Returns
/// A counter-clockwise ring whose signed area is the shell's minus the holes'. `to_geo`
/// splits it back into a shell with interiors.
pub fn bridge_holes(shell: &[DVec2], holes: &[Polygon]) -> Polygon {
    let mut ring = shell.to_vec();
    if ring.len() < 3 {
        return ring;
    }
    if polygon_area(&ring) < 0.0 {
        ring.reverse();
    }

    for hole in holes.iter().filter(|h| h.len() >= 3) {
        let mut hole = hole.clone();
        if polygon_area(&hole) > 0.0 {
            hole.reverse();
        }

        let (i, j) = bridge_between(&ring, &hole);
        let mut merged = Vec::with_capacity(ring.len() + hole.len() + 2);
        merged.extend_from_slice(&ring[..=i]);
        merged.extend(hole[j..].iter().chain(&hole[..=j]).copied());
        merged.extend_from_slice(&ring[i..]);
        ring = merged;
    }
    ring
}

// closest ring/hole vertex pair whose slit crosses neither ring
fn bridge_between(ring: &[DVec2], hole: &[DVec2]) -> (usize, usize) {
    let mut pairs: Vec<(f64, usize, usize)> = ring
        .iter()
        .enumerate()
        .flat_map(|(i, a)| hole.iter().enumerate().map(move |(j, b)| (a.distance_squared(*b), i, j)))
        .collect();
    pairs.sort_by(|p, q| p.0.total_cmp(&q.0));

    pairs
        .iter()
        .find(|&&(_, i, j)| !slit_crosses(ring[i], hole[j], ring) && !slit_crosses(ring[i], hole[j], hole))
        .or(pairs.first())
        .map_or((0, 0), |&(_, i, j)| (i, j))
}

fn slit_crosses(a: DVec2, b: DVec2, ring: &[DVec2]) -> bool {
    (0..ring.len()).any(|k| {
        let p = ring[k];
        let q = ring[(k + 1) % ring.len()];
        let touches = [p, q].iter().any(|v| *v == a || *v == b);
        !touches && intersect_segments(a, b, p, q).is_some()
    })
}

// undo bridge_holes: split a ring into simple loops wherever a vertex repeats
fn split_at_repeats(ring: &[DVec2]) -> Vec<Polygon> {
    let mut loops = Vec::new();
    let mut stack: Vec<DVec2> = Vec::with_capacity(ring.len());

    for &p in ring {
        match stack.iter().rposition(|&q| q == p) {
            Some(pos) => {
                let closed: Polygon = stack.drain(pos..).collect();
                if closed.len() >= 3 {
                    loops.push(closed);
                }
                stack.push(p);
            }
            None => stack.push(p),
        }
    }
    if stack.len() >= 3 {
        loops.push(stack);
    }
    loops
}

fn line_string(ring: &[DVec2]) -> geo::LineString<f64> {
    ring.iter().map(|v| geo::Coord { x: v.x, y: v.y }).collect::<Vec<_>>().into()
}

// conversions to the geo crate, used for the boolean and buffer operations
pub fn to_geo(polygon: &[DVec2]) -> geo::Polygon<f64> {
    let mut loops = split_at_repeats(polygon);
    if loops.len() <= 1 {
        return geo::Polygon::new(line_string(polygon), vec![]);
    }

    // largest loop is the shell, loops wound against it are its holes
    loops.sort_by(|a, b| polygon_area(b).abs().total_cmp(&polygon_area(a).abs()));
    let shell = loops.remove(0);
    let shell_sign = polygon_area(&shell).signum();
    let holes = loops
        .iter()
        .filter(|l| polygon_area(l).signum() != shell_sign)
        .map(|l| line_string(l))
        .collect();
    geo::Polygon::new(line_string(&shell), holes)
}

fn open_ring(line: &geo::LineString<f64>) -> Polygon {
    let mut ring: Polygon = line.coords().map(|c| DVec2::new(c.x, c.y)).collect();
    if ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    ring
}

pub fn from_geo(polygon: &geo::Polygon<f64>) -> Polygon {
    let shell = open_ring(polygon.exterior());
    let holes: Vec<Polygon> = polygon.interiors().iter().map(open_ring).collect();
    if holes.is_empty() { shell } else { bridge_holes(&shell, &holes) }
}

// keep only parts that still cover some area
fn non_empty_parts(parts: geo::MultiPolygon<f64>) -> Vec<Polygon> {
    parts
        .0
        .iter()
        .filter(|p| p.unsigned_area() > 0.0)
        .map(from_geo)
        .filter(|ring| ring.len() >= 3)
        .collect()
}

/// Intersects two simple polygons.
/// # Returns
/// Every non-empty part of the intersection; empty when they do not overlap.
pub fn intersect_polygons(subject: &[DVec2], clip: &[DVec2]) -> Vec<Polygon> {
    if subject.len() < 3 || clip.len() < 3 {
        return Vec::new();
    }
    non_empty_parts(to_geo(subject).intersection(&to_geo(clip)))
}

/// Buffers a polygon inwards (negative buffer) by `distance`.
/// # Returns
/// Every non-empty part left after the inset; empty when the inset swallows the polygon.
pub fn inset_polygon(polygon: &[DVec2], distance: f64) -> Vec<Polygon> {
    if polygon.len() < 3 {
        return Vec::new();
    }
    if distance <= 0.0 {
        return vec![polygon.to_vec()];
    }
    non_empty_parts(to_geo(polygon).buffer(-distance))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: f64) -> Polygon {
        vec![
            DVec2::new(0.0, 0.0),
            DVec2::new(size, 0.0),
            DVec2::new(size, size),
            DVec2::new(0.0, size),
        ]
    }

    #[test]
    fn signed_area_follows_winding() {
        let ccw = square(2.0);
        let mut cw = ccw.clone();
        cw.reverse();
        assert_eq!(polygon_area(&ccw), 4.0);
        assert_eq!(polygon_area(&cw), -4.0);
        assert_eq!(polygon_area(&ccw[..2]), 0.0);
    }

    #[test]
    fn centroid_of_offset_square() {
        let poly: Polygon = square(2.0).into_iter().map(|v| v + DVec2::new(100.0, 40.0)).collect();
        assert!(polygon_centroid(&poly).distance(DVec2::new(101.0, 41.0)) < 1e-9);
    }

    #[test]
    fn centroid_of_degenerate_polygon_is_vertex_average() {
        let line = vec![DVec2::new(0.0, 0.0), DVec2::new(2.0, 0.0), DVec2::new(4.0, 0.0)];
        assert_eq!(polygon_centroid(&line), DVec2::new(2.0, 0.0));
    }

    #[test]
    fn segment_distance_to_polygon() {
        let poly = square(1.0);
        assert_eq!(polygon_to_segment_distance(&poly, DVec2::new(0.5, -1.0), DVec2::new(0.5, 2.0)), 0.0);
        assert_eq!(polygon_to_segment_distance(&poly, DVec2::new(0.2, 0.2), DVec2::new(0.4, 0.4)), 0.0);
        let d = polygon_to_segment_distance(&poly, DVec2::new(3.0, 0.0), DVec2::new(3.0, 1.0));
        assert!((d - 2.0).abs() < 1e-12);
    }

    #[test]
    fn intersection_with_half_rectangle() {
        let poly = square(2.0);
        let half = vec![
            DVec2::new(0.0, 0.0),
            DVec2::new(1.0, 0.0),
            DVec2::new(1.0, 2.0),
            DVec2::new(0.0, 2.0),
        ];
        let parts = intersect_polygons(&poly, &half);
        assert_eq!(parts.len(), 1);
        assert!((polygon_area(&parts[0]).abs() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn disjoint_intersection_is_empty() {
        let far: Polygon = square(1.0).into_iter().map(|v| v + DVec2::new(5.0, 5.0)).collect();
        assert!(intersect_polygons(&square(1.0), &far).is_empty());
    }

    #[test]
    fn inset_shrinks_and_can_vanish() {
        let parts = inset_polygon(&square(10.0), 1.0);
        assert_eq!(parts.len(), 1);
        assert!((polygon_area(&parts[0]).abs() - 64.0).abs() < 1e-3);
        assert!(inset_polygon(&square(1.0), 0.6).is_empty());
    }

    #[test]
    fn bridged_hole_keeps_its_area() {
        let hole: Polygon = square(2.0).into_iter().map(|v| v + DVec2::new(4.0, 4.0)).collect();
        let ring = bridge_holes(&square(10.0), &[hole]);
        assert_eq!(ring.len(), 4 + 4 + 2);
        assert!((polygon_area(&ring) - 96.0).abs() < 1e-9);
        assert!(!point_in_polygon(DVec2::new(5.0, 5.0), &ring));
        assert!(point_in_polygon(DVec2::new(8.0, 1.0), &ring));

        let shape = to_geo(&ring);
        assert_eq!(shape.interiors().len(), 1);
        assert!((shape.unsigned_area() - 96.0).abs() < 1e-9);
        assert!((polygon_area(&from_geo(&shape)) - 96.0).abs() < 1e-9);
    }

    #[test]
    fn holes_survive_boolean_ops() {
        let hole: Polygon = square(2.0).into_iter().map(|v| v + DVec2::new(1.0, 4.0)).collect();
        let ring = bridge_holes(&square(10.0), &[hole]);
        let left = vec![DVec2::new(0.0, 0.0), DVec2::new(5.0, 0.0), DVec2::new(5.0, 10.0), DVec2::new(0.0, 10.0)];

        let parts = intersect_polygons(&ring, &left);
        assert_eq!(parts.len(), 1);
        assert!((polygon_area(&parts[0]) - 46.0).abs() < 1e-6);

        let inset = inset_polygon(&ring, 0.5);
        let area: f64 = inset.iter().map(|p| polygon_area(p)).sum();
        // shell shrinks to 9 x 9, the hole grows to 3 x 3
        assert!(area > 60.0 && area < 81.0 - 4.0);
    }
}
