use bevy::math::DVec2;

use super::GeoBounds;
use super::utils::point_to_segment_distance;

// relative tolerance for treating two directions as parallel
const PARALLEL_EPSILON: f64 = 1e-12;

/// Liang-Barsky parametric clipping of the segment `p1 -> p2` against `bounds`.
///
/// Each bound plane narrows the valid parameter interval `[t0, t1]`; the segment is rejected
/// as soon as that interval becomes empty. Planes the segment runs parallel to (`p == 0`)
/// only reject when the segment lies on their outside.
///
/// # Returns
/// `Some((clipped_p1, clipped_p2))` in the original direction, `None` if nothing is inside.
pub fn clip_segment(bounds: &GeoBounds, p1: DVec2, p2: DVec2) -> Option<(DVec2, DVec2)> {
    let d = p2 - p1;
    let mut t0 = 0.0_f64;
    let mut t1 = 1.0_f64;

    // (p, q) for the left, right, bottom and top planes
    let planes = [
        (-d.x, p1.x - bounds.min_lon),
        (d.x, bounds.max_lon - p1.x),
        (-d.y, p1.y - bounds.min_lat),
        (d.y, bounds.max_lat - p1.y),
    ];

    for (p, q) in planes {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }

        let r = q / p;
        if p < 0.0 {
            // entering
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            // leaving
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }

    Some((p1 + d * t0, p1 + d * t1))
}

/// find the intersection between segments `p1 -> p2` and `q1 -> q2`, lookup Cramer's rule
/// https://cp-algorithms.com/geometry/lines-intersection.html
///
/// Near-parallel pairs are detected with a tolerance relative to the segment lengths and
/// resolved as collinear overlaps instead of dividing by a vanishing determinant.
///
/// # Returns
/// The first point along `p1 -> p2` shared with the other segment, `None` if they are apart.
pub fn intersect_segments(p1: DVec2, p2: DVec2, q1: DVec2, q2: DVec2) -> Option<DVec2> {
    let r = p2 - p1;
    let s = q2 - q1;
    let qp = q1 - p1;

    let denom = r.perp_dot(s);
    let scale = r.length() * s.length();

    if denom.abs() <= PARALLEL_EPSILON * scale || scale == 0.0 {
        return collinear_overlap(p1, p2, q1, q2);
    }

    let t = qp.perp_dot(s) / denom;
    let u = qp.perp_dot(r) / denom;

    let tol = PARALLEL_EPSILON.sqrt();
    if t >= -tol && t <= 1.0 + tol && u >= -tol && u <= 1.0 + tol {
        Some(p1 + r * t.clamp(0.0, 1.0))
    } else {
        None
    }
}

// parallel or degenerate segments, only touching or overlapping collinear ones meet
fn collinear_overlap(p1: DVec2, p2: DVec2, q1: DVec2, q2: DVec2) -> Option<DVec2> {
    let r = p2 - p1;
    let len_sq = r.length_squared();
    let touch = PARALLEL_EPSILON.sqrt() * (1.0 + r.length().max((q2 - q1).length()));

    if len_sq == 0.0 {
        return (point_to_segment_distance(p1, q1, q2) <= touch).then_some(p1);
    }

    // off the supporting line
    if (q1 - p1).perp_dot(r).abs() / len_sq.sqrt() > touch || (q2 - p1).perp_dot(r).abs() / len_sq.sqrt() > touch {
        return None;
    }

    let t_a = (q1 - p1).dot(r) / len_sq;
    let t_b = (q2 - p1).dot(r) / len_sq;
    let lo = t_a.min(t_b).max(0.0);
    let hi = t_a.max(t_b).min(1.0);

    if lo <= hi + touch / len_sq.sqrt() {
        Some(p1 + r * lo.min(1.0))
    } else {
        None
    }
}
