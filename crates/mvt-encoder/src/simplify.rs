//! Douglas–Peucker line simplification.
//!
//! Applied in tile-local units before clipping, so the tolerance is
//! naturally scaled to the tile's pixel resolution. The recursion is
//! driven purely by input order and distances, so identical input
//! always produces identical output.

/// Simplify a polyline, keeping endpoints. `tolerance` is the maximum
/// allowed perpendicular deviation in the same units as the points.
pub fn simplify(points: &[(f64, f64)], tolerance: f64) -> Vec<(f64, f64)> {
    if points.len() <= 2 || tolerance <= 0.0 {
        return points.to_vec();
    }

    let mut keep = vec![false; points.len()];
    keep[0] = true;
    keep[points.len() - 1] = true;
    simplify_segment(points, 0, points.len() - 1, tolerance * tolerance, &mut keep);

    points
        .iter()
        .zip(keep.iter())
        .filter_map(|(p, &k)| if k { Some(*p) } else { None })
        .collect()
}

fn simplify_segment(
    points: &[(f64, f64)],
    first: usize,
    last: usize,
    tolerance_sq: f64,
    keep: &mut [bool],
) {
    if last <= first + 1 {
        return;
    }

    let mut max_dist_sq = 0.0;
    let mut max_index = first;

    for i in (first + 1)..last {
        let dist_sq = perpendicular_distance_sq(points[i], points[first], points[last]);
        if dist_sq > max_dist_sq {
            max_dist_sq = dist_sq;
            max_index = i;
        }
    }

    if max_dist_sq > tolerance_sq {
        keep[max_index] = true;
        simplify_segment(points, first, max_index, tolerance_sq, keep);
        simplify_segment(points, max_index, last, tolerance_sq, keep);
    }
}

fn perpendicular_distance_sq(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len_sq = dx * dx + dy * dy;

    if len_sq == 0.0 {
        let (ex, ey) = (p.0 - a.0, p.1 - a.1);
        return ex * ex + ey * ey;
    }

    // Distance from p to the infinite line through a and b
    let cross = dx * (a.1 - p.1) - dy * (a.0 - p.0);
    cross * cross / len_sq
}

/// Simplify a closed ring. The closing duplicate (if present) is
/// preserved by simplifying the open form and re-closing.
pub fn simplify_ring(ring: &[(f64, f64)], tolerance: f64) -> Vec<(f64, f64)> {
    if ring.len() <= 4 || tolerance <= 0.0 {
        return ring.to_vec();
    }
    simplify(ring, tolerance)
}
