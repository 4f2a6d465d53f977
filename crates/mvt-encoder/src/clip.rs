//! Clipping geometry to the tile plus its edge buffer.
//!
//! Rings are clipped with Sutherland–Hodgman so intersection points
//! are interpolated exactly where edges cross the clip bounds; lines
//! are clipped per-segment with Liang–Barsky and rejoined into chains.

/// Rectangular clip bounds in tile-local units.
#[derive(Debug, Clone, Copy)]
pub struct ClipRect {
    pub min: f64,
    pub max: f64,
}

impl ClipRect {
    /// Tile extent expanded by `buffer` units on every side.
    pub fn with_buffer(extent: f64, buffer: f64) -> Self {
        Self {
            min: -buffer,
            max: extent + buffer,
        }
    }

    pub fn contains(&self, p: (f64, f64)) -> bool {
        p.0 >= self.min && p.0 <= self.max && p.1 >= self.min && p.1 <= self.max
    }
}

/// Clip a polygon ring against the rect. Returns the clipped ring
/// without a closing duplicate; fewer than 3 vertices means the ring
/// degenerated to nothing inside the bounds.
pub fn clip_ring(ring: &[(f64, f64)], rect: ClipRect) -> Vec<(f64, f64)> {
    if ring.is_empty() {
        return Vec::new();
    }

    let mut output = ring.to_vec();

    // Left edge
    output = clip_against_edge(&output, |p| p.0 >= rect.min, |a, b| {
        let t = (rect.min - a.0) / (b.0 - a.0);
        (rect.min, a.1 + t * (b.1 - a.1))
    });
    // Right edge
    output = clip_against_edge(&output, |p| p.0 <= rect.max, |a, b| {
        let t = (rect.max - a.0) / (b.0 - a.0);
        (rect.max, a.1 + t * (b.1 - a.1))
    });
    // Top edge
    output = clip_against_edge(&output, |p| p.1 >= rect.min, |a, b| {
        let t = (rect.min - a.1) / (b.1 - a.1);
        (a.0 + t * (b.0 - a.0), rect.min)
    });
    // Bottom edge
    output = clip_against_edge(&output, |p| p.1 <= rect.max, |a, b| {
        let t = (rect.max - a.1) / (b.1 - a.1);
        (a.0 + t * (b.0 - a.0), rect.max)
    });

    output
}

fn clip_against_edge<F, I>(polygon: &[(f64, f64)], inside: F, intersect: I) -> Vec<(f64, f64)>
where
    F: Fn(&(f64, f64)) -> bool,
    I: Fn(&(f64, f64), &(f64, f64)) -> (f64, f64),
{
    if polygon.is_empty() {
        return Vec::new();
    }

    let mut output = Vec::new();
    let n = polygon.len();

    for i in 0..n {
        let current = &polygon[i];
        let next = &polygon[(i + 1) % n];

        match (inside(current), inside(next)) {
            (true, true) => output.push(*next),
            (true, false) => output.push(intersect(current, next)),
            (false, true) => {
                output.push(intersect(current, next));
                output.push(*next);
            }
            (false, false) => {}
        }
    }

    output
}

/// Clip a linestring against the rect, producing zero or more chains.
pub fn clip_linestring(line: &[(f64, f64)], rect: ClipRect) -> Vec<Vec<(f64, f64)>> {
    let mut chains: Vec<Vec<(f64, f64)>> = Vec::new();

    for window in line.windows(2) {
        let (a, b) = (window[0], window[1]);
        let Some((ca, cb)) = clip_segment(a, b, rect) else {
            continue;
        };

        match chains.last_mut() {
            Some(chain) if approx_eq(*chain.last().unwrap(), ca) => {
                chain.push(cb);
            }
            _ => chains.push(vec![ca, cb]),
        }
    }

    chains.retain(|chain| chain.len() >= 2);
    chains
}

/// Liang–Barsky segment clip.
fn clip_segment(
    a: (f64, f64),
    b: (f64, f64),
    rect: ClipRect,
) -> Option<((f64, f64), (f64, f64))> {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let mut t0 = 0.0f64;
    let mut t1 = 1.0f64;

    let checks = [
        (-dx, a.0 - rect.min),
        (dx, rect.max - a.0),
        (-dy, a.1 - rect.min),
        (dy, rect.max - a.1),
    ];

    for (p, q) in checks {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            if r > t0 {
                t0 = r;
            }
        } else {
            if r < t0 {
                return None;
            }
            if r < t1 {
                t1 = r;
            }
        }
    }

    Some((
        (a.0 + t0 * dx, a.1 + t0 * dy),
        (a.0 + t1 * dx, a.1 + t1 * dy),
    ))
}

fn approx_eq(a: (f64, f64), b: (f64, f64)) -> bool {
    (a.0 - b.0).abs() < 1e-9 && (a.1 - b.1).abs() < 1e-9
}

/// Round a clipped ring to grid integers and drop consecutive
/// duplicates and the closing duplicate. Fewer than 3 remaining
/// points means the ring collapsed.
pub fn round_and_clean_ring(ring: &[(f64, f64)]) -> Vec<(i32, i32)> {
    let mut cleaned: Vec<(i32, i32)> = Vec::with_capacity(ring.len());
    for &(x, y) in ring {
        let p = (x.round() as i32, y.round() as i32);
        if cleaned.last() != Some(&p) {
            cleaned.push(p);
        }
    }

    if cleaned.len() > 1 && cleaned.first() == cleaned.last() {
        cleaned.pop();
    }

    if cleaned.len() < 3 {
        return Vec::new();
    }
    cleaned
}

/// Round a clipped chain to grid integers, dropping duplicates.
pub fn round_and_clean_line(line: &[(f64, f64)]) -> Vec<(i32, i32)> {
    let mut cleaned: Vec<(i32, i32)> = Vec::with_capacity(line.len());
    for &(x, y) in line {
        let p = (x.round() as i32, y.round() as i32);
        if cleaned.last() != Some(&p) {
            cleaned.push(p);
        }
    }
    if cleaned.len() < 2 {
        return Vec::new();
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect() -> ClipRect {
        ClipRect {
            min: 0.0,
            max: 100.0,
        }
    }

    #[test]
    fn test_ring_fully_inside_unchanged() {
        let ring = vec![(10.0, 10.0), (20.0, 10.0), (20.0, 20.0), (10.0, 20.0)];
        let clipped = clip_ring(&ring, rect());
        assert_eq!(clipped.len(), 4);
    }

    #[test]
    fn test_ring_fully_outside_vanishes() {
        let ring = vec![
            (200.0, 200.0),
            (300.0, 200.0),
            (300.0, 300.0),
            (200.0, 300.0),
        ];
        let clipped = clip_ring(&ring, rect());
        assert!(round_and_clean_ring(&clipped).is_empty());
    }

    #[test]
    fn test_ring_straddling_edge_is_interpolated() {
        // Square half inside on the right edge
        let ring = vec![(50.0, 10.0), (150.0, 10.0), (150.0, 90.0), (50.0, 90.0)];
        let clipped = clip_ring(&ring, rect());
        // Every vertex must be inside the rect
        for p in &clipped {
            assert!(rect().contains(*p), "{:?} outside", p);
        }
        // The clipped shape keeps its inside corners and gains edge points
        assert!(clipped.contains(&(100.0, 10.0)));
        assert!(clipped.contains(&(100.0, 90.0)));
    }

    #[test]
    fn test_linestring_crossing_produces_chain() {
        let line = vec![(-50.0, 50.0), (150.0, 50.0)];
        let chains = clip_linestring(&line, rect());
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0][0], (0.0, 50.0));
        assert_eq!(chains[0][1], (100.0, 50.0));
    }

    #[test]
    fn test_linestring_exiting_and_reentering_splits() {
        // Goes out the top and comes back down
        let line = vec![
            (10.0, 50.0),
            (10.0, -50.0),
            (90.0, -50.0),
            (90.0, 50.0),
        ];
        let chains = clip_linestring(&line, rect());
        assert_eq!(chains.len(), 2);
    }

    #[test]
    fn test_round_and_clean() {
        let ring = vec![
            (0.4, 0.4),
            (0.6, 0.4), // rounds to (1, 0)
            (1.2, 0.2), // rounds to (1, 0) again -> dropped
            (5.0, 5.0),
            (0.4, 0.4), // closing duplicate -> dropped
        ];
        let cleaned = round_and_clean_ring(&ring);
        assert_eq!(cleaned, vec![(0, 0), (1, 0), (5, 5)]);

        // Collapsed ring
        let tiny = vec![(0.1, 0.1), (0.2, 0.2), (0.1, 0.0)];
        assert!(round_and_clean_ring(&tiny).is_empty());
    }
}
