//! Density grid over a query bounding box.

use serde::Serialize;

use tile_common::{BoundingBox, Feature, TileResult};

/// Default grid dimension (N x N cells).
pub const DEFAULT_GRID_SIZE: usize = 3;

/// A high-count cell reported with its center coordinate.
#[derive(Debug, Clone, Serialize)]
pub struct Hotspot {
    pub row: usize,
    pub col: usize,
    pub count: u64,
    pub center: [f64; 2],
}

/// Per-cell counts plus the top cells by count.
#[derive(Debug, Clone, Serialize)]
pub struct DensityGrid {
    pub grid_size: usize,
    /// Row-major counts, row 0 at the south edge.
    pub counts: Vec<Vec<u64>>,
    pub total: u64,
    pub hotspots: Vec<Hotspot>,
}

/// Partition the bbox into a grid and count each feature into the
/// cell containing its representative point (centroid for non-point
/// geometry). Every candidate lands in exactly one cell, so the cell
/// counts always sum to the candidate count.
pub fn density_grid(
    features: &[Feature],
    bbox: BoundingBox,
    grid_size: usize,
    top_k: usize,
) -> TileResult<DensityGrid> {
    bbox.validate()?;
    let grid_size = grid_size.max(1);

    let mut counts = vec![vec![0u64; grid_size]; grid_size];
    let cell_width = bbox.width() / grid_size as f64;
    let cell_height = bbox.height() / grid_size as f64;

    for feature in features {
        let [x, y] = feature.geometry.representative_point();
        // Clamp so edge points (and centroids nudged outside by
        // clipping) still land in a cell.
        let col = if cell_width > 0.0 {
            (((x - bbox.min_x) / cell_width).floor() as i64).clamp(0, grid_size as i64 - 1)
        } else {
            0
        } as usize;
        let row = if cell_height > 0.0 {
            (((y - bbox.min_y) / cell_height).floor() as i64).clamp(0, grid_size as i64 - 1)
        } else {
            0
        } as usize;
        counts[row][col] += 1;
    }

    let mut hotspots: Vec<Hotspot> = Vec::new();
    for (row, row_counts) in counts.iter().enumerate() {
        for (col, &count) in row_counts.iter().enumerate() {
            if count == 0 {
                continue;
            }
            hotspots.push(Hotspot {
                row,
                col,
                count,
                center: [
                    bbox.min_x + (col as f64 + 0.5) * cell_width,
                    bbox.min_y + (row as f64 + 0.5) * cell_height,
                ],
            });
        }
    }
    hotspots.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| (a.row, a.col).cmp(&(b.row, b.col)))
    });
    hotspots.truncate(top_k);

    Ok(DensityGrid {
        grid_size,
        counts,
        total: features.len() as u64,
        hotspots,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::point;

    fn bbox() -> BoundingBox {
        BoundingBox::new(0.0, 0.0, 3.0, 3.0)
    }

    #[test]
    fn test_counts_sum_to_total() {
        let features: Vec<_> = (0..25)
            .map(|i| point(i, (i % 5) as f64 * 0.6, (i / 5) as f64 * 0.6))
            .collect();

        let grid = density_grid(&features, bbox(), 3, 3).unwrap();
        let sum: u64 = grid.counts.iter().flatten().sum();
        assert_eq!(sum, 25);
        assert_eq!(grid.total, 25);
    }

    #[test]
    fn test_cell_assignment() {
        let features = vec![
            point(1, 0.5, 0.5), // south-west cell
            point(2, 2.5, 2.5), // north-east cell
            point(3, 2.6, 2.4), // north-east cell again
        ];
        let grid = density_grid(&features, bbox(), 3, 9).unwrap();
        assert_eq!(grid.counts[0][0], 1);
        assert_eq!(grid.counts[2][2], 2);

        assert_eq!(grid.hotspots[0].count, 2);
        assert_eq!((grid.hotspots[0].row, grid.hotspots[0].col), (2, 2));
        // Hotspot centers are cell centers
        assert_eq!(grid.hotspots[0].center, [2.5, 2.5]);
    }

    #[test]
    fn test_boundary_points_clamp_into_grid() {
        let features = vec![point(1, 3.0, 3.0), point(2, 0.0, 0.0)];
        let grid = density_grid(&features, bbox(), 3, 9).unwrap();
        let sum: u64 = grid.counts.iter().flatten().sum();
        assert_eq!(sum, 2);
        assert_eq!(grid.counts[2][2], 1);
        assert_eq!(grid.counts[0][0], 1);
    }

    #[test]
    fn test_empty_scope() {
        let grid = density_grid(&[], bbox(), 3, 3).unwrap();
        assert_eq!(grid.total, 0);
        assert!(grid.hotspots.is_empty());
    }

    #[test]
    fn test_invalid_bbox_rejected() {
        let bad = BoundingBox::new(3.0, 0.0, 0.0, 3.0);
        assert!(density_grid(&[], bad, 3, 3).is_err());
    }
}
