//! Pixel window resampling.
//!
//! One consistent, declared policy: nearest-neighbor for categorical
//! data, bilinear otherwise. The choice is made per datasource up
//! front, never inferred from content.

use rayon::prelude::*;

/// Decoded pixels covering a run of internal tiles, band-interleaved.
pub struct Region {
    /// Region width in pixels.
    pub width: usize,
    /// Region height in pixels.
    pub height: usize,
    /// Samples per pixel.
    pub bands: usize,
    /// Chunky (interleaved) 8-bit samples, row-major.
    pub data: Vec<u8>,
    /// Column of the region's left edge in image pixel coordinates.
    pub origin_col: f64,
    /// Row of the region's top edge in image pixel coordinates.
    pub origin_row: f64,
}

impl Region {
    #[inline]
    fn sample(&self, col: isize, row: isize, band: usize) -> Option<u8> {
        if col < 0 || row < 0 || col >= self.width as isize || row >= self.height as isize {
            return None;
        }
        let idx = (row as usize * self.width + col as usize) * self.bands + band;
        self.data.get(idx).copied()
    }

    #[inline]
    fn sample_clamped(&self, col: isize, row: isize, band: usize) -> u8 {
        let col = col.clamp(0, self.width as isize - 1);
        let row = row.clamp(0, self.height as isize - 1);
        let idx = (row as usize * self.width + col as usize) * self.bands + band;
        self.data[idx]
    }
}

/// Resampling method; see module docs for the selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Nearest,
    Bilinear,
}

/// The source window being mapped onto the output tile, in image
/// pixel coordinates of the level being read.
#[derive(Debug, Clone, Copy)]
pub struct SourceWindow {
    pub col0: f64,
    pub row0: f64,
    pub col1: f64,
    pub row1: f64,
    /// Image dimensions of the level, for coverage checks.
    pub image_width: u64,
    pub image_height: u64,
}

/// Resample the window to a square RGBA tile.
///
/// `band_mapping` selects source bands for the output channels: one
/// entry for grayscale, three for RGB, four for RGBA. Output pixels
/// that fall outside the image extent are fully transparent.
pub fn resample_to_rgba(
    region: &Region,
    window: SourceWindow,
    out_size: usize,
    band_mapping: &[usize],
    method: Method,
) -> Vec<u8> {
    let mut out = vec![0u8; out_size * out_size * 4];
    let col_step = (window.col1 - window.col0) / out_size as f64;
    let row_step = (window.row1 - window.row0) / out_size as f64;

    out.par_chunks_mut(out_size * 4)
        .enumerate()
        .for_each(|(j, out_row)| {
            let src_row = window.row0 + (j as f64 + 0.5) * row_step - 0.5;
            for i in 0..out_size {
                let src_col = window.col0 + (i as f64 + 0.5) * col_step - 0.5;

                // Outside the image extent stays transparent.
                let center_col = src_col + 0.5;
                let center_row = src_row + 0.5;
                if center_col < 0.0
                    || center_row < 0.0
                    || center_col >= window.image_width as f64
                    || center_row >= window.image_height as f64
                {
                    continue;
                }

                let mut channels = [0u8; 4];
                for (slot, &band) in band_mapping.iter().enumerate() {
                    channels[slot] = sample_band(region, src_col, src_row, band, method);
                }

                let rgba = match band_mapping.len() {
                    1 => [channels[0], channels[0], channels[0], 255],
                    3 => [channels[0], channels[1], channels[2], 255],
                    _ => channels,
                };
                out_row[i * 4..i * 4 + 4].copy_from_slice(&rgba);
            }
        });

    out
}

fn sample_band(region: &Region, src_col: f64, src_row: f64, band: usize, method: Method) -> u8 {
    let rel_col = src_col - region.origin_col;
    let rel_row = src_row - region.origin_row;

    match method {
        Method::Nearest => region
            .sample(
                (rel_col + 0.5).floor() as isize,
                (rel_row + 0.5).floor() as isize,
                band,
            )
            .unwrap_or(0),
        Method::Bilinear => {
            let c0 = rel_col.floor();
            let r0 = rel_row.floor();
            let fc = rel_col - c0;
            let fr = rel_row - r0;
            let (c0, r0) = (c0 as isize, r0 as isize);

            let p00 = region.sample_clamped(c0, r0, band) as f64;
            let p10 = region.sample_clamped(c0 + 1, r0, band) as f64;
            let p01 = region.sample_clamped(c0, r0 + 1, band) as f64;
            let p11 = region.sample_clamped(c0 + 1, r0 + 1, band) as f64;

            let top = p00 * (1.0 - fc) + p10 * fc;
            let bottom = p01 * (1.0 - fc) + p11 * fc;
            (top * (1.0 - fr) + bottom * fr).round().clamp(0.0, 255.0) as u8
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 4x4 single-band ramp: value = col * 10.
    fn ramp_region() -> Region {
        let mut data = Vec::new();
        for _row in 0..4 {
            for col in 0..4u8 {
                data.push(col * 10);
            }
        }
        Region {
            width: 4,
            height: 4,
            bands: 1,
            data,
            origin_col: 0.0,
            origin_row: 0.0,
        }
    }

    fn full_window() -> SourceWindow {
        SourceWindow {
            col0: 0.0,
            row0: 0.0,
            col1: 4.0,
            row1: 4.0,
            image_width: 4,
            image_height: 4,
        }
    }

    #[test]
    fn test_identity_nearest() {
        let out = resample_to_rgba(&ramp_region(), full_window(), 4, &[0], Method::Nearest);
        // Row 0: gray values equal the ramp
        for col in 0..4 {
            assert_eq!(out[col * 4], (col as u8) * 10);
            assert_eq!(out[col * 4 + 3], 255);
        }
    }

    #[test]
    fn test_upsample_bilinear_interpolates() {
        let out = resample_to_rgba(&ramp_region(), full_window(), 8, &[0], Method::Bilinear);
        // Doubling a ramp gives monotone non-decreasing values
        let row: Vec<u8> = (0..8).map(|i| out[i * 4]).collect();
        for pair in row.windows(2) {
            assert!(pair[1] >= pair[0], "not monotone: {:?}", row);
        }
        // Interior values land between the ramp endpoints
        assert!(row[3] > 0 && row[3] < 30);
    }

    #[test]
    fn test_upsample_nearest_replicates() {
        let out = resample_to_rgba(&ramp_region(), full_window(), 8, &[0], Method::Nearest);
        let row: Vec<u8> = (0..8).map(|i| out[i * 4]).collect();
        // Each source pixel appears exactly twice
        assert_eq!(row, vec![0, 0, 10, 10, 20, 20, 30, 30]);
    }

    #[test]
    fn test_outside_extent_is_transparent() {
        // Window extends past the image on the right
        let window = SourceWindow {
            col0: 2.0,
            row0: 0.0,
            col1: 6.0,
            row1: 4.0,
            image_width: 4,
            image_height: 4,
        };
        let out = resample_to_rgba(&ramp_region(), window, 4, &[0], Method::Nearest);
        // Left half covered, right half transparent
        assert_eq!(out[3], 255);
        assert_eq!(out[2 * 4 + 3], 0);
        assert_eq!(out[3 * 4 + 3], 0);
    }

    #[test]
    fn test_rgb_mapping() {
        // Two-band region; map band 1 into red, band 0 into green/blue
        let mut data = Vec::new();
        for _ in 0..4 {
            data.extend_from_slice(&[10, 200]);
        }
        let region = Region {
            width: 2,
            height: 2,
            bands: 2,
            data,
            origin_col: 0.0,
            origin_row: 0.0,
        };
        let window = SourceWindow {
            col0: 0.0,
            row0: 0.0,
            col1: 2.0,
            row1: 2.0,
            image_width: 2,
            image_height: 2,
        };
        let out = resample_to_rgba(&region, window, 2, &[1, 0, 0], Method::Nearest);
        assert_eq!(&out[0..4], &[200, 10, 10, 255]);
    }

    #[test]
    fn test_deterministic() {
        let a = resample_to_rgba(&ramp_region(), full_window(), 16, &[0], Method::Bilinear);
        let b = resample_to_rgba(&ramp_region(), full_window(), 16, &[0], Method::Bilinear);
        assert_eq!(a, b);
    }
}
