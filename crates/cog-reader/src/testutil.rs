//! Synthetic cloud-optimized TIFF fixtures for tests.

use std::io::Write;

/// Pixel pattern painted into the fixture.
#[derive(Debug, Clone, Copy)]
pub enum Pattern {
    /// Single band, value = column * 8 (a horizontal ramp).
    GrayRamp,
    /// Three bands: red in the west half, green in the north half,
    /// constant blue.
    RgbQuadrants,
}

/// Description of a fixture raster.
pub struct CogSpec {
    pub width: u64,
    pub height: u64,
    pub tile: u64,
    pub bands: u16,
    pub overviews: usize,
    pub epsg: u32,
    /// World coordinates of the top-left corner.
    pub origin: (f64, f64),
    /// World units per full-resolution pixel.
    pub pixel_size: f64,
    pub pattern: Pattern,
}

impl CogSpec {
    /// 8-bit gray ramp over [139.5, 36.0] at 0.01 degrees/pixel.
    pub fn gray_gradient(width: u64, height: u64, tile: u64) -> Self {
        Self {
            width,
            height,
            tile,
            bands: 1,
            overviews: 0,
            epsg: 4326,
            origin: (139.5, 36.0),
            pixel_size: 0.01,
            pattern: Pattern::GrayRamp,
        }
    }

    /// RGB quadrants over the same geography.
    pub fn rgb_quadrants(width: u64, height: u64, tile: u64) -> Self {
        Self {
            bands: 3,
            pattern: Pattern::RgbQuadrants,
            ..Self::gray_gradient(width, height, tile)
        }
    }

    /// Sample a full-resolution pixel value.
    pub fn pixel(&self, x: u64, y: u64, band: u16) -> u8 {
        match self.pattern {
            Pattern::GrayRamp => ((x * 8) % 256) as u8,
            Pattern::RgbQuadrants => match band {
                0 => {
                    if x < self.width / 2 {
                        255
                    } else {
                        0
                    }
                }
                1 => {
                    if y < self.height / 2 {
                        255
                    } else {
                        0
                    }
                }
                _ => 128,
            },
        }
    }
}

fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

struct Entry {
    tag: u16,
    field_type: u16,
    count: u32,
    payload: Vec<u8>,
}

fn short(value: u16) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

fn long(value: u32) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

fn longs(values: &[u64]) -> Vec<u8> {
    values
        .iter()
        .flat_map(|v| (*v as u32).to_le_bytes())
        .collect()
}

fn doubles(values: &[f64]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Build a little-endian classic TIFF with deflate-compressed tiles
/// and `spec.overviews` power-of-two overview levels.
pub fn build_cog(spec: &CogSpec) -> Vec<u8> {
    let levels = spec.overviews + 1;

    // Compress every level's tiles first, recording sizes.
    let mut level_tiles: Vec<Vec<Vec<u8>>> = Vec::new();
    for level in 0..levels {
        let factor = 1u64 << level;
        let (w, h) = (spec.width / factor, spec.height / factor);
        let across = (w + spec.tile - 1) / spec.tile;
        let down = (h + spec.tile - 1) / spec.tile;

        let mut tiles = Vec::new();
        for ty in 0..down {
            for tx in 0..across {
                let mut raw =
                    Vec::with_capacity((spec.tile * spec.tile * spec.bands as u64) as usize);
                for py in 0..spec.tile {
                    for px in 0..spec.tile {
                        let (x, y) = (tx * spec.tile + px, ty * spec.tile + py);
                        for band in 0..spec.bands {
                            if x < w && y < h {
                                // Overviews decimate the full grid.
                                raw.push(spec.pixel(x * factor, y * factor, band));
                            } else {
                                raw.push(0);
                            }
                        }
                    }
                }
                tiles.push(zlib(&raw));
            }
        }
        level_tiles.push(tiles);
    }

    // Data region directly after the 8-byte header.
    let mut data = Vec::new();
    let mut level_offsets: Vec<Vec<u64>> = Vec::new();
    for tiles in &level_tiles {
        let mut offsets = Vec::new();
        for tile in tiles {
            offsets.push(8 + data.len() as u64);
            data.extend_from_slice(tile);
        }
        level_offsets.push(offsets);
    }

    // Build IFD entry lists per level.
    let mut level_entries: Vec<Vec<Entry>> = Vec::new();
    for level in 0..levels {
        let factor = 1u64 << level;
        let (w, h) = (spec.width / factor, spec.height / factor);
        let counts: Vec<u64> = level_tiles[level].iter().map(|t| t.len() as u64).collect();

        let photometric: u16 = if spec.bands >= 3 { 2 } else { 1 };
        let mut entries = vec![
            Entry {
                tag: 256,
                field_type: 4,
                count: 1,
                payload: long(w as u32),
            },
            Entry {
                tag: 257,
                field_type: 4,
                count: 1,
                payload: long(h as u32),
            },
            Entry {
                tag: 258,
                field_type: 3,
                count: spec.bands as u32,
                payload: (0..spec.bands).flat_map(|_| short(8)).collect(),
            },
            Entry {
                tag: 259,
                field_type: 3,
                count: 1,
                payload: short(8), // deflate
            },
            Entry {
                tag: 262,
                field_type: 3,
                count: 1,
                payload: short(photometric),
            },
            Entry {
                tag: 277,
                field_type: 3,
                count: 1,
                payload: short(spec.bands),
            },
            Entry {
                tag: 284,
                field_type: 3,
                count: 1,
                payload: short(1),
            },
            Entry {
                tag: 322,
                field_type: 4,
                count: 1,
                payload: long(spec.tile as u32),
            },
            Entry {
                tag: 323,
                field_type: 4,
                count: 1,
                payload: long(spec.tile as u32),
            },
            Entry {
                tag: 324,
                field_type: 4,
                count: level_offsets[level].len() as u32,
                payload: longs(&level_offsets[level]),
            },
            Entry {
                tag: 325,
                field_type: 4,
                count: counts.len() as u32,
                payload: longs(&counts),
            },
        ];

        if level == 0 {
            entries.push(Entry {
                tag: 33550,
                field_type: 12,
                count: 3,
                payload: doubles(&[spec.pixel_size, spec.pixel_size, 0.0]),
            });
            entries.push(Entry {
                tag: 33922,
                field_type: 12,
                count: 6,
                payload: doubles(&[0.0, 0.0, 0.0, spec.origin.0, spec.origin.1, 0.0]),
            });
            let key: u16 = if spec.epsg == 4326 { 2048 } else { 3072 };
            let geokeys: Vec<u8> = [1u16, 1, 0, 1, key, 0, 1, spec.epsg as u16]
                .iter()
                .flat_map(|v| v.to_le_bytes())
                .collect();
            entries.push(Entry {
                tag: 34735,
                field_type: 3,
                count: 8,
                payload: geokeys,
            });
        }

        entries.sort_by_key(|e| e.tag);
        level_entries.push(entries);
    }

    // Lay out IFD tables and their external payloads.
    let mut pos = 8 + data.len() as u64;
    let mut ifd_offsets = Vec::new();
    let mut external_offsets: Vec<Vec<u64>> = Vec::new();
    for entries in &level_entries {
        ifd_offsets.push(pos);
        let table = 2 + entries.len() as u64 * 12 + 4;
        let mut externals = Vec::new();
        let mut external_pos = pos + table;
        for entry in entries {
            if entry.payload.len() > 4 {
                externals.push(external_pos);
                external_pos += entry.payload.len() as u64;
            } else {
                externals.push(0);
            }
        }
        external_offsets.push(externals);
        pos = external_pos;
    }

    // Assemble the file.
    let mut out = Vec::new();
    out.extend_from_slice(b"II");
    out.extend_from_slice(&42u16.to_le_bytes());
    out.extend_from_slice(&(ifd_offsets[0] as u32).to_le_bytes());
    out.extend_from_slice(&data);

    for (level, entries) in level_entries.iter().enumerate() {
        out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        for (i, entry) in entries.iter().enumerate() {
            out.extend_from_slice(&entry.tag.to_le_bytes());
            out.extend_from_slice(&entry.field_type.to_le_bytes());
            out.extend_from_slice(&entry.count.to_le_bytes());
            if entry.payload.len() <= 4 {
                let mut inline = entry.payload.clone();
                inline.resize(4, 0);
                out.extend_from_slice(&inline);
            } else {
                out.extend_from_slice(&(external_offsets[level][i] as u32).to_le_bytes());
            }
        }
        let next = if level + 1 < levels {
            ifd_offsets[level + 1] as u32
        } else {
            0
        };
        out.extend_from_slice(&next.to_le_bytes());
        for entry in entries {
            if entry.payload.len() > 4 {
                out.extend_from_slice(&entry.payload);
            }
        }
    }

    out
}
