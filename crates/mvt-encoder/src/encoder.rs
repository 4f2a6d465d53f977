//! Top-level tile encoding pipeline.
//!
//! Features arrive in the geometry store's stable order; everything
//! downstream (projection, simplification, clipping, dictionary
//! assembly) is deterministic, so encoding the same tile twice over
//! unchanged data produces byte-identical output.

use std::collections::BTreeMap;

use tile_common::geom::Position;
use tile_common::tile::{wgs84_to_mercator, MERCATOR_EXTENT_M};
use tile_common::{Feature, Geometry, TileCoord};

use crate::clip::{self, ClipRect};
use crate::geometry::{wind_ring, GeometryEncoder};
use crate::layer::{GeomType, LayerBuilder, MvtValue, TileBuilder};
use crate::simplify;
use crate::{BUFFER_FRACTION, EXTENT, SIMPLIFY_MAX_ZOOM};

/// Encoder tuning knobs; the defaults implement the contract.
#[derive(Debug, Clone)]
pub struct EncodeOptions {
    pub extent: u32,
    pub buffer_fraction: f64,
    /// Simplification is skipped at and above this zoom.
    pub simplify_max_zoom: u8,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            extent: EXTENT,
            buffer_fraction: BUFFER_FRACTION,
            simplify_max_zoom: SIMPLIFY_MAX_ZOOM,
        }
    }
}

/// Maps lon/lat into the tile-local grid.
struct TileProjection {
    merc_min_x: f64,
    merc_max_y: f64,
    span: f64,
    extent: f64,
}

impl TileProjection {
    fn new(coord: TileCoord, extent: u32) -> Self {
        let n = (1u64 << coord.z) as f64;
        let world = 2.0 * MERCATOR_EXTENT_M;
        let span = world / n;

        Self {
            merc_min_x: -MERCATOR_EXTENT_M + coord.x as f64 * span,
            merc_max_y: MERCATOR_EXTENT_M - coord.y as f64 * span,
            span,
            extent: extent as f64,
        }
    }

    /// Project to tile units; (0,0) is the tile's top-left corner.
    fn project(&self, position: Position) -> (f64, f64) {
        let (mx, my) = wgs84_to_mercator(position[0], position[1]);
        let x = (mx - self.merc_min_x) / self.span * self.extent;
        let y = (self.merc_max_y - my) / self.span * self.extent;
        (x, y)
    }
}

/// Encode one tile from the features intersecting it.
///
/// `layer_filter` restricts output to a single named layer. Features
/// whose geometry degenerates to nothing after clipping are dropped;
/// if everything drops the result is an empty byte vector (the
/// explicit empty tile).
pub fn encode_tile(
    features: &[Feature],
    coord: TileCoord,
    layer_filter: Option<&str>,
    options: &EncodeOptions,
) -> Vec<u8> {
    let projection = TileProjection::new(coord, options.extent);
    let rect = ClipRect::with_buffer(
        options.extent as f64,
        options.extent as f64 * options.buffer_fraction,
    );
    let tolerance = if coord.z < options.simplify_max_zoom {
        1.0 // one grid step at this tile's resolution
    } else {
        0.0
    };

    // Group by layer name; BTreeMap keeps layer order stable.
    let mut layers: BTreeMap<&str, Vec<&Feature>> = BTreeMap::new();
    for feature in features {
        if let Some(wanted) = layer_filter {
            if feature.layer != wanted {
                continue;
            }
        }
        layers.entry(feature.layer.as_str()).or_default().push(feature);
    }

    let mut tile = TileBuilder::new();

    for (name, members) in layers {
        let mut layer = LayerBuilder::new(name);

        for feature in members {
            let Some((geom_type, commands)) =
                encode_geometry(&feature.geometry, &projection, rect, tolerance)
            else {
                continue;
            };

            let properties: Vec<(String, MvtValue)> = feature
                .properties
                .iter()
                .filter_map(|(k, v)| MvtValue::from_json(v).map(|mv| (k.clone(), mv)))
                .collect();

            let id = (feature.id.as_u128() >> 64) as u64;
            layer.add_feature(Some(id), geom_type, &commands, &properties);
        }

        tile.add_layer(layer);
    }

    tile.build()
}

fn encode_geometry(
    geometry: &Geometry,
    projection: &TileProjection,
    rect: ClipRect,
    tolerance: f64,
) -> Option<(GeomType, Vec<u32>)> {
    let mut encoder = GeometryEncoder::new();

    match geometry {
        Geometry::Point(p) => {
            encode_points(std::slice::from_ref(p), projection, rect, &mut encoder);
        }
        Geometry::MultiPoint(pts) => {
            encode_points(pts, projection, rect, &mut encoder);
        }
        Geometry::LineString(line) => {
            encode_line(line, projection, rect, tolerance, &mut encoder);
        }
        Geometry::MultiLineString(lines) => {
            for line in lines {
                encode_line(line, projection, rect, tolerance, &mut encoder);
            }
        }
        Geometry::Polygon(rings) => {
            encode_polygon(rings, projection, rect, tolerance, &mut encoder);
        }
        Geometry::MultiPolygon(polys) => {
            for rings in polys {
                encode_polygon(rings, projection, rect, tolerance, &mut encoder);
            }
        }
    }

    if encoder.is_empty() {
        return None;
    }

    let geom_type = match geometry {
        Geometry::Point(_) | Geometry::MultiPoint(_) => GeomType::Point,
        Geometry::LineString(_) | Geometry::MultiLineString(_) => GeomType::LineString,
        Geometry::Polygon(_) | Geometry::MultiPolygon(_) => GeomType::Polygon,
    };

    Some((geom_type, encoder.into_commands()))
}

fn encode_points(
    points: &[Position],
    projection: &TileProjection,
    rect: ClipRect,
    encoder: &mut GeometryEncoder,
) {
    let kept: Vec<(i32, i32)> = points
        .iter()
        .map(|&p| projection.project(p))
        .filter(|&p| rect.contains(p))
        .map(|(x, y)| (x.round() as i32, y.round() as i32))
        .collect();

    if !kept.is_empty() {
        encoder.points(&kept);
    }
}

fn encode_line(
    line: &[Position],
    projection: &TileProjection,
    rect: ClipRect,
    tolerance: f64,
    encoder: &mut GeometryEncoder,
) {
    let projected: Vec<(f64, f64)> = line.iter().map(|&p| projection.project(p)).collect();
    let simplified = simplify::simplify(&projected, tolerance);

    for chain in clip::clip_linestring(&simplified, rect) {
        let cleaned = clip::round_and_clean_line(&chain);
        if cleaned.len() >= 2 {
            encoder.linestring(&cleaned);
        }
    }
}

fn encode_polygon(
    rings: &[Vec<Position>],
    projection: &TileProjection,
    rect: ClipRect,
    tolerance: f64,
    encoder: &mut GeometryEncoder,
) {
    let mut prepared: Vec<Vec<(i32, i32)>> = Vec::with_capacity(rings.len());

    for (i, ring) in rings.iter().enumerate() {
        // Drop the GeoJSON closing duplicate; the cyclic clip and the
        // ClosePath command both treat the ring as closed.
        let open = if ring.len() > 1 && ring.first() == ring.last() {
            &ring[..ring.len() - 1]
        } else {
            &ring[..]
        };

        let projected: Vec<(f64, f64)> = open.iter().map(|&p| projection.project(p)).collect();
        let simplified = simplify::simplify_ring(&projected, tolerance);
        let clipped = clip::clip_ring(&simplified, rect);
        let cleaned = clip::round_and_clean_ring(&clipped);

        if cleaned.is_empty() {
            // A vanished exterior ring takes its holes with it.
            if i == 0 {
                return;
            }
            continue;
        }

        prepared.push(wind_ring(cleaned, i != 0));
    }

    for ring in &prepared {
        encoder.ring(ring);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use uuid::Uuid;

    fn feature(n: u128, layer: &str, geometry: Geometry) -> Feature {
        let mut properties = Map::new();
        properties.insert("n".into(), serde_json::json!(n as u64));
        Feature {
            id: Uuid::from_u128(n),
            tileset_id: Uuid::from_u128(1),
            layer: layer.into(),
            geometry,
            properties,
        }
    }

    // Tile 0/0/0 covers the whole world; easy to reason about.
    fn world_tile() -> TileCoord {
        TileCoord::new(0, 0, 0)
    }

    #[test]
    fn test_point_encodes_nonempty() {
        let features = vec![feature(1, "poi", Geometry::Point([0.0, 0.0]))];
        let tile = encode_tile(&features, world_tile(), None, &EncodeOptions::default());
        assert!(!tile.is_empty());
        // Layer name appears in the serialized bytes
        assert!(tile.windows(3).any(|w| w == b"poi"));
    }

    #[test]
    fn test_feature_outside_tile_yields_empty_tile() {
        // Western hemisphere point, eastern hemisphere tile (z1 x1)
        let features = vec![feature(1, "poi", Geometry::Point([-90.0, 0.0]))];
        let tile = encode_tile(
            &features,
            TileCoord::new(1, 1, 0),
            None,
            &EncodeOptions::default(),
        );
        assert!(tile.is_empty());
    }

    #[test]
    fn test_encoding_is_reproducible() {
        let features = vec![
            feature(1, "roads", Geometry::LineString(vec![[0.0, 0.0], [10.0, 10.0]])),
            feature(
                2,
                "land",
                Geometry::Polygon(vec![vec![
                    [0.0, 0.0],
                    [20.0, 0.0],
                    [20.0, 20.0],
                    [0.0, 20.0],
                    [0.0, 0.0],
                ]]),
            ),
            feature(3, "poi", Geometry::Point([5.0, 5.0])),
        ];
        let options = EncodeOptions::default();
        let a = encode_tile(&features, world_tile(), None, &options);
        let b = encode_tile(&features, world_tile(), None, &options);
        assert_eq!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn test_layer_filter() {
        let features = vec![
            feature(1, "roads", Geometry::Point([0.0, 0.0])),
            feature(2, "poi", Geometry::Point([1.0, 1.0])),
        ];
        let tile = encode_tile(
            &features,
            world_tile(),
            Some("roads"),
            &EncodeOptions::default(),
        );
        assert!(tile.windows(5).any(|w| w == b"roads"));
        assert!(!tile.windows(3).any(|w| w == b"poi"));
    }

    #[test]
    fn test_polygon_clipped_away_is_dropped() {
        // Polygon well inside the north-west z2 tile, encoded into the
        // south-east one.
        let features = vec![feature(
            1,
            "land",
            Geometry::Polygon(vec![vec![
                [-120.0, 60.0],
                [-110.0, 60.0],
                [-110.0, 65.0],
                [-120.0, 65.0],
                [-120.0, 60.0],
            ]]),
        )];
        let tile = encode_tile(
            &features,
            TileCoord::new(2, 3, 3),
            None,
            &EncodeOptions::default(),
        );
        assert!(tile.is_empty());
    }

    #[test]
    fn test_high_zoom_keeps_detail() {
        // A wiggly line that simplification would flatten at low zoom
        let line: Vec<Position> = (0..40)
            .map(|i| [139.7 + i as f64 * 1e-5, 35.68 + ((i % 3) as f64) * 1e-6])
            .collect();
        let features = vec![feature(1, "roads", Geometry::LineString(line))];

        let coarse = encode_tile(
            &features,
            TileCoord::new(0, 0, 0),
            None,
            &EncodeOptions::default(),
        );
        let fine_coord = tile_common::tile::latlon_to_tile(35.68, 139.7, 18);
        let fine = encode_tile(&features, fine_coord, None, &EncodeOptions::default());

        // At z18 the geometry is exact, so more command words survive.
        assert!(fine.len() > coarse.len());
    }

    #[test]
    fn test_shared_properties_dedup_across_features() {
        let mut shared = Map::new();
        shared.insert("class".into(), serde_json::json!("residential"));

        let make = |n: u128, lon: f64| Feature {
            id: Uuid::from_u128(n),
            tileset_id: Uuid::from_u128(1),
            layer: "roads".into(),
            geometry: Geometry::Point([lon, 0.0]),
            properties: shared.clone(),
        };

        let features = vec![make(1, 0.0), make(2, 10.0), make(3, 20.0)];
        let tile = encode_tile(&features, world_tile(), None, &EncodeOptions::default());

        // "residential" must appear exactly once in the layer bytes.
        let needle = b"residential";
        let count = tile
            .windows(needle.len())
            .filter(|w| w == needle)
            .count();
        assert_eq!(count, 1);
    }
}
