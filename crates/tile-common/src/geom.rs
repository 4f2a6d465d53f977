//! Canonical feature and geometry model.
//!
//! Geometries are GeoJSON-shaped: the serde representation matches the
//! `{"type": ..., "coordinates": ...}` wire form directly, so rows read
//! from the store and bodies sent to clients share one model.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{TileError, TileResult};
use crate::BoundingBox;

/// A single lon/lat position.
pub type Position = [f64; 2];

/// A GeoJSON-shaped geometry in WGS84.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Position),
    MultiPoint(Vec<Position>),
    LineString(Vec<Position>),
    MultiLineString(Vec<Vec<Position>>),
    Polygon(Vec<Vec<Position>>),
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

impl Geometry {
    /// GeoJSON type name.
    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::MultiPoint(_) => "MultiPoint",
            Geometry::LineString(_) => "LineString",
            Geometry::MultiLineString(_) => "MultiLineString",
            Geometry::Polygon(_) => "Polygon",
            Geometry::MultiPolygon(_) => "MultiPolygon",
        }
    }

    /// Structural validation: non-empty coordinate arrays, linestrings
    /// with at least two positions, polygon rings closed with at least
    /// four positions.
    pub fn validate(&self) -> TileResult<()> {
        fn check_ring(ring: &[Position]) -> TileResult<()> {
            if ring.len() < 4 {
                return Err(TileError::InvalidParameter {
                    param: "geometry".into(),
                    message: "polygon ring needs at least 4 positions".into(),
                });
            }
            let first = ring[0];
            let last = ring[ring.len() - 1];
            if first != last {
                return Err(TileError::InvalidParameter {
                    param: "geometry".into(),
                    message: "polygon ring is not closed".into(),
                });
            }
            Ok(())
        }

        match self {
            Geometry::Point(_) => Ok(()),
            Geometry::MultiPoint(pts) => {
                if pts.is_empty() {
                    return Err(empty_geometry());
                }
                Ok(())
            }
            Geometry::LineString(line) => {
                if line.len() < 2 {
                    return Err(TileError::InvalidParameter {
                        param: "geometry".into(),
                        message: "linestring needs at least 2 positions".into(),
                    });
                }
                Ok(())
            }
            Geometry::MultiLineString(lines) => {
                if lines.is_empty() {
                    return Err(empty_geometry());
                }
                for line in lines {
                    if line.len() < 2 {
                        return Err(TileError::InvalidParameter {
                            param: "geometry".into(),
                            message: "linestring needs at least 2 positions".into(),
                        });
                    }
                }
                Ok(())
            }
            Geometry::Polygon(rings) => {
                if rings.is_empty() {
                    return Err(empty_geometry());
                }
                rings.iter().try_for_each(|r| check_ring(r))
            }
            Geometry::MultiPolygon(polys) => {
                if polys.is_empty() {
                    return Err(empty_geometry());
                }
                for rings in polys {
                    if rings.is_empty() {
                        return Err(empty_geometry());
                    }
                    rings.iter().try_for_each(|r| check_ring(r))?;
                }
                Ok(())
            }
        }
    }

    /// Iterate every position in the geometry.
    fn positions(&self) -> Vec<Position> {
        match self {
            Geometry::Point(p) => vec![*p],
            Geometry::MultiPoint(pts) => pts.clone(),
            Geometry::LineString(line) => line.clone(),
            Geometry::MultiLineString(lines) => lines.iter().flatten().copied().collect(),
            Geometry::Polygon(rings) => rings.iter().flatten().copied().collect(),
            Geometry::MultiPolygon(polys) => {
                polys.iter().flatten().flatten().copied().collect()
            }
        }
    }

    /// Bounding box over all positions.
    pub fn bbox(&self) -> BoundingBox {
        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;

        for [x, y] in self.positions() {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }

        BoundingBox::new(min_x, min_y, max_x, max_y)
    }

    /// Representative point used by the analytics module: the point
    /// itself for points, the coordinate centroid otherwise.
    pub fn representative_point(&self) -> Position {
        if let Geometry::Point(p) = self {
            return *p;
        }

        let positions = self.positions();
        if positions.is_empty() {
            return [0.0, 0.0];
        }
        let n = positions.len() as f64;
        let sum_x: f64 = positions.iter().map(|p| p[0]).sum();
        let sum_y: f64 = positions.iter().map(|p| p[1]).sum();
        [sum_x / n, sum_y / n]
    }
}

fn empty_geometry() -> TileError {
    TileError::InvalidParameter {
        param: "geometry".into(),
        message: "empty coordinate array".into(),
    }
}

/// A stored feature: geometry plus properties, owned by a tileset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    pub id: Uuid,
    pub tileset_id: Uuid,
    pub layer: String,
    pub geometry: Geometry,
    pub properties: Map<String, Value>,
}

impl Feature {
    /// Shape as a GeoJSON Feature object.
    pub fn to_geojson(&self) -> Value {
        serde_json::json!({
            "type": "Feature",
            "id": self.id.to_string(),
            "geometry": self.geometry,
            "properties": Value::Object(self.properties.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geojson_wire_shape() {
        let geom: Geometry =
            serde_json::from_str(r#"{"type":"Point","coordinates":[139.76,35.68]}"#).unwrap();
        assert_eq!(geom, Geometry::Point([139.76, 35.68]));

        let out = serde_json::to_value(&geom).unwrap();
        assert_eq!(out["type"], "Point");
        assert_eq!(out["coordinates"][0], 139.76);
    }

    #[test]
    fn test_polygon_validation() {
        let closed = Geometry::Polygon(vec![vec![
            [0.0, 0.0],
            [1.0, 0.0],
            [1.0, 1.0],
            [0.0, 0.0],
        ]]);
        assert!(closed.validate().is_ok());

        let open = Geometry::Polygon(vec![vec![
            [0.0, 0.0],
            [1.0, 0.0],
            [1.0, 1.0],
            [0.5, 0.5],
        ]]);
        assert!(open.validate().is_err());

        let degenerate = Geometry::Polygon(vec![vec![[0.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]);
        assert!(degenerate.validate().is_err());
    }

    #[test]
    fn test_linestring_validation() {
        assert!(Geometry::LineString(vec![[0.0, 0.0]]).validate().is_err());
        assert!(Geometry::LineString(vec![[0.0, 0.0], [1.0, 1.0]])
            .validate()
            .is_ok());
        assert!(Geometry::MultiPoint(vec![]).validate().is_err());
    }

    #[test]
    fn test_bbox_and_centroid() {
        let geom = Geometry::LineString(vec![[0.0, 0.0], [10.0, 20.0]]);
        let bbox = geom.bbox();
        assert_eq!(bbox.min_x, 0.0);
        assert_eq!(bbox.max_y, 20.0);

        let center = geom.representative_point();
        assert_eq!(center, [5.0, 10.0]);

        let point = Geometry::Point([3.0, 4.0]);
        assert_eq!(point.representative_point(), [3.0, 4.0]);
    }

    #[test]
    fn test_feature_to_geojson() {
        let mut props = Map::new();
        props.insert("name".into(), Value::String("station".into()));

        let feature = Feature {
            id: Uuid::nil(),
            tileset_id: Uuid::nil(),
            layer: "default".into(),
            geometry: Geometry::Point([139.76, 35.68]),
            properties: props,
        };

        let gj = feature.to_geojson();
        assert_eq!(gj["type"], "Feature");
        assert_eq!(gj["geometry"]["type"], "Point");
        assert_eq!(gj["properties"]["name"], "station");
    }
}
