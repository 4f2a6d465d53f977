//! TileJSON-style tileset descriptor.

use std::sync::Arc;

use axum::{extract::Path, Extension, Json};
use serde_json::{json, Value};

use storage::{Tileset, TilesetKind};

use crate::error::ApiResult;
use crate::state::AppState;
use crate::validation::parse_uuid;

pub async fn tilejson_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(tileset_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let id = parse_uuid(&tileset_id, "tileset_id")?;
    let tileset = state.catalog.get_tileset(id).await?;

    // Vector tilesets advertise their layers and property keys so
    // clients can build styles without fetching tiles first.
    let mut vector_layers: Vec<(String, Vec<String>)> = Vec::new();
    if tileset.kind == TilesetKind::Vector {
        for layer in state.catalog.list_layers(id).await? {
            let fields = state.catalog.layer_field_hints(id, &layer).await?;
            vector_layers.push((layer, fields));
        }
    }

    Ok(Json(build_tilejson(&tileset, &vector_layers)))
}

/// Assemble the descriptor document.
pub fn build_tilejson(tileset: &Tileset, vector_layers: &[(String, Vec<String>)]) -> Value {
    let base_url =
        std::env::var("PUBLIC_BASE_URL").unwrap_or_else(|_| String::new());
    let template = format!(
        "{}/tiles/{}/{{z}}/{{x}}/{{y}}.{}",
        base_url, tileset.id, tileset.format
    );

    let mut doc = json!({
        "tilejson": "3.0.0",
        "name": tileset.name,
        "tiles": [template],
        "minzoom": tileset.min_zoom,
        "maxzoom": tileset.max_zoom,
    });

    if let Some(bounds) = &tileset.bounds {
        doc["bounds"] = json!(bounds.to_array());
    }
    if let Some(center) = &tileset.center {
        doc["center"] = json!(center);
    }

    if tileset.kind == TilesetKind::Vector {
        let layers: Vec<Value> = vector_layers
            .iter()
            .map(|(layer, fields)| {
                let field_map: serde_json::Map<String, Value> = fields
                    .iter()
                    .map(|f| (f.clone(), Value::String("String".into())))
                    .collect();
                json!({
                    "id": layer,
                    "fields": field_map,
                    "minzoom": tileset.min_zoom,
                    "maxzoom": tileset.max_zoom,
                })
            })
            .collect();
        doc["vector_layers"] = json!(layers);
    }

    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use tile_common::BoundingBox;
    use uuid::Uuid;

    fn vector_tileset() -> Tileset {
        Tileset {
            id: Uuid::nil(),
            name: "transit".into(),
            kind: TilesetKind::Vector,
            format: "pbf".into(),
            min_zoom: 2,
            max_zoom: 14,
            bounds: Some(BoundingBox::new(139.5, 35.5, 140.0, 36.0)),
            center: Some([139.75, 35.75, 10.0]),
            public: true,
            metadata: Value::Null,
        }
    }

    #[test]
    fn test_build_tilejson_vector() {
        let layers = vec![
            ("stations".to_string(), vec!["name".to_string(), "line".to_string()]),
            ("routes".to_string(), vec![]),
        ];
        let doc = build_tilejson(&vector_tileset(), &layers);

        assert_eq!(doc["tilejson"], "3.0.0");
        assert_eq!(doc["minzoom"], 2);
        assert_eq!(doc["maxzoom"], 14);
        assert!(doc["tiles"][0]
            .as_str()
            .unwrap()
            .ends_with("/{z}/{x}/{y}.pbf"));
        assert_eq!(doc["bounds"][0], 139.5);
        assert_eq!(doc["vector_layers"][0]["id"], "stations");
        assert_eq!(doc["vector_layers"][0]["fields"]["name"], "String");
    }

    #[test]
    fn test_build_tilejson_raster_has_no_vector_layers() {
        let tileset = Tileset {
            kind: TilesetKind::Raster,
            format: "png".into(),
            ..vector_tileset()
        };
        let doc = build_tilejson(&tileset, &[]);
        assert!(doc.get("vector_layers").is_none());
        assert!(doc["tiles"][0].as_str().unwrap().ends_with(".png"));
    }
}
