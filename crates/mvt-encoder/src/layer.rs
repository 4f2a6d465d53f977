//! Layer and tile assembly with deduplicated property dictionaries.

use std::collections::HashMap;

use serde_json::Value;

use crate::proto;
use crate::EXTENT;

/// Geometry type tag carried on each feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeomType {
    Point = 1,
    LineString = 2,
    Polygon = 3,
}

/// A property value in the layer's value table.
#[derive(Debug, Clone, PartialEq)]
pub enum MvtValue {
    Str(String),
    Double(f64),
    Int(i64),
    Uint(u64),
    Bool(bool),
}

impl MvtValue {
    /// Convert a JSON property value. Nested arrays/objects are kept
    /// as their JSON text; nulls are dropped by the caller.
    pub fn from_json(value: &Value) -> Option<MvtValue> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(MvtValue::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(MvtValue::Int(i))
                } else if let Some(u) = n.as_u64() {
                    Some(MvtValue::Uint(u))
                } else {
                    n.as_f64().map(MvtValue::Double)
                }
            }
            Value::String(s) => Some(MvtValue::Str(s.clone())),
            other => Some(MvtValue::Str(other.to_string())),
        }
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            MvtValue::Str(s) => proto::write_string(&mut out, 1, s),
            MvtValue::Double(d) => proto::write_double(&mut out, 3, *d),
            MvtValue::Int(i) => proto::write_uint64(&mut out, 4, *i as u64),
            MvtValue::Uint(u) => proto::write_uint64(&mut out, 5, *u),
            MvtValue::Bool(b) => proto::write_bool(&mut out, 7, *b),
        }
        out
    }

    /// Stable text form used as the dedup map key.
    fn dedup_key(&self) -> String {
        format!("{:?}", self)
    }
}

/// Builds one named layer: features plus the shared key/value tables.
///
/// Identical `(key, value)` pairs across features share one dictionary
/// entry; indices are assigned in first-seen order so the layer bytes
/// are deterministic for a given feature sequence.
pub struct LayerBuilder {
    name: String,
    features: Vec<Vec<u8>>,
    keys: Vec<String>,
    key_index: HashMap<String, u32>,
    values: Vec<MvtValue>,
    value_index: HashMap<String, u32>,
}

impl LayerBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            features: Vec::new(),
            keys: Vec::new(),
            key_index: HashMap::new(),
            values: Vec::new(),
            value_index: HashMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    fn key_id(&mut self, key: &str) -> u32 {
        if let Some(&idx) = self.key_index.get(key) {
            return idx;
        }
        let idx = self.keys.len() as u32;
        self.keys.push(key.to_string());
        self.key_index.insert(key.to_string(), idx);
        idx
    }

    fn value_id(&mut self, value: &MvtValue) -> u32 {
        let dedup = value.dedup_key();
        if let Some(&idx) = self.value_index.get(&dedup) {
            return idx;
        }
        let idx = self.values.len() as u32;
        self.values.push(value.clone());
        self.value_index.insert(dedup, idx);
        idx
    }

    /// Add an encoded feature with its property tags.
    pub fn add_feature(
        &mut self,
        id: Option<u64>,
        geom_type: GeomType,
        commands: &[u32],
        properties: &[(String, MvtValue)],
    ) {
        if commands.is_empty() {
            return;
        }

        let mut tags = Vec::with_capacity(properties.len() * 2);
        for (key, value) in properties {
            tags.push(self.key_id(key));
            tags.push(self.value_id(value));
        }

        let mut feature = Vec::new();
        if let Some(id) = id {
            proto::write_uint64(&mut feature, 1, id);
        }
        proto::write_packed_u32(&mut feature, 2, &tags);
        proto::write_uint64(&mut feature, 3, geom_type as u64);
        proto::write_packed_u32(&mut feature, 4, commands);

        self.features.push(feature);
    }

    /// Serialize the layer message.
    pub fn build(self) -> Vec<u8> {
        let mut out = Vec::new();
        proto::write_string(&mut out, 1, &self.name);
        for feature in &self.features {
            proto::write_bytes(&mut out, 2, feature);
        }
        for key in &self.keys {
            proto::write_string(&mut out, 3, key);
        }
        for value in &self.values {
            proto::write_bytes(&mut out, 4, &value.encode());
        }
        proto::write_uint64(&mut out, 5, EXTENT as u64);
        proto::write_uint64(&mut out, 15, 2); // layer version
        out
    }
}

/// Assembles layers into the final tile message.
#[derive(Default)]
pub struct TileBuilder {
    layers: Vec<Vec<u8>>,
}

impl TileBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_layer(&mut self, layer: LayerBuilder) {
        if !layer.is_empty() {
            self.layers.push(layer.build());
        }
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = Vec::new();
        for layer in &self.layers {
            proto::write_bytes(&mut out, 3, layer);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_conversion() {
        assert_eq!(
            MvtValue::from_json(&serde_json::json!("a")),
            Some(MvtValue::Str("a".into()))
        );
        assert_eq!(
            MvtValue::from_json(&serde_json::json!(42)),
            Some(MvtValue::Int(42))
        );
        assert_eq!(
            MvtValue::from_json(&serde_json::json!(1.5)),
            Some(MvtValue::Double(1.5))
        );
        assert_eq!(
            MvtValue::from_json(&serde_json::json!(true)),
            Some(MvtValue::Bool(true))
        );
        assert_eq!(MvtValue::from_json(&Value::Null), None);
        // Nested values are carried as JSON text
        assert_eq!(
            MvtValue::from_json(&serde_json::json!({"a": 1})),
            Some(MvtValue::Str("{\"a\":1}".into()))
        );
    }

    #[test]
    fn test_key_value_deduplication() {
        let mut layer = LayerBuilder::new("poi");
        let commands = vec![9, 0, 0];

        layer.add_feature(
            Some(1),
            GeomType::Point,
            &commands,
            &[("kind".into(), MvtValue::Str("cafe".into()))],
        );
        layer.add_feature(
            Some(2),
            GeomType::Point,
            &commands,
            &[("kind".into(), MvtValue::Str("cafe".into()))],
        );
        layer.add_feature(
            Some(3),
            GeomType::Point,
            &commands,
            &[("kind".into(), MvtValue::Str("bar".into()))],
        );

        assert_eq!(layer.keys.len(), 1);
        assert_eq!(layer.values.len(), 2);
        assert_eq!(layer.feature_count(), 3);
    }

    #[test]
    fn test_distinct_types_not_conflated() {
        let mut layer = LayerBuilder::new("t");
        let commands = vec![9, 0, 0];
        layer.add_feature(
            None,
            GeomType::Point,
            &commands,
            &[
                ("a".into(), MvtValue::Int(1)),
                ("b".into(), MvtValue::Uint(1)),
                ("c".into(), MvtValue::Str("1".into())),
            ],
        );
        assert_eq!(layer.values.len(), 3);
    }

    #[test]
    fn test_empty_feature_is_dropped() {
        let mut layer = LayerBuilder::new("t");
        layer.add_feature(None, GeomType::Point, &[], &[]);
        assert!(layer.is_empty());
    }

    #[test]
    fn test_layer_bytes_are_deterministic() {
        let build = || {
            let mut layer = LayerBuilder::new("roads");
            layer.add_feature(
                Some(1),
                GeomType::LineString,
                &[9, 4, 4, 10, 2, 2],
                &[("class".into(), MvtValue::Str("primary".into()))],
            );
            layer.build()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn test_empty_layer_omitted_from_tile() {
        let mut tile = TileBuilder::new();
        tile.add_layer(LayerBuilder::new("empty"));
        assert!(tile.build().is_empty());
    }
}
