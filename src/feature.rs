use serde_json::{Map, Number, Value};

use crate::{geojson::GeoFeature, geometry::Geometry};

pub type Properties = Map<String, Value>;

/// One GeoJSON feature. Either side may be absent, which serializes as `null`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Feature {
    pub properties: Option<Properties>,
    pub geometry: Option<Geometry>,
}

impl Feature {
    pub fn new(properties: Option<Properties>, geometry: Option<Geometry>) -> Self {
        Self {
            properties,
            geometry,
        }
    }

    /// Shallow merge: incoming keys overwrite, missing keys are kept. An absent or
    /// empty side leaves the existing side untouched.
    pub fn update(&mut self, properties: Option<Properties>, geometry: Option<Geometry>) {
        merge(&mut self.properties, properties);
        merge(&mut self.geometry, geometry);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.as_ref()?.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_str()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.properties
            .get_or_insert_with(Properties::new)
            .insert(key.to_string(), value.into());
    }

    pub fn id(&self) -> Option<&str> {
        self.get_str("id")
    }

    /// Property value as a lookup key. Empty strings, zero, `null`, `false` and
    /// containers never produce a key.
    pub fn key(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(x) if !x.is_empty() => Some(x.clone()),
            Value::Number(x) if x.as_f64() != Some(0.0) => Some(number_key(x)),
            _ => None,
        }
    }

    pub fn to_geojson(&self) -> GeoFeature {
        GeoFeature::new(self.properties.clone(), self.geometry.clone())
    }
}

/// Whole floats key the same as integers, so `12.0` matches `12`.
fn number_key(number: &Number) -> String {
    match number.as_f64() {
        Some(x) if number.is_f64() && x.fract() == 0.0 && x.abs() < 1e15 => {
            format!("{}", x as i64)
        }
        _ => number.to_string(),
    }
}

fn merge(existing: &mut Option<Map<String, Value>>, incoming: Option<Map<String, Value>>) {
    let Some(incoming) = incoming.filter(|x| !x.is_empty()) else {
        return;
    };
    match existing {
        Some(x) if !x.is_empty() => x.extend(incoming),
        _ => *existing = Some(incoming),
    }
}

impl From<GeoFeature> for Feature {
    fn from(x: GeoFeature) -> Self {
        Self::new(x.properties, x.geometry)
    }
}

/// A directory entry: a [`Feature`] plus whatever extraction logic the record kind adds.
pub trait Record {
    fn from_feature(feature: Feature) -> Self;
    fn feature(&self) -> &Feature;
    fn feature_mut(&mut self) -> &mut Feature;
}

impl Record for Feature {
    fn from_feature(feature: Feature) -> Self {
        feature
    }

    fn feature(&self) -> &Feature {
        self
    }

    fn feature_mut(&mut self) -> &mut Feature {
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(x) => x,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn update_overwrites_and_keeps() {
        let mut feature = Feature::new(Some(map(json!({"id": "a", "loc": 1}))), None);
        feature.update(Some(map(json!({"loc": 2, "town": "Babylon"}))), None);
        assert_eq!(
            feature.properties,
            Some(map(json!({"id": "a", "loc": 2, "town": "Babylon"})))
        );
        assert_eq!(feature.geometry, None);
    }

    #[test]
    fn update_adopts_when_absent() {
        let mut feature = Feature::default();
        feature.update(
            Some(map(json!({"id": "a"}))),
            Some(map(json!({"type": "Point", "coordinates": [1.0, 2.0]}))),
        );
        assert_eq!(feature.id(), Some("a"));
        assert_eq!(
            feature.geometry,
            Some(map(json!({"type": "Point", "coordinates": [1.0, 2.0]})))
        );
    }

    #[test]
    fn update_ignores_empty() {
        let mut feature = Feature::new(Some(map(json!({"id": "a"}))), None);
        feature.update(Some(Map::new()), Some(Map::new()));
        feature.update(None, None);
        assert_eq!(feature.properties, Some(map(json!({"id": "a"}))));
        assert_eq!(feature.geometry, None);
    }

    #[test]
    fn update_is_idempotent() {
        let update = map(json!({"town": "Babylon", "loc": 3}));
        let mut once = Feature::new(Some(map(json!({"id": "a", "loc": 1}))), None);
        once.update(Some(update.clone()), None);
        let mut twice = once.clone();
        twice.update(Some(update), None);
        assert_eq!(once, twice);
    }

    #[test]
    fn lookup_keys() {
        let feature = Feature::new(
            Some(map(json!({"name": "Deli", "phone": "", "loc": 12, "none": 0, "n": null}))),
            None,
        );
        assert_eq!(feature.key("name").as_deref(), Some("Deli"));
        assert_eq!(feature.key("loc").as_deref(), Some("12"));
        assert_eq!(feature.key("phone"), None);
        assert_eq!(feature.key("none"), None);
        assert_eq!(feature.key("n"), None);
        assert_eq!(feature.key("missing"), None);

        let feature = Feature::new(Some(map(json!({"loc": 12.0, "half": 2.5, "big": 7u64}))), None);
        assert_eq!(feature.key("loc").as_deref(), Some("12"));
        assert_eq!(feature.key("half").as_deref(), Some("2.5"));
        assert_eq!(feature.key("big").as_deref(), Some("7"));
    }

    #[test]
    fn serializes_nulls() {
        let value = serde_json::to_value(Feature::default().to_geojson()).unwrap();
        assert_eq!(
            value,
            json!({"type": "Feature", "properties": null, "geometry": null})
        );
    }
}
