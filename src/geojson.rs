use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, ser::PrettyFormatter, Serializer, Value};

use crate::{feature::Properties, geometry::Geometry};

pub const CRS84: &str = "urn:ogc:def:crs:OGC:1.3:CRS84";

#[derive(Debug, Deserialize, Serialize)]
pub struct FeatureCollection {
    #[serde(rename = "type", default = "collection_type")]
    pub kind: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "crs84")]
    pub crs: Value,
    #[serde(default)]
    pub features: Vec<GeoFeature>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeoFeature {
    #[serde(rename = "type", default = "feature_type")]
    pub kind: String,
    #[serde(default)]
    pub properties: Option<Properties>,
    #[serde(default)]
    pub geometry: Option<Geometry>,
}

fn collection_type() -> String {
    "FeatureCollection".to_string()
}

fn feature_type() -> String {
    "Feature".to_string()
}

fn crs84() -> Value {
    json!({
        "type": "name",
        "properties": { "name": CRS84 },
    })
}

impl FeatureCollection {
    pub fn new(name: &str, features: Vec<GeoFeature>) -> Self {
        Self {
            kind: collection_type(),
            name: Some(name.to_string()),
            crs: crs84(),
            features,
        }
    }
}

impl GeoFeature {
    pub fn new(properties: Option<Properties>, geometry: Option<Geometry>) -> Self {
        Self {
            kind: feature_type(),
            properties,
            geometry,
        }
    }
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("failed to parse {}", path.display()))
}

pub fn read(path: &Path) -> Result<FeatureCollection> {
    read_json(path)
}

/// Four space indented, non-ASCII written as-is.
pub fn write(path: &Path, collection: &FeatureCollection) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    to_writer(&mut writer, collection)?;
    writer.flush()?;
    Ok(())
}

pub fn to_writer<W: Write>(writer: &mut W, collection: &FeatureCollection) -> Result<()> {
    let mut serializer = Serializer::with_formatter(&mut *writer, PrettyFormatter::with_indent(b"    "));
    collection.serialize(&mut serializer)?;
    writer.write_all(b"\n")?;
    Ok(())
}
