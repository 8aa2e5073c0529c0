use std::{collections::HashMap, path::Path};

use anyhow::Result;
use serde::Deserialize;

use crate::geojson::read_json;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Category {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub subcategory: String,
}

/// Raw business labels mapped to their normalised category.
pub type Taxonomy = HashMap<String, Category>;

pub fn load(path: &Path) -> Result<Taxonomy> {
    read_json(path)
}
