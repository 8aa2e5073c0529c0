use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::geocode::GEOAPIFY_URL;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub census: PathBuf,
    pub categories: PathBuf,
    #[serde(default = "data_folder")]
    pub data_folder: String,
    #[serde(default)]
    pub geocoder: GeocoderConfig,
    #[serde(default)]
    pub sources: Vec<DataSource>,
    #[serde(default)]
    pub corrections: Vec<Corrections>,
    pub locations: Option<LocationsConfig>,
}

#[derive(Debug, Deserialize)]
pub struct GeocoderConfig {
    #[serde(default = "api_key_env")]
    pub api_key_env: String,
    #[serde(default = "geocoder_url")]
    pub url: String,
}

/// A business map built from either a listing page or a CSV export.
#[derive(Debug, Deserialize)]
pub struct DataSource {
    pub name: String,
    pub geojson: PathBuf,
    pub url: Option<String>,
    pub csv: Option<PathBuf>,
    #[serde(default = "business_root")]
    pub root: String,
    #[serde(default = "business_target")]
    pub target: String,
}

/// Out-of-band fixes applied to an already built map.
#[derive(Debug, Deserialize)]
pub struct Corrections {
    pub filename: PathBuf,
    pub corrections: Option<PathBuf>,
    pub csv: Option<PathBuf>,
    pub img: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LocationsConfig {
    pub name: String,
    pub output: PathBuf,
    pub pages: Vec<String>,
    #[serde(default = "location_root")]
    pub root: String,
    #[serde(default = "location_target")]
    pub target: String,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            api_key_env: api_key_env(),
            url: geocoder_url(),
        }
    }
}

fn data_folder() -> String {
    "data".to_string()
}

fn api_key_env() -> String {
    "GEOAPIFY_API_KEY".to_string()
}

fn geocoder_url() -> String {
    GEOAPIFY_URL.to_string()
}

fn business_root() -> String {
    "body".to_string()
}

fn business_target() -> String {
    "div.gear".to_string()
}

fn location_root() -> String {
    "div.content".to_string()
}

fn location_target() -> String {
    "article".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_yaml::from_str(&data)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }
}
