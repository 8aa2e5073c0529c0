use std::sync::OnceLock;

use regex::Regex;
use scraper::ElementRef;
use serde_json::json;

use crate::{
    census::Census,
    feature::{Feature, Properties, Record},
    fetch::{selector, stripped_strings},
    geometry::{bounding_box, Geometry, GeometryError},
    utils::title_case,
};

const INTERACTIVE_MARKER: &str = "interactive map";

/// A named map page. Geometry stays unset until matched against the census.
#[derive(Debug, Clone, PartialEq)]
pub struct Location(Feature);

impl Record for Location {
    fn from_feature(feature: Feature) -> Self {
        Self(feature)
    }

    fn feature(&self) -> &Feature {
        &self.0
    }

    fn feature_mut(&mut self) -> &mut Feature {
        &mut self.0
    }
}

impl Location {
    /// Reads one listing entry. `None` if it has no map link.
    pub fn from_listing(node: ElementRef, data_folder: &str) -> Option<Self> {
        let anchor = selector("div a").ok()?;
        let url = node.select(&anchor).next()?.value().attr("href")?;

        let file = url.rsplit('/').next().unwrap_or(url);
        let file = file.split('.').next().unwrap_or(file);
        let (slug, year) = split_year(file);

        let interactive = stripped_strings(node)
            .any(|x| x.to_lowercase().contains(INTERACTIVE_MARKER));

        let properties = Properties::from_iter([
            ("name".to_string(), json!(title_case(&slug.replace('-', " ")))),
            ("data".to_string(), json!(format!("{data_folder}/{slug}.geojson"))),
            ("source".to_string(), json!(url)),
            ("interactive".to_string(), json!(interactive)),
            ("year".to_string(), json!(year)),
        ]);
        Some(Self(Feature::new(Some(properties), None)))
    }

    pub fn name(&self) -> &str {
        self.0.get_str("name").unwrap_or_default()
    }

    pub fn year(&self) -> u64 {
        self.0.get("year").and_then(|x| x.as_u64()).unwrap_or(0)
    }

    /// Replaces geometry with the bounding box of the first census place whose name
    /// contains this location's name. No match leaves geometry unset.
    pub fn bounding_box(&mut self, census: &Census) -> Result<bool, GeometryError> {
        let Some(geometry) = self.census_geometry(census) else {
            return Ok(false);
        };
        self.0.geometry = Some(bounding_box(geometry)?);
        Ok(true)
    }

    /// Like [`Location::bounding_box`] but adopts the whole place polygon.
    pub fn match_geometry(&mut self, census: &Census) -> bool {
        let Some(geometry) = self.census_geometry(census).cloned() else {
            return false;
        };
        self.0.geometry = Some(geometry);
        true
    }

    fn census_geometry<'a>(&self, census: &'a Census) -> Option<&'a Geometry> {
        census.find(self.name())?.geometry.as_ref()
    }
}

/// Splits a trailing `-YYYY` segment off a slug.
fn split_year(file: &str) -> (String, u64) {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^\d{4}").expect("hardcoded"));

    let (head, last) = match file.rsplit_once('-') {
        Some((head, last)) => (head, last),
        None => ("", file),
    };
    match re.find(last).and_then(|x| x.as_str().parse().ok()) {
        Some(year) => (head.to_string(), year),
        None => (file.to_string(), 0),
    }
}
