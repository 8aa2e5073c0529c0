use std::env;

use anyhow::{Context, Result};
use geo::Point;
use serde::Deserialize;
use serde_json::Value;
use ureq::Agent;

pub const GEOAPIFY_URL: &str = "https://api.geoapify.com/v1/geocode/search";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeocodeMatch {
    pub formatted: String,
    pub point: Option<Point>,
}

/// Free-text address lookup. No match is `Ok` with an empty address and no point;
/// `Err` is reserved for transport and service failures.
pub trait Geocoder {
    fn geocode(&self, text: &str) -> Result<GeocodeMatch>;
}

pub struct Geoapify {
    agent: Agent,
    url: String,
    api_key: String,
}

impl Geoapify {
    pub fn new(agent: Agent, url: &str, api_key: &str) -> Self {
        Self {
            agent,
            url: url.to_string(),
            api_key: api_key.to_string(),
        }
    }

    pub fn from_env(agent: Agent, url: &str, api_key_env: &str) -> Result<Self> {
        let api_key = env::var(api_key_env)
            .with_context(|| format!("{api_key_env} must be set to geocode"))?;
        Ok(Self::new(agent, url, &api_key))
    }
}

impl Geocoder for Geoapify {
    fn geocode(&self, text: &str) -> Result<GeocodeMatch> {
        let response: Response = self
            .agent
            .get(&self.url)
            .set("Accept", "application/json")
            .query("text", text.trim())
            .query("apiKey", &self.api_key)
            .call()?
            .into_json()?;
        Ok(response.first_match())
    }
}

#[derive(Deserialize)]
struct Response {
    #[serde(default)]
    features: Vec<ResponseFeature>,
}

#[derive(Deserialize)]
struct ResponseFeature {
    #[serde(default)]
    properties: ResponseProperties,
    geometry: Option<ResponseGeometry>,
}

#[derive(Default, Deserialize)]
struct ResponseProperties {
    #[serde(default)]
    formatted: String,
}

#[derive(Deserialize)]
struct ResponseGeometry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    coordinates: Value,
}

impl Response {
    // the service ranks its results, ambiguous addresses just take the top one
    fn first_match(self) -> GeocodeMatch {
        let Some(x) = self.features.into_iter().next() else {
            return GeocodeMatch::default();
        };
        let point = x.geometry.and_then(|x| {
            if x.kind != "Point" {
                return None;
            }
            let position = x.coordinates.as_array()?;
            Some(Point::new(
                position.first()?.as_f64()?,
                position.get(1)?.as_f64()?,
            ))
        });
        GeocodeMatch {
            formatted: x.properties.formatted,
            point,
        }
    }
}
