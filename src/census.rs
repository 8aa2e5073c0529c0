use std::path::Path;

use anyhow::Result;

use crate::{
    geojson::{self, FeatureCollection},
    geometry::Geometry,
};

#[derive(Debug, Clone)]
pub struct Place {
    pub name: String,
    pub geometry: Option<Geometry>,
}

/// Read-only town polygons, in document order.
#[derive(Debug, Default)]
pub struct Census {
    places: Vec<Place>,
}

impl Census {
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::from(geojson::read(path)?))
    }

    pub fn places(&self) -> &[Place] {
        &self.places
    }

    /// First place whose `NAME` contains `name`.
    pub fn find(&self, name: &str) -> Option<&Place> {
        self.places.iter().find(|x| x.name.contains(name))
    }
}

impl From<FeatureCollection> for Census {
    fn from(collection: FeatureCollection) -> Self {
        let places = collection
            .features
            .into_iter()
            .filter_map(|x| {
                let name = x.properties?.get("NAME")?.as_str()?.to_string();
                Some(Place {
                    name,
                    geometry: x.geometry,
                })
            })
            .collect();
        Self { places }
    }
}
