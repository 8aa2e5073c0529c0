use anyhow::Result;
use itertools::Itertools;

use super::category::Taxonomy;
use crate::{
    census::Census,
    feature::{Feature, Record},
    geocode::Geocoder,
    geometry::{address_suffix, point_geometry, STREET_TYPES},
};

/// A business on a map. Geometry is either unset or the geocoded point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Business(pub(super) Feature);

impl Record for Business {
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

impl From<Business> for Feature {
    fn from(x: Business) -> Self {
        x.0
    }
}

impl Business {
    pub fn id(&self) -> Option<&str> {
        self.0.id()
    }

    /// Sets `category`/`subcategory` from the taxonomy entry keyed by the raw
    /// `business` label, or empty strings when there is none.
    pub fn match_category(&mut self, taxonomy: &Taxonomy) {
        let (category, subcategory) = self
            .0
            .get_str("business")
            .and_then(|x| taxonomy.get(x))
            .map(|x| (x.category.clone(), x.subcategory.clone()))
            .unwrap_or_default();
        self.0.set("category", category);
        self.0.set("subcategory", subcategory);
    }

    /// Fills a missing `town` from the census place named after the street type in
    /// `address`. When several places match, the last one in census order wins.
    pub fn match_town(&mut self, census: &Census) -> bool {
        if self.0.contains("town") {
            return false;
        }
        let Some(address) = self.0.get_str("address") else {
            return false;
        };

        let suffix = address_suffix(address, &STREET_TYPES);
        let mut town = None;
        for place in census.places() {
            if suffix.contains(&place.name) {
                town = Some(place.name.clone());
            }
        }

        match town {
            Some(x) => {
                self.0.set("town", x);
                true
            }
            None => false,
        }
    }

    /// Geocodes `address` in the record's town, falling back to the town of
    /// `default_context` (`"Town,State"`), whose state is always used. Returns
    /// whether a point was found; without one the geometry is left as it was.
    pub fn geocode(&mut self, geocoder: &dyn Geocoder, default_context: &str) -> Result<bool> {
        let Some(query) = self.geocode_query(default_context) else {
            return Ok(false);
        };

        let result = geocoder.geocode(&query)?;
        self.0.set("address_formatted", result.formatted);
        match result.point {
            Some(x) => {
                self.0.geometry = Some(point_geometry(x));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn geocode_query(&self, default_context: &str) -> Option<String> {
        let address = self.0.get_str("address")?;
        let (town, state) = default_context
            .split_once(',')
            .unwrap_or((default_context, ""));
        let town = self.0.get_str("town").unwrap_or(town);

        let address = address
            .replace('#', "No.")
            .replace('&', "and")
            .replace('\'', "");
        let query = [address.trim(), town.trim(), state.trim()]
            .into_iter()
            .filter(|x| !x.is_empty())
            .join(" ");
        Some(query)
    }
}
