use std::str::FromStr;

use anyhow::{Context, Error};
use serde::Deserialize;
use serde_json::json;
use serde_with::DeserializeFromStr;

use super::Business;
use crate::{
    feature::{Feature, Properties},
    utils::{first_number, slug},
};

/// A `LOC` cell such as `"A12"`, reduced to its first run of digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, DeserializeFromStr)]
pub struct LocCode(pub u32);

impl FromStr for LocCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        first_number(s)
            .map(Self)
            .with_context(|| format!("no number in LOC {s:?}"))
    }
}

/// One row of a business export.
#[derive(Debug, Deserialize)]
pub struct BusinessRow {
    #[serde(rename = "Business")]
    pub business: String,
    #[serde(rename = "Address")]
    pub address: String,
    #[serde(rename = "Town")]
    pub town: String,
    #[serde(rename = "Category")]
    pub category: String,
    #[serde(rename = "DL Info")]
    pub info: String,
    #[serde(rename = "LOC")]
    pub loc: LocCode,
    #[serde(rename = "Phone", default)]
    pub phone: String,
    #[serde(rename = "Shoppers Discount", default)]
    pub discount: String,
    #[serde(rename = "Exp.", default)]
    pub exp: String,
    #[serde(rename = "Website", default)]
    pub website: String,
}

/// One row of the map location cross-reference.
#[derive(Debug, Deserialize)]
pub struct LocRow {
    #[serde(rename = "LOC")]
    pub loc: LocCode,
    #[serde(rename = "Business")]
    pub business: String,
    #[serde(rename = "Phone", default)]
    pub phone: String,
    #[serde(rename = "Address", default)]
    pub address: String,
}

impl Business {
    /// Keyed by the slug of the business name, which is also kept as `mapname`.
    pub fn from_row(row: &BusinessRow) -> Self {
        let mut properties = Properties::from_iter([
            ("id".to_string(), json!(slug(&row.business))),
            ("address".to_string(), json!(row.address)),
            ("town".to_string(), json!(row.town)),
            ("business".to_string(), json!(row.category)),
            ("info".to_string(), json!(row.info)),
            ("mapname".to_string(), json!(row.business)),
            ("loc".to_string(), json!(row.loc.0)),
        ]);

        let optional = [
            ("phone", &row.phone),
            ("discount", &row.discount),
            ("exp", &row.exp),
        ];
        for (key, value) in optional {
            if !value.is_empty() {
                properties.insert(key.to_string(), json!(value));
            }
        }
        if !row.website.is_empty() {
            let (key, url) = website(&row.website);
            properties.insert(key.to_string(), json!(url));
        }

        Self(Feature::new(Some(properties), None))
    }
}

/// Classifies a free-text website cell into the property it belongs in.
pub fn website(text: &str) -> (&'static str, String) {
    if text.contains("IG @") {
        let handle = text.replace("IG @", "");
        ("instagram", format!("https://www.instagram.com/{}/", handle.trim()))
    } else if text.contains("FB @") {
        let handle = text.replace("FB @", "");
        ("facebook", format!("https://www.facebook.com/{}", handle.trim()))
    } else if !text.contains("http") {
        ("web", format!("http://{text}"))
    } else {
        ("web", text.to_string())
    }
}
