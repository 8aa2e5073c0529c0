use scraper::{ElementRef, Selector};
use serde_json::json;

use super::Business;
use crate::{
    feature::{Feature, Properties},
    fetch::stripped_strings,
    utils::collapse_whitespace,
};

/// Later tags overwrite earlier ones, so headings win over paragraphs.
const TARGET_TAGS: [&str; 2] = ["p", "h3"];

impl Business {
    /// Reads a listing fragment keyed by its `id` attribute. `None` without one.
    pub fn from_fragment(node: ElementRef) -> Option<Self> {
        let id = node.value().attr("id")?;
        let mut business = Self(Feature::default());
        business.load_fragment(node, id);
        Some(business)
    }

    fn load_fragment(&mut self, node: ElementRef, id: &str) {
        let mut properties = Properties::new();
        properties.insert("id".to_string(), json!(id));

        for tag in TARGET_TAGS {
            let Ok(selector) = Selector::parse(tag) else {
                continue;
            };
            for element in node.select(&selector) {
                if let Some((attribute, data)) = tag_data(element) {
                    properties.insert(attribute, json!(data));
                }
            }
            self.0.update(Some(properties.clone()), None);
        }
    }
}

/// Property name and value for one classed tag, or `None` when it carries nothing.
fn tag_data(element: ElementRef) -> Option<(String, String)> {
    // document order, `classes()` comes back sorted
    let class = element
        .value()
        .attr("class")?
        .split_whitespace()
        .next()?
        .to_lowercase();

    let (attribute, data) = match class.as_str() {
        "web" | "email" => {
            let link = element
                .select(&Selector::parse("a").ok()?)
                .next()?
                .value()
                .attr("href")
                .filter(|x| *x != "#")?
                .replace("mailto:", "");
            let attribute = if link.contains("facebook.com") {
                "facebook".to_string()
            } else if link.contains("instagram.com") {
                "instagram".to_string()
            } else {
                class
            };
            (attribute, link)
        }
        "category" => ("business".to_string(), clean_text(element)),
        _ => (class, clean_text(element)),
    };

    (!data.is_empty()).then_some((attribute, data))
}

/// Tag text with any `Label:` prefix dropped and whitespace collapsed.
fn clean_text(element: ElementRef) -> String {
    let text = stripped_strings(element).collect::<Vec<_>>().join(" ");
    let text = text.rsplit(':').next().unwrap_or_default();
    collapse_whitespace(text)
}
