use anyhow::{Context, Result};
use indicatif::ProgressIterator;
use scraper::{ElementRef, Selector};
use tracing::{info, warn};

use crate::{
    census::Census,
    config::{Config, LocationsConfig},
    directory::Directory,
    feature::Record,
    fetch,
    utils::{agent, progress_style},
};

use self::location::Location;

mod location;

pub fn main(config: &Config, outline: bool) -> Result<()> {
    let Some(locations) = &config.locations else {
        info!("No location pages configured");
        return Ok(());
    };
    let census = Census::load(&config.census)?;
    let mut directory = Directory::new(&locations.name);
    scrape_pages(&mut directory, locations, &config.data_folder)?;
    if directory.is_empty() {
        warn!("No locations found on {} pages", locations.pages.len());
    }
    process(&mut directory, &census, outline)?;
    directory.save_geojson(&locations.output)?;
    info!(
        "Saved {} locations to {}",
        directory.len(),
        locations.output.display()
    );
    Ok(())
}

fn scrape_pages(
    directory: &mut Directory<Location>,
    config: &LocationsConfig,
    data_folder: &str,
) -> Result<()> {
    let agent = agent();
    let target = fetch::selector(&config.target)?;
    for url in config.pages.iter().progress_with_style(progress_style()) {
        info!("Processing: {url}");
        let document = fetch::document(&agent, url)?;
        let root = fetch::root(&document, &config.root)?;
        add_listings(directory, root, &target, data_folder);
    }
    Ok(())
}

/// Adds every listing under `root`, keyed by name. A name already present is only
/// replaced by a listing with a later year.
pub fn add_listings(
    directory: &mut Directory<Location>,
    root: ElementRef,
    target: &Selector,
    data_folder: &str,
) -> usize {
    let mut added = 0;
    for node in root.select(target) {
        let Some(location) = Location::from_listing(node, data_folder) else {
            warn!("Skipping listing without a map link");
            continue;
        };
        let name = location.name().to_string();
        let newer = directory
            .get(&name)
            .map_or(true, |x| location.year() > x.year());
        if newer {
            info!("  {name}");
            directory.insert(name, location);
            added += 1;
        }
    }
    added
}

pub fn process(directory: &mut Directory<Location>, census: &Census, outline: bool) -> Result<()> {
    for location in directory.values_mut() {
        let matched = if outline {
            location.match_geometry(census)
        } else {
            location
                .bounding_box(census)
                .with_context(|| format!("bounding box for {}", location.name()))?
        };
        if !matched {
            info!("No census place for {}", location.name());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use scraper::Html;
    use serde_json::json;

    use super::*;
    use crate::census::tests::census;

    const PAGE: &str = r#"
        <html><body><div class="content">
            <article><div><a href="north-babylon-2023.html">2023</a></div></article>
            <article><div><a href="north-babylon-2024.html">2024</a></div><p>Interactive map</p></article>
            <article><div><a href="north-babylon-2022.html">2022</a></div></article>
            <article><div>Coming soon</div></article>
            <article><div><a href="hicksville.html">Hicksville</a></div></article>
        </div></body></html>
    "#;

    fn scrape() -> Directory<Location> {
        let document = Html::parse_document(PAGE);
        let root = fetch::root(&document, "div.content").unwrap();
        let mut directory = Directory::new("Maps");
        add_listings(
            &mut directory,
            root,
            &fetch::selector("article").unwrap(),
            "data",
        );
        directory
    }

    #[test]
    fn latest_year_wins() {
        let directory = scrape();
        assert_eq!(directory.len(), 2);
        let location = directory.get("North Babylon").unwrap();
        assert_eq!(location.year(), 2024);
        assert_eq!(
            location.feature().get_str("source"),
            Some("north-babylon-2024.html")
        );
        assert_eq!(location.feature().get("interactive"), Some(&json!(true)));
    }

    #[test]
    fn later_page_with_older_year_is_ignored() {
        let mut directory = scrape();
        let document = Html::parse_document(
            r#"<div class="content"><article><div><a href="north-babylon-2021.html">x</a></div></article></div>"#,
        );
        let root = fetch::root(&document, "div.content").unwrap();
        let added = add_listings(
            &mut directory,
            root,
            &fetch::selector("article").unwrap(),
            "data",
        );
        assert_eq!(added, 0);
        assert_eq!(directory.get("North Babylon").unwrap().year(), 2024);
    }

    #[test]
    fn process_sets_boxes() {
        let mut directory = scrape();
        process(&mut directory, &census(), false).unwrap();
        let output = serde_json::to_value(directory.to_collection()).unwrap();
        assert_eq!(output["features"][0]["properties"]["name"], "Hicksville");
        assert_eq!(output["features"][0]["geometry"], json!(null));
        assert_eq!(output["features"][1]["geometry"]["type"], "MultiPoint");
    }

    #[test]
    fn process_outline() {
        let mut directory = scrape();
        process(&mut directory, &census(), true).unwrap();
        let location = directory.get("North Babylon").unwrap();
        assert_eq!(
            location.feature().geometry.as_ref().unwrap()["type"],
            json!("MultiPolygon")
        );
    }
}
