use std::{
    fs::{self, File},
    io::Read,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use globset::Glob;
use indicatif::ProgressIterator;
use scraper::{ElementRef, Selector};
use tracing::{error, info, warn};

use crate::{
    census::Census,
    config::{Config, Corrections, DataSource},
    directory::{Directory, Lookup},
    feature::Record,
    fetch,
    geocode::{Geoapify, Geocoder},
    utils::{agent, first_letters, first_number, progress_style},
};

use self::{
    business::Business,
    category::Taxonomy,
    rows::{BusinessRow, LocRow},
};

mod business;
mod category;
mod html;
mod rows;

pub type BusinessDirectory = Directory<Business>;

pub fn build(config: &Config, force: bool) -> Result<()> {
    let census = Census::load(&config.census)?;
    let taxonomy = category::load(&config.categories)?;

    for source in &config.sources {
        if source.geojson.exists() && !force {
            info!(
                "Skipping {}: {} already exists",
                source.name,
                source.geojson.display()
            );
            continue;
        }
        if let Err(e) = build_source(config, source, &census, &taxonomy) {
            error!("Failed to build {}: {e:#}", source.name);
        }
    }
    Ok(())
}

fn build_source(
    config: &Config,
    source: &DataSource,
    census: &Census,
    taxonomy: &Taxonomy,
) -> Result<()> {
    info!("Building {}", source.name);
    let mut directory = BusinessDirectory::new(&source.name);

    if let Some(url) = &source.url {
        let document = fetch::document(&agent(), url)?;
        let root = fetch::root(&document, &source.root)?;
        let added = scrape(&mut directory, root, &fetch::selector(&source.target)?);
        info!("Scraped {added} businesses from {url}");
    } else if let Some(path) = &source.csv {
        let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let added = load_csv(&mut directory, file)?;
        info!("Loaded {added} businesses from {}", path.display());
    } else {
        bail!("source has neither a url nor a csv");
    }

    match_categories(&mut directory, taxonomy);
    match_towns(&mut directory, census);

    let geocoder = Geoapify::from_env(agent(), &config.geocoder.url, &config.geocoder.api_key_env)?;
    geocode(&mut directory, &geocoder)?;

    directory.save_geojson(&source.geojson)?;
    info!(
        "Saved {} businesses to {}",
        directory.len(),
        source.geojson.display()
    );
    Ok(())
}

pub fn correct(config: &Config) -> Result<()> {
    let taxonomy = category::load(&config.categories)?;
    for corrections in &config.corrections {
        if let Err(e) = apply_corrections(corrections, &taxonomy) {
            error!(
                "Failed to correct {}: {e:#}",
                corrections.filename.display()
            );
        }
    }
    Ok(())
}

fn apply_corrections(corrections: &Corrections, taxonomy: &Taxonomy) -> Result<()> {
    info!("Correcting {}", corrections.filename.display());
    let mut directory = BusinessDirectory::new("");
    directory.load_geojson(&corrections.filename, false)?;
    match_categories(&mut directory, taxonomy);

    if let Some(path) = &corrections.csv {
        let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let matched = load_loc_from_csv(&mut directory, file)?;
        info!("Matched {matched} location codes from {}", path.display());
    }
    if let Some(pattern) = &corrections.img {
        let matched = load_images(&mut directory, pattern)?;
        info!("Matched {matched} images for {pattern}");
    }
    if let Some(path) = &corrections.corrections {
        directory.load_geojson(path, true)?;
    }

    directory.save_geojson(&corrections.filename)
}

/// Merges one record per fragment under `root` into the directory.
pub fn scrape(directory: &mut BusinessDirectory, root: ElementRef, target: &Selector) -> usize {
    let mut added = 0;
    for node in root.select(target) {
        let Some(business) = Business::from_fragment(node) else {
            warn!("Skipping listing without an id");
            continue;
        };
        if let Some(id) = business.id().map(str::to_string) {
            directory.upsert(id, business.into());
            added += 1;
        }
    }
    added
}

/// Merges every row of a business export, keyed by slug. Rows that fail to parse
/// are skipped; read errors abort.
pub fn load_csv(directory: &mut BusinessDirectory, reader: impl Read) -> Result<usize> {
    let mut added = 0;
    let mut reader = csv_reader(reader);
    for (index, row) in reader.deserialize::<BusinessRow>().enumerate() {
        let row = match row {
            Ok(x) => x,
            Err(e) if matches!(e.kind(), csv::ErrorKind::Deserialize { .. }) => {
                warn!("Skipping row {}: {e}", index + 1);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let business = Business::from_row(&row);
        match business.id().filter(|x| !x.is_empty()).map(str::to_string) {
            Some(id) => {
                directory.upsert(id, business.into());
                added += 1;
            }
            None => warn!("Skipping {:?}: name has no letters", row.business),
        }
    }
    Ok(added)
}

/// Short or ragged rows fail to deserialize and get skipped instead of ending the read.
fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new().flexible(true).from_reader(reader)
}

/// Backfills `loc` from a cross-reference export, matching on `mapname`, then
/// `phone`, then `address`.
pub fn load_loc_from_csv(directory: &mut BusinessDirectory, reader: impl Read) -> Result<usize> {
    let mut names = Lookup::new("mapname");
    let mut phones = Lookup::new("phone");
    let mut addresses = Lookup::new("address");

    let mut reader = csv_reader(reader);
    for (index, row) in reader.deserialize::<LocRow>().enumerate() {
        let row = match row {
            Ok(x) => x,
            Err(e) if matches!(e.kind(), csv::ErrorKind::Deserialize { .. }) => {
                warn!("Skipping row {}: {e}", index + 1);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let loc = row.loc.0;
        if !row.address.is_empty() {
            let toggled = match row.address.strip_suffix('.') {
                Some(x) => x.to_string(),
                None => format!("{}.", row.address),
            };
            addresses.table.insert(toggled, loc);
            addresses.table.insert(row.address, loc);
        }
        names.table.insert(row.business, loc);
        phones.table.insert(row.phone, loc);
    }

    Ok(directory.merge_by_external_key(&[names, phones, addresses], |business, loc| {
        business.feature_mut().set("loc", *loc);
    }))
}

/// Sets `priority` and `img` from map images named like `NB-A12.png`. Only the file
/// name part of `pattern` may contain wildcards.
pub fn load_images(directory: &mut BusinessDirectory, pattern: &str) -> Result<usize> {
    let pattern = Path::new(pattern);
    let folder = match pattern.parent() {
        Some(x) if !x.as_os_str().is_empty() => x,
        _ => Path::new("."),
    };
    let file_pattern = pattern
        .file_name()
        .and_then(|x| x.to_str())
        .with_context(|| format!("no file pattern in {}", pattern.display()))?;
    let matcher = Glob::new(file_pattern)?.compile_matcher();

    let mut paths: Vec<PathBuf> = fs::read_dir(folder)
        .with_context(|| format!("failed to list {}", folder.display()))?
        .map(|entry| entry.map(|x| x.path()))
        .collect::<Result<_, _>>()?;
    paths.retain(|x| x.file_name().is_some_and(|x| matcher.is_match(x)));
    paths.sort();

    let mut images = Lookup::new("loc");
    for path in &paths {
        let Some(stem) = path.file_stem().and_then(|x| x.to_str()) else {
            continue;
        };
        match image_code(stem) {
            Some((loc, priority)) => {
                images
                    .table
                    .insert(loc.to_string(), (priority.to_string(), stem.to_string()));
            }
            None => warn!("Skipping image {}: no location code", path.display()),
        }
    }

    Ok(directory.merge_by_external_key(&[images], |business, (priority, img)| {
        let feature = business.feature_mut();
        feature.set("priority", priority.as_str());
        feature.set("img", img.as_str());
    }))
}

/// Location code and priority letters from the last hyphen segment of a file stem.
fn image_code(stem: &str) -> Option<(u32, &str)> {
    let code = stem.rsplit('-').next()?;
    Some((first_number(code)?, first_letters(code)?))
}

pub fn match_categories(directory: &mut BusinessDirectory, taxonomy: &Taxonomy) {
    info!("Matching business categories");
    for business in directory.values_mut() {
        business.match_category(taxonomy);
    }
}

pub fn match_towns(directory: &mut BusinessDirectory, census: &Census) {
    info!("Matching towns");
    let matched = directory
        .values_mut()
        .map(|x| x.match_town(census))
        .filter(|x| *x)
        .count();
    info!("Matched {matched} towns");
}

/// Geocodes every business in the directory's own `"Town,State"` context. A failed
/// lookup aborts the pass; businesses geocoded before it keep their results.
pub fn geocode(directory: &mut BusinessDirectory, geocoder: &dyn Geocoder) -> Result<()> {
    info!("Geocoding businesses");
    let context = directory.name.clone();
    let total = directory.len();
    for business in directory
        .values_mut()
        .progress_with_style(progress_style())
    {
        let id = business.id().unwrap_or_default().to_string();
        let found = business
            .geocode(geocoder, &context)
            .with_context(|| format!("failed to geocode {id}"))?;
        if !found {
            warn!("No location found for {id}");
        }
    }
    info!("Geocoded {total} businesses");
    Ok(())
}

#[cfg(test)]
mod tests {
    use geo::Point;
    use scraper::Html;
    use serde_json::{json, Value};

    use super::{business::tests::FakeGeocoder, *};
    use crate::{census::tests::census, geocode::GeocodeMatch, geojson::FeatureCollection};

    const EXPORT: &str = "\
Business,Address,Town,Category,DL Info,LOC,Phone,Shoppers Discount,Exp.,Website
Joe's Deli,1 Main St,Babylon,Deli,,A1,631-555-0001,,,joesdeli.com
Joes Deli,,,,Open late,A1,,,,
Bakery,2 Main St,Babylon,Bakery,,none,,,,
Tailor,3 Main St,Babylon,Tailor,,C3,,,,
";

    const XREF: &str = "\
LOC,Business,Phone,Address
11,Joe's Deli,,
12,Somebody Else,631-555-0003,
13,Another,,4 Oak Ave.
14,,,
";

    fn taxonomy() -> Taxonomy {
        Taxonomy::from([(
            "Deli".to_string(),
            category::Category {
                category: "Food".to_string(),
                subcategory: "Deli".to_string(),
            },
        )])
    }

    fn directory(value: Value) -> BusinessDirectory {
        let collection: FeatureCollection = serde_json::from_value(value).unwrap();
        let mut directory = BusinessDirectory::new("");
        directory.load_collection(collection, false);
        directory
    }

    #[test]
    fn scrape_merges_fragments() {
        let document = Html::parse_document(
            r#"<body>
                <div class="gear" id="joes"><h3 class="name">Joe's</h3></div>
                <div class="gear"><h3 class="name">No id</h3></div>
                <div class="gear" id="joes"><p class="phone">555</p></div>
                <div class="other" id="skip"></div>
            </body>"#,
        );
        let root = fetch::root(&document, "body").unwrap();
        let mut directory = BusinessDirectory::new("Babylon, NY");
        let added = scrape(&mut directory, root, &fetch::selector("div.gear").unwrap());

        assert_eq!(added, 2);
        assert_eq!(directory.len(), 1);
        let joes = directory.get("joes").unwrap().feature();
        assert_eq!(joes.get_str("name"), Some("Joe's"));
        assert_eq!(joes.get_str("phone"), Some("555"));
    }

    #[test]
    fn csv_rows_merge_by_slug() {
        let mut directory = BusinessDirectory::new("Babylon, NY");
        let added = load_csv(&mut directory, EXPORT.as_bytes()).unwrap();

        assert_eq!(added, 3);
        assert_eq!(directory.len(), 2);
        let deli = directory.get("joesdeli").unwrap().feature();
        assert_eq!(deli.get_str("mapname"), Some("Joes Deli"));
        assert_eq!(deli.get_str("info"), Some("Open late"));
        assert_eq!(deli.get_str("phone"), Some("631-555-0001"));
        assert_eq!(deli.get_str("web"), Some("http://joesdeli.com"));
        assert!(directory.get("bakery").is_none());
        assert_eq!(directory.get("tailor").unwrap().feature().get("loc"), Some(&json!(3)));
    }

    #[test]
    fn ragged_rows_are_skipped() {
        let export = "\
Business,Address,Town,Category,DL Info,LOC,Phone,Shoppers Discount,Exp.,Website
Deli,1 Main St,Babylon,Deli,,A1,,,,
Short,2 Main St
Tailor,3 Main St,Babylon,Tailor,,C3,,,,
";
        let mut loaded = BusinessDirectory::new("Babylon, NY");
        assert_eq!(load_csv(&mut loaded, export.as_bytes()).unwrap(), 2);
        assert!(loaded.get("deli").is_some());
        assert!(loaded.get("short").is_none());
        assert!(loaded.get("tailor").is_some());

        let xref = "\
LOC,Business,Phone,Address
11,Deli
13
12,Somebody Else,,3 Main St
";
        let mut directory = directory(json!({"features": [
            {"properties": {"id": "a", "mapname": "Deli"}},
            {"properties": {"id": "b", "address": "3 Main St."}},
        ]}));
        assert_eq!(load_loc_from_csv(&mut directory, xref.as_bytes()).unwrap(), 2);
        assert_eq!(directory.get("a").unwrap().feature().get("loc"), Some(&json!(11)));
        assert_eq!(directory.get("b").unwrap().feature().get("loc"), Some(&json!(12)));
    }

    #[test]
    fn loc_cross_reference() {
        let mut directory = directory(json!({"features": [
            {"properties": {"id": "a", "mapname": "Joe's Deli", "phone": "631-555-0003"}},
            {"properties": {"id": "b", "phone": "631-555-0003", "loc": 1}},
            {"properties": {"id": "c", "address": "4 Oak Ave"}},
            {"properties": {"id": "d", "mapname": "", "phone": ""}},
        ]}));
        let matched = load_loc_from_csv(&mut directory, XREF.as_bytes()).unwrap();

        assert_eq!(matched, 3);
        let loc = |id: &str| directory.get(id).unwrap().feature().get("loc").cloned();
        assert_eq!(loc("a"), Some(json!(11)));
        assert_eq!(loc("b"), Some(json!(12)));
        assert_eq!(loc("c"), Some(json!(13)));
        assert_eq!(loc("d"), None);
    }

    #[test]
    fn images_by_loc() {
        let folder = tempfile::tempdir().unwrap();
        for name in ["NB-A12.png", "NB-B12.png", "NB-C3.png", "NB-logo.png", "HK-A5.png"] {
            fs::write(folder.path().join(name), b"").unwrap();
        }
        let mut directory = directory(json!({"features": [
            {"properties": {"id": "a", "loc": 12}},
            {"properties": {"id": "b", "loc": 3}},
            {"properties": {"id": "c", "loc": 5}},
            {"properties": {"id": "d"}},
            {"properties": {"id": "e", "loc": 3.0}},
        ]}));

        let pattern = folder.path().join("NB-*png");
        let matched = load_images(&mut directory, pattern.to_str().unwrap()).unwrap();

        assert_eq!(matched, 3);
        let a = directory.get("a").unwrap().feature();
        assert_eq!(a.get_str("priority"), Some("B"));
        assert_eq!(a.get_str("img"), Some("NB-B12"));
        let b = directory.get("b").unwrap().feature();
        assert_eq!(b.get_str("priority"), Some("C"));
        assert!(!directory.get("c").unwrap().feature().contains("img"));
        assert!(!directory.get("d").unwrap().feature().contains("img"));
        // hand-edited files may carry whole floats
        assert_eq!(directory.get("e").unwrap().feature().get_str("img"), Some("NB-C3"));
    }

    #[test]
    fn image_codes() {
        assert_eq!(image_code("NB-A12"), Some((12, "A")));
        assert_eq!(image_code("north-babylon-AB7x"), Some((7, "AB")));
        assert_eq!(image_code("NB-logo"), None);
        assert_eq!(image_code("NB-12"), None);
    }

    #[test]
    fn towns_and_geocoding() {
        let mut directory = directory(json!({
            "name": "North Babylon, NY",
            "features": [
                {"properties": {"id": "a", "address": "1 Deer Park Ave North Babylon"}},
                {"properties": {"id": "b", "address": "2 Main St", "town": "Babylon"}},
                {"properties": {"id": "c"}},
            ]
        }));
        match_towns(&mut directory, &census());

        let geocoder = FakeGeocoder {
            answer: GeocodeMatch {
                formatted: "Somewhere".to_string(),
                point: Some(Point::new(-73.3, 40.7)),
            },
            ..Default::default()
        };
        geocode(&mut directory, &geocoder).unwrap();

        assert_eq!(
            geocoder.queries.borrow().as_slice(),
            [
                "1 Deer Park Ave North Babylon North Babylon NY",
                "2 Main St Babylon NY"
            ]
        );
        assert_eq!(
            directory.get("a").unwrap().feature().geometry.as_ref().unwrap()["type"],
            json!("Point")
        );
        assert!(directory.get("c").unwrap().feature().geometry.is_none());
    }

    #[test]
    fn categories_for_every_business() {
        let mut directory = directory(json!({"features": [
            {"properties": {"id": "a", "business": "Deli"}},
            {"properties": {"id": "b", "business": "Unknown"}},
        ]}));
        match_categories(&mut directory, &taxonomy());

        assert_eq!(directory.get("a").unwrap().feature().get_str("category"), Some("Food"));
        assert_eq!(directory.get("b").unwrap().feature().get_str("category"), Some(""));
    }

    #[test]
    fn corrections_written_back() {
        let folder = tempfile::tempdir().unwrap();
        let path = |name: &str| folder.path().join(name);
        let map = json!({
            "type": "FeatureCollection",
            "name": "North Babylon, NY",
            "features": [
                {"type": "Feature", "properties": {"id": "deli", "mapname": "Joe's Deli", "business": "Deli"},
                 "geometry": {"type": "Point", "coordinates": [-73.3, 40.7]}},
                {"type": "Feature", "properties": {"id": "tailor", "phone": "631-555-0003", "business": "Tailor"},
                 "geometry": null},
            ]
        });
        let fixes = json!({
            "name": "fixes",
            "features": [
                {"type": "Feature", "properties": {"id": "deli", "town": "Springfield"}, "geometry": null},
                {"type": "Feature", "properties": {"town": "Nowhere"}, "geometry": null},
            ]
        });
        fs::write(path("map.geojson"), map.to_string()).unwrap();
        fs::write(path("fixes.geojson"), fixes.to_string()).unwrap();
        fs::write(path("xref.csv"), XREF).unwrap();
        fs::create_dir(path("img")).unwrap();
        fs::write(path("img").join("NB-A11.png"), b"").unwrap();

        let corrections = Corrections {
            filename: path("map.geojson"),
            corrections: Some(path("fixes.geojson")),
            csv: Some(path("xref.csv")),
            img: Some(path("img").join("NB-*png").to_str().unwrap().to_string()),
        };
        apply_corrections(&corrections, &taxonomy()).unwrap();

        let saved = serde_json::to_value(crate::geojson::read(&path("map.geojson")).unwrap()).unwrap();
        assert_eq!(saved["name"], "North Babylon, NY");
        assert_eq!(saved["features"].as_array().unwrap().len(), 2);
        assert_eq!(
            saved["features"][0]["properties"],
            json!({
                "id": "deli",
                "mapname": "Joe's Deli",
                "business": "Deli",
                "category": "Food",
                "subcategory": "Deli",
                "loc": 11,
                "priority": "A",
                "img": "NB-A11",
                "town": "Springfield",
            })
        );
        assert_eq!(saved["features"][0]["geometry"]["type"], "Point");
        assert_eq!(saved["features"][1]["properties"]["loc"], json!(12));
        assert_eq!(saved["features"][1]["properties"]["category"], "");
        assert!(saved["features"][1]["properties"].get("img").is_none());
    }
}
