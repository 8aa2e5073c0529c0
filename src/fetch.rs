use anyhow::{anyhow, Context, Result};
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use ureq::Agent;

pub fn document(agent: &Agent, url: &str) -> Result<Html> {
    debug!("GET {url}");
    let body = agent
        .get(url)
        .call()
        .with_context(|| format!("failed to fetch {url}"))?
        .into_string()?;
    Ok(Html::parse_document(&body))
}

pub fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector {css:?}: {e:?}"))
}

/// First element matching `css`.
pub fn root<'a>(document: &'a Html, css: &str) -> Result<ElementRef<'a>> {
    document
        .select(&selector(css)?)
        .next()
        .with_context(|| format!("no element matches {css:?}"))
}

/// Text nodes under `element`, trimmed, empty ones dropped.
pub fn stripped_strings<'a>(element: ElementRef<'a>) -> impl Iterator<Item = &'a str> {
    element.text().map(str::trim).filter(|x| !x.is_empty())
}
