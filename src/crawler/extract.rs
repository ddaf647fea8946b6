//! HTML extraction for links and page structure
//!
//! This module handles parsing HTML content to extract:
//! - Links to follow (first canonical link, `<a href>` tags, anchors inside
//!   `<noscript>`)
//! - The page [`Structure`]: title, description, robots meta, pager links,
//!   headings and JSON-LD types

use crate::crawler::hooks::ContentExtractor;
use crate::crawler::types::{FetchedDocument, Heading, LinkedData, Structure};
use crate::url::LinkList;
use scraper::{ElementRef, Html, Selector};

/// Default [`ContentExtractor`] built on `scraper`
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlExtractor;

impl ContentExtractor for HtmlExtractor {
    fn extract(&self, doc: &FetchedDocument) -> anyhow::Result<Structure> {
        let document = Html::parse_document(&doc.text());
        extract_structure(&document)
    }
}

fn selector(css: &str) -> anyhow::Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow::anyhow!("invalid selector {}: {:?}", css, e))
}

fn trim_text(text: &str) -> String {
    text.trim_matches(|c| c == ' ' || c == '\t' || c == '\n').to_string()
}

fn element_text(element: ElementRef<'_>) -> String {
    trim_text(&element.text().collect::<String>())
}

/// Extracts the raw links of a document
///
/// # Link Extraction Rules
///
/// - the `href` of the first `<link rel="canonical">`
/// - every non-empty `<a href="...">`
/// - anchors found in the text of `<noscript>` elements
///
/// Each href is counted as often as it occurs. Hrefs are returned as written
/// in the document; normalization happens later.
///
/// # Example
///
/// ```
/// use site_walker::crawler::extract_links;
///
/// let html = r#"<a href="/a">A</a><a href="/a#top">A</a><a href="">empty</a>"#;
/// let links = extract_links(html);
/// assert_eq!(links.get("/a"), Some(&1));
/// assert_eq!(links.get("/a#top"), Some(&1));
/// assert_eq!(links.len(), 2);
/// ```
pub fn extract_links(html: &str) -> LinkList {
    let document = Html::parse_document(html);
    let mut links = LinkList::new();

    if let Ok(canonical_selector) = Selector::parse("link[rel=canonical]") {
        if let Some(href) = document
            .select(&canonical_selector)
            .next()
            .and_then(|element| element.value().attr("href"))
        {
            *links.entry(href.to_string()).or_insert(0) += 1;
        }
    }

    collect_anchors(&document, &mut links);

    if let Ok(noscript_selector) = Selector::parse("noscript") {
        for element in document.select(&noscript_selector) {
            let fragment = Html::parse_fragment(&element.text().collect::<String>());
            collect_anchors(&fragment, &mut links);
        }
    }

    links
}

fn collect_anchors(document: &Html, links: &mut LinkList) {
    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            if let Some(href) = element.value().attr("href") {
                if !href.is_empty() {
                    *links.entry(href.to_string()).or_insert(0) += 1;
                }
            }
        }
    }
}

/// Extracts the semantic elements of a parsed document
pub fn extract_structure(document: &Html) -> anyhow::Result<Structure> {
    let mut structure = Structure::default();

    if let Some(title) = document.select(&selector("title")?).next() {
        structure.title = element_text(title);
    }

    structure.description = first_meta(document, "description")?;
    structure.robots = first_meta(document, "robots")?;

    let rel_selector = selector("link[rel=prev], link[rel=next], link[rel=canonical]")?;
    for element in document.select(&rel_selector) {
        let (Some(rel), Some(href)) = (element.value().attr("rel"), element.value().attr("href")) else {
            continue;
        };
        let href = trim_text(href);
        match rel {
            "canonical" => structure.canonical = href,
            "prev" => structure.link_prev = href,
            "next" => structure.link_next = href,
            _ => {}
        }
    }

    for element in document.select(&selector(r#"script[type="application/ld+json"]"#)?) {
        let raw = element.text().collect::<String>();
        match serde_json::from_str::<LinkedData>(&raw) {
            Ok(linked_data) => structure.linked_data.push(linked_data),
            Err(e) => tracing::debug!("Skipping unparseable JSON-LD: {}", e),
        }
    }

    for element in document.select(&selector("h1, h2, h3, h4, h5, h6")?) {
        let level = element.value().name()[1..].parse::<u8>().unwrap_or(0);
        structure.headings.push(Heading {
            level,
            text: element_text(element),
        });
    }

    Ok(structure)
}

fn first_meta(document: &Html, name: &str) -> anyhow::Result<String> {
    let meta_selector = selector(&format!("meta[name={}]", name))?;
    Ok(document
        .select(&meta_selector)
        .next()
        .and_then(|element| element.value().attr("content"))
        .map(trim_text)
        .unwrap_or_default())
}
