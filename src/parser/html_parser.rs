use crate::browser::RenderedPage;
use crate::error::NotifierError;
use crate::parser::ListingRecord;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};
use url::Url;

/// html parser for pulling listing anchors out of result containers
pub struct ListingExtractor {
    container_selector: Selector,
    anchor_selector: Selector,
    base_selector: Selector,
}

impl ListingExtractor {
    pub fn new(result_selector: &str) -> Result<Self, NotifierError> {
        Ok(Self {
            container_selector: Selector::parse(result_selector)
                .map_err(|e| NotifierError::ParseError(format!("Invalid result selector '{}': {}", result_selector, e)))?,
            anchor_selector: Selector::parse("a")
                .map_err(|e| NotifierError::ParseError(format!("Invalid anchor selector: {}", e)))?,
            base_selector: Selector::parse("base[href]")
                .map_err(|e| NotifierError::ParseError(format!("Invalid base selector: {}", e)))?,
        })
    }

    /// Result containers in document order.
    pub fn find_result_containers<'a>(&self, document: &'a Html) -> Vec<ElementRef<'a>> {
        document.select(&self.container_selector).collect()
    }

    /// Url that relative links resolve against: the first `<base href>`
    /// (itself relative to the page url) or the page url.
    pub fn document_base(&self, document: &Html, page_url: &str) -> Option<Url> {
        let page_base = Url::parse(page_url).ok();
        let declared = document
            .select(&self.base_selector)
            .next()
            .and_then(|base| base.value().attr("href"))
            .map(str::trim)
            .filter(|href| !href.is_empty());

        match declared {
            Some(href) => match resolve_href(page_base.as_ref(), href) {
                Ok(resolved) => Url::parse(&resolved).ok(),
                Err(e) => {
                    warn!("Ignoring unusable <base href>: {}", e);
                    page_base
                }
            },
            None => page_base,
        }
    }

    /// Title/link pairs of every anchor inside `container`.
    ///
    /// Links are resolved against `base` the way a browser reports `a.href`.
    /// Anchors without an `href` come back with an empty link. An `href` that
    /// cannot be resolved fails the whole container.
    pub fn extract_anchors(
        &self,
        base: Option<&Url>,
        container: &ElementRef,
    ) -> Result<Vec<(String, String)>, NotifierError> {
        let mut anchors = Vec::new();

        for anchor in container.select(&self.anchor_selector) {
            let title = visible_text(&anchor);
            let link = match anchor.value().attr("href").map(str::trim) {
                Some(href) if !href.is_empty() => resolve_href(base, href)?,
                _ => String::new(),
            };
            anchors.push((title, link));
        }

        Ok(anchors)
    }

    // pull listing records from a rendered page
    pub fn extract(&self, page: &RenderedPage) -> Vec<ListingRecord> {
        let document = Html::parse_document(&page.html);
        let base = self.document_base(&document, &page.url);
        let containers = self.find_result_containers(&document);
        info!("Found {} result container(s) on {}", containers.len(), page.url);

        let mut records = Vec::new();
        for (index, container) in containers.iter().enumerate() {
            match self.extract_anchors(base.as_ref(), container) {
                Ok(anchors) => {
                    for (title, link) in anchors {
                        let record = ListingRecord::new(title.trim(), link.trim());
                        if record.is_valid() {
                            debug!("Extracted: Title: {}, Link: {}", record.title, record.link);
                            records.push(record);
                        } else {
                            debug!("Skipping anchor with empty title or link in container {}", index);
                        }
                    }
                }
                Err(e) => {
                    warn!("Error extracting data from result container {}: {}", index, e);
                    // keep going with the remaining containers
                }
            }
        }

        debug!("Extracted {} listing record(s) from {}", records.len(), page.url);
        records
    }
}

// text nodes joined, whitespace runs collapsed to one space
fn visible_text(element: &ElementRef) -> String {
    element
        .text()
        .flat_map(|text| text.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}

fn resolve_href(base: Option<&Url>, href: &str) -> Result<String, NotifierError> {
    let resolved = match base {
        Some(base) => base.join(href),
        None => Url::parse(href),
    };

    resolved
        .map(String::from)
        .map_err(|e| NotifierError::ParseError(format!("Could not resolve link '{}': {}", href, e)))
}
