//! Extension points of a walk
//!
//! Every hook is a single-method trait object handed to [`Walker::start`]
//! inside [`Hooks`]. A missing hook falls back to the built-in behavior.
//!
//! [`Walker::start`]: crate::crawler::Walker::start

use crate::crawler::extract::HtmlExtractor;
use crate::crawler::types::{
    FetchedDocument, ScrapeResult, Structure, Validation, ValidationReport,
};
use crate::url::LinkList;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Extracts the [`Structure`] of an HTML document
pub trait ContentExtractor: Send + Sync {
    fn extract(&self, doc: &FetchedDocument) -> anyhow::Result<Structure>;
}

/// Validates a page body against the schema registered for its group
pub trait SchemaValidator: Send + Sync {
    fn validate(&self, group: &str, body: &[u8]) -> anyhow::Result<ValidationReport>;
}

/// Produces a custom payload for a page
pub trait ScrapeHook: Send + Sync {
    fn scrape(&self, doc: &FetchedDocument) -> anyhow::Result<serde_json::Value>;
}

/// Turns the structure and payload of a page into validations
pub trait ValidationHook: Send + Sync {
    fn validate(
        &self,
        structure: &Structure,
        data: Option<&serde_json::Value>,
    ) -> anyhow::Result<Vec<Validation>>;
}

/// Replaces the built-in link filter
///
/// The returned links are taken as they are: neither normalized nor checked
/// against the link policy.
pub trait LinkFilterHook: Send + Sync {
    fn filter_links(
        &self,
        base: &Url,
        doc_url: &Url,
        doc: &FetchedDocument,
    ) -> anyhow::Result<LinkList>;
}

/// Rewrites a result before it is recorded
pub trait ResultModifier: Send + Sync {
    fn modify(&self, result: ScrapeResult) -> anyhow::Result<ScrapeResult>;
}

/// Receives instrumentation events from the coordinator
///
/// Every method defaults to doing nothing.
pub trait MetricsSink: Send + Sync {
    /// A new loop started
    fn reset_loop(&self) {}

    /// A result was recorded
    fn observe_scrape(&self, _group: &str, _code: u16, _duration: Duration) {}

    /// Current number of open jobs and recorded results
    fn set_progress(&self, _open: usize, _complete: usize) {}

    /// Schema validation outcome of one page, reported once per completed loop
    fn track_validation(&self, _group: &str, _path: &str, _score: f64, _penalties: &[(String, f64)]) {}
}

/// Metrics sink that drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {}

/// The hooks of one walk
#[derive(Clone)]
pub struct Hooks {
    pub extractor: Arc<dyn ContentExtractor>,
    pub schema_validator: Option<Arc<dyn SchemaValidator>>,
    pub scrape: Option<Arc<dyn ScrapeHook>>,
    pub validation: Option<Arc<dyn ValidationHook>>,
    pub link_filter: Option<Arc<dyn LinkFilterHook>>,
    pub result_modifier: Option<Arc<dyn ResultModifier>>,
}

impl Default for Hooks {
    fn default() -> Self {
        Self {
            extractor: Arc::new(HtmlExtractor),
            schema_validator: None,
            scrape: None,
            validation: None,
            link_filter: None,
            result_modifier: None,
        }
    }
}

impl Hooks {
    pub fn with_extractor(mut self, extractor: impl ContentExtractor + 'static) -> Self {
        self.extractor = Arc::new(extractor);
        self
    }

    pub fn with_schema_validator(mut self, validator: impl SchemaValidator + 'static) -> Self {
        self.schema_validator = Some(Arc::new(validator));
        self
    }

    pub fn with_scrape(mut self, hook: impl ScrapeHook + 'static) -> Self {
        self.scrape = Some(Arc::new(hook));
        self
    }

    pub fn with_validation(mut self, hook: impl ValidationHook + 'static) -> Self {
        self.validation = Some(Arc::new(hook));
        self
    }

    pub fn with_link_filter(mut self, hook: impl LinkFilterHook + 'static) -> Self {
        self.link_filter = Some(Arc::new(hook));
        self
    }

    pub fn with_result_modifier(mut self, hook: impl ResultModifier + 'static) -> Self {
        self.result_modifier = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("schema_validator", &self.schema_validator.is_some())
            .field("scrape", &self.scrape.is_some())
            .field("validation", &self.validation.is_some())
            .field("link_filter", &self.link_filter.is_some())
            .field("result_modifier", &self.result_modifier.is_some())
            .finish()
    }
}

impl<F> ScrapeHook for F
where
    F: Fn(&FetchedDocument) -> anyhow::Result<serde_json::Value> + Send + Sync,
{
    fn scrape(&self, doc: &FetchedDocument) -> anyhow::Result<serde_json::Value> {
        self(doc)
    }
}

impl<F> ResultModifier for F
where
    F: Fn(ScrapeResult) -> anyhow::Result<ScrapeResult> + Send + Sync,
{
    fn modify(&self, result: ScrapeResult) -> anyhow::Result<ScrapeResult> {
        self(result)
    }
}

impl<F> SchemaValidator for F
where
    F: Fn(&str, &[u8]) -> anyhow::Result<ValidationReport> + Send + Sync,
{
    fn validate(&self, group: &str, body: &[u8]) -> anyhow::Result<ValidationReport> {
        self(group, body)
    }
}

impl<F> ContentExtractor for F
where
    F: Fn(&FetchedDocument) -> anyhow::Result<Structure> + Send + Sync,
{
    fn extract(&self, doc: &FetchedDocument) -> anyhow::Result<Structure> {
        self(doc)
    }
}

impl<F> ValidationHook for F
where
    F: Fn(&Structure, Option<&serde_json::Value>) -> anyhow::Result<Vec<Validation>> + Send + Sync,
{
    fn validate(
        &self,
        structure: &Structure,
        data: Option<&serde_json::Value>,
    ) -> anyhow::Result<Vec<Validation>> {
        self(structure, data)
    }
}

impl<F> LinkFilterHook for F
where
    F: Fn(&Url, &Url, &FetchedDocument) -> anyhow::Result<LinkList> + Send + Sync,
{
    fn filter_links(
        &self,
        base: &Url,
        doc_url: &Url,
        doc: &FetchedDocument,
    ) -> anyhow::Result<LinkList> {
        self(base, doc_url, doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_hooks() {
        let hooks = Hooks::default();
        assert!(hooks.scrape.is_none());
        assert!(hooks.link_filter.is_none());
        assert!(hooks.result_modifier.is_none());
        assert!(format!("{:?}", hooks).contains("link_filter: false"));
    }

    #[test]
    fn test_closure_hooks() {
        let hooks = Hooks::default()
            .with_scrape(|doc: &FetchedDocument| -> anyhow::Result<serde_json::Value> {
                Ok(serde_json::json!({ "len": doc.body.len() }))
            })
            .with_result_modifier(|mut result: ScrapeResult| -> anyhow::Result<ScrapeResult> {
                result.group = "modified".to_string();
                Ok(result)
            });

        let modified = hooks
            .result_modifier
            .as_ref()
            .unwrap()
            .modify(ScrapeResult::new("https://example.com/"))
            .unwrap();
        assert_eq!(modified.group, "modified");
        assert!(hooks.scrape.is_some());
    }

    fn create_test_document() -> FetchedDocument {
        FetchedDocument {
            url: Url::parse("https://example.com/page").unwrap(),
            status: 200,
            headers: reqwest::header::HeaderMap::new(),
            body: b"<title>Page</title>".to_vec(),
        }
    }

    #[test]
    fn test_closure_extractor_validation_and_link_filter() {
        let hooks = Hooks::default()
            .with_extractor(|_doc: &FetchedDocument| -> anyhow::Result<Structure> {
                Ok(Structure {
                    title: "fixed".to_string(),
                    ..Structure::default()
                })
            })
            .with_validation(
                |structure: &Structure,
                 data: Option<&serde_json::Value>|
                 -> anyhow::Result<Vec<Validation>> {
                    assert!(data.is_none());
                    Ok(vec![Validation::warning("seo", format!("title is {}", structure.title))])
                },
            )
            .with_link_filter(
                |_base: &Url, doc_url: &Url, _doc: &FetchedDocument| -> anyhow::Result<LinkList> {
                    let mut links = LinkList::new();
                    links.insert(doc_url.join("next")?.to_string(), 1);
                    Ok(links)
                },
            );

        let doc = create_test_document();
        let structure = hooks.extractor.extract(&doc).unwrap();
        assert_eq!(structure.title, "fixed");

        let validations = hooks
            .validation
            .as_ref()
            .unwrap()
            .validate(&structure, None)
            .unwrap();
        assert_eq!(validations.len(), 1);
        assert_eq!(validations[0].message, "title is fixed");

        let base = Url::parse("https://example.com").unwrap();
        let links = hooks
            .link_filter
            .as_ref()
            .unwrap()
            .filter_links(&base, &doc.url, &doc)
            .unwrap();
        assert!(links.contains_key("https://example.com/next"));
    }

    #[test]
    fn test_noop_metrics() {
        let sink = NoopMetrics;
        sink.reset_loop();
        sink.observe_scrape("default", 200, Duration::from_millis(5));
        sink.set_progress(1, 2);
        sink.track_validation("default", "/", 100.0, &[]);
    }
}
