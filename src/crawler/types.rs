//! Value types produced by a walk

use crate::url::LinkList;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Group assigned to a result when no group header is configured or present
pub const DEFAULT_GROUP: &str = "default";

/// One followed redirect hop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redirect {
    /// Status code of the redirect response
    pub code: u16,
    /// Resolved `Location` of the hop
    pub url: String,
}

/// Heading found on a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    pub level: u8,
    pub text: String,
}

/// `@context` / `@type` of a JSON-LD block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedData {
    #[serde(rename = "@context", default)]
    pub context: String,
    #[serde(rename = "@type", default)]
    pub kind: String,
}

/// The semantic skeleton of an HTML page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Structure {
    pub title: String,
    pub description: String,
    pub headings: Vec<Heading>,
    /// Content of `<meta name="robots">`
    pub robots: String,
    pub linked_data: Vec<LinkedData>,
    pub canonical: String,
    pub link_prev: String,
    pub link_next: String,
}

/// Severity of a hook validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationLevel {
    Error,
    Warning,
    Info,
}

/// Finding reported by the validation hook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    pub level: ValidationLevel,
    pub message: String,
    pub group: String,
}

impl Validation {
    pub fn error(group: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ValidationLevel::Error, group, message)
    }

    pub fn warning(group: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ValidationLevel::Warning, group, message)
    }

    pub fn info(group: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ValidationLevel::Info, group, message)
    }

    fn new(level: ValidationLevel, group: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            group: group.into(),
        }
    }
}

/// One schema violation with the score penalty it costs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: String,
    pub message: String,
    pub penalty: f64,
}

/// Outcome of validating a page against the schema of its group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub score: f64,
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    /// Sums the penalties of all violations per violation kind
    pub fn penalties_by_kind(&self) -> Vec<(String, f64)> {
        let mut penalties: Vec<(String, f64)> = Vec::new();
        for violation in &self.violations {
            match penalties.iter_mut().find(|(kind, _)| *kind == violation.kind) {
                Some((_, total)) => *total += violation.penalty,
                None => penalties.push((violation.kind.clone(), violation.penalty)),
            }
        }
        penalties
    }
}

/// Record of one completed fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeResult {
    pub target_url: String,
    pub error: Option<String>,
    /// Final HTTP status code, 0 when no response arrived
    pub code: u16,
    /// Status line, e.g. `200 OK`
    pub status: String,
    pub content_type: String,
    /// Number of body bytes read
    pub length: usize,
    pub duration: Duration,
    /// Set when the coordinator records the result
    pub time: DateTime<Utc>,
    pub redirects: Vec<Redirect>,
    /// Raw hrefs as found in the document
    pub links: LinkList,
    pub normalized_links: LinkList,
    pub structure: Structure,
    pub validation_report: Option<ValidationReport>,
    pub validation_error: Option<String>,
    pub validations: Vec<Validation>,
    /// Payload produced by the scrape hook
    pub data: Option<serde_json::Value>,
    pub group: String,
}

impl ScrapeResult {
    /// Creates an empty result for a URL about to be fetched
    pub fn new(target_url: impl Into<String>) -> Self {
        Self {
            target_url: target_url.into(),
            error: None,
            code: 0,
            status: String::new(),
            content_type: String::new(),
            length: 0,
            duration: Duration::ZERO,
            time: Utc::now(),
            redirects: Vec::new(),
            links: LinkList::new(),
            normalized_links: LinkList::new(),
            structure: Structure::default(),
            validation_report: None,
            validation_error: None,
            validations: Vec::new(),
            data: None,
            group: DEFAULT_GROUP.to_string(),
        }
    }

    /// True if the robots meta directive of the page forbids following links
    pub fn is_nofollow(&self) -> bool {
        self.structure.robots.to_lowercase().contains("nofollow")
    }
}

/// A fetched document as handed to hooks
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    /// URL of the final response
    pub url: url::Url,
    pub status: u16,
    pub headers: reqwest::header::HeaderMap,
    pub body: Vec<u8>,
}

impl FetchedDocument {
    /// Body decoded as UTF-8, invalid sequences replaced
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}
