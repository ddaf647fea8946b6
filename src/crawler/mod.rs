//! Crawler module: the walk engine
//!
//! This module contains the core crawling logic, including:
//! - The client pool bounding concurrent fetches
//! - The scrape worker fetching one URL and following its redirects
//! - HTML link and structure extraction
//! - The coordinator owning all crawl state and restarting finished loops
//! - Status snapshots and throughput numbers

mod coordinator;
mod extract;
mod hooks;
mod pool;
mod scrape;
mod status;
mod types;

pub use coordinator::{Command, LoopCompletions, LoopPhase, Walker};
pub use extract::{extract_links, extract_structure, HtmlExtractor};
pub use hooks::{
    ContentExtractor, Hooks, LinkFilterHook, MetricsSink, NoopMetrics, ResultModifier,
    SchemaValidator, ScrapeHook, ValidationHook,
};
pub use pool::{build_http_client, ClientPool, ClientSettings, LeasedClient};
pub use scrape::{scrape, ScrapeJob, ScrapeOutcome, MAX_REDIRECTS};
pub use status::{
    build_status, BucketCount, DurationBucket, LoopCounters, Status, DURATION_BUCKETS,
    SCRAPE_WINDOW,
};
pub use types::{
    FetchedDocument, Heading, LinkedData, Redirect, ScrapeResult, Structure, Validation,
    ValidationLevel, ValidationReport, Violation, DEFAULT_GROUP,
};
