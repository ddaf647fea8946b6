//! Scrape worker
//!
//! One scrape fetches one URL with a leased pool client, follows redirects by
//! hand and runs the configured hooks over HTML responses. Failures never
//! escape: they end up in the error field of the returned result.

use crate::crawler::extract::extract_links;
use crate::crawler::hooks::Hooks;
use crate::crawler::pool::LeasedClient;
use crate::crawler::types::{FetchedDocument, Redirect, ScrapeResult};
use crate::url::{normalize_link, LinkList};
use anyhow::{anyhow, bail, Context};
use reqwest::header::{CONTENT_TYPE, LOCATION, USER_AGENT};
use reqwest::Response;
use std::sync::Arc;
use std::time::Instant;
use url::Url;

/// Maximum number of redirect hops followed for one URL
pub const MAX_REDIRECTS: usize = 10;

/// Everything a scrape task needs, moved into the task
#[derive(Debug)]
pub struct ScrapeJob {
    pub url: String,
    pub base: Url,
    pub group_header: Option<String>,
    pub client: LeasedClient,
    pub hooks: Hooks,
}

/// What a scrape task reports back to the coordinator
#[derive(Debug)]
pub struct ScrapeOutcome {
    pub result: ScrapeResult,
    /// Pool slot to release
    pub slot: usize,
    /// The fetched HTML document, if there is one
    pub document: Option<Arc<FetchedDocument>>,
}

/// Fetches one URL and interprets the response
///
/// # Request Flow
///
/// 1. GET with the client's agent and the base URL's credentials
/// 2. Follow redirects manually (max 10 hops), recording every hop
/// 3. Record code, status, content type and group
/// 4. Non-2xx responses end the scrape with an error
/// 5. HTML bodies are read, schema-validated, searched for links, run
///    through the content extractor, then the scrape and validation hooks
pub async fn scrape(job: ScrapeJob) -> ScrapeOutcome {
    let slot = job.client.index;
    let mut result = ScrapeResult::new(job.url.clone());

    let document = match scrape_into(&job, &mut result).await {
        Ok(document) => document.map(Arc::new),
        Err(e) => {
            tracing::debug!("Scrape of {} failed: {:#}", job.url, e);
            result.error = Some(format!("{:#}", e));
            None
        }
    };

    ScrapeOutcome {
        result,
        slot,
        document,
    }
}

async fn scrape_into(
    job: &ScrapeJob,
    result: &mut ScrapeResult,
) -> anyhow::Result<Option<FetchedDocument>> {
    let start = Instant::now();
    let target = Url::parse(&job.url).with_context(|| format!("invalid url {}", job.url))?;

    let (response, final_url) = fetch_following_redirects(job, target, result).await?;

    result.duration = start.elapsed();
    result.code = response.status().as_u16();
    result.status = response.status().to_string();
    result.content_type = header_value(&response, CONTENT_TYPE.as_str()).unwrap_or_default();

    if let Some(group_header) = &job.group_header {
        if let Some(group) = header_value(&response, group_header).filter(|g| !g.is_empty()) {
            result.group = group;
        }
        if result.group.ends_with('/') {
            result.group.push_str("index");
        }
    }

    if !response.status().is_success() {
        bail!("unexpected status: {}", result.status);
    }

    if !result.content_type.contains("html") {
        return Ok(None);
    }

    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let body = response.bytes().await.context("reading body")?.to_vec();
    result.length = body.len();

    let document = FetchedDocument {
        url: final_url,
        status,
        headers,
        body,
    };

    let hooks = &job.hooks;

    if let Some(validator) = &hooks.schema_validator {
        match validator.validate(&result.group, &document.body) {
            Ok(report) => result.validation_report = Some(report),
            Err(e) => result.validation_error = Some(format!("{:#}", e)),
        }
    }

    result.links = extract_links(&document.text());
    result.normalized_links = normalize_links(&job.base, &result.links);

    result.structure = hooks
        .extractor
        .extract(&document)
        .context("extracting structure")?;

    if let Some(scrape_hook) = &hooks.scrape {
        result.data = Some(scrape_hook.scrape(&document)?);
    }

    if let Some(validation_hook) = &hooks.validation {
        result.validations = validation_hook.validate(&result.structure, result.data.as_ref())?;
    }

    Ok(Some(document))
}

async fn fetch_following_redirects(
    job: &ScrapeJob,
    mut current: Url,
    result: &mut ScrapeResult,
) -> anyhow::Result<(Response, Url)> {
    loop {
        let mut request = job
            .client
            .client
            .get(current.clone())
            .header(USER_AGENT, job.client.agent.as_str());

        // credentials only go to the walked origin
        if !job.base.username().is_empty() && current.origin() == job.base.origin() {
            request = request.basic_auth(job.base.username(), job.base.password());
        }

        let response = request.send().await?;

        if !response.status().is_redirection() {
            return Ok((response, current));
        }

        let Some(location) = header_value(&response, LOCATION.as_str()) else {
            return Ok((response, current));
        };

        if result.redirects.len() >= MAX_REDIRECTS {
            bail!("stopped after {} redirects", MAX_REDIRECTS);
        }

        let next = current
            .join(&location)
            .map_err(|e| anyhow!("invalid redirect location {:?}: {}", location, e))?;

        result.redirects.push(Redirect {
            code: response.status().as_u16(),
            url: next.to_string(),
        });
        current = next;
    }
}

fn header_value(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn normalize_links(base: &Url, links: &LinkList) -> LinkList {
    let mut normalized = LinkList::new();
    for (raw, count) in links {
        if let Ok(link) = normalize_link(base, raw) {
            *normalized.entry(link.to_string()).or_insert(0) += count;
        }
    }
    normalized
}
