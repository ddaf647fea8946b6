use crate::config::Config;
use crate::robots::RobotsGroup;
use crate::url::{normalize_link, LinkList};
use url::Url;

/// Policy a discovered link has to pass before it becomes a job
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkLimitations {
    /// Maximum number of path segments, 0 means unlimited
    pub depth: usize,
    /// Follow rel=prev / rel=next links
    pub paging: bool,
    /// Reject every link that carries a query
    pub ignore_all_queries: bool,
    /// Path prefixes that reject a link
    pub ignore_path_prefixes: Vec<String>,
    /// A link has to start with one of these prefixes
    pub include_path_prefixes: Vec<String>,
    /// Query parameter names that reject a link
    pub ignore_queries_with: Vec<String>,
}

impl LinkLimitations {
    /// Derives the limitations of a walk from its configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            depth: config.depth as usize,
            paging: config.paging,
            ignore_all_queries: config.ignore_all_queries,
            ignore_path_prefixes: config.ignore.clone(),
            include_path_prefixes: config.target.paths.clone(),
            ignore_queries_with: config.ignore_queries_with.clone(),
        }
    }
}

/// Reason a link was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRejection {
    Pager,
    ForeignOrigin,
    TooDeep,
    IgnoredPath,
    RobotsDisallowed,
    Query,
    NotIncluded,
}

/// Runs the filter rules in order, the first rule that matches rejects
pub fn check_link(
    link: &Url,
    base: &Url,
    link_next: Option<&str>,
    link_prev: Option<&str>,
    limits: &LinkLimitations,
    robots: Option<&RobotsGroup>,
) -> Result<(), LinkRejection> {
    if !limits.paging {
        let link_str = link.as_str();
        if link_next == Some(link_str) || link_prev == Some(link_str) {
            return Err(LinkRejection::Pager);
        }
    }

    if link.scheme() != base.scheme()
        || link.host_str() != base.host_str()
        || link.port_or_known_default() != base.port_or_known_default()
    {
        return Err(LinkRejection::ForeignOrigin);
    }

    let path = link.path();

    if limits.depth > 0 && path.split('/').count() - 1 > limits.depth {
        return Err(LinkRejection::TooDeep);
    }

    if limits
        .ignore_path_prefixes
        .iter()
        .any(|prefix| path.starts_with(prefix.as_str()))
    {
        return Err(LinkRejection::IgnoredPath);
    }

    if let Some(group) = robots {
        if !group.test(path) {
            return Err(LinkRejection::RobotsDisallowed);
        }
    }

    let mut params = link.query_pairs().peekable();
    if params.peek().is_some() {
        if limits.ignore_all_queries {
            return Err(LinkRejection::Query);
        }
        if params.any(|(name, _)| limits.ignore_queries_with.iter().any(|i| *i == name)) {
            return Err(LinkRejection::Query);
        }
    }

    if !limits
        .include_path_prefixes
        .iter()
        .any(|prefix| path.starts_with(prefix.as_str()))
    {
        return Err(LinkRejection::NotIncluded);
    }

    Ok(())
}

/// Decides whether a normalized link may be crawled
///
/// # Arguments
///
/// * `link` - The normalized link
/// * `base` - Base URL of the walk
/// * `link_next` / `link_prev` - Normalized pager links of the current page
/// * `limits` - The link policy
/// * `robots` - robots.txt group for the configured agent, if robots apply
pub fn accept_link(
    link: &Url,
    base: &Url,
    link_next: Option<&str>,
    link_prev: Option<&str>,
    limits: &LinkLimitations,
    robots: Option<&RobotsGroup>,
) -> bool {
    match check_link(link, base, link_next, link_prev, limits, robots) {
        Ok(()) => true,
        Err(reason) => {
            tracing::trace!("Rejected {}: {:?}", link, reason);
            false
        }
    }
}

/// Normalizes and filters the raw links of a page
///
/// Every accepted link is counted once per raw href that normalized to it.
/// Hrefs that fail to normalize are dropped.
pub fn filter_scrape_links(
    links: &LinkList,
    base: &Url,
    link_next: Option<&str>,
    link_prev: Option<&str>,
    limits: &LinkLimitations,
    robots: Option<&RobotsGroup>,
) -> LinkList {
    let mut accepted = LinkList::new();

    for raw in links.keys() {
        let link = match normalize_link(base, raw) {
            Ok(link) => link,
            Err(e) => {
                tracing::trace!("Skipping link {}: {}", raw, e);
                continue;
            }
        };

        if accept_link(&link, base, link_next, link_prev, limits, robots) {
            *accepted.entry(link.to_string()).or_insert(0) += 1;
        }
    }

    accepted
}
