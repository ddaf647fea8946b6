//! Robots.txt handling module
//!
//! This module fetches and parses the robots.txt of the walked origin. The
//! walker checks its seed paths against it at start and filters every
//! discovered link through the group for its agent.

mod parser;

pub use parser::{RobotsData, RobotsGroup};

use crate::WalkerError;
use url::Url;

/// Fetches robots.txt for the base origin
///
/// # Arguments
///
/// * `client` - HTTP client to fetch with (carries the user agent)
/// * `base_url` - Base URL of the walk
///
/// # Returns
///
/// * `Ok(RobotsData)` - Parsed robots.txt, or an allow/deny-all policy derived
///   from a 4xx/5xx status
/// * `Err(WalkerError)` - The request failed or returned an unexpected status
pub async fn fetch_robots(client: &reqwest::Client, base_url: &Url) -> Result<RobotsData, WalkerError> {
    let robots_url = base_url.join("/robots.txt")?;

    tracing::debug!("Fetching {}", robots_url);

    let response = client.get(robots_url.clone()).send().await?;
    let status = response.status().as_u16();
    let body = response.bytes().await?;

    RobotsData::from_status_and_bytes(status, &body).ok_or_else(|| {
        WalkerError::Robots(format!(
            "unexpected status {} for {}",
            status, robots_url
        ))
    })
}

/// Returns every seed path the group does not allow
pub fn disallowed_paths(group: &RobotsGroup, paths: &[String]) -> Vec<String> {
    paths
        .iter()
        .filter(|path| !group.test(path))
        .cloned()
        .collect()
}
