//! Robots.txt parser implementation
//!
//! This module wraps the robotstxt crate's matcher behind the group lookup the
//! walker needs: pick the group for one agent, then test paths against it.

use robotstxt::DefaultMatcher;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Policy {
    AllowAll,
    DisallowAll,
    Rules,
}

/// Parsed robots.txt data for one origin
#[derive(Debug, Clone)]
pub struct RobotsData {
    content: Arc<str>,
    policy: Policy,
}

impl RobotsData {
    /// Creates robots data from a robots.txt body
    pub fn from_bytes(body: &[u8]) -> Self {
        Self {
            content: Arc::from(String::from_utf8_lossy(body).as_ref()),
            policy: Policy::Rules,
        }
    }

    /// Creates robots data from the status and body of a robots.txt response
    ///
    /// # Returns
    ///
    /// * `Some(RobotsData)` - 2xx bodies are parsed, 4xx allows everything and
    ///   5xx disallows everything
    /// * `None` - Any other status
    pub fn from_status_and_bytes(status: u16, body: &[u8]) -> Option<Self> {
        match status {
            200..=299 => Some(Self::from_bytes(body)),
            400..=499 => Some(Self::allow_all()),
            500..=599 => Some(Self::disallow_all()),
            _ => None,
        }
    }

    /// Robots data that allows every path
    pub fn allow_all() -> Self {
        Self {
            content: Arc::from(""),
            policy: Policy::AllowAll,
        }
    }

    /// Robots data that disallows every path
    pub fn disallow_all() -> Self {
        Self {
            content: Arc::from(""),
            policy: Policy::DisallowAll,
        }
    }

    /// Returns the group of rules that applies to `agent`
    pub fn find_group(&self, agent: &str) -> RobotsGroup {
        RobotsGroup {
            content: Arc::clone(&self.content),
            policy: self.policy,
            agent: agent.to_string(),
        }
    }
}

/// The robots.txt rules applying to one user agent
#[derive(Debug, Clone)]
pub struct RobotsGroup {
    content: Arc<str>,
    policy: Policy,
    agent: String,
}

impl RobotsGroup {
    /// Checks whether `path` may be fetched
    ///
    /// # Arguments
    ///
    /// * `path` - The URL path to check (e.g., "/page.html")
    pub fn test(&self, path: &str) -> bool {
        match self.policy {
            Policy::AllowAll => true,
            Policy::DisallowAll => false,
            Policy::Rules => {
                if self.content.trim().is_empty() {
                    return true;
                }
                let mut matcher = DefaultMatcher::default();
                matcher.one_agent_allowed_by_robots(&self.content, &self.agent, path)
            }
        }
    }

    /// The agent this group was selected for
    pub fn agent(&self) -> &str {
        &self.agent
    }
}
