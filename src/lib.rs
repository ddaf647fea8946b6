//! Site-Walker: a continuous same-origin site crawler
//!
//! This crate implements a crawl engine that walks a website from a set of seed
//! paths, follows same-origin links according to a configurable policy, and
//! restarts from the same seed every time a full pass completes. Each finished
//! pass is kept as an immutable snapshot so a site can be monitored over time.

pub mod config;
pub mod crawler;
pub mod robots;
pub mod url;

use thiserror::Error;

/// Main error type for Site-Walker operations
#[derive(Debug, Error)]
pub enum WalkerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("robots.txt does not allow access to the following paths (you can either ignore robots or try as a different user agent): {}", .paths.join(", "))]
    RobotsDenied { paths: Vec<String> },

    #[error("Robots.txt error: {0}")]
    Robots(String),

    #[error("Walker engine is not running")]
    EngineStopped,
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),
}

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Hooks, LoopCompletions, ScrapeResult, Status, Walker};
pub use url::{filter_scrape_links, normalize_link, LinkLimitations};
