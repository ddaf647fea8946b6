//! URL handling module for Site-Walker
//!
//! This module normalizes links found on pages and decides which of them stay
//! inside the walk.

mod filter;
mod normalize;

use std::collections::HashMap;

// Re-export main functions
pub use filter::{accept_link, check_link, filter_scrape_links, LinkLimitations, LinkRejection};
pub use normalize::{normalize_link, seed_url};

/// Links of a page mapped to the number of times they occur
pub type LinkList = HashMap<String, usize>;
