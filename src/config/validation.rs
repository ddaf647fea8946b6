use crate::config::types::{Config, Target};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_target(&config.target)?;
    validate_concurrency(config.concurrency)?;
    validate_agent(&config.agent)?;
    validate_prefixes("ignore", &config.ignore)?;
    validate_query_names(&config.ignore_queries_with)?;

    if let Some(header) = &config.group_header {
        if header.trim().is_empty() {
            return Err(ConfigError::Validation(
                "group-header cannot be empty when set".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates the crawl target
fn validate_target(target: &Target) -> Result<(), ConfigError> {
    let url = Url::parse(&target.base_url).map_err(|e| {
        ConfigError::InvalidUrl(format!("Invalid base-url '{}': {}", target.base_url, e))
    })?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "base-url '{}' must use http or https",
            target.base_url
        )));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(ConfigError::Validation(format!(
            "base-url '{}' has no host",
            target.base_url
        )));
    }

    if target.paths.is_empty() {
        return Err(ConfigError::Validation(
            "target must have at least one path".to_string(),
        ));
    }

    validate_prefixes("paths", &target.paths)
}

fn validate_concurrency(concurrency: u32) -> Result<(), ConfigError> {
    if !(1..=100).contains(&concurrency) {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 100, got {}",
            concurrency
        )));
    }
    Ok(())
}

fn validate_agent(agent: &str) -> Result<(), ConfigError> {
    if agent.trim().is_empty() {
        return Err(ConfigError::Validation("agent cannot be empty".to_string()));
    }

    // header values may not carry line breaks
    if agent.chars().any(|c| c == '\r' || c == '\n') {
        return Err(ConfigError::Validation(format!(
            "agent must be a single line, got {:?}",
            agent
        )));
    }

    Ok(())
}

/// Path lists must hold absolute paths
fn validate_prefixes(field: &str, prefixes: &[String]) -> Result<(), ConfigError> {
    for prefix in prefixes {
        if !prefix.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "{} entry '{}' must start with '/'",
                field, prefix
            )));
        }
    }
    Ok(())
}

fn validate_query_names(names: &[String]) -> Result<(), ConfigError> {
    if names.iter().any(|name| name.is_empty()) {
        return Err(ConfigError::Validation(
            "ignore-queries-with cannot contain empty names".to_string(),
        ));
    }
    Ok(())
}
