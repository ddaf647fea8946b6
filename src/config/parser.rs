use crate::config::types::{Config, Target};
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;
use url::{Position, Url};

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use site_walker::config::load_config;
///
/// let config = load_config(Path::new("walker.toml")).unwrap();
/// println!("Concurrency: {}", config.concurrency);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses configuration from TOML text, applies target defaults and validates
///
/// A target given without paths uses the path of its base URL as the only seed
/// path (or `/` when the base URL has none), and the base URL is reduced to its
/// origin.
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let mut config: Config = toml::from_str(content)?;

    apply_target_defaults(&mut config.target)?;

    validate(&config)?;

    Ok(config)
}

/// Fills in seed paths for a target that only names a URL
pub(crate) fn apply_target_defaults(target: &mut Target) -> Result<(), ConfigError> {
    if target.base_url.trim().is_empty() {
        return Err(ConfigError::Validation(
            "target base url must not be empty".to_string(),
        ));
    }

    if !target.paths.is_empty() {
        return Ok(());
    }

    let url = Url::parse(&target.base_url).map_err(|e| {
        ConfigError::InvalidUrl(format!("target base url can not be parsed: {}", e))
    })?;

    let path = url.path();
    if path.is_empty() || path == "/" {
        target.paths = vec!["/".to_string()];
    } else {
        target.paths = vec![path.to_string()];
    }

    let mut origin = url[..Position::BeforePath].to_string();
    if let Some(query) = url.query() {
        origin.push('?');
        origin.push_str(query);
    }
    target.base_url = origin;

    Ok(())
}

/// Computes a SHA-256 hash of the configuration file content
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}
