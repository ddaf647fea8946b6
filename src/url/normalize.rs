use crate::UrlError;
use url::Url;

/// Normalizes a raw link found on a page into an absolute URL
///
/// # Normalization Steps
///
/// 1. Drop the fragment (everything from the first `#`)
/// 2. Resolve the remainder against `base`; a link without host or scheme
///    inherits them from `base`
/// 3. Copy the credentials of `base` onto the link
///
/// Links with other schemes (`mailto:`, `javascript:`, ...) normalize fine and
/// are left for the link filter to reject. Normalizing an already normalized
/// link returns it unchanged.
///
/// # Arguments
///
/// * `base` - The base URL of the walk
/// * `raw` - The href as found in the document
///
/// # Returns
///
/// * `Ok(Url)` - Normalized URL
/// * `Err(UrlError)` - The link can not be parsed
///
/// # Examples
///
/// ```
/// use site_walker::url::normalize_link;
/// use url::Url;
///
/// let base = Url::parse("https://example.com").unwrap();
/// let url = normalize_link(&base, "/page#top").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/page");
/// ```
pub fn normalize_link(base: &Url, raw: &str) -> Result<Url, UrlError> {
    let without_fragment = match raw.find('#') {
        Some(pos) => &raw[..pos],
        None => raw,
    };

    let mut link = base
        .join(without_fragment)
        .map_err(|e| UrlError::Parse(format!("{}: {}", raw, e)))?;
    link.set_fragment(None);

    if has_credentials(base) && !link.cannot_be_a_base() {
        link.set_username(base.username())
            .map_err(|_| UrlError::Parse(format!("{}: can not carry credentials", raw)))?;
        link.set_password(base.password())
            .map_err(|_| UrlError::Parse(format!("{}: can not carry credentials", raw)))?;
    }

    Ok(link)
}

fn has_credentials(url: &Url) -> bool {
    !url.username().is_empty() || url.password().is_some()
}

/// Builds the seed URL for a path below the base origin
///
/// Seeds are normalized like every discovered link, so a page reached from a
/// seed and from a link maps to one key. The base query is kept unless the
/// path brings its own.
pub fn seed_url(base: &Url, path: &str) -> Result<String, UrlError> {
    let mut seed = normalize_link(base, path)?;
    if seed.query().is_none() {
        if let Some(query) = base.query().filter(|q| !q.is_empty()) {
            seed.set_query(Some(query));
        }
    }
    Ok(seed.to_string())
}
