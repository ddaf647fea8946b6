use serde::Deserialize;

/// Default number of pooled clients and concurrent fetches
pub const DEFAULT_CONCURRENCY: u32 = 2;

/// Default user agent sent with every request and matched against robots.txt
pub const DEFAULT_AGENT: &str = "site-walker";

/// Main configuration structure for Site-Walker
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Site to walk
    pub target: Target,

    /// Maximum number of concurrent fetches (also the client pool size)
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// User agent for requests and robots.txt group selection
    #[serde(default = "default_agent")]
    pub agent: String,

    /// Give every pooled client its own cookie jar
    #[serde(default = "default_true")]
    pub use_cookies: bool,

    /// Skip TLS certificate verification
    #[serde(default)]
    pub accept_invalid_certs: bool,

    /// Do not fetch or honour robots.txt and robots meta directives
    #[serde(default)]
    pub ignore_robots: bool,

    /// Never follow links carrying a query string
    #[serde(default)]
    pub ignore_all_queries: bool,

    /// Query parameter names that exclude a link
    #[serde(default)]
    pub ignore_queries_with: Vec<String>,

    /// Path prefixes that exclude a link
    #[serde(default)]
    pub ignore: Vec<String>,

    /// Maximum number of path segments (0 = unlimited)
    #[serde(default)]
    pub depth: u32,

    /// Follow rel=prev / rel=next pager links
    #[serde(default)]
    pub paging: bool,

    /// Response header carrying the page group (template) name
    #[serde(default)]
    pub group_header: Option<String>,
}

/// Crawl target: the base origin and the seed paths below it
///
/// In TOML this is either a plain string (`target = "https://example.com/blog"`)
/// or a table with `base-url` and `paths`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "RawTarget")]
pub struct Target {
    pub base_url: String,
    pub paths: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTarget {
    Url(String),
    Table {
        #[serde(rename = "base-url", alias = "baseurl")]
        base_url: String,
        #[serde(default)]
        paths: Vec<String>,
    },
}

impl From<RawTarget> for Target {
    fn from(raw: RawTarget) -> Self {
        match raw {
            RawTarget::Url(base_url) => Target {
                base_url,
                paths: Vec::new(),
            },
            RawTarget::Table { base_url, paths } => Target { base_url, paths },
        }
    }
}

impl Config {
    /// Creates a configuration with default settings for the given target
    pub fn for_target(base_url: impl Into<String>, paths: Vec<String>) -> Self {
        Self {
            target: Target {
                base_url: base_url.into(),
                paths,
            },
            ..Self::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target: Target::default(),
            concurrency: DEFAULT_CONCURRENCY,
            agent: DEFAULT_AGENT.to_string(),
            use_cookies: true,
            accept_invalid_certs: false,
            ignore_robots: false,
            ignore_all_queries: false,
            ignore_queries_with: Vec::new(),
            ignore: Vec::new(),
            depth: 0,
            paging: false,
            group_header: None,
        }
    }
}

fn default_concurrency() -> u32 {
    DEFAULT_CONCURRENCY
}

fn default_agent() -> String {
    DEFAULT_AGENT.to_string()
}

fn default_true() -> bool {
    true
}
