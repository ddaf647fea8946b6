//! Pool of reusable HTTP clients
//!
//! Each client keeps its own connections and, optionally, its own cookie jar.
//! A client is leased to exactly one scrape at a time; the pool size is an
//! upper bound on concurrent fetches.

use reqwest::{redirect::Policy, Client};
use std::time::Duration;

/// Total time allowed for one request
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Time allowed to establish a connection, TLS handshake included
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

const TCP_KEEPALIVE: Duration = Duration::from_secs(5);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(15);
const POOL_MAX_IDLE_PER_HOST: usize = 50;

/// Settings every client of a pool is built with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub agent: String,
    pub use_cookies: bool,
    pub accept_invalid_certs: bool,
}

/// Builds one pool client
///
/// Redirects are not followed by the client; the scrape worker follows them
/// itself so every hop can be recorded.
pub fn build_http_client(settings: &ClientSettings) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(settings.agent.clone())
        .timeout(REQUEST_TIMEOUT)
        .connect_timeout(CONNECT_TIMEOUT)
        .tcp_keepalive(TCP_KEEPALIVE)
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .redirect(Policy::none())
        .cookie_store(settings.use_cookies)
        .danger_accept_invalid_certs(settings.accept_invalid_certs)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Builds the client used to fetch robots.txt
///
/// Unlike pool clients it follows redirects on its own.
pub fn build_robots_client(settings: &ClientSettings) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(settings.agent.clone())
        .timeout(REQUEST_TIMEOUT)
        .connect_timeout(CONNECT_TIMEOUT)
        .danger_accept_invalid_certs(settings.accept_invalid_certs)
        .build()
}

#[derive(Debug)]
struct PoolClient {
    client: Client,
    busy: bool,
}

/// A client handed out by [`ClientPool::lease`]
///
/// The slot index has to be handed back with [`ClientPool::release`].
#[derive(Debug, Clone)]
pub struct LeasedClient {
    pub index: usize,
    pub client: Client,
    pub agent: String,
}

/// Fixed set of clients with a busy flag per client
#[derive(Debug)]
pub struct ClientPool {
    settings: ClientSettings,
    clients: Vec<PoolClient>,
}

impl ClientPool {
    /// Builds `count` clients with identical settings
    pub fn new(count: usize, settings: ClientSettings) -> Result<Self, reqwest::Error> {
        let clients = (0..count)
            .map(|_| {
                build_http_client(&settings).map(|client| PoolClient {
                    client,
                    busy: false,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            "Built client pool of {} for agent {:?} (cookies: {})",
            count,
            settings.agent,
            settings.use_cookies
        );

        Ok(Self { settings, clients })
    }

    /// True if the pool was built for this size and these settings
    pub fn matches(&self, count: usize, settings: &ClientSettings) -> bool {
        self.clients.len() == count && &self.settings == settings
    }

    /// Takes the first idle client, if any
    pub fn lease(&mut self) -> Option<LeasedClient> {
        let (index, slot) = self
            .clients
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| !slot.busy)?;
        slot.busy = true;
        Some(LeasedClient {
            index,
            client: slot.client.clone(),
            agent: self.settings.agent.clone(),
        })
    }

    /// Marks a leased client idle again
    pub fn release(&mut self, index: usize) {
        match self.clients.get_mut(index) {
            Some(slot) => slot.busy = false,
            None => tracing::warn!("Released unknown pool slot {}", index),
        }
    }

    pub fn busy_count(&self) -> usize {
        self.clients.iter().filter(|slot| slot.busy).count()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
