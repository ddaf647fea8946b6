//! Walker coordinator - the crawl loop
//!
//! A single tokio task owns every piece of mutable crawl state: the job map,
//! the result map, the client pool and the counters. Callers talk to it
//! through [`Walker`], which sends [`Command`]s over a channel and waits for
//! the reply. Scrape tasks report back over a second channel. Commands and
//! results are handled one at a time, so every status is a consistent
//! snapshot.
//!
//! A loop ends when no job is open and nothing is in flight. The coordinator
//! then freezes a complete status, publishes it and restarts from the same
//! seed.

use crate::config::{validate, Config};
use crate::crawler::hooks::{Hooks, MetricsSink, NoopMetrics};
use crate::crawler::pool::{build_robots_client, ClientPool, ClientSettings};
use crate::crawler::scrape::{scrape, ScrapeJob, ScrapeOutcome};
use crate::crawler::status::{build_status, LoopCounters, Status};
use crate::crawler::types::{FetchedDocument, ScrapeResult};
use crate::robots::{disallowed_paths, fetch_robots, RobotsGroup};
use crate::url::{filter_scrape_links, normalize_link, seed_url, LinkLimitations, LinkList};
use crate::WalkerError;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use url::Url;

/// Interval at which the loop re-evaluates dispatch and completion on its own
const TICK: Duration = Duration::from_secs(1);

const COMMAND_BUFFER: usize = 32;

/// Requests handled by the coordinator task
#[derive(Debug)]
pub enum Command {
    Start {
        config: Box<Config>,
        hooks: Hooks,
        reply: oneshot::Sender<Result<LoopCompletions, WalkerError>>,
    },
    Status {
        reply: oneshot::Sender<Status>,
    },
    CompleteStatus {
        reply: oneshot::Sender<Option<Arc<Status>>>,
    },
    Stop {
        reply: oneshot::Sender<Status>,
    },
}

/// Where the current loop stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    /// Nothing started yet
    Idle,
    /// Open jobs are waiting for a client
    Running,
    /// Every job is in flight, waiting for results
    Draining,
    /// The loop just finished
    Completed,
}

/// Receives a complete status every time a loop finishes
///
/// Only the newest unread status is kept: a slow reader skips loops instead
/// of stalling the walker. `recv` returns `None` once the walker was started
/// again or stopped.
#[derive(Debug)]
pub struct LoopCompletions {
    rx: watch::Receiver<Option<Arc<Status>>>,
}

impl LoopCompletions {
    pub async fn recv(&mut self) -> Option<Arc<Status>> {
        loop {
            self.rx.changed().await.ok()?;
            if let Some(status) = self.rx.borrow_and_update().clone() {
                return Some(status);
            }
        }
    }
}

/// Handle to a running walker
///
/// Cloning the handle shares the same coordinator. The coordinator ends when
/// [`Walker::stop`] is called or every handle is dropped.
#[derive(Debug, Clone)]
pub struct Walker {
    commands: mpsc::Sender<Command>,
}

impl Default for Walker {
    fn default() -> Self {
        Self::new()
    }
}

impl Walker {
    /// Spawns a walker coordinator on the current tokio runtime
    pub fn new() -> Self {
        Self::with_metrics(Arc::new(NoopMetrics))
    }

    /// Spawns a walker coordinator that reports to `metrics`
    pub fn with_metrics(metrics: Arc<dyn MetricsSink>) -> Self {
        let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
        tokio::spawn(Coordinator::new(rx, metrics).run());
        Self { commands }
    }

    /// Starts walking the configured target
    ///
    /// Any loop in progress is abandoned. Unless robots are ignored, start
    /// fails if robots.txt disallows one of the seed paths.
    ///
    /// # Returns
    ///
    /// * `Ok(LoopCompletions)` - Receiver for the complete status of each loop
    /// * `Err(WalkerError)` - Invalid base URL, robots.txt failure or denial
    pub async fn start(&self, config: Config, hooks: Hooks) -> Result<LoopCompletions, WalkerError> {
        self.request(|reply| Command::Start {
            config: Box::new(config),
            hooks,
            reply,
        })
        .await?
    }

    /// Builds a status of the loop in progress
    pub async fn status(&self) -> Result<Status, WalkerError> {
        self.request(|reply| Command::Status { reply }).await
    }

    /// Returns the status of the last finished loop, if any
    pub async fn complete_status(&self) -> Result<Option<Arc<Status>>, WalkerError> {
        self.request(|reply| Command::CompleteStatus { reply }).await
    }

    /// Stops the coordinator and returns the status of the loop in progress
    ///
    /// Fetches in flight are not cancelled; their results are discarded.
    pub async fn stop(&self) -> Result<Status, WalkerError> {
        self.request(|reply| Command::Stop { reply }).await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, WalkerError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| WalkerError::EngineStopped)?;
        rx.await.map_err(|_| WalkerError::EngineStopped)
    }
}

/// Settings of the walk in progress
struct Walk {
    base: Url,
    paths: Vec<String>,
    concurrency: usize,
    group_header: Option<String>,
    ignore_robots: bool,
    limits: LinkLimitations,
    robots: Option<RobotsGroup>,
    hooks: Hooks,
}

/// A scrape outcome tagged with the start and pool it belongs to
struct TaggedOutcome {
    epoch: u64,
    pool_id: u64,
    outcome: ScrapeOutcome,
}

struct Coordinator {
    commands: mpsc::Receiver<Command>,
    results_tx: mpsc::UnboundedSender<TaggedOutcome>,
    results_rx: mpsc::UnboundedReceiver<TaggedOutcome>,
    metrics: Arc<dyn MetricsSink>,

    walk: Option<Walk>,
    pool: Option<ClientPool>,
    /// Bumped on every successful start
    epoch: u64,
    /// Bumped whenever the pool is rebuilt
    pool_id: u64,

    jobs: HashMap<String, bool>,
    results: HashMap<String, ScrapeResult>,
    counters: LoopCounters,
    running: usize,
    loop_started: bool,
    phase: LoopPhase,

    complete: Option<Arc<Status>>,
    completions: Option<watch::Sender<Option<Arc<Status>>>>,
}

impl Coordinator {
    fn new(commands: mpsc::Receiver<Command>, metrics: Arc<dyn MetricsSink>) -> Self {
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        Self {
            commands,
            results_tx,
            results_rx,
            metrics,
            walk: None,
            pool: None,
            epoch: 0,
            pool_id: 0,
            jobs: HashMap::new(),
            results: HashMap::new(),
            counters: LoopCounters::default(),
            running: 0,
            loop_started: false,
            phase: LoopPhase::Idle,
            complete: None,
            completions: None,
        }
    }

    async fn run(mut self) {
        let mut tick = tokio::time::interval(TICK);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            self.check_completion();
            self.dispatch();

            tokio::select! {
                _ = tick.tick() => {}
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command).await {
                            break;
                        }
                    }
                    None => break,
                },
                Some(tagged) = self.results_rx.recv() => self.handle_outcome(tagged),
            }
        }

        tracing::info!("Walker stopped");
    }

    /// Handles one command, returns false once the walker should stop
    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Start {
                config,
                hooks,
                reply,
            } => {
                let started = self.start(*config, hooks).await;
                if let Err(e) = &started {
                    tracing::warn!("Walk not started: {}", e);
                }
                let _ = reply.send(started);
            }
            Command::Status { reply } => {
                let _ = reply.send(self.live_status());
            }
            Command::CompleteStatus { reply } => {
                let _ = reply.send(self.complete.clone());
            }
            Command::Stop { reply } => {
                let _ = reply.send(self.live_status());
                return false;
            }
        }
        true
    }

    /// Validates a new walk and, on success, replaces the current one
    async fn start(&mut self, config: Config, hooks: Hooks) -> Result<LoopCompletions, WalkerError> {
        validate(&config)?;
        let base = Url::parse(&config.target.base_url)?;

        let settings = ClientSettings {
            agent: config.agent.clone(),
            use_cookies: config.use_cookies,
            accept_invalid_certs: config.accept_invalid_certs,
        };

        let robots = if config.ignore_robots {
            None
        } else {
            let client = build_robots_client(&settings)?;
            let data = fetch_robots(&client, &base).await?;
            let group = data.find_group(&config.agent);
            let denied = disallowed_paths(&group, &config.target.paths);
            if !denied.is_empty() {
                return Err(WalkerError::RobotsDenied { paths: denied });
            }
            Some(group)
        };

        let concurrency = config.concurrency as usize;
        let pool_matches = self
            .pool
            .as_ref()
            .map_or(false, |pool| pool.matches(concurrency, &settings));
        if !pool_matches {
            self.pool = Some(ClientPool::new(concurrency, settings)?);
            self.pool_id += 1;
        }

        self.epoch += 1;
        self.walk = Some(Walk {
            limits: LinkLimitations::from_config(&config),
            base,
            paths: config.target.paths,
            concurrency,
            group_header: config.group_header,
            ignore_robots: config.ignore_robots,
            robots,
            hooks,
        });

        let (tx, rx) = watch::channel(None);
        self.completions = Some(tx);

        self.restart();

        Ok(LoopCompletions { rx })
    }

    /// Reseeds the jobs from the walk's paths and clears the loop state
    fn restart(&mut self) {
        let Some(walk) = &self.walk else {
            return;
        };

        self.jobs = walk
            .paths
            .iter()
            .filter_map(|path| match seed_url(&walk.base, path) {
                Ok(seed) => Some((seed, false)),
                Err(e) => {
                    tracing::warn!("Skipping seed {}: {}", path, e);
                    None
                }
            })
            .collect();
        self.results = HashMap::new();
        self.counters.reset();
        self.running = 0;
        self.loop_started = true;
        self.metrics.reset_loop();

        tracing::info!(
            "Starting loop over {} with {} seed(s)",
            walk.base,
            self.jobs.len()
        );
        self.set_phase(LoopPhase::Running);
    }

    /// Hands idle clients to open jobs, bounded by the configured concurrency
    fn dispatch(&mut self) {
        if !self.loop_started {
            return;
        }
        let (Some(walk), Some(pool)) = (&self.walk, &mut self.pool) else {
            return;
        };

        for (url, active) in self.jobs.iter_mut() {
            if self.running >= walk.concurrency {
                break;
            }
            if *active {
                continue;
            }
            let Some(client) = pool.lease() else {
                break;
            };

            *active = true;
            self.running += 1;

            tracing::debug!("Dispatching {} on client {}", url, client.index);

            let job_url = url.clone();
            let slot = client.index;
            let job = ScrapeJob {
                url: url.clone(),
                base: walk.base.clone(),
                group_header: walk.group_header.clone(),
                client,
                hooks: walk.hooks.clone(),
            };
            let results_tx = self.results_tx.clone();
            let epoch = self.epoch;
            let pool_id = self.pool_id;

            tokio::spawn(async move {
                // a panicking hook must not leave the job in flight
                let outcome = match tokio::spawn(scrape(job)).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        tracing::warn!("Scrape task for {} failed: {}", job_url, e);
                        failed_outcome(job_url, slot, format!("scrape task failed: {}", e))
                    }
                };
                // the coordinator may be gone already
                let _ = results_tx.send(TaggedOutcome {
                    epoch,
                    pool_id,
                    outcome,
                });
            });
        }

        if self.running > 0 && self.jobs.values().all(|active| *active) {
            self.set_phase(LoopPhase::Draining);
        } else if !self.jobs.is_empty() {
            self.set_phase(LoopPhase::Running);
        }
    }

    /// Ingests one scrape outcome and enqueues the links it leads to
    fn handle_outcome(&mut self, tagged: TaggedOutcome) {
        let TaggedOutcome {
            epoch,
            pool_id,
            outcome,
        } = tagged;
        let ScrapeOutcome {
            result,
            slot,
            document,
        } = outcome;

        if pool_id == self.pool_id {
            if let Some(pool) = &mut self.pool {
                pool.release(slot);
            }
        }

        if epoch != self.epoch {
            tracing::debug!("Dropping result of an earlier walk: {}", result.target_url);
            return;
        }

        self.running = self.running.saturating_sub(1);

        let job_url = result.target_url.clone();
        self.jobs.remove(&job_url);

        let Some(walk) = &self.walk else {
            return;
        };

        let mut result = match &walk.hooks.result_modifier {
            Some(modifier) => match modifier.modify(result.clone()) {
                Ok(modified) => modified,
                Err(e) => {
                    tracing::warn!("Could not modify result for {}: {:#}", job_url, e);
                    result
                }
            },
            None => result,
        };

        result.time = Utc::now();
        self.counters.record(&result);
        self.metrics
            .observe_scrape(&result.group, result.code, result.duration);

        tracing::debug!(
            "Result {} {} ({} links)",
            result.code,
            job_url,
            result.links.len()
        );

        let links = next_links(walk, &result, document.as_deref());
        self.results.insert(job_url, result);

        for link in links.into_keys() {
            if !self.results.contains_key(&link) && !self.jobs.contains_key(&link) {
                self.jobs.insert(link, false);
            }
        }

        self.metrics.set_progress(self.jobs.len(), self.results.len());
    }

    /// Publishes the complete status and restarts once the loop ran dry
    fn check_completion(&mut self) {
        if !self.loop_started || !self.jobs.is_empty() || self.running != 0 {
            return;
        }
        let Some(walk) = &self.walk else {
            return;
        };

        let status = Arc::new(build_status(
            &self.results,
            &self.jobs,
            &self.counters,
            Utc::now(),
        ));

        tracing::info!(
            "Loop over {} complete: {} results in {}s",
            walk.base,
            status.scrape_total_requests,
            status.scrape_total_seconds
        );
        report_validation_metrics(self.metrics.as_ref(), &status, &walk.paths);

        self.set_phase(LoopPhase::Completed);
        self.complete = Some(Arc::clone(&status));
        if let Some(completions) = &self.completions {
            completions.send_replace(Some(status));
        }

        self.restart();
    }

    fn live_status(&self) -> Status {
        build_status(&self.results, &self.jobs, &self.counters, Utc::now())
    }

    fn set_phase(&mut self, phase: LoopPhase) {
        if self.phase != phase {
            tracing::debug!("Loop phase {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
        }
    }
}

/// Outcome for a scrape that ended without producing a result
fn failed_outcome(url: String, slot: usize, error: String) -> ScrapeOutcome {
    let mut result = ScrapeResult::new(url);
    result.error = Some(error);
    ScrapeOutcome {
        result,
        slot,
        document: None,
    }
}

/// Links of a result that may become jobs
fn next_links(walk: &Walk, result: &ScrapeResult, document: Option<&FetchedDocument>) -> LinkList {
    if let Some(link_filter) = &walk.hooks.link_filter {
        if let Some(error) = &result.error {
            tracing::debug!("Not following links of {}: {}", result.target_url, error);
            return LinkList::new();
        }
        let Some(document) = document else {
            return LinkList::new();
        };
        return match link_filter.filter_links(&walk.base, &document.url, document) {
            Ok(links) => links,
            Err(e) => {
                tracing::warn!("Link filter failed for {}: {:#}", result.target_url, e);
                LinkList::new()
            }
        };
    }

    if !walk.ignore_robots && result.is_nofollow() {
        tracing::trace!("Robots meta of {} says nofollow", result.target_url);
        return LinkList::new();
    }

    let link_next = normalized_pager_link(&walk.base, &result.structure.link_next);
    let link_prev = normalized_pager_link(&walk.base, &result.structure.link_prev);

    filter_scrape_links(
        &result.links,
        &walk.base,
        link_next.as_deref(),
        link_prev.as_deref(),
        &walk.limits,
        walk.robots.as_ref(),
    )
}

fn normalized_pager_link(base: &Url, href: &str) -> Option<String> {
    if href.is_empty() {
        return None;
    }
    normalize_link(base, href).ok().map(|link| link.to_string())
}

/// Reports the schema validation of every page of a finished loop
///
/// Each page is attributed to the longest configured path its URL starts
/// with, or `/`.
fn report_validation_metrics(metrics: &dyn MetricsSink, status: &Status, paths: &[String]) {
    for result in status.results.values() {
        let Some(report) = &result.validation_report else {
            continue;
        };
        let Ok(url) = Url::parse(&result.target_url) else {
            continue;
        };
        let path = paths
            .iter()
            .filter(|path| url.path().starts_with(path.as_str()))
            .max_by_key(|path| path.len())
            .map(String::as_str)
            .unwrap_or("/");

        metrics.track_validation(&result.group, path, report.score, &report.penalties_by_kind());
    }
}
