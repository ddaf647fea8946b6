//! Status snapshots of a walk
//!
//! A [`Status`] owns copies of the jobs and results it was built from, so it
//! stays valid while the walk goes on.

use crate::crawler::types::ScrapeResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Length of the trailing window used for the current scrape speed
pub const SCRAPE_WINDOW: Duration = Duration::from_secs(60);

/// Counters kept by the coordinator for the current loop
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoopCounters {
    pub code_counts: HashMap<u16, usize>,
    pub group_counts: HashMap<String, usize>,
}

impl LoopCounters {
    /// Counts one recorded result
    pub fn record(&mut self, result: &ScrapeResult) {
        *self.code_counts.entry(result.code).or_insert(0) += 1;
        *self.group_counts.entry(result.group.clone()).or_insert(0) += 1;
    }

    pub fn reset(&mut self) {
        self.code_counts.clear();
        self.group_counts.clear();
    }
}

/// Point-in-time view of a walk
#[derive(Debug, Clone, Default, Serialize)]
pub struct Status {
    pub results: HashMap<String, ScrapeResult>,
    /// Open jobs, `true` while a fetch is in flight
    pub jobs: HashMap<String, bool>,
    /// Requests per second within the trailing window
    pub scrape_speed: f64,
    /// Requests per second since the oldest result
    pub scrape_speed_average: f64,
    pub scrape_window_requests: u64,
    pub scrape_window_seconds: u64,
    pub scrape_total_requests: u64,
    pub scrape_total_seconds: u64,
    pub code_counts: HashMap<u16, usize>,
    pub group_counts: HashMap<String, usize>,
}

/// Builds a status from the live state of the coordinator
///
/// Results are not ordered, so the oldest timestamps are searched for. Speeds
/// are `0.0` when no full second has passed.
pub fn build_status(
    results: &HashMap<String, ScrapeResult>,
    jobs: &HashMap<String, bool>,
    counters: &LoopCounters,
    now: DateTime<Utc>,
) -> Status {
    let now_secs = now.timestamp();
    let mut first = now_secs;
    let mut window_first = now_secs;
    let mut window_requests = 0u64;

    for result in results.values() {
        let ts = result.time.timestamp();
        first = first.min(ts);

        let in_window = now
            .signed_duration_since(result.time)
            .to_std()
            .map_or(true, |age| age < SCRAPE_WINDOW);
        if in_window {
            window_first = window_first.min(ts);
            window_requests += 1;
        }
    }

    let total_requests = results.len() as u64;
    let window_seconds = (now_secs - window_first).max(0) as u64;
    let total_seconds = (now_secs - first).max(0) as u64;

    Status {
        results: results.clone(),
        jobs: jobs.clone(),
        scrape_speed: per_second(window_requests, window_seconds),
        scrape_speed_average: per_second(total_requests, total_seconds),
        scrape_window_requests: window_requests,
        scrape_window_seconds: window_seconds,
        scrape_total_requests: total_requests,
        scrape_total_seconds: total_seconds,
        code_counts: counters.code_counts.clone(),
        group_counts: counters.group_counts.clone(),
    }
}

fn per_second(count: u64, seconds: u64) -> f64 {
    if seconds == 0 {
        0.0
    } else {
        count as f64 / seconds as f64
    }
}

impl Status {
    /// Number of jobs with a fetch in flight
    pub fn active_jobs(&self) -> usize {
        self.jobs.values().filter(|active| **active).count()
    }

    /// Results that answered 404, sorted by URL
    pub fn dead_links(&self) -> Vec<&ScrapeResult> {
        let mut dead: Vec<&ScrapeResult> =
            self.results.values().filter(|r| r.code == 404).collect();
        dead.sort_by(|a, b| a.target_url.cmp(&b.target_url));
        dead
    }

    /// Results without a response or with a 5xx, sorted by URL
    pub fn failures(&self) -> Vec<&ScrapeResult> {
        let mut failed: Vec<&ScrapeResult> = self
            .results
            .values()
            .filter(|r| r.code == 0 || r.code >= 500)
            .collect();
        failed.sort_by(|a, b| a.target_url.cmp(&b.target_url));
        failed
    }

    /// Response time distribution per group
    pub fn duration_buckets(&self) -> BTreeMap<String, Vec<BucketCount>> {
        let mut by_group: BTreeMap<String, Vec<Duration>> = BTreeMap::new();
        for result in self.results.values() {
            by_group
                .entry(result.group.clone())
                .or_default()
                .push(result.duration);
        }

        by_group
            .into_iter()
            .map(|(group, durations)| {
                let counts = DURATION_BUCKETS
                    .iter()
                    .map(|bucket| BucketCount {
                        bucket: *bucket,
                        count: durations.iter().filter(|d| bucket.contains(**d)).count(),
                        total: durations.len(),
                    })
                    .collect();
                (group, counts)
            })
            .collect()
    }
}

/// A named response time range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DurationBucket {
    pub name: &'static str,
    pub from: Duration,
    pub to: Duration,
}

impl DurationBucket {
    /// True for durations strictly between the bounds
    pub fn contains(&self, duration: Duration) -> bool {
        duration > self.from && duration < self.to
    }
}

const fn bucket(name: &'static str, from_ms: u64, to_ms: u64) -> DurationBucket {
    DurationBucket {
        name,
        from: Duration::from_millis(from_ms),
        to: Duration::from_millis(to_ms),
    }
}

pub const DURATION_BUCKETS: [DurationBucket; 10] = [
    bucket("awesome", 0, 50),
    bucket("great", 50, 100),
    bucket("good", 100, 200),
    bucket("ok", 200, 300),
    bucket("not great", 300, 500),
    bucket("bad", 500, 1_000),
    bucket("really bad", 1_000, 3_000),
    bucket("looks broken", 3_000, 5_000),
    bucket("site seems down", 5_000, 10_000),
    bucket("must not happen", 10_000, 3_600_000),
];

/// Number of results of a group within one bucket
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BucketCount {
    pub bucket: DurationBucket,
    pub count: usize,
    pub total: usize,
}

impl BucketCount {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.count as f64 / self.total as f64 * 100.0).round()
        }
    }
}
