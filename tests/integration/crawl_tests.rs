//! Integration tests for the walker
//!
//! These tests use wiremock to create mock HTTP servers and drive complete
//! walk loops through the public `Walker` API.

use site_walker::config::Config;
use site_walker::crawler::{FetchedDocument, Hooks, MetricsSink, ScrapeResult, Status, Walker};
use site_walker::{LoopCompletions, WalkerError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LOOP_TIMEOUT: Duration = Duration::from_secs(20);

/// Creates a test configuration walking the mock server from `/`
fn create_test_config(base_url: &str) -> Config {
    let mut config = Config::for_target(base_url, vec!["/".to_string()]);
    config.concurrency = 1;
    config.agent = "TestBot".to_string();
    config
}

fn html_page(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(
        format!("<html><head><title>Test</title></head><body>{}</body></html>", body),
        "text/html",
    )
}

async fn mount_page(server: &MockServer, page_path: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(page_path))
        .respond_with(html_page(body))
        .mount(server)
        .await;
}

/// Waits for the next completed loop
async fn next_loop(completions: &mut LoopCompletions) -> Arc<Status> {
    tokio::time::timeout(LOOP_TIMEOUT, completions.recv())
        .await
        .expect("loop did not complete in time")
        .expect("walker stopped publishing loops")
}

fn result_for<'a>(status: &'a Status, server: &MockServer, page_path: &str) -> &'a ScrapeResult {
    let url = format!("{}{}", server.uri(), page_path);
    status
        .results
        .get(&url)
        .unwrap_or_else(|| panic!("no result for {}", url))
}

/// Mounts a small site: `/` links to `/a` and `/b`, `/a` links back and to
/// `/b`, `/b` links off-site.
async fn mount_small_site(server: &MockServer) {
    mount_page(server, "/", r#"<a href="/a">A</a> <a href="/b#top">B</a>"#).await;
    mount_page(server, "/a", r#"<a href="/">Home</a> <a href="b">B</a>"#).await;
    mount_page(
        server,
        "/b",
        r#"<a href="https://other.example/elsewhere">Elsewhere</a>"#,
    )
    .await;
}

#[tokio::test]
async fn test_full_loop_single_site() {
    let mock_server = MockServer::start().await;
    mount_small_site(&mock_server).await;

    let walker = Walker::new();
    let mut completions = walker
        .start(create_test_config(&mock_server.uri()), Hooks::default())
        .await
        .expect("start failed");

    let status = next_loop(&mut completions).await;

    assert_eq!(status.results.len(), 3, "results: {:?}", status.results.keys());
    assert!(status.jobs.is_empty());
    assert_eq!(status.scrape_total_requests, 3);
    assert_eq!(status.code_counts.get(&200), Some(&3));
    assert_eq!(status.group_counts.get("default"), Some(&3));

    let home = result_for(&status, &mock_server, "/");
    assert_eq!(home.code, 200);
    assert!(home.error.is_none());
    assert_eq!(home.structure.title, "Test");
    assert!(home.content_type.contains("text/html"));
    assert!(status
        .results
        .keys()
        .all(|url| url.starts_with(&mock_server.uri())));

    let complete = walker
        .complete_status()
        .await
        .unwrap()
        .expect("no complete status");
    assert_eq!(complete.results.len(), 3);

    walker.stop().await.unwrap();
}

#[tokio::test]
async fn test_robots_denies_seed_path() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("User-agent: TestBot\nDisallow: /private\n"),
        )
        .mount(&mock_server)
        .await;

    let mut config = create_test_config(&mock_server.uri());
    config.target.paths = vec!["/".to_string(), "/private".to_string()];

    let walker = Walker::new();
    let err = walker.start(config.clone(), Hooks::default()).await.unwrap_err();

    match err {
        WalkerError::RobotsDenied { paths } => assert_eq!(paths, vec!["/private".to_string()]),
        other => panic!("unexpected error: {}", other),
    }

    // Ignoring robots lets the same walk start
    config.ignore_robots = true;
    assert!(walker.start(config, Hooks::default()).await.is_ok());
    walker.stop().await.unwrap();
}

#[tokio::test]
async fn test_robots_server_error_denies_everything() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let walker = Walker::new();
    let err = walker
        .start(create_test_config(&mock_server.uri()), Hooks::default())
        .await
        .unwrap_err();

    assert!(matches!(err, WalkerError::RobotsDenied { .. }));
}

#[tokio::test]
async fn test_robots_filters_links() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /admin\n"))
        .mount(&mock_server)
        .await;

    mount_page(&mock_server, "/", r#"<a href="/admin/users">Admin</a> <a href="/public">Public</a>"#).await;
    mount_page(&mock_server, "/public", "nothing here").await;

    Mock::given(method("GET"))
        .and(path("/admin/users"))
        .respond_with(html_page("secret"))
        .expect(0)
        .mount(&mock_server)
        .await;

    let walker = Walker::new();
    let mut completions = walker
        .start(create_test_config(&mock_server.uri()), Hooks::default())
        .await
        .unwrap();

    let status = next_loop(&mut completions).await;
    walker.stop().await.unwrap();

    assert_eq!(status.results.len(), 2);
    result_for(&status, &mock_server, "/public");
}

#[tokio::test]
async fn test_pager_links_are_not_followed() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"<html><head><link rel="next" href="/list/2"></head>
            <body><a href="/list/2">Next</a> <a href="/item">Item</a></body></html>"#,
            "text/html",
        ))
        .mount(&mock_server)
        .await;
    mount_page(&mock_server, "/item", "item").await;

    Mock::given(method("GET"))
        .and(path("/list/2"))
        .respond_with(html_page("page two"))
        .expect(0)
        .mount(&mock_server)
        .await;

    let mut config = create_test_config(&mock_server.uri());
    config.target.paths = vec!["/list".to_string()];
    config.ignore_robots = true;

    let walker = Walker::new();
    let mut completions = walker.start(config, Hooks::default()).await.unwrap();

    let status = next_loop(&mut completions).await;
    walker.stop().await.unwrap();

    assert_eq!(status.results.len(), 2);
    let list = result_for(&status, &mock_server, "/list");
    assert!(list.structure.link_next.ends_with("/list/2"));
}

#[tokio::test]
async fn test_concurrency_bound() {
    let mock_server = MockServer::start().await;

    let links: String = (0..6)
        .map(|i| format!(r#"<a href="/page/{}">{}</a>"#, i, i))
        .collect();
    mount_page(&mock_server, "/", &links).await;

    for i in 0..6 {
        Mock::given(method("GET"))
            .and(path(format!("/page/{}", i)))
            .respond_with(html_page("slow").set_delay(Duration::from_millis(150)))
            .mount(&mock_server)
            .await;
    }

    let mut config = create_test_config(&mock_server.uri());
    config.concurrency = 2;
    config.ignore_robots = true;

    let walker = Walker::new();
    let mut completions = walker.start(config, Hooks::default()).await.unwrap();

    let mut max_active = 0;
    let deadline = tokio::time::Instant::now() + LOOP_TIMEOUT;
    while walker.complete_status().await.unwrap().is_none() {
        assert!(tokio::time::Instant::now() < deadline, "loop did not complete");
        let status = walker.status().await.unwrap();
        max_active = max_active.max(status.active_jobs());
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let status = next_loop(&mut completions).await;
    walker.stop().await.unwrap();

    assert!(max_active <= 2, "saw {} active jobs", max_active);
    assert!(max_active > 0);
    assert_eq!(status.results.len(), 7);
}

#[tokio::test]
async fn test_restart_keeps_complete_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(r#"<a href="/a">A</a>"#).set_delay(Duration::from_millis(200)))
        .mount(&mock_server)
        .await;
    mount_page(&mock_server, "/a", "leaf").await;

    let mut config = create_test_config(&mock_server.uri());
    config.ignore_robots = true;

    let walker = Walker::new();
    let mut first = walker.start(config.clone(), Hooks::default()).await.unwrap();
    let completed = next_loop(&mut first).await;
    assert_eq!(completed.results.len(), 2);

    let _second = walker.start(config, Hooks::default()).await.unwrap();

    // The earlier receiver is closed by the new start
    let closed = tokio::time::timeout(LOOP_TIMEOUT, first.recv()).await.unwrap();
    assert!(closed.is_none());

    let live = walker.status().await.unwrap();
    assert!(live.results.is_empty());
    assert_eq!(live.jobs.len(), 1);

    let complete = walker.complete_status().await.unwrap().unwrap();
    assert_eq!(complete.results.len(), 2);

    walker.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_returns_status_and_ends_walker() {
    let mock_server = MockServer::start().await;
    mount_small_site(&mock_server).await;

    let mut config = create_test_config(&mock_server.uri());
    config.ignore_robots = true;

    let walker = Walker::new();
    walker.start(config.clone(), Hooks::default()).await.unwrap();

    let status = walker.stop().await.unwrap();
    assert!(status.results.len() + status.jobs.len() >= 1);

    assert!(matches!(
        walker.status().await.unwrap_err(),
        WalkerError::EngineStopped
    ));
    assert!(matches!(
        walker.start(config, Hooks::default()).await.unwrap_err(),
        WalkerError::EngineStopped
    ));
}

#[tokio::test]
async fn test_error_results_and_redirects() {
    let mock_server = MockServer::start().await;

    mount_page(
        &mock_server,
        "/",
        r#"<a href="/gone">Gone</a> <a href="/old">Old</a>"#,
    )
    .await;
    mount_page(&mock_server, "/new", "moved here").await;

    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "/new"))
        .mount(&mock_server)
        .await;

    let mut config = create_test_config(&mock_server.uri());
    config.ignore_robots = true;

    let walker = Walker::new();
    let mut completions = walker.start(config, Hooks::default()).await.unwrap();
    let status = next_loop(&mut completions).await;
    walker.stop().await.unwrap();

    let gone = result_for(&status, &mock_server, "/gone");
    assert_eq!(gone.code, 404);
    assert!(gone.error.as_deref().unwrap_or_default().contains("404"));
    assert_eq!(status.dead_links().len(), 1);

    let old = result_for(&status, &mock_server, "/old");
    assert_eq!(old.code, 200);
    assert_eq!(old.redirects.len(), 1);
    assert_eq!(old.redirects[0].code, 301);
    assert_eq!(old.redirects[0].url, format!("{}/new", mock_server.uri()));
}

#[derive(Default)]
struct CountingMetrics {
    loops: AtomicUsize,
    scrapes: AtomicUsize,
}

impl MetricsSink for CountingMetrics {
    fn reset_loop(&self) {
        self.loops.fetch_add(1, Ordering::SeqCst);
    }

    fn observe_scrape(&self, group: &str, _code: u16, _duration: Duration) {
        if group == "modified" {
            self.scrapes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[tokio::test]
async fn test_result_modifier_and_metrics() {
    let mock_server = MockServer::start().await;
    mount_small_site(&mock_server).await;

    let mut config = create_test_config(&mock_server.uri());
    config.ignore_robots = true;

    let metrics = Arc::new(CountingMetrics::default());
    let walker = Walker::with_metrics(metrics.clone());
    let hooks = Hooks::default().with_result_modifier(
        |mut result: ScrapeResult| -> anyhow::Result<ScrapeResult> {
            result.group = "modified".to_string();
            Ok(result)
        },
    );

    let mut completions = walker.start(config, hooks).await.unwrap();
    let status = next_loop(&mut completions).await;
    walker.stop().await.unwrap();

    assert!(status.results.values().all(|r| r.group == "modified"));
    assert_eq!(status.group_counts.get("modified"), Some(&3));
    assert!(metrics.loops.load(Ordering::SeqCst) >= 1);
    assert!(metrics.scrapes.load(Ordering::SeqCst) >= 3);
}

#[tokio::test]
async fn test_credentialed_base_fetches_each_page_once() {
    let mock_server = MockServer::start().await;
    mount_small_site(&mock_server).await;

    let base = mock_server.uri().replacen("http://", "http://user:pw@", 1);
    let mut config = create_test_config(&base);
    config.ignore_robots = true;

    let walker = Walker::new();
    let mut completions = walker.start(config, Hooks::default()).await.unwrap();
    let status = next_loop(&mut completions).await;
    walker.stop().await.unwrap();

    let mut keys: Vec<&String> = status.results.keys().collect();
    keys.sort();
    assert_eq!(keys.len(), 3, "results: {:?}", keys);
    assert!(keys.iter().all(|url| url.starts_with(&base)));
    assert!(status.results.contains_key(&format!("{}/", base)));
}

#[tokio::test]
async fn test_panicking_hook_fails_only_its_page() {
    let mock_server = MockServer::start().await;
    mount_small_site(&mock_server).await;

    let mut config = create_test_config(&mock_server.uri());
    config.ignore_robots = true;

    let hooks = Hooks::default().with_scrape(
        |doc: &FetchedDocument| -> anyhow::Result<serde_json::Value> {
            if doc.url.path() == "/a" {
                panic!("scrape hook blew up");
            }
            Ok(serde_json::json!({ "path": doc.url.path() }))
        },
    );

    let walker = Walker::new();
    let mut completions = walker.start(config, hooks).await.unwrap();
    let status = next_loop(&mut completions).await;
    walker.stop().await.unwrap();

    assert_eq!(status.results.len(), 3);
    assert!(status.jobs.is_empty());

    let failed = result_for(&status, &mock_server, "/a");
    assert!(failed
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("scrape task failed"));

    let home = result_for(&status, &mock_server, "/");
    assert!(home.error.is_none());
    assert_eq!(home.data, Some(serde_json::json!({ "path": "/" })));
}

#[tokio::test]
async fn test_paging_follows_next_link() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"<html><head><link rel="next" href="/list/2"></head>
            <body><a href="/list/2">Next</a></body></html>"#,
            "text/html",
        ))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/list/2"))
        .respond_with(html_page("page two"))
        .expect(1..)
        .mount(&mock_server)
        .await;

    let mut config = create_test_config(&mock_server.uri());
    config.target.paths = vec!["/list".to_string()];
    config.ignore_robots = true;
    config.paging = true;

    let walker = Walker::new();
    let mut completions = walker.start(config, Hooks::default()).await.unwrap();
    let status = next_loop(&mut completions).await;
    walker.stop().await.unwrap();

    assert_eq!(status.results.len(), 2);
    assert_eq!(result_for(&status, &mock_server, "/list/2").code, 200);
}

#[tokio::test]
async fn test_jobs_and_results_stay_disjoint() {
    let mock_server = MockServer::start().await;

    let links: String = (0..5)
        .map(|i| format!(r#"<a href="/item/{}">{}</a> <a href="/">Home</a>"#, i, i))
        .collect();
    mount_page(&mock_server, "/", &links).await;

    for i in 0..5 {
        Mock::given(method("GET"))
            .and(path(format!("/item/{}", i)))
            .respond_with(
                html_page(r#"<a href="/">Home</a> <a href="/item/0">First</a>"#)
                    .set_delay(Duration::from_millis(100)),
            )
            .mount(&mock_server)
            .await;
    }

    let mut config = create_test_config(&mock_server.uri());
    config.concurrency = 2;
    config.ignore_robots = true;

    let walker = Walker::new();
    walker.start(config, Hooks::default()).await.unwrap();

    let deadline = tokio::time::Instant::now() + LOOP_TIMEOUT;
    let mut samples = 0;
    while walker.complete_status().await.unwrap().is_none() {
        assert!(tokio::time::Instant::now() < deadline, "loop did not complete");
        let status = walker.status().await.unwrap();
        for url in status.jobs.keys() {
            assert!(
                !status.results.contains_key(url),
                "{} is both a job and a result",
                url
            );
        }
        samples += 1;
        tokio::time::sleep(Duration::from_millis(15)).await;
    }
    walker.stop().await.unwrap();

    assert!(samples > 0);
}
