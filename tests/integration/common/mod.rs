//! Shared helpers for the integration tests
#![allow(dead_code)]

use arw_crawler::config::{Config, CrawlerConfig, QueueConfig, StorageConfig, UserAgentConfig};
use arw_crawler::queue::Job;
use arw_crawler::{ArwEngine, CrawlResult};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration backed by an in-memory store
pub fn create_test_config() -> Config {
    create_test_config_with_db(":memory:")
}

/// Creates a test configuration with short intervals and fast retries
pub fn create_test_config_with_db(db_path: &str) -> Config {
    Config {
        crawler: CrawlerConfig {
            minimum_request_interval: 10,
            rate_window: 1000,
            rate_window_max_requests: 100,
            request_timeout: 5000,
            ..Default::default()
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        storage: StorageConfig {
            database_path: db_path.to_string(),
        },
        queue: QueueConfig {
            max_attempts: 3,
            backoff_base: 10,
        },
        ..Default::default()
    }
}

/// Builds an HTML page with a title and the given links
pub fn html_page(title: &str, links: &[&str]) -> String {
    let anchors: String = links
        .iter()
        .map(|href| format!(r#"<a href="{}">{}</a> "#, href, href))
        .collect();
    format!(
        "<html><head><title>{}</title></head><body><h1>{}</h1><p>{}</p></body></html>",
        title, title, anchors
    )
}

/// Serves `body` as HTML at `at`
pub async fn mount_page(server: &MockServer, at: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/html"))
        .mount(server)
        .await;
}

/// Answers `at` with a redirect to `location`
pub async fn mount_redirect(server: &MockServer, at: &str, status: u16, location: &str) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(status).insert_header("Location", location))
        .mount(server)
        .await;
}

/// Serves a robots.txt
pub async fn mount_robots(server: &MockServer, body: &str) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

/// URL paths of a result list, in order
pub fn result_paths(results: &[CrawlResult]) -> Vec<String> {
    results
        .iter()
        .map(|r| url::Url::parse(&r.url).unwrap().path().to_string())
        .collect()
}

/// Polls a job until it reaches a terminal state
pub async fn wait_for_terminal<J, F>(engine: &ArwEngine, id: &str, status: F) -> J
where
    J: Job,
    F: Fn(&ArwEngine, &str) -> arw_crawler::Result<J>,
{
    for _ in 0..400 {
        let job = status(engine, id).expect("job should exist");
        if job.status().is_terminal() {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("job {} did not finish in time", id);
}

/// Polls a job until `ready` holds
pub async fn wait_until<J, F, P>(engine: &ArwEngine, id: &str, status: F, ready: P) -> J
where
    J: Job,
    F: Fn(&ArwEngine, &str) -> arw_crawler::Result<J>,
    P: Fn(&J) -> bool,
{
    for _ in 0..400 {
        let job = status(engine, id).expect("job should exist");
        if ready(&job) {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} never reached the expected state", id);
}
