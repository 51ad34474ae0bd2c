//! Integration tests for the job queues
//!
//! Batch fan-out, retries, cancellation, recovery after restart and the
//! single-page scrape path, all against wiremock sites.

mod common;

use arw_crawler::queue::{insert_job, CrawlJob};
use arw_crawler::storage::{lock, open_storage};
use arw_crawler::{ArwEngine, ArwError, CancelOutcome, JobStatus, ScrapeOptions};
use common::{
    create_test_config, create_test_config_with_db, html_page, mount_page, mount_robots,
    result_paths, wait_for_terminal, wait_until,
};
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_batch_partial_failure() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(&mock_server, "/one", html_page("One", &[])).await;
    mount_page(&mock_server, "/two", html_page("Two", &[])).await;
    Mock::given(method("GET"))
        .and(path("/three"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let engine = ArwEngine::new(create_test_config()).unwrap();
    let urls: Vec<String> = ["/one", "/two", "/three"]
        .iter()
        .map(|p| format!("{}{}", base_url, p))
        .collect();
    let id = engine.submit_batch(&urls, ScrapeOptions::default()).unwrap();

    let job = wait_for_terminal(&engine, &id, |e, id| e.batch_status(id)).await;

    assert_eq!(job.meta.status, JobStatus::Completed);
    assert_eq!(job.meta.progress, 100);
    assert_eq!(job.results.len(), 2);
    assert_eq!(job.errors.len(), 1);
    assert!(job.errors.contains_key(&urls[2]));
    assert_eq!(
        job.results[&urls[0]].title.as_deref(),
        Some("One")
    );
}

#[tokio::test]
async fn test_batch_records_robots_denials() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_robots(&mock_server, "User-agent: TestBot\nDisallow: /private\n").await;
    mount_page(&mock_server, "/open", html_page("Open", &[])).await;

    let engine = ArwEngine::new(create_test_config()).unwrap();
    let urls = vec![
        format!("{}/open", base_url),
        format!("{}/private/data", base_url),
    ];
    let id = engine.submit_batch(&urls, ScrapeOptions::default()).unwrap();
    let job = wait_for_terminal(&engine, &id, |e, id| e.batch_status(id)).await;

    assert_eq!(job.meta.status, JobStatus::Completed);
    assert_eq!(job.results.len(), 1);
    assert!(job.errors[&urls[1]].contains("robots.txt"));
}

#[tokio::test]
async fn test_batch_rejects_empty_and_invalid_lists() {
    let engine = ArwEngine::new(create_test_config()).unwrap();

    let empty = engine.submit_batch(&[], ScrapeOptions::default());
    assert!(matches!(empty, Err(ArwError::Validation(_))));

    let invalid = engine.submit_batch(
        &["https://example.com/".to_string(), "mailto:x@example.com".to_string()],
        ScrapeOptions::default(),
    );
    assert!(matches!(invalid, Err(ArwError::Validation(_))));
}

#[tokio::test]
async fn test_transient_seed_failure_is_retried() {
    let mock_server = MockServer::start().await;

    // First attempt hits a 503; the retry succeeds
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_page(&mock_server, "/", html_page("Home", &[])).await;

    let engine = ArwEngine::new(create_test_config()).unwrap();
    let id = engine
        .submit_crawl(&mock_server.uri(), ScrapeOptions::default())
        .unwrap();
    let job = wait_for_terminal(&engine, &id, |e, id| e.crawl_status(id)).await;

    assert_eq!(job.meta.status, JobStatus::Completed);
    assert_eq!(job.meta.attempts, 2);
    assert!(job.meta.error.is_none());
    assert_eq!(result_paths(&job.results), vec!["/"]);
}

#[tokio::test]
async fn test_permanent_seed_failure_is_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let engine = ArwEngine::new(create_test_config()).unwrap();
    let id = engine
        .submit_crawl(&mock_server.uri(), ScrapeOptions::default())
        .unwrap();
    let job = wait_for_terminal(&engine, &id, |e, id| e.crawl_status(id)).await;

    // A missing seed is a page-level result, not a job failure
    assert_eq!(job.meta.status, JobStatus::Completed);
    assert_eq!(job.meta.attempts, 1);
    assert_eq!(job.results.len(), 1);
    assert_eq!(job.results[0].status_code, Some(404));
}

#[tokio::test]
async fn test_cancel_pending_job_removes_it() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(html_page("Slow", &[]), "text/html")
                .set_delay(Duration::from_millis(1500)),
        )
        .mount(&mock_server)
        .await;
    mount_page(&mock_server, "/", html_page("Home", &[])).await;

    let mut config = create_test_config();
    config.crawler.max_concurrent_requests = 1;
    let engine = ArwEngine::new(config).unwrap();

    let slow = engine
        .submit_crawl(&format!("{}/slow", mock_server.uri()), ScrapeOptions::default())
        .unwrap();
    wait_until(&engine, &slow, |e, id| e.crawl_status(id), |job| {
        job.meta.status == JobStatus::Processing
    })
    .await;

    // The only worker is busy, so this one stays pending
    let queued = engine
        .submit_crawl(&mock_server.uri(), ScrapeOptions::default())
        .unwrap();
    assert_eq!(engine.cancel(&queued).unwrap(), CancelOutcome::Removed);
    assert!(matches!(
        engine.crawl_status(&queued),
        Err(ArwError::JobNotFound(_))
    ));

    let job = wait_for_terminal(&engine, &slow, |e, id| e.crawl_status(id)).await;
    assert_eq!(job.meta.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_cancel_processing_job_keeps_results() {
    let mock_server = MockServer::start().await;

    let links: Vec<String> = (1..=10).map(|i| format!("/p{}", i)).collect();
    let link_refs: Vec<&str> = links.iter().map(String::as_str).collect();
    mount_page(&mock_server, "/", html_page("Home", &link_refs)).await;
    for link in &links {
        mount_page(&mock_server, link, html_page(link, &[])).await;
    }

    let mut config = create_test_config();
    config.crawler.minimum_request_interval = 200;
    let engine = ArwEngine::new(config).unwrap();

    let id = engine
        .submit_crawl(&mock_server.uri(), ScrapeOptions::default())
        .unwrap();
    wait_until(&engine, &id, |e, id| e.crawl_status(id), |job| {
        !job.results.is_empty()
    })
    .await;

    assert_eq!(engine.cancel(&id).unwrap(), CancelOutcome::Requested);
    let job = wait_for_terminal(&engine, &id, |e, id| e.crawl_status(id)).await;

    assert_eq!(job.meta.status, JobStatus::Cancelled);
    assert!(!job.results.is_empty());
    assert!(job.results.len() < 11);
    assert_eq!(job.results[0].depth, 0);
    assert!(job.meta.completed_at.is_some());
}

#[tokio::test]
async fn test_cancel_interrupts_retry_backoff() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&mock_server)
        .await;

    // The next attempt would be a minute away
    let mut config = create_test_config();
    config.queue.backoff_base = 60_000;
    let engine = ArwEngine::new(config).unwrap();

    let id = engine
        .submit_crawl(&mock_server.uri(), ScrapeOptions::default())
        .unwrap();
    wait_until(&engine, &id, |e, id| e.crawl_status(id), |job| {
        job.meta.attempts == 1
    })
    .await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let started = Instant::now();
    assert_eq!(engine.cancel(&id).unwrap(), CancelOutcome::Requested);
    let job = wait_for_terminal(&engine, &id, |e, id| e.crawl_status(id)).await;

    assert_eq!(job.meta.status, JobStatus::Cancelled);
    assert_eq!(job.meta.attempts, 1);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_cancel_finished_job_is_noop() {
    let mock_server = MockServer::start().await;
    mount_page(&mock_server, "/", html_page("Home", &[])).await;

    let engine = ArwEngine::new(create_test_config()).unwrap();
    let id = engine
        .submit_crawl(&mock_server.uri(), ScrapeOptions::default())
        .unwrap();
    let before = wait_for_terminal(&engine, &id, |e, id| e.crawl_status(id)).await;

    assert_eq!(engine.cancel(&id).unwrap(), CancelOutcome::AlreadyFinished);
    let after = engine.crawl_status(&id).unwrap();
    assert_eq!(after.meta.status, JobStatus::Completed);
    assert_eq!(after.meta.completed_at, before.meta.completed_at);

    assert!(matches!(engine.cancel("missing"), Err(ArwError::JobNotFound(_))));
}

#[tokio::test]
async fn test_status_is_scoped_to_job_kind() {
    let mock_server = MockServer::start().await;
    mount_page(&mock_server, "/", html_page("Home", &[])).await;

    let engine = ArwEngine::new(create_test_config()).unwrap();
    let id = engine
        .submit_batch(&[mock_server.uri()], ScrapeOptions::default())
        .unwrap();

    assert!(engine.batch_status(&id).is_ok());
    assert!(matches!(engine.crawl_status(&id), Err(ArwError::JobNotFound(_))));
}

#[tokio::test]
async fn test_pending_jobs_resume_after_restart() {
    let mock_server = MockServer::start().await;
    mount_page(&mock_server, "/", html_page("Home", &["/next"])).await;
    mount_page(&mock_server, "/next", html_page("Next", &[])).await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("queue.db");
    let db_path = db_path.to_str().unwrap();

    // A job left behind by a previous process
    let job = CrawlJob::new(format!("{}/", mock_server.uri()), ScrapeOptions::default());
    {
        let storage = open_storage(Path::new(db_path)).unwrap();
        insert_job(&mut *lock(&storage).unwrap(), &job).unwrap();
    }

    let engine = ArwEngine::new(create_test_config_with_db(db_path)).unwrap();
    let resumed = wait_for_terminal(&engine, &job.meta.id, |e, id| e.crawl_status(id)).await;

    assert_eq!(resumed.meta.status, JobStatus::Completed);
    assert_eq!(result_paths(&resumed.results), vec!["/", "/next"]);
}

#[tokio::test]
async fn test_stats_count_jobs_and_cache() {
    let mock_server = MockServer::start().await;
    mount_page(&mock_server, "/", html_page("Home", &[])).await;

    let engine = ArwEngine::new(create_test_config()).unwrap();
    let id = engine
        .submit_crawl(&mock_server.uri(), ScrapeOptions::default())
        .unwrap();
    wait_for_terminal(&engine, &id, |e, id| e.crawl_status(id)).await;

    let stats = engine.stats().unwrap();
    assert_eq!(stats.queues.crawl.completed, 1);
    assert_eq!(stats.queues.crawl.pending, 0);
    assert_eq!(stats.queues.batch.completed, 0);
    // The discovery result for the origin is cached
    assert!(stats.cache.shared_entries >= 1);
    assert_eq!(stats.tracked_domains, 1);
}

#[tokio::test]
async fn test_scrape_serves_repeat_requests_from_cache() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/article"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(html_page("Article", &["/next"]), "text/html"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let engine = ArwEngine::new(create_test_config()).unwrap();
    let url = format!("{}/article", mock_server.uri());

    let first = engine.scrape(&url, &ScrapeOptions::default()).await.unwrap();
    let second = engine.scrape(&url, &ScrapeOptions::default()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.title.as_deref(), Some("Article"));
    assert_eq!(first.links, vec![format!("{}/next", mock_server.uri())]);
}

#[tokio::test]
async fn test_scrape_denied_by_robots() {
    let mock_server = MockServer::start().await;
    mount_robots(&mock_server, "User-agent: *\nDisallow: /\n").await;

    let engine = ArwEngine::new(create_test_config()).unwrap();
    let result = engine
        .scrape(&mock_server.uri(), &ScrapeOptions::default())
        .await;

    assert!(matches!(result, Err(ArwError::RobotsDenied { .. })));
}

#[tokio::test]
async fn test_rendering_without_webdriver_fails_fast() {
    let engine = ArwEngine::new(create_test_config()).unwrap();
    let options = ScrapeOptions {
        screenshot: true,
        respect_robots_txt: false,
        ..Default::default()
    };

    let result = engine.scrape("http://127.0.0.1:9/", &options).await;
    assert!(matches!(result, Err(ArwError::Render { .. })));
}
