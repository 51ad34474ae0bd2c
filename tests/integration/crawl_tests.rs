//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock sites and run full crawls through
//! the engine, both directly (map, stream) and through the crawl queue.

mod common;

use arw_crawler::{ArwEngine, ArwError, ExtractionMode, JobStatus, ScrapeOptions};
use common::{
    create_test_config, html_page, mount_page, mount_redirect, mount_robots, result_paths,
    wait_for_terminal,
};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mounts `/` -> `/a`, `/b`; `/a` -> `/c`; `/b` -> `/`
async fn mount_three_level_site(server: &MockServer) {
    mount_page(server, "/", html_page("Home", &["/a", "/b"])).await;
    mount_page(server, "/a", html_page("A", &["/c"])).await;
    mount_page(server, "/b", html_page("B", &["/"])).await;
    mount_page(server, "/c", html_page("C", &[])).await;
}

fn options_with_depth(max_depth: u32) -> ScrapeOptions {
    ScrapeOptions {
        max_depth: Some(max_depth),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_max_depth_bounds_the_crawl() {
    let mock_server = MockServer::start().await;
    mount_three_level_site(&mock_server).await;

    let engine = ArwEngine::new(create_test_config()).unwrap();
    let pages = engine
        .map(&mock_server.uri(), &options_with_depth(1))
        .await
        .unwrap();

    let paths: HashSet<String> = pages
        .iter()
        .map(|p| url::Url::parse(&p.url).unwrap().path().to_string())
        .collect();
    let expected: HashSet<String> = ["/", "/a", "/b"].iter().map(|s| s.to_string()).collect();

    assert_eq!(paths, expected);
    assert_eq!(pages[0].depth, 0);
    assert!(pages[1..].iter().all(|p| p.depth == 1));
    assert_eq!(pages[0].title.as_deref(), Some("Home"));
}

#[tokio::test]
async fn test_crawl_job_completes_in_bfs_order() {
    let mock_server = MockServer::start().await;
    mount_three_level_site(&mock_server).await;

    let engine = ArwEngine::new(create_test_config()).unwrap();
    let id = engine
        .submit_crawl(&mock_server.uri(), options_with_depth(2))
        .unwrap();

    let job = wait_for_terminal(&engine, &id, |e, id| e.crawl_status(id)).await;

    assert_eq!(job.meta.status, JobStatus::Completed);
    assert_eq!(job.meta.progress, 100);
    assert!(job.meta.completed_at.is_some());
    assert_eq!(job.meta.attempts, 1);
    assert_eq!(result_paths(&job.results), vec!["/", "/a", "/b", "/c"]);

    let depths: Vec<u32> = job.results.iter().map(|r| r.depth).collect();
    assert_eq!(depths, vec![0, 1, 1, 2]);
    assert!(job.results.iter().all(|r| r.arw.is_some()));
}

#[tokio::test]
async fn test_robots_disallow_respected() {
    let mock_server = MockServer::start().await;

    mount_robots(&mock_server, "User-agent: *\nDisallow: /admin\n").await;
    mount_page(
        &mock_server,
        "/",
        html_page("Home", &["/admin", "/admin/users", "/public"]),
    )
    .await;
    mount_page(&mock_server, "/public", html_page("Public", &[])).await;
    Mock::given(method("GET"))
        .and(path("/admin"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html_page("Admin", &[]), "text/html"))
        .expect(0)
        .mount(&mock_server)
        .await;

    let engine = ArwEngine::new(create_test_config()).unwrap();
    let id = engine
        .submit_crawl(&mock_server.uri(), ScrapeOptions::default())
        .unwrap();
    let job = wait_for_terminal(&engine, &id, |e, id| e.crawl_status(id)).await;

    let paths = result_paths(&job.results);
    assert_eq!(paths, vec!["/", "/public"]);
    assert!(paths.iter().all(|p| !p.starts_with("/admin")));

    let arw = job.results[0].arw.as_ref().unwrap();
    assert!(arw.has_robots_txt);
    assert!(arw.allowed_by_robots);
}

#[tokio::test]
async fn test_robots_ignored_when_disabled() {
    let mock_server = MockServer::start().await;

    mount_robots(&mock_server, "User-agent: *\nDisallow: /admin\n").await;
    mount_page(&mock_server, "/", html_page("Home", &["/admin"])).await;
    mount_page(&mock_server, "/admin", html_page("Admin", &[])).await;

    let engine = ArwEngine::new(create_test_config()).unwrap();
    let options = ScrapeOptions {
        respect_robots_txt: false,
        ..Default::default()
    };
    let pages = engine.map(&mock_server.uri(), &options).await.unwrap();

    assert_eq!(pages.len(), 2);
    assert_eq!(pages[1].title.as_deref(), Some("Admin"));
}

#[tokio::test]
async fn test_crawl_delay_spaces_requests() {
    let mock_server = MockServer::start().await;

    mount_robots(&mock_server, "User-agent: *\nCrawl-delay: 2\n").await;
    mount_page(&mock_server, "/", html_page("Home", &["/a"])).await;
    mount_page(&mock_server, "/a", html_page("A", &[])).await;

    let engine = ArwEngine::new(create_test_config()).unwrap();

    let start = Instant::now();
    let pages = engine
        .map(&mock_server.uri(), &options_with_depth(1))
        .await
        .unwrap();
    let elapsed = start.elapsed();

    assert_eq!(pages.len(), 2);
    assert!(
        elapsed >= Duration::from_millis(2000),
        "two fetches completed in {:?}",
        elapsed
    );
}

#[tokio::test]
async fn test_equivalent_urls_fetched_once() {
    let mock_server = MockServer::start().await;

    mount_page(
        &mock_server,
        "/",
        html_page(
            "Home",
            &["/a", "/a/", "/a#intro", "/#top", "/?utm_source=feed", "/./a"],
        ),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html_page("A", &["/"]), "text/html"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let engine = ArwEngine::new(create_test_config()).unwrap();
    let pages = engine
        .map(&mock_server.uri(), &options_with_depth(3))
        .await
        .unwrap();

    let urls: Vec<&str> = pages.iter().map(|p| p.url.as_str()).collect();
    let unique: HashSet<&str> = urls.iter().copied().collect();
    assert_eq!(urls.len(), unique.len());
    assert_eq!(pages.len(), 2);
}

#[tokio::test]
async fn test_failed_page_recorded_without_aborting() {
    let mock_server = MockServer::start().await;

    mount_page(&mock_server, "/", html_page("Home", &["/broken", "/ok"])).await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;
    mount_page(&mock_server, "/ok", html_page("OK", &[])).await;

    let engine = ArwEngine::new(create_test_config()).unwrap();
    let id = engine
        .submit_crawl(&mock_server.uri(), options_with_depth(1))
        .unwrap();
    let job = wait_for_terminal(&engine, &id, |e, id| e.crawl_status(id)).await;

    assert_eq!(job.meta.status, JobStatus::Completed);
    assert_eq!(result_paths(&job.results), vec!["/", "/broken", "/ok"]);

    let broken = &job.results[1];
    assert!(broken.is_error());
    assert_eq!(broken.status_code, Some(500));
    assert!(broken.links.is_empty());
    assert!(!job.results[2].is_error());
}

#[tokio::test]
async fn test_max_pages_bounds_results() {
    let mock_server = MockServer::start().await;

    let links: Vec<String> = (1..=6).map(|i| format!("/p{}", i)).collect();
    let link_refs: Vec<&str> = links.iter().map(String::as_str).collect();
    mount_page(&mock_server, "/", html_page("Home", &link_refs)).await;
    for link in &links {
        mount_page(&mock_server, link, html_page(link, &[])).await;
    }

    let engine = ArwEngine::new(create_test_config()).unwrap();
    let options = ScrapeOptions {
        max_pages: Some(3),
        ..Default::default()
    };
    let pages = engine.map(&mock_server.uri(), &options).await.unwrap();

    assert_eq!(pages.len(), 3);
}

#[tokio::test]
async fn test_external_links_not_followed_by_default() {
    let mock_server = MockServer::start().await;
    let other_server = MockServer::start().await;

    // Same mock server, reached through a different host name
    let external = other_server.uri().replace("127.0.0.1", "localhost");
    mount_page(
        &mock_server,
        "/",
        html_page("Home", &[&format!("{}/elsewhere", external), "/inside"]),
    )
    .await;
    mount_page(&mock_server, "/inside", html_page("Inside", &[])).await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&other_server)
        .await;

    let engine = ArwEngine::new(create_test_config()).unwrap();
    let pages = engine
        .map(&mock_server.uri(), &options_with_depth(1))
        .await
        .unwrap();

    assert_eq!(pages.len(), 2);
    assert!(pages.iter().all(|p| !p.url.contains("localhost")));
}

#[tokio::test]
async fn test_redirect_to_visited_page_emitted_once() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(&mock_server, "/", html_page("Home", &["/a", "/old"])).await;
    mount_page(&mock_server, "/a", html_page("A", &[])).await;
    mount_redirect(&mock_server, "/old", 301, &format!("{}/a", base_url)).await;

    let engine = ArwEngine::new(create_test_config()).unwrap();
    let id = engine.submit_crawl(&base_url, options_with_depth(1)).unwrap();
    let job = wait_for_terminal(&engine, &id, |e, id| e.crawl_status(id)).await;

    assert_eq!(job.meta.status, JobStatus::Completed);
    assert_eq!(result_paths(&job.results), vec!["/", "/a"]);
}

#[tokio::test]
async fn test_redirect_target_counts_as_visited() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    // The redirect is reached before the page it points to
    mount_page(&mock_server, "/", html_page("Home", &["/old", "/a"])).await;
    mount_redirect(&mock_server, "/old", 301, &format!("{}/a", base_url)).await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html_page("A", &[]), "text/html"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let engine = ArwEngine::new(create_test_config()).unwrap();
    let pages = engine.map(&base_url, &options_with_depth(1)).await.unwrap();

    let paths: Vec<String> = pages
        .iter()
        .map(|p| url::Url::parse(&p.url).unwrap().path().to_string())
        .collect();
    assert_eq!(paths, vec!["/", "/a"]);
}

#[tokio::test]
async fn test_redirect_into_disallowed_path_dropped() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_robots(&mock_server, "User-agent: *\nDisallow: /admin\n").await;
    mount_page(&mock_server, "/", html_page("Home", &["/go", "/public"])).await;
    mount_page(&mock_server, "/public", html_page("Public", &[])).await;
    mount_page(&mock_server, "/admin/secret", html_page("Secret", &[])).await;
    mount_redirect(&mock_server, "/go", 302, &format!("{}/admin/secret", base_url)).await;

    let engine = ArwEngine::new(create_test_config()).unwrap();
    let id = engine.submit_crawl(&base_url, options_with_depth(1)).unwrap();
    let job = wait_for_terminal(&engine, &id, |e, id| e.crawl_status(id)).await;

    assert_eq!(result_paths(&job.results), vec!["/", "/public"]);
    assert!(job.results.iter().all(|r| r.title.as_deref() != Some("Secret")));
}

#[tokio::test]
async fn test_redirect_off_domain_dropped() {
    let mock_server = MockServer::start().await;
    let other_server = MockServer::start().await;

    let external = other_server.uri().replace("127.0.0.1", "localhost");
    mount_page(&mock_server, "/", html_page("Home", &["/go"])).await;
    mount_redirect(&mock_server, "/go", 302, &format!("{}/landing", external)).await;
    mount_page(&other_server, "/landing", html_page("Elsewhere", &["/more"])).await;

    let engine = ArwEngine::new(create_test_config()).unwrap();
    let pages = engine
        .map(&mock_server.uri(), &options_with_depth(2))
        .await
        .unwrap();

    assert_eq!(pages.len(), 1);
    assert!(pages.iter().all(|p| !p.url.contains("localhost")));
    assert!(pages.iter().all(|p| p.title.as_deref() != Some("Elsewhere")));
}

#[tokio::test]
async fn test_scrape_redirect_into_disallowed_path() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_robots(&mock_server, "User-agent: *\nDisallow: /admin\n").await;
    mount_page(&mock_server, "/admin/secret", html_page("Secret", &[])).await;
    mount_redirect(&mock_server, "/go", 302, &format!("{}/admin/secret", base_url)).await;

    let engine = ArwEngine::new(create_test_config()).unwrap();
    let result = engine
        .scrape(&format!("{}/go", base_url), &ScrapeOptions::default())
        .await;

    match result {
        Err(ArwError::RobotsDenied { url }) => assert!(url.ends_with("/admin/secret")),
        other => panic!("expected robots denial, got {:?}", other.map(|r| r.url)),
    }
}

#[tokio::test]
async fn test_user_agent_override_selects_robots_group() {
    let mock_server = MockServer::start().await;

    mount_robots(
        &mock_server,
        "User-agent: CustomBot\nDisallow: /a\n\nUser-agent: *\nAllow: /\n",
    )
    .await;
    mount_page(&mock_server, "/", html_page("Home", &["/a", "/b"])).await;
    mount_page(&mock_server, "/a", html_page("A", &[])).await;
    mount_page(&mock_server, "/b", html_page("B", &[])).await;

    let engine = ArwEngine::new(create_test_config()).unwrap();

    let default_pages = engine
        .map(&mock_server.uri(), &options_with_depth(1))
        .await
        .unwrap();
    assert_eq!(default_pages.len(), 3);

    let options = ScrapeOptions {
        user_agent: Some("CustomBot/2.0 (+https://example.com/bot)".to_string()),
        ..options_with_depth(1)
    };
    let pages = engine.map(&mock_server.uri(), &options).await.unwrap();
    let paths: Vec<String> = pages
        .iter()
        .map(|p| url::Url::parse(&p.url).unwrap().path().to_string())
        .collect();
    assert_eq!(paths, vec!["/", "/b"]);
}

#[tokio::test]
async fn test_follow_sitemap_seeds_unlinked_pages() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(&mock_server, "/", html_page("Home", &[])).await;
    mount_page(&mock_server, "/orphan", html_page("Orphan", &[])).await;
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            "<urlset><url><loc>{}/orphan</loc></url><url><loc>{}/</loc></url></urlset>",
            base_url, base_url
        )))
        .mount(&mock_server)
        .await;

    let engine = ArwEngine::new(create_test_config()).unwrap();

    let without = engine.map(&base_url, &options_with_depth(1)).await.unwrap();
    assert_eq!(without.len(), 1);

    let options = ScrapeOptions {
        follow_sitemap: true,
        max_depth: Some(1),
        ..Default::default()
    };
    let with = engine.map(&base_url, &options).await.unwrap();
    assert_eq!(with.len(), 2);
    assert_eq!(with[1].title.as_deref(), Some("Orphan"));
    assert_eq!(with[1].depth, 1);
}

#[tokio::test]
async fn test_stream_delivers_results_in_order() {
    let mock_server = MockServer::start().await;
    mount_three_level_site(&mock_server).await;

    let engine = ArwEngine::new(create_test_config()).unwrap();
    let mut rx = engine
        .crawl_stream(&mock_server.uri(), options_with_depth(2))
        .unwrap();

    let mut results = Vec::new();
    while let Some(result) = rx.recv().await {
        results.push(result);
    }

    assert_eq!(result_paths(&results), vec!["/", "/a", "/b", "/c"]);
}

#[tokio::test]
async fn test_machine_view_mode() {
    let mock_server = MockServer::start().await;

    mount_page(
        &mock_server,
        "/",
        "<html><head><title>Doc</title></head><body><h1>Guide</h1><p>Intro</p><ul><li>step</li></ul></body></html>"
            .to_string(),
    )
    .await;

    let engine = ArwEngine::new(create_test_config()).unwrap();
    let options = ScrapeOptions {
        extraction_mode: ExtractionMode::MachineView,
        ..Default::default()
    };
    let result = engine.scrape(&mock_server.uri(), &options).await.unwrap();

    let view = result.machine_view.expect("machine view attached");
    assert_eq!(view.title.as_deref(), Some("Doc"));
    assert_eq!(view.sections.len(), 3);
    assert_eq!(view.summary, "Intro");
    assert!(result.content.starts_with("# Guide"));
}

#[tokio::test]
async fn test_deeply_nested_page_is_extracted() {
    let mock_server = MockServer::start().await;

    let depth = 10_000;
    let body = format!(
        "<html><head><title>Deep</title></head><body>{}<p>deep</p>{}</body></html>",
        "<div>".repeat(depth),
        "</div>".repeat(depth)
    );
    mount_page(&mock_server, "/", body).await;

    let engine = ArwEngine::new(create_test_config()).unwrap();
    let options = ScrapeOptions {
        extraction_mode: ExtractionMode::MachineView,
        ..Default::default()
    };
    let result = engine.scrape(&mock_server.uri(), &options).await.unwrap();

    assert_eq!(result.title.as_deref(), Some("Deep"));
    assert!(result.content.contains("deep"));
    let view = result.machine_view.expect("machine view attached");
    assert_eq!(view.summary, "deep");
}

#[tokio::test]
async fn test_unreachable_seed_fails_the_job() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&mock_server)
        .await;

    let engine = ArwEngine::new(create_test_config()).unwrap();
    let id = engine
        .submit_crawl(&mock_server.uri(), ScrapeOptions::default())
        .unwrap();
    let job = wait_for_terminal(&engine, &id, |e, id| e.crawl_status(id)).await;

    assert_eq!(job.meta.status, JobStatus::Failed);
    assert_eq!(job.meta.attempts, 3);
    assert!(job.meta.error.is_some());
    assert!(job.results.is_empty());
}

#[tokio::test]
async fn test_submit_rejects_invalid_input() {
    let engine = ArwEngine::new(create_test_config()).unwrap();

    let bad_url = engine.submit_crawl("ftp://example.com/", ScrapeOptions::default());
    assert!(matches!(bad_url, Err(arw_crawler::ArwError::Validation(_))));

    let bad_depth = engine.submit_crawl("https://example.com/", options_with_depth(11));
    assert!(matches!(bad_depth, Err(arw_crawler::ArwError::Validation(_))));

    let stats = engine.stats().unwrap();
    assert_eq!(stats.queues.crawl.pending, 0);
}
