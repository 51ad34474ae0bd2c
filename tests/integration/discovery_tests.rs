//! Integration tests for ARW discovery
//!
//! These tests serve llms.txt, robots.txt and sitemap.xml from wiremock and
//! check parsing, fallbacks and caching through the engine.

use arw_crawler::config::{Config, CrawlerConfig, StorageConfig, UserAgentConfig};
use arw_crawler::ArwEngine;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LLMS_TXT: &str = "# Example Site\n> A site for tests\n\n## Docs\nSee https://example.com/docs for details.\n\n## API\nReference: https://example.com/api\n";

/// Creates a test configuration backed by an in-memory store
fn create_test_config() -> Config {
    Config {
        crawler: CrawlerConfig {
            minimum_request_interval: 10,
            ..Default::default()
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        storage: StorageConfig {
            database_path: ":memory:".to_string(),
        },
        ..Default::default()
    }
}

fn sitemap_xml(base_url: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>{base}/</loc><lastmod>2024-01-01</lastmod><priority>1.0</priority></url>
  <url><loc>{base}/about</loc><changefreq>monthly</changefreq></url>
</urlset>"#,
        base = base_url
    )
}

async fn mount_text(server: &MockServer, at: &str, body: String, expected: u64) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(expected)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_discover_all_documents() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_text(&mock_server, "/llms.txt", LLMS_TXT.to_string(), 1).await;
    mount_text(
        &mock_server,
        "/robots.txt",
        format!(
            "User-agent: *\nDisallow: /admin\nCrawl-delay: 2\n\nSitemap: {}/sitemap.xml\n",
            base_url
        ),
        1,
    )
    .await;
    mount_text(&mock_server, "/sitemap.xml", sitemap_xml(&base_url), 1).await;

    let engine = ArwEngine::new(create_test_config()).unwrap();
    let result = engine.discover(&format!("{}/some/page?q=1", base_url)).await.unwrap();

    assert_eq!(result.origin, base_url);

    let llms = result.llms_txt.expect("llms.txt should be parsed");
    let docs = llms
        .sections
        .iter()
        .find(|s| s.title == "Docs")
        .expect("Docs section");
    assert_eq!(docs.links, vec!["https://example.com/docs"]);
    assert!(llms.sections.iter().any(|s| s.title == "API"));

    let robots = result.robots_txt.expect("robots.txt should be parsed");
    assert_eq!(robots.crawl_delay_ms, Some(2000));
    assert_eq!(robots.sitemaps, vec![format!("{}/sitemap.xml", base_url)]);

    let sitemap = result.sitemap.expect("sitemap should be parsed");
    assert_eq!(sitemap.urls.len(), 2);
    assert_eq!(sitemap.urls[0].lastmod.as_deref(), Some("2024-01-01"));
    assert_eq!(sitemap.urls[1].changefreq.as_deref(), Some("monthly"));
    assert_eq!(sitemap.urls[1].priority, None);
}

#[tokio::test]
async fn test_discover_is_idempotent_within_ttl() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    // Each document may only be fetched once
    mount_text(&mock_server, "/llms.txt", LLMS_TXT.to_string(), 1).await;
    mount_text(&mock_server, "/robots.txt", "User-agent: *\nAllow: /\n".to_string(), 1).await;
    mount_text(&mock_server, "/sitemap.xml", sitemap_xml(&base_url), 1).await;

    let engine = ArwEngine::new(create_test_config()).unwrap();
    let first = engine.discover(&base_url).await.unwrap();
    let second = engine.discover(&format!("{}/other", base_url)).await.unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_missing_documents_are_omitted() {
    let mock_server = MockServer::start().await;

    mount_text(&mock_server, "/robots.txt", "User-agent: *\nDisallow: /private\n".to_string(), 1).await;
    Mock::given(method("GET"))
        .and(path("/llms.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let engine = ArwEngine::new(create_test_config()).unwrap();
    let result = engine.discover(&mock_server.uri()).await.unwrap();

    assert!(result.llms_txt.is_none());
    assert!(result.sitemap.is_none());
    let robots = result.robots_txt.expect("robots.txt still parsed");
    assert_eq!(robots.groups.len(), 1);
    assert_eq!(robots.groups[0].disallow, vec!["/private"]);
}

#[tokio::test]
async fn test_sitemap_falls_back_to_robots_reference() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_text(
        &mock_server,
        "/robots.txt",
        format!("User-agent: *\nAllow: /\nSitemap: {}/maps/site.xml\n", base_url),
        1,
    )
    .await;
    mount_text(&mock_server, "/maps/site.xml", sitemap_xml(&base_url), 1).await;

    let engine = ArwEngine::new(create_test_config()).unwrap();
    let result = engine.discover(&base_url).await.unwrap();

    let sitemap = result.sitemap.expect("sitemap found through robots.txt");
    assert_eq!(sitemap.source_url, format!("{}/maps/site.xml", base_url));
    assert_eq!(sitemap.urls.len(), 2);
}

#[tokio::test]
async fn test_html_error_page_is_not_a_sitemap() {
    let mock_server = MockServer::start().await;

    // Soft-404 pages answer 200 with HTML
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("<html><body>Not here</body></html>", "text/html"),
        )
        .mount(&mock_server)
        .await;

    let engine = ArwEngine::new(create_test_config()).unwrap();
    let result = engine.discover(&mock_server.uri()).await.unwrap();

    assert!(result.sitemap.is_none());
}

#[tokio::test]
async fn test_clear_cache_forces_refetch() {
    let mock_server = MockServer::start().await;

    mount_text(&mock_server, "/robots.txt", "User-agent: *\nAllow: /\n".to_string(), 2).await;

    let engine = ArwEngine::new(create_test_config()).unwrap();
    engine.discover(&mock_server.uri()).await.unwrap();

    let removed = engine.clear_cache().unwrap();
    assert!(removed > 0);

    let result = engine.discover(&mock_server.uri()).await.unwrap();
    assert!(result.robots_txt.is_some());
}

#[tokio::test]
async fn test_discover_rejects_invalid_url() {
    let engine = ArwEngine::new(create_test_config()).unwrap();
    let result = engine.discover("not a url").await;
    assert!(matches!(result, Err(arw_crawler::ArwError::Validation(_))));
}
