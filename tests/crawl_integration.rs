//! End-to-end crawl tests against a mock catalog server.

use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use catalog_core::{CrawlConfig, CrawlEngine};

/// Config tuned for tests: tiny backoff, one walk per test server.
fn test_config() -> CrawlConfig {
    CrawlConfig {
        initial_concurrency: 4,
        min_concurrency: 1,
        max_concurrency: 8,
        base_backoff_ms: 10,
        max_backoff_ms: 50,
        fetch_timeout_secs: 5,
        ..CrawlConfig::default()
    }
}

fn catalog_body(hrefs: &[&str]) -> String {
    let items: String = hrefs
        .iter()
        .map(|href| {
            format!(
                r#"<li><a class="woocommerce-loop-product__link" href="{href}">item</a></li>"#
            )
        })
        .collect();
    format!(r#"<html><body><ul class="products">{items}</ul></body></html>"#)
}

fn product_body(name: &str, price: &str) -> String {
    format!(
        r#"<html><body>
            <h1 class="product_title">{name}</h1>
            <p class="price"><span class="woocommerce-Price-amount"><bdi>{price}</bdi></span></p>
        </body></html>"#
    )
}

async fn mount_catalog_page(server: &MockServer, page: &str, body: String) {
    Mock::given(method("GET"))
        .and(path("/catalog"))
        .and(query_param("page", page))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn mount_product(server: &MockServer, product_path: &str, name: &str, price: &str) {
    Mock::given(method("GET"))
        .and(path(product_path))
        .respond_with(ResponseTemplate::new(200).set_body_string(product_body(name, price)))
        .mount(server)
        .await;
}

// ---- Integration test: full walk stops when a page repeats known products ----

#[tokio::test]
async fn test_walk_extracts_all_pages_and_stops_on_no_new_links() {
    let server = MockServer::start().await;

    mount_catalog_page(
        &server,
        "1",
        catalog_body(&["/product/item-a", "/product/item-b"]),
    )
    .await;
    mount_catalog_page(
        &server,
        "2",
        catalog_body(&["/product/item-c", "/product/item-d"]),
    )
    .await;
    // Page 3 only repeats a product from page 1: the walk must stop here.
    mount_catalog_page(&server, "3", catalog_body(&["/product/item-a"])).await;
    Mock::given(method("GET"))
        .and(path("/catalog"))
        .and(query_param("page", "4"))
        .respond_with(ResponseTemplate::new(200).set_body_string(catalog_body(&[])))
        .expect(0)
        .mount(&server)
        .await;

    mount_product(&server, "/product/item-a", "Brake Pad Set", "KSh 4,500").await;
    mount_product(&server, "/product/item-b", "Oil Filter", "KSh 1,200").await;
    mount_product(&server, "/product/item-c", "Spark Plug", "KSh 800").await;
    mount_product(&server, "/product/item-d", "Air Filter", "KSh 2,300").await;

    let (engine, mut records) = CrawlEngine::new(test_config()).unwrap();
    let stats = engine
        .run(&format!("{}/catalog?page=1", server.uri()))
        .await
        .unwrap();
    drop(engine);

    assert_eq!(stats.products_accepted, 4);
    assert_eq!(stats.duplicates_skipped, 0);
    // 3 catalog pages + 4 detail pages.
    assert_eq!(stats.pages_attempted, 7);
    assert_eq!(stats.pages_succeeded, 7);
    assert_eq!(stats.pages_failed, 0);
    assert_eq!(stats.retries, 0);

    let mut sequence_ids = Vec::new();
    let mut fingerprints = Vec::new();
    while let Some(accepted) = records.recv().await {
        sequence_ids.push(accepted.sequence_id);
        fingerprints.push(accepted.fingerprint);
        assert!(accepted.record.price > 0.0);
        assert_eq!(accepted.record.currency_hint, "KES");
    }
    assert_eq!(sequence_ids, vec![1, 2, 3, 4]);
    fingerprints.sort();
    fingerprints.dedup();
    assert_eq!(fingerprints.len(), 4, "fingerprints must be unique");
}

// ---- Integration test: tracking-parameter twins are fetched but deduplicated ----

#[tokio::test]
async fn test_tracking_param_twins_collapse_to_one_record() {
    let server = MockServer::start().await;

    mount_catalog_page(
        &server,
        "1",
        catalog_body(&["/product/widget", "/product/widget?utm_source=promo"]),
    )
    .await;
    // Both variants hit the same detail page.
    Mock::given(method("GET"))
        .and(path("/product/widget"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(product_body("Widget Deluxe", "KSh 950")),
        )
        .expect(2)
        .mount(&server)
        .await;

    let config = CrawlConfig {
        max_pages: 1,
        ..test_config()
    };
    let (engine, mut records) = CrawlEngine::new(config).unwrap();
    let stats = engine
        .run(&format!("{}/catalog?page=1", server.uri()))
        .await
        .unwrap();
    drop(engine);

    assert_eq!(stats.products_accepted, 1);
    assert_eq!(stats.duplicates_skipped, 1);

    let first = records.recv().await.unwrap();
    assert_eq!(first.record.name, "Widget Deluxe");
    assert!(records.recv().await.is_none(), "only one record may stream");
}

// ---- Integration test: product cap stops the run ----

#[tokio::test]
async fn test_product_cap_stops_accepting() {
    let server = MockServer::start().await;

    mount_catalog_page(
        &server,
        "1",
        catalog_body(&[
            "/product/p1",
            "/product/p2",
            "/product/p3",
            "/product/p4",
            "/product/p5",
        ]),
    )
    .await;
    for i in 1..=5 {
        mount_product(&server, &format!("/product/p{i}"), "Brake Pad Set", "KSh 100").await;
    }

    let config = CrawlConfig {
        // One admission slot serializes the detail fetches.
        initial_concurrency: 1,
        min_concurrency: 1,
        max_concurrency: 1,
        max_pages: 1,
        max_products: 2,
        ..test_config()
    };
    let (engine, _records) = CrawlEngine::new(config).unwrap();
    let stats = engine
        .run(&format!("{}/catalog?page=1", server.uri()))
        .await
        .unwrap();

    assert_eq!(stats.products_accepted, 2);
}

// ---- Integration test: external stop returns promptly with honest stats ----

#[tokio::test]
async fn test_external_stop_drains_and_returns() {
    let server = MockServer::start().await;

    let links: Vec<String> = (0..10).map(|i| format!("/product/slow-{i}")).collect();
    let hrefs: Vec<&str> = links.iter().map(String::as_str).collect();
    mount_catalog_page(&server, "1", catalog_body(&hrefs)).await;
    Mock::given(method("GET"))
        .and(wiremock::matchers::path_regex("^/product/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(product_body("Slow Product", "KSh 100"))
                .set_delay(std::time::Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let config = CrawlConfig {
        initial_concurrency: 2,
        min_concurrency: 1,
        max_concurrency: 2,
        max_pages: 1,
        ..test_config()
    };
    let (engine, _records) = CrawlEngine::new(config).unwrap();
    let stop = engine.stop_signal();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        stop.trigger();
    });

    let run = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        engine.run(&format!("{}/catalog?page=1", server.uri())),
    )
    .await;

    let stats = run.expect("run must return promptly after stop").unwrap();
    // In-flight fetches drained; everything else was cancelled before fetch.
    assert!(stats.products_accepted < 10);
    assert!(stats.pages_attempted >= 1);
}

// ---- Integration test: time budget triggers the stop signal ----

/// Serves an endless catalog: every page links one fresh product.
struct PagedCatalog;

impl wiremock::Respond for PagedCatalog {
    fn respond(&self, request: &wiremock::Request) -> ResponseTemplate {
        let page = request
            .url
            .query_pairs()
            .find(|(key, _)| key == "page")
            .map_or_else(|| "1".to_owned(), |(_, value)| value.into_owned());
        ResponseTemplate::new(200)
            .set_body_string(catalog_body(&[&format!("/product/item-{page}")]))
    }
}

#[tokio::test]
async fn test_time_budget_stops_the_run() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/catalog"))
        .respond_with(PagedCatalog)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(wiremock::matchers::path_regex("^/product/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(product_body("Slow Product", "KSh 100"))
                .set_delay(std::time::Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let config = CrawlConfig {
        max_pages: 50,
        time_budget_secs: Some(1),
        ..test_config()
    };
    let (engine, _records) = CrawlEngine::new(config).unwrap();
    let started = std::time::Instant::now();
    let run = tokio::time::timeout(
        std::time::Duration::from_secs(10),
        engine.run(&format!("{}/catalog?page=1", server.uri())),
    )
    .await;

    let stats = run.expect("time budget must end the run").unwrap();
    assert!(started.elapsed() < std::time::Duration::from_secs(5));
    assert!(stats.products_accepted < 50, "the walk must not complete");
}
