//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use chrono::NaiveDate;
use sitewatch::feed::{FeedManager, HttpFetcher, ManagerSettings, DEFAULT_USER_AGENT};
use sitewatch::storage::KeyValueStore;
use sitewatch::util::FixedClock;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub fn urlset(locs: &[&str]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">"#,
    );
    for loc in locs {
        xml.push_str(&format!("\n  <url><loc>{loc}</loc><lastmod>2024-06-01</lastmod></url>"));
    }
    xml.push_str("\n</urlset>");
    xml
}

pub fn sitemap_index(children: &[&str]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">"#,
    );
    for child in children {
        xml.push_str(&format!("\n  <sitemap><loc>{child}</loc></sitemap>"));
    }
    xml.push_str("\n</sitemapindex>");
    xml
}

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
}

pub fn manager(store: Arc<dyn KeyValueStore>, clock: Arc<FixedClock>) -> FeedManager {
    let fetcher =
        HttpFetcher::new(DEFAULT_USER_AGENT, Duration::from_secs(5), 1024 * 1024).unwrap();
    FeedManager::new(store, Arc::new(fetcher))
        .with_clock(clock)
        .with_settings(ManagerSettings {
            child_delay: Duration::ZERO,
            max_index_depth: 3,
            max_sitemap_bytes: 1024 * 1024,
        })
}

pub async fn serve(server: &MockServer, p: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(p.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

pub async fn serve_status(server: &MockServer, p: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(p.to_string()))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}
