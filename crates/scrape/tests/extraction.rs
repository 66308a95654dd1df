// ABOUTME: Integration tests for fetching source pages and extracting records from them.
// ABOUTME: Uses an HTML fixture served by a mock server, plus locator sets loaded from JSON.

use httpmock::prelude::*;
use pretty_assertions::assert_eq;
use sitefeed_scrape::{extract_records, extract_text, Document, Fetcher, LocatorSet};
use std::fs;

/// Load an HTML snapshot from the fixtures directory.
fn load_html_fixture(name: &str) -> String {
    let path = format!(
        "{}/tests/fixtures/html/{}.html",
        env!("CARGO_MANIFEST_DIR"),
        name
    );
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("failed to read {}: {}", path, e))
}

fn quotes_locators() -> LocatorSet {
    LocatorSet::table(
        ".memberName table",
        ["contract", "latest", "high", "low", "open"],
    )
}

#[tokio::test]
async fn fetched_fixture_yields_quote_records() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/sjzx/yshqbg");
        then.status(200)
            .header("content-type", "text/html; charset=utf-8")
            .body(load_html_fixture("sge_yshq"));
    });

    let fetcher = Fetcher::builder().build().unwrap();
    let body = fetcher
        .fetch_text(&server.url("/sjzx/yshqbg"))
        .await
        .unwrap();
    mock.assert();

    let doc = Document::parse(&body).unwrap();
    let records = extract_records(&doc, &quotes_locators());

    let contracts: Vec<&str> = records
        .iter()
        .filter_map(|r| r.get("contract"))
        .collect();
    // The trailing note row spans all columns and is dropped.
    assert_eq!(contracts, vec!["Au99.99", "Au(T+D)", "Ag(T+D)"]);
    assert_eq!(
        records[2].values().collect::<Vec<_>>(),
        vec!["Ag(T+D)", "6,120", "6,188", "6,090", "6,101"]
    );

    assert_eq!(
        extract_text(&doc, ".jzk_newsCenter_meeting .title h1").as_deref(),
        Some("上海黄金交易所2024年03月15日延时行情")
    );
}

#[tokio::test]
async fn gbk_page_is_decoded_before_extraction() {
    let html = "<html><body><ul class=\"list\"><li><a href=\"/a\">通知公告</a><span>2024-03-01</span></li></ul></body></html>";
    let (encoded, _, _) = encoding_rs::GBK.encode(html);

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/gbk");
        then.status(200)
            .header("content-type", "text/html; charset=gbk")
            .body(encoded.into_owned());
    });

    let body = Fetcher::builder()
        .build()
        .unwrap()
        .fetch_text(&server.url("/gbk"))
        .await
        .unwrap();
    let doc = Document::parse(&body).unwrap();

    let locators: LocatorSet = serde_json::from_str(
        r#"{
            "root": "ul.list",
            "row": "li",
            "fields": [
                { "name": "title", "selector": "a" },
                { "name": "href", "selector": ["a", "href"] },
                { "name": "date", "selector": "span" }
            ]
        }"#,
    )
    .unwrap();
    assert!(locators.validate().is_ok());

    let records = extract_records(&doc, &locators);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].get("title"), Some("通知公告"));
    assert_eq!(records[0].get("href"), Some("/a"));
    assert_eq!(records[0].get("date"), Some("2024-03-01"));
}

#[test]
fn page_without_root_yields_no_records() {
    let doc = Document::parse("<html><body><p>系统维护中</p></body></html>").unwrap();
    assert!(extract_records(&doc, &quotes_locators()).is_empty());
}
