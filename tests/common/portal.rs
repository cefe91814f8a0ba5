//! Mock card portal built on wiremock, plus helpers for driving a retriever against it

use campus_ledger::{Config, CookieJar, Event};
use serde_json::{Value, json};
use std::time::Duration;
use wiremock::matchers::{body_string_contains, header_regex, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const SUBJECT: &str = "20240001";
pub const TRANSACTIONS_PATH: &str = "/Report/GetPersonTrjn";

/// Retriever config pointed at the mock server, without pacing delays
pub fn portal_config(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.portal.base_url = server.uri();
    config.portal.request_timeout = Duration::from_secs(5);
    config.retrieval.page_delay = Duration::ZERO;
    config
}

/// Cookies as a logged-in browser would have captured them
pub fn logged_in_jar() -> CookieJar {
    [
        ("ASP.NET_SessionId", "mock-session"),
        ("hallticket", "mock-ticket"),
        ("imeiticket", "mock-imei"),
    ]
    .into_iter()
    .collect()
}

/// Body of page `page` for a history of `total` records in pages of `page_size`
pub fn page_body(page: u32, total: u64, page_size: usize) -> Value {
    let first = (u64::from(page) - 1) * page_size as u64;
    let rows: Vec<Value> = (first..total)
        .take(page_size)
        .map(|seq| {
            json!({
                "SEQ": seq,
                "OCCTIME": format!("2025-03-{:02} 12:00:00", seq % 28 + 1),
                "MERCNAME": "第一食堂",
                "TRANAMT": format!("-{}.50", seq % 9 + 1),
            })
        })
        .collect();
    json!({ "total": total.to_string(), "rows": rows })
}

/// Mount a page mock answering only requests whose cookies present the ticket as `ticket_cookie`
pub async fn mount_page(
    server: &MockServer,
    ticket_cookie: &str,
    page: u32,
    body: Value,
    expected_calls: u64,
) {
    Mock::given(method("POST"))
        .and(path(TRANSACTIONS_PATH))
        .and(header_regex("cookie", &format!("{ticket_cookie}=")))
        .and(body_string_contains(format!("page={page}&")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(expected_calls)
        .named(format!("page {page} via {ticket_cookie}"))
        .mount(server)
        .await;
}

/// Reject every request presenting the ticket as `ticket_cookie` with a login page
pub async fn reject_shape(server: &MockServer, ticket_cookie: &str) {
    Mock::given(method("POST"))
        .and(path(TRANSACTIONS_PATH))
        .and(header_regex("cookie", &format!("{ticket_cookie}=")))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<html><body>请重新登录</body></html>"),
        )
        .named(format!("login page for {ticket_cookie}"))
        .mount(server)
        .await;
}

/// Wait for the run's `Finished` event, collecting every event on the way
pub async fn events_until_finished(
    events: &mut tokio::sync::broadcast::Receiver<Event>,
) -> Vec<Event> {
    tokio::time::timeout(Duration::from_secs(10), async {
        let mut seen = Vec::new();
        loop {
            let event = events.recv().await.expect("event channel closed");
            let done = matches!(event, Event::Finished { .. });
            seen.push(event);
            if done {
                return seen;
            }
        }
    })
    .await
    .expect("timed out waiting for Finished")
}
