//! Integration tests for the HTTP fetcher
//!
//! These tests use wiremock to create mock HTTP servers and run the full
//! fetch, extract and store cycle end-to-end.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use sumi_sweep::config::{FetchConfig, FieldSelector, RetryGating};
use sumi_sweep::engine::{BackoffPolicy, Orchestrator, Performer, RunOptions};
use sumi_sweep::fetch::{HttpFetcher, PageContent};
use sumi_sweep::output::{DirectorySink, ResultSink};
use sumi_sweep::{ItemStatus, JsonStateStore, StateStore};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const QUESTION_PAGE: &str = r#"
    <html>
    <head><title>Question</title></head>
    <body>
        <div title="topic title">How do retries work?</div>
        <div class="answer">With backoff.</div>
    </body>
    </html>
"#;

/// Creates a fetch configuration extracting a required question and an optional answer
fn create_test_config() -> FetchConfig {
    FetchConfig {
        user_agent: "TestSweep/1.0".to_string(),
        timeout_secs: 5,
        https_only: false,
        fields: vec![
            FieldSelector {
                name: "question".to_string(),
                selector: r#"div[title*="topic"]"#.to_string(),
                required: true,
            },
            FieldSelector {
                name: "answer".to_string(),
                selector: "div.answer".to_string(),
                required: false,
            },
        ],
    }
}

fn run_options(max_attempts: u32) -> RunOptions {
    RunOptions {
        concurrency: 2,
        max_attempts,
        backoff: BackoffPolicy::linear(Duration::from_millis(5), Duration::from_millis(20)),
        gating: RetryGating::Immediate,
    }
}

async fn mount_page(server: &MockServer, route: &str, status: u16, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(status)
                .set_body_string(body)
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

fn read_result(dir: &Path, reference: &str) -> serde_json::Value {
    let bytes = std::fs::read(dir.join(reference)).expect("result file should exist");
    serde_json::from_slice(&bytes).expect("result file should be JSON")
}

#[tokio::test]
async fn test_fetch_extracts_fields() {
    let server = MockServer::start().await;
    mount_page(&server, "/q/1", 200, QUESTION_PAGE).await;

    let fetcher = HttpFetcher::new(&create_test_config()).unwrap();
    let url = format!("{}/q/1", server.uri());
    let content = fetcher.perform(&url).await.unwrap();

    assert_eq!(content.status, 200);
    assert_eq!(content.title.as_deref(), Some("Question"));
    assert_eq!(content.fields["question"], "How do retries work?");
    assert_eq!(content.fields["answer"], "With backoff.");
}

#[tokio::test]
async fn test_non_success_status_is_recoverable() {
    let server = MockServer::start().await;
    mount_page(&server, "/missing", 404, "not here").await;

    let fetcher = HttpFetcher::new(&create_test_config()).unwrap();
    let err = fetcher
        .perform(&format!("{}/missing", server.uri()))
        .await
        .unwrap_err();

    assert!(!err.is_fatal());
    assert_eq!(err.message(), "HTTP 404");
}

#[tokio::test]
async fn test_missing_required_field_is_recoverable() {
    let server = MockServer::start().await;
    mount_page(&server, "/empty", 200, "<html><body><p>nothing</p></body></html>").await;

    let fetcher = HttpFetcher::new(&create_test_config()).unwrap();
    let err = fetcher
        .perform(&format!("{}/empty", server.uri()))
        .await
        .unwrap_err();

    assert!(!err.is_fatal());
    assert!(err.message().starts_with("required selectors not found"));
    assert!(err.message().contains("question"));
}

#[tokio::test]
async fn test_full_run_stores_results_and_state() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(&server, "/q/1", 200, QUESTION_PAGE).await;
    mount_page(&server, "/q/2", 200, QUESTION_PAGE).await;

    // Fails once, then serves the page
    Mock::given(method("GET"))
        .and(path("/q/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_page(&server, "/q/flaky", 200, QUESTION_PAGE).await;

    Mock::given(method("GET"))
        .and(path("/q/broken"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let results_dir = dir.path().join("links");
    let store = Arc::new(JsonStateStore::new(&dir.path().join("status.json")).unwrap());
    let sink: Arc<dyn ResultSink<PageContent>> =
        Arc::new(DirectorySink::new(&results_dir).unwrap());
    let fetcher = Arc::new(HttpFetcher::new(&create_test_config()).unwrap());

    let keys: Vec<String> = ["/q/1", "/q/2", "/q/flaky", "/q/broken", "/q/1"]
        .iter()
        .map(|p| format!("{}{}", base, p))
        .collect();

    let orchestrator = Orchestrator::new(
        Arc::clone(&store) as Arc<dyn StateStore>,
        fetcher,
        sink,
        run_options(2),
    );
    let summary = orchestrator
        .run(&keys, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.completed, 3);
    assert_eq!(summary.failed, 1);

    let items = store.load().unwrap();
    assert_eq!(items.len(), 4);

    let flaky = &items[&format!("{}/q/flaky", base)];
    assert_eq!(flaky.status, ItemStatus::Completed);
    assert_eq!(flaky.attempt_count(), 2);
    assert_eq!(flaky.attempts[0].error.as_deref(), Some("HTTP 503"));

    let broken = &items[&format!("{}/q/broken", base)];
    assert_eq!(broken.status, ItemStatus::FailedRetryable);
    assert_eq!(broken.last_error.as_deref(), Some("HTTP 500"));
    assert!(broken.result_ref.is_none());

    let first = &items[&format!("{}/q/1", base)];
    let reference = first.result_ref.as_deref().expect("completed item has a result");
    let stored = read_result(&results_dir, reference);
    assert_eq!(stored["key"], format!("{}/q/1", base));
    assert_eq!(stored["content"]["fields"]["question"], "How do retries work?");

    let files = std::fs::read_dir(&results_dir).unwrap().count();
    assert_eq!(files, 3);
}
