// tests/metrics.rs
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use reddit_watch::metrics::Metrics;
use reddit_watch::scheduler::run_cycle;
use reddit_watch::source::{FeedAdapter, SearchRequest};

const ATOM: &str = include_str!("fixtures/reddit_search_atom.xml");

// One recorder per process, so everything lives in a single test.
#[tokio::test]
async fn metrics_endpoint_contains_cycle_series() {
    let metrics = Metrics::init().expect("install prometheus recorder");

    let adapter = FeedAdapter::from_fixture(ATOM);
    let req = SearchRequest::new("python", 60)
        .unwrap()
        .with_strict_filter(true);
    let outcome = run_cycle(&adapter, &req, 1).await;
    assert_eq!(outcome.results.len(), 2);

    let resp = metrics
        .router()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    for needle in [
        "watch_cycles_total",
        "watch_results_total",
        "watch_filtered_out_total",
        "watch_fetch_ms",
        "watch_last_cycle_ts",
        "watch_polling",
    ] {
        assert!(text.contains(needle), "missing series {needle} in:\n{text}");
    }
}
