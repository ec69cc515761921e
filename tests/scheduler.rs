// tests/scheduler.rs
//
// Poll cycle behaviour with a scripted adapter and a recording renderer.
// Wait-phase tests run on paused tokio time so 60s intervals finish instantly.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reddit_watch::error::FetchError;
use reddit_watch::render::{CycleOutcome, Progress, Renderer, StatusMessage};
use reddit_watch::scheduler::{
    run_cycle, wait_phase, SchedulerState, Session, WaitEnd, IDLE_HINT,
};
use reddit_watch::source::{NormalizedResult, PublishedAt, SearchRequest, SourceAdapter};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

fn post(title: &str, body: &str) -> NormalizedResult {
    NormalizedResult {
        title: title.into(),
        body_text: body.into(),
        published_at: PublishedAt::Unknown,
        permalink: format!("https://www.reddit.com/r/test/comments/{}/", title.len()),
        author: None,
        score: None,
        subreddit: None,
        external_url: None,
    }
}

/// Replays scripted responses, then returns empty results forever.
struct ScriptedAdapter {
    script: Mutex<VecDeque<Result<Vec<NormalizedResult>, FetchError>>>,
    cap: usize,
    calls: Mutex<Vec<String>>,
}

impl ScriptedAdapter {
    fn new(script: Vec<Result<Vec<NormalizedResult>, FetchError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            cap: 10,
            calls: Mutex::default(),
        }
    }
}

#[async_trait]
impl SourceAdapter for ScriptedAdapter {
    async fn fetch(&self, request: &SearchRequest) -> Result<Vec<NormalizedResult>, FetchError> {
        self.calls.lock().unwrap().push(request.keyword.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }

    fn display_cap(&self, _request: &SearchRequest) -> usize {
        self.cap
    }
}

#[derive(Debug)]
enum Event {
    Status(StatusMessage),
    Progress(Progress, Instant),
    Results(CycleOutcome),
}

struct Recorder {
    tx: mpsc::UnboundedSender<Event>,
}

#[async_trait]
impl Renderer for Recorder {
    async fn publish_status(&self, status: &StatusMessage) {
        let _ = self.tx.send(Event::Status(status.clone()));
    }

    async fn publish_progress(&self, progress: &Progress) {
        let _ = self.tx.send(Event::Progress(progress.clone(), Instant::now()));
    }

    async fn publish_results(&self, outcome: &CycleOutcome) {
        let _ = self.tx.send(Event::Results(outcome.clone()));
    }
}

fn recorder() -> (Arc<Recorder>, mpsc::UnboundedReceiver<Event>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(Recorder { tx }), rx)
}

async fn next_outcome(rx: &mut mpsc::UnboundedReceiver<Event>) -> CycleOutcome {
    loop {
        match rx.recv().await.expect("renderer channel open") {
            Event::Results(o) => return o,
            _ => continue,
        }
    }
}

fn drain_progress(rx: &mut mpsc::UnboundedReceiver<Event>) -> Vec<(Progress, Instant)> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        if let Event::Progress(p, at) = ev {
            out.push((p, at));
        }
    }
    out
}

fn strict(keyword: &str) -> SearchRequest {
    SearchRequest::new(keyword, 60)
        .unwrap()
        .with_strict_filter(true)
}

#[tokio::test]
async fn strict_cycle_keeps_only_keyword_hits() {
    let adapter = ScriptedAdapter::new(vec![Ok(vec![
        post("Python 3.12 released", ""),
        post("Snake care tips", "python the snake"),
        post("Unrelated", "nothing here"),
    ])]);
    let outcome = run_cycle(&adapter, &strict("Python"), 1).await;
    assert!(outcome.error.is_none());
    let titles: Vec<_> = outcome.results.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, ["Python 3.12 released", "Snake care tips"]);
}

#[tokio::test]
async fn fetch_error_becomes_outcome_error() {
    let adapter = ScriptedAdapter::new(vec![Err(FetchError::Timeout(Duration::from_secs(10)))]);
    let outcome = run_cycle(&adapter, &strict("rust"), 7).await;
    assert_eq!(outcome.cycle, 7);
    assert!(outcome.results.is_empty());
    let err = outcome.error.expect("error recorded");
    assert_eq!(err.kind, "timeout");
}

#[tokio::test]
async fn results_are_capped_after_filtering() {
    let cap = 10;
    for n in [0usize, 1, cap, cap + 1, 10 * cap] {
        let raw = (0..n).map(|i| post(&format!("rust {i}"), "")).collect();
        let adapter = ScriptedAdapter::new(vec![Ok(raw)]);
        let req = SearchRequest::new("rust", 60).unwrap();
        let outcome = run_cycle(&adapter, &req, 1).await;
        assert_eq!(outcome.results.len(), n.min(cap), "raw count {n}");
    }
}

#[tokio::test(start_paused = true)]
async fn one_minute_wait_is_hundred_steps_reaching_one() {
    let (rec, mut rx) = recorder();
    let (_cancel_tx, mut cancel_rx) = watch::channel(false);

    let t0 = Instant::now();
    let end = wait_phase(rec.as_ref(), Duration::from_secs(60), 100, &mut cancel_rx).await;
    assert_eq!(end, WaitEnd::Elapsed);
    let elapsed = t0.elapsed();
    assert!(elapsed >= Duration::from_secs(60) && elapsed < Duration::from_millis(60_100));

    let progress = drain_progress(&mut rx);
    assert_eq!(progress.len(), 100);
    let mut last_fraction = 0.0;
    let mut last_at = t0;
    for (p, at) in &progress {
        assert!(p.fraction >= last_fraction, "progress went backwards");
        let step = *at - last_at;
        assert!(step >= Duration::from_millis(600) && step <= Duration::from_millis(601));
        last_fraction = p.fraction;
        last_at = *at;
    }
    assert_eq!(last_fraction, 1.0);
    assert_eq!(progress.last().unwrap().0.label, "next search in 0s");
}

#[tokio::test(start_paused = true)]
async fn cancel_interrupts_wait_mid_step() {
    let (rec, mut rx) = recorder();
    let (cancel_tx, mut cancel_rx) = watch::channel(false);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        let _ = cancel_tx.send(true);
        // Keep the sender alive past the cancel point.
        tokio::time::sleep(Duration::from_secs(120)).await;
    });

    let t0 = Instant::now();
    let end = wait_phase(rec.as_ref(), Duration::from_secs(60), 100, &mut cancel_rx).await;
    assert_eq!(end, WaitEnd::Cancelled);
    let elapsed = t0.elapsed();
    assert!(elapsed >= Duration::from_millis(1_500) && elapsed < Duration::from_millis(1_800));
    assert_eq!(drain_progress(&mut rx).len(), 2);
}

#[tokio::test(start_paused = true)]
async fn session_survives_fetch_errors_and_keeps_polling() {
    let adapter = Arc::new(ScriptedAdapter::new(vec![
        Err(FetchError::Status {
            status: 503,
            url: "https://www.reddit.com/search.rss".into(),
        }),
        Ok(vec![post("rust 1", ""), post("rust 2", ""), post("rust 3", "")]),
    ]));
    let (rec, mut rx) = recorder();
    let session = Session::new(adapter.clone(), rec).with_progress_steps(4);

    assert_eq!(session.state().await, SchedulerState::Idle);
    session.start(SearchRequest::new("rust", 1).unwrap()).await;
    assert_eq!(session.state().await, SchedulerState::Polling);

    let first = next_outcome(&mut rx).await;
    assert_eq!(first.cycle, 1);
    assert!(first.results.is_empty());
    assert!(first.error.is_some());

    let second = next_outcome(&mut rx).await;
    assert_eq!(second.cycle, 2);
    assert!(second.error.is_none());
    assert_eq!(second.results.len(), 3);

    assert!(session.stop().await);
    assert_eq!(session.state().await, SchedulerState::Idle);
    assert!(!session.stop().await);
    assert_eq!(adapter.calls.lock().unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn stop_during_long_wait_is_immediate() {
    let adapter = Arc::new(ScriptedAdapter::new(vec![]));
    let (rec, mut rx) = recorder();
    let session = Session::new(adapter, rec);

    session.start(SearchRequest::new("rust", 3600).unwrap()).await;
    next_outcome(&mut rx).await;

    let t0 = Instant::now();
    assert!(session.stop().await);
    assert!(t0.elapsed() < Duration::from_secs(36), "stop waited a full step");
}

#[tokio::test(start_paused = true)]
async fn update_config_applies_at_next_cycle() {
    let adapter = Arc::new(ScriptedAdapter::new(vec![]));
    let (rec, mut rx) = recorder();
    let session = Session::new(adapter.clone(), rec).with_progress_steps(2);

    session.start(SearchRequest::new("rust", 1).unwrap()).await;
    assert_eq!(next_outcome(&mut rx).await.keyword, "rust");

    assert!(session.update_config(SearchRequest::new("tokio", 1).unwrap()).await);
    assert_eq!(
        session.current_request().await.map(|r| r.keyword),
        Some("tokio".to_string())
    );
    assert_eq!(next_outcome(&mut rx).await.keyword, "tokio");

    session.stop().await;
    assert!(!session.update_config(SearchRequest::new("go", 1).unwrap()).await);
    let calls = adapter.calls.lock().unwrap().clone();
    assert_eq!(&calls[..2], ["rust", "tokio"]);
}

#[tokio::test(start_paused = true)]
async fn clearing_keyword_goes_idle_with_hint() {
    let adapter = Arc::new(ScriptedAdapter::new(vec![]));
    let (rec, mut rx) = recorder();
    let session = Session::new(adapter, rec);

    session.start(SearchRequest::new("rust", 60).unwrap()).await;
    next_outcome(&mut rx).await;
    assert!(session.clear_keyword().await);
    assert_eq!(session.state().await, SchedulerState::Idle);

    let mut last_status = None;
    while let Ok(ev) = rx.try_recv() {
        if let Event::Status(s) = ev {
            last_status = Some(s);
        }
    }
    assert_eq!(last_status.map(|s| s.text), Some(IDLE_HINT.to_string()));
}
