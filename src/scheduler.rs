//! # Poll Scheduler
//! Drives fetch → filter → render → wait for one keyword session.
//!
//! A [`Session`] is either idle or polling. While polling, a single tokio task runs cycles back to
//! back; nothing overlaps. Stop is delivered over a `watch` channel that interrupts both the fetch
//! and every wait step, so it takes effect immediately instead of at the next cycle. Config updates
//! ride a second `watch` channel and are picked up when the next cycle starts.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use metrics::{counter, gauge, histogram};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::filter;
use crate::render::{CycleOutcome, ErrorInfo, Progress, Renderer, StatusLevel, StatusMessage};
use crate::source::{SearchRequest, SourceAdapter};

pub const DEFAULT_PROGRESS_STEPS: u32 = 100;
pub const IDLE_HINT: &str = "enter a keyword and press start";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub request: SearchRequest,
    pub progress_steps: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    Idle,
    Polling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitEnd {
    Elapsed,
    Cancelled,
}

struct Running {
    cancel: watch::Sender<bool>,
    config: watch::Sender<SchedulerConfig>,
    handle: JoinHandle<()>,
}

impl Running {
    async fn shutdown(self) {
        let _ = self.cancel.send(true);
        if let Err(e) = self.handle.await {
            tracing::warn!(error = ?e, "poll task ended abnormally");
        }
    }
}

/// One operator session. Owns its adapter, renderer and state; nothing is shared across sessions.
pub struct Session {
    adapter: Arc<dyn SourceAdapter>,
    renderer: Arc<dyn Renderer>,
    progress_steps: u32,
    running: Mutex<Option<Running>>,
}

impl Session {
    pub fn new(adapter: Arc<dyn SourceAdapter>, renderer: Arc<dyn Renderer>) -> Self {
        Self {
            adapter,
            renderer,
            progress_steps: DEFAULT_PROGRESS_STEPS,
            running: Mutex::new(None),
        }
    }

    pub fn with_progress_steps(mut self, steps: u32) -> Self {
        self.progress_steps = steps.max(1);
        self
    }

    /// Idle → Polling. A session that is already polling is restarted with `request`.
    pub async fn start(&self, request: SearchRequest) {
        let mut running = self.running.lock().await;
        if let Some(prev) = running.take() {
            prev.shutdown().await;
        }

        tracing::info!(
            keyword = %request.keyword,
            interval_secs = request.interval_secs,
            strict = request.strict_filter,
            source = self.adapter.name(),
            "polling started"
        );
        let config = SchedulerConfig {
            request,
            progress_steps: self.progress_steps,
        };
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (config_tx, config_rx) = watch::channel(config);
        let handle = tokio::spawn(run_loop(
            self.adapter.clone(),
            self.renderer.clone(),
            config_rx,
            cancel_rx,
        ));
        gauge!("watch_polling").set(1.0);

        *running = Some(Running {
            cancel: cancel_tx,
            config: config_tx,
            handle,
        });
    }

    /// Polling → Idle. Returns false if the session was already idle.
    pub async fn stop(&self) -> bool {
        self.stop_with("polling stopped").await
    }

    /// Keyword emptied by the operator: same as stop, with a prompt to enter a new one.
    pub async fn clear_keyword(&self) -> bool {
        self.stop_with(IDLE_HINT).await
    }

    async fn stop_with(&self, message: &str) -> bool {
        let prev = self.running.lock().await.take();
        let Some(prev) = prev else {
            return false;
        };
        prev.shutdown().await;
        gauge!("watch_polling").set(0.0);
        self.renderer
            .publish_status(&StatusMessage {
                level: StatusLevel::Info,
                text: message.to_string(),
            })
            .await;
        true
    }

    /// Replace the request used from the next cycle on. Returns false when idle.
    pub async fn update_config(&self, request: SearchRequest) -> bool {
        let running = self.running.lock().await;
        let Some(r) = running.as_ref() else {
            return false;
        };
        tracing::info!(keyword = %request.keyword, "search settings updated");
        r.config.send_modify(|cfg| cfg.request = request);
        true
    }

    pub async fn state(&self) -> SchedulerState {
        match self.running.lock().await.as_ref() {
            Some(r) if !r.handle.is_finished() => SchedulerState::Polling,
            _ => SchedulerState::Idle,
        }
    }

    /// Request the running task will use for its next cycle.
    pub async fn current_request(&self) -> Option<SearchRequest> {
        self.running
            .lock()
            .await
            .as_ref()
            .map(|r| r.config.borrow().request.clone())
    }
}

async fn run_loop(
    adapter: Arc<dyn SourceAdapter>,
    renderer: Arc<dyn Renderer>,
    config: watch::Receiver<SchedulerConfig>,
    mut cancel: watch::Receiver<bool>,
) {
    let mut cycle: u64 = 0;
    loop {
        if *cancel.borrow() {
            break;
        }
        cycle += 1;
        let cfg = config.borrow().clone();
        let request = &cfg.request;

        renderer
            .publish_status(&StatusMessage {
                level: StatusLevel::Info,
                text: format!(
                    "[{}] searching for '{}'... ({})",
                    Utc::now().format("%Y-%m-%d %H:%M:%S"),
                    request.keyword,
                    adapter.name()
                ),
            })
            .await;

        let outcome = tokio::select! {
            o = run_cycle(adapter.as_ref(), request, cycle) => o,
            _ = cancelled(&mut cancel) => break,
        };
        renderer.publish_results(&outcome).await;
        renderer.publish_status(&outcome.status()).await;

        let interval = Duration::from_secs(request.interval_secs);
        if wait_phase(renderer.as_ref(), interval, cfg.progress_steps, &mut cancel).await
            == WaitEnd::Cancelled
        {
            break;
        }
    }
    tracing::info!(cycles = cycle, "poll task exiting");
}

/// One fetch → filter → cap pass. Fetch failures become `outcome.error`, never a panic or retry.
pub async fn run_cycle(
    adapter: &dyn SourceAdapter,
    request: &SearchRequest,
    cycle: u64,
) -> CycleOutcome {
    let timestamp = Utc::now();
    let t0 = Instant::now();
    counter!("watch_cycles_total").increment(1);

    let (results, error) = match adapter.fetch(request).await {
        Ok(raw) => {
            let fetched = raw.len();
            let kept = filter::filter(raw, &request.keyword, request.strict_filter);
            counter!("watch_filtered_out_total").increment((fetched - kept.len()) as u64);
            let shown = filter::cap(kept, adapter.display_cap(request));
            tracing::debug!(cycle, fetched, shown = shown.len(), "cycle fetched");
            (shown, None)
        }
        Err(e) => {
            tracing::warn!(cycle, keyword = %request.keyword, kind = e.kind(), error = %e, "fetch failed");
            counter!("watch_fetch_errors_total", "kind" => e.kind()).increment(1);
            (Vec::new(), Some(ErrorInfo::from(&e)))
        }
    };

    histogram!("watch_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    counter!("watch_results_total").increment(results.len() as u64);
    gauge!("watch_last_cycle_ts").set(timestamp.timestamp() as f64);

    CycleOutcome {
        cycle,
        timestamp,
        keyword: request.keyword.clone(),
        results,
        error,
    }
}

pub fn step_duration(interval: Duration, steps: u32) -> Duration {
    interval / steps.max(1)
}

/// Sleep `interval` in `steps` equal slices, publishing progress after each one.
/// The final report is exactly 1.0. Cancellation wakes the sleep immediately.
pub async fn wait_phase(
    renderer: &dyn Renderer,
    interval: Duration,
    steps: u32,
    cancel: &mut watch::Receiver<bool>,
) -> WaitEnd {
    let steps = steps.max(1);
    let step = step_duration(interval, steps);

    for i in 0..steps {
        if *cancel.borrow() {
            return WaitEnd::Cancelled;
        }
        tokio::select! {
            _ = tokio::time::sleep(step) => {}
            _ = cancelled(cancel) => return WaitEnd::Cancelled,
        }
        let done = i + 1;
        let remaining = interval.saturating_sub(step * done);
        renderer
            .publish_progress(&Progress {
                fraction: f64::from(done) / f64::from(steps),
                label: format!("next search in {}", format_remaining(remaining)),
            })
            .await;
    }
    WaitEnd::Elapsed
}

/// Resolves once the flag is set or the sender is gone.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

fn format_remaining(d: Duration) -> String {
    let secs = d.as_secs();
    match (secs / 60, secs % 60) {
        (0, s) => format!("{s}s"),
        (m, 0) => format!("{m}m"),
        (m, s) => format!("{m}m {s}s"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_minute_is_hundred_steps_of_600ms() {
        assert_eq!(
            step_duration(Duration::from_secs(60), 100),
            Duration::from_millis(600)
        );
        assert_eq!(
            step_duration(Duration::from_secs(60), 0),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn remaining_is_human_readable() {
        assert_eq!(format_remaining(Duration::from_secs(42)), "42s");
        assert_eq!(format_remaining(Duration::from_secs(120)), "2m");
        assert_eq!(format_remaining(Duration::from_secs(1782)), "29m 42s");
    }
}
