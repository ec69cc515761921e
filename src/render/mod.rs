//! Renderer boundary: where cycle outcomes, status lines and wait progress go.
//!
//! The scheduler never formats markup. Renderers receive raw (truncated) text and decide how to
//! display it safely.

pub mod board;
pub mod log;
pub mod slack;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;
use crate::source::NormalizedResult;

pub use board::{Board, BoardSnapshot};
pub use log::LogRenderer;
pub use slack::SlackRenderer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub level: StatusLevel,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// 0.0 ..= 1.0
    pub fraction: f64,
    pub label: String,
}

/// Serializable summary of a failed fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: String,
    pub message: String,
}

impl From<&FetchError> for ErrorInfo {
    fn from(e: &FetchError) -> Self {
        Self {
            kind: e.kind().to_string(),
            message: e.to_string(),
        }
    }
}

/// Result of one poll. Replaces the previous outcome wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleOutcome {
    pub cycle: u64,
    pub timestamp: DateTime<Utc>,
    pub keyword: String,
    pub results: Vec<NormalizedResult>,
    pub error: Option<ErrorInfo>,
}

impl CycleOutcome {
    /// Status line for this outcome. Zero matches is informational, not an error.
    pub fn status(&self) -> StatusMessage {
        let (level, text) = match &self.error {
            Some(err) => (StatusLevel::Error, format!("fetch failed: {}", err.message)),
            None if self.results.is_empty() => (
                StatusLevel::Info,
                format!("no posts found for '{}'", self.keyword),
            ),
            None => (
                StatusLevel::Success,
                format!(
                    "fetched {} latest posts for '{}'",
                    self.results.len(),
                    self.keyword
                ),
            ),
        };
        StatusMessage { level, text }
    }
}

#[async_trait]
pub trait Renderer: Send + Sync {
    async fn publish_status(&self, status: &StatusMessage);
    async fn publish_progress(&self, progress: &Progress);
    async fn publish_results(&self, outcome: &CycleOutcome);
}

/// Fans every event out to all registered renderers, in order.
#[derive(Default, Clone)]
pub struct RendererMux {
    renderers: Vec<Arc<dyn Renderer>>,
}

impl RendererMux {
    pub fn new(renderers: Vec<Arc<dyn Renderer>>) -> Self {
        Self { renderers }
    }

    pub fn push(&mut self, renderer: Arc<dyn Renderer>) {
        self.renderers.push(renderer);
    }
}

#[async_trait]
impl Renderer for RendererMux {
    async fn publish_status(&self, status: &StatusMessage) {
        for r in &self.renderers {
            r.publish_status(status).await;
        }
    }

    async fn publish_progress(&self, progress: &Progress) {
        for r in &self.renderers {
            r.publish_progress(progress).await;
        }
    }

    async fn publish_results(&self, outcome: &CycleOutcome) {
        for r in &self.renderers {
            r.publish_results(outcome).await;
        }
    }
}
