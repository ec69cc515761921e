use async_trait::async_trait;

use super::{CycleOutcome, Progress, Renderer, StatusLevel, StatusMessage};

/// Writes every renderer event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogRenderer;

#[async_trait]
impl Renderer for LogRenderer {
    async fn publish_status(&self, status: &StatusMessage) {
        match status.level {
            StatusLevel::Info | StatusLevel::Success => {
                tracing::info!(target: "watch", "{}", status.text)
            }
            StatusLevel::Warning => tracing::warn!(target: "watch", "{}", status.text),
            StatusLevel::Error => tracing::error!(target: "watch", "{}", status.text),
        }
    }

    async fn publish_progress(&self, progress: &Progress) {
        tracing::trace!(
            target: "watch",
            fraction = progress.fraction,
            "{}",
            progress.label
        );
    }

    async fn publish_results(&self, outcome: &CycleOutcome) {
        tracing::info!(
            target: "watch",
            cycle = outcome.cycle,
            keyword = %outcome.keyword,
            results = outcome.results.len(),
            error = outcome.error.as_ref().map(|e| e.kind.as_str()),
            "cycle outcome"
        );
        for r in &outcome.results {
            tracing::debug!(
                target: "watch",
                published = %r.published_at,
                permalink = %r.permalink,
                "{}",
                r.title
            );
        }
    }
}
