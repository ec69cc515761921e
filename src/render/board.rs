use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::Serialize;

use super::{CycleOutcome, Progress, Renderer, StatusMessage};

/// What the dashboard shows right now. Nothing older than the latest outcome is kept.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BoardSnapshot {
    pub status: Option<StatusMessage>,
    pub progress: Option<Progress>,
    pub outcome: Option<CycleOutcome>,
}

/// In-memory renderer backing `GET /status`.
#[derive(Debug, Clone, Default)]
pub struct Board {
    inner: Arc<RwLock<BoardSnapshot>>,
}

impl Board {
    pub fn snapshot(&self) -> BoardSnapshot {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn update(&self, f: impl FnOnce(&mut BoardSnapshot)) {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut *guard);
    }

    /// Drop the progress bar (used when polling stops mid-wait).
    pub fn clear_progress(&self) {
        self.update(|s| s.progress = None);
    }
}

#[async_trait]
impl Renderer for Board {
    async fn publish_status(&self, status: &StatusMessage) {
        let status = status.clone();
        self.update(|s| s.status = Some(status));
    }

    async fn publish_progress(&self, progress: &Progress) {
        let progress = progress.clone();
        self.update(|s| s.progress = Some(progress));
    }

    async fn publish_results(&self, outcome: &CycleOutcome) {
        let outcome = outcome.clone();
        self.update(|s| {
            s.outcome = Some(outcome);
            s.progress = None;
        });
    }
}
