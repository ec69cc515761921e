use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::counter;
use reqwest::Client;

use super::{CycleOutcome, Progress, Renderer, StatusMessage};

/// Posts outcomes that carry posts or an error to a Slack-compatible incoming webhook.
/// Status lines and progress are not forwarded.
pub struct SlackRenderer {
    webhook_url: String,
    client: Client,
    timeout: Duration,
}

impl SlackRenderer {
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url,
            client: Client::new(),
            timeout: Duration::from_secs(5),
        }
    }

    /// `None` when `SLACK_WEBHOOK_URL` is unset or blank.
    pub fn from_env() -> Option<Self> {
        std::env::var("SLACK_WEBHOOK_URL")
            .ok()
            .filter(|u| !u.trim().is_empty())
            .map(Self::new)
    }

    async fn post(&self, text: String) -> Result<()> {
        let body = serde_json::json!({ "text": text });
        self.client
            .post(&self.webhook_url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .context("slack post")?
            .error_for_status()
            .context("slack non-2xx")?;
        Ok(())
    }
}

/// Slack mrkdwn body for an outcome; `None` when there is nothing worth posting.
pub fn format_outcome(outcome: &CycleOutcome) -> Option<String> {
    if let Some(err) = &outcome.error {
        return Some(format!(
            "*reddit-watch* '{}': fetch failed ({}): {}",
            outcome.keyword, err.kind, err.message
        ));
    }
    if outcome.results.is_empty() {
        return None;
    }

    let mut text = format!(
        "*reddit-watch* '{}': {} latest posts @ {}",
        outcome.keyword,
        outcome.results.len(),
        outcome.timestamp.to_rfc3339()
    );
    for r in &outcome.results {
        let title = r.title.replace(['<', '>', '|'], " ");
        text.push_str(&format!("\n• <{}|{}>", r.permalink, title));
        if let Some(sub) = &r.subreddit {
            text.push_str(&format!(" r/{sub}"));
        }
        if let Some(score) = r.score {
            text.push_str(&format!(" ({score})"));
        }
    }
    Some(text)
}

#[async_trait]
impl Renderer for SlackRenderer {
    async fn publish_status(&self, _status: &StatusMessage) {}

    async fn publish_progress(&self, _progress: &Progress) {}

    async fn publish_results(&self, outcome: &CycleOutcome) {
        let Some(text) = format_outcome(outcome) else {
            return;
        };
        if let Err(e) = self.post(text).await {
            tracing::warn!(error = ?e, "slack webhook delivery failed");
            counter!("watch_webhook_errors_total").increment(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::ErrorInfo;
    use crate::source::{NormalizedResult, PublishedAt};
    use chrono::Utc;

    fn outcome(results: Vec<NormalizedResult>, error: Option<ErrorInfo>) -> CycleOutcome {
        CycleOutcome {
            cycle: 3,
            timestamp: Utc::now(),
            keyword: "tokio".into(),
            results,
            error,
        }
    }

    #[test]
    fn empty_outcome_is_not_posted() {
        assert!(format_outcome(&outcome(vec![], None)).is_none());
    }

    #[test]
    fn results_render_as_links() {
        let r = NormalizedResult {
            title: "tokio <1.40> released".into(),
            body_text: String::new(),
            published_at: PublishedAt::Unknown,
            permalink: "https://www.reddit.com/r/rust/comments/1/x/".into(),
            author: Some("ferris".into()),
            score: Some(42),
            subreddit: Some("rust".into()),
            external_url: None,
        };
        let text = format_outcome(&outcome(vec![r], None)).unwrap();
        assert!(text.contains("<https://www.reddit.com/r/rust/comments/1/x/|tokio  1.40  released>"));
        assert!(text.contains("r/rust (42)"));
    }

    #[test]
    fn errors_are_posted() {
        let err = ErrorInfo {
            kind: "status".into(),
            message: "HTTP 429 from https://www.reddit.com/search.rss".into(),
        };
        let text = format_outcome(&outcome(vec![], Some(err))).unwrap();
        assert!(text.contains("fetch failed (status)"));
    }
}
