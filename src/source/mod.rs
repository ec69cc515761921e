//! Source adapters: turn Reddit search (public feed or OAuth API) into [`NormalizedResult`]s.

pub mod api;
pub mod feed;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use regex::Regex;
use reqwest::Url;

use crate::config::{SourceKind, WatchConfig};
use crate::error::ConfigError;

pub use api::{ApiAdapter, Credentials};
pub use feed::FeedAdapter;
pub use types::{NormalizedResult, PublishedAt, SearchRequest, SortOrder, SourceAdapter};

pub const REDDIT_WEB_BASE: &str = "https://www.reddit.com";

/// Cut `s` to at most `max` characters (not bytes).
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Turn an HTML fragment (Reddit's `<content type="html">`) into readable text: drop comments
/// and tags, then decode entities and collapse whitespace. Tags go before entities so an
/// escaped `&lt;T&gt;` in the post survives as `<T>`.
pub fn plain_text(html: &str) -> String {
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags =
        RE_TAGS.get_or_init(|| Regex::new(r"(?s)<!--.*?-->|</?[A-Za-z!][^>]*>").unwrap());
    let stripped = re_tags.replace_all(html, " ");
    collapse_whitespace(&html_escape::decode_html_entities(&stripped))
}

pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Resolve a post link against `base`. Returns `None` if no absolute http(s) URL can be formed.
pub fn absolute_permalink(link: &str, base: &str) -> Option<String> {
    let link = link.trim();
    if link.is_empty() {
        return None;
    }
    let url = match Url::parse(link) {
        Ok(u) => u,
        Err(_) => Url::parse(base).ok()?.join(link).ok()?,
    };
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

pub(crate) fn http_client(user_agent: &str, timeout: Duration) -> Result<reqwest::Client, ConfigError> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()
        .map_err(|e| ConfigError::invalid("source", format!("building http client: {e}")))
}

/// Build the adapter selected in the config. Missing API credentials are fatal here.
pub fn build_adapter(cfg: &WatchConfig) -> Result<Arc<dyn SourceAdapter>, ConfigError> {
    let adapter: Arc<dyn SourceAdapter> = match cfg.source.kind {
        SourceKind::Feed => Arc::new(FeedAdapter::from_config(&cfg.source)?),
        SourceKind::Api => {
            let creds = cfg.credentials()?;
            Arc::new(ApiAdapter::from_config(&cfg.source, creds)?)
        }
    };
    tracing::info!(source = adapter.name(), "source adapter ready");
    Ok(adapter)
}
