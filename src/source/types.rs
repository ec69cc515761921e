// src/source/types.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use crate::error::{ConfigError, FetchError};

/// Upstream sort order. Reddit search is always asked for the newest posts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    New,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::New => "new",
        }
    }
}

/// What to search for and how often. Validated on construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub keyword: String,
    pub sort: SortOrder,
    pub limit: usize,
    pub strict_filter: bool,
    pub interval_secs: u64,
    /// Wrap the keyword in quotes so upstream treats it as a phrase.
    pub phrase_match: bool,
}

impl SearchRequest {
    pub const DEFAULT_LIMIT: usize = 25;

    pub fn new(keyword: &str, interval_secs: u64) -> Result<Self, ConfigError> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(ConfigError::invalid("keyword", "must not be empty"));
        }
        if interval_secs == 0 {
            return Err(ConfigError::invalid("interval_secs", "must be > 0"));
        }
        Ok(Self {
            keyword: keyword.to_string(),
            sort: SortOrder::New,
            limit: Self::DEFAULT_LIMIT,
            strict_filter: false,
            interval_secs,
            phrase_match: false,
        })
    }

    pub fn with_limit(mut self, limit: usize) -> Result<Self, ConfigError> {
        if limit == 0 {
            return Err(ConfigError::invalid("limit", "must be > 0"));
        }
        self.limit = limit;
        Ok(self)
    }

    pub fn with_strict_filter(mut self, strict: bool) -> Self {
        self.strict_filter = strict;
        self
    }

    pub fn with_phrase_match(mut self, phrase: bool) -> Self {
        self.phrase_match = phrase;
        self
    }

    /// Query term as sent upstream, quoted when phrase matching is on. Not yet encoded.
    pub fn query_term(&self) -> String {
        if self.phrase_match {
            format!("\"{}\"", self.keyword)
        } else {
            self.keyword.clone()
        }
    }

    /// Percent-encoded query term, safe for insertion into a URL.
    pub fn encoded_query(&self) -> String {
        urlencoding::encode(&self.query_term()).into_owned()
    }
}

/// Publication time of a post; feeds do not always carry one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "at", rename_all = "lowercase")]
pub enum PublishedAt {
    Known(DateTime<Utc>),
    Unknown,
}

impl PublishedAt {
    /// Parse an RFC 3339 (Atom) or RFC 2822 (RSS) timestamp. Unparseable input is `Unknown`.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let parsed = OffsetDateTime::parse(raw, &Rfc3339)
            .or_else(|_| OffsetDateTime::parse(raw, &Rfc2822))
            .ok()
            .map(|dt| dt.unix_timestamp());
        match parsed {
            Some(secs) => Self::from_unix(secs),
            None => {
                tracing::debug!(raw, "unparseable publish timestamp");
                Self::Unknown
            }
        }
    }

    pub fn from_unix(secs: i64) -> Self {
        DateTime::from_timestamp(secs, 0)
            .map(Self::Known)
            .unwrap_or(Self::Unknown)
    }
}

impl std::fmt::Display for PublishedAt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PublishedAt::Known(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S UTC")),
            PublishedAt::Unknown => f.write_str("unknown"),
        }
    }
}

/// Common shape produced by every source adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedResult {
    pub title: String,
    pub body_text: String,
    pub published_at: PublishedAt,
    /// Always an absolute http(s) URL.
    pub permalink: String,
    pub author: Option<String>,
    pub score: Option<i64>,
    pub subreddit: Option<String>,
    /// Target of a link post (API only).
    pub external_url: Option<String>,
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch(&self, request: &SearchRequest) -> Result<Vec<NormalizedResult>, FetchError>;

    fn name(&self) -> &'static str;

    /// Maximum number of results shown per cycle for this adapter.
    fn display_cap(&self, request: &SearchRequest) -> usize;
}
