use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use quick_xml::events::{BytesText, Event};
use quick_xml::{Reader, Writer};
use reqwest::Client;
use serde::Deserialize;

use crate::config::SourceSection;
use crate::error::{ConfigError, FetchError};
use crate::source::types::{NormalizedResult, PublishedAt, SearchRequest, SourceAdapter};
use crate::source::{
    absolute_permalink, collapse_whitespace, http_client, plain_text, truncate_chars,
    REDDIT_WEB_BASE,
};

// --- Atom (what reddit.com/search.rss actually serves) ---

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<TextNode>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    published: Option<String>,
    summary: Option<TextNode>,
    content: Option<TextNode>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href", default)]
    href: String,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TextNode {
    #[serde(rename = "$text", default)]
    text: String,
}

// --- RSS 2.0 ---

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

/// Fields pulled out of either feed flavour before normalization.
struct FeedEntry {
    title: String,
    summary: String,
    published: Option<String>,
    link: Option<String>,
}

impl From<AtomEntry> for FeedEntry {
    fn from(e: AtomEntry) -> Self {
        let link = e
            .links
            .iter()
            .find(|l| l.rel.as_deref().is_none_or(|r| r == "alternate"))
            .or_else(|| e.links.first())
            .map(|l| l.href.clone());
        let summary = e
            .summary
            .or(e.content)
            .map(|t| t.text)
            .unwrap_or_default();
        Self {
            title: e.title.map(|t| t.text).unwrap_or_default(),
            summary,
            published: e.published,
            link,
        }
    }
}

impl From<RssItem> for FeedEntry {
    fn from(it: RssItem) -> Self {
        Self {
            title: it.title.unwrap_or_default(),
            summary: it.description.unwrap_or_default(),
            published: it.pub_date,
            link: it.link,
        }
    }
}

/// Public search feed strategy. No credentials needed.
pub struct FeedAdapter {
    mode: Mode,
    base_url: String,
    display_cap: usize,
    body_chars: usize,
}

enum Mode {
    Fixture(String),
    Http { client: Client, timeout: Duration },
}

impl FeedAdapter {
    pub const DEFAULT_DISPLAY_CAP: usize = 10;
    pub const DEFAULT_BODY_CHARS: usize = 200;

    /// Serve a stored feed document instead of hitting the network.
    pub fn from_fixture(xml: &str) -> Self {
        Self {
            mode: Mode::Fixture(xml.to_string()),
            base_url: REDDIT_WEB_BASE.to_string(),
            display_cap: Self::DEFAULT_DISPLAY_CAP,
            body_chars: Self::DEFAULT_BODY_CHARS,
        }
    }

    pub fn new(base_url: &str, user_agent: &str, timeout: Duration) -> Result<Self, ConfigError> {
        Ok(Self {
            mode: Mode::Http {
                client: http_client(user_agent, timeout)?,
                timeout,
            },
            base_url: base_url.trim_end_matches('/').to_string(),
            display_cap: Self::DEFAULT_DISPLAY_CAP,
            body_chars: Self::DEFAULT_BODY_CHARS,
        })
    }

    pub fn from_config(cfg: &SourceSection) -> Result<Self, ConfigError> {
        Ok(Self::new(&cfg.feed_base_url, &cfg.user_agent, cfg.timeout())?
            .with_display_cap(cfg.display_cap)
            .with_body_chars(cfg.body_chars))
    }

    pub fn with_display_cap(mut self, cap: usize) -> Self {
        self.display_cap = cap;
        self
    }

    pub fn with_body_chars(mut self, n: usize) -> Self {
        self.body_chars = n;
        self
    }

    /// `{base}/search.rss?q=<encoded>&sort=new`
    pub fn search_url(&self, request: &SearchRequest) -> String {
        format!(
            "{}/search.rss?q={}&sort={}",
            self.base_url,
            request.encoded_query(),
            request.sort.as_str()
        )
    }

    /// Parse an Atom or RSS 2.0 document. Anything that is not a feed counts as "no matches".
    pub fn parse_feed(&self, xml: &str) -> Result<Vec<NormalizedResult>, FetchError> {
        let t0 = Instant::now();

        let entries: Vec<FeedEntry> = match root_element(xml)?.as_deref() {
            Some("feed") => {
                let xml = flatten_text_elements(xml)?;
                let feed: AtomFeed =
                    from_str(&xml).map_err(|e| FetchError::parse("atom feed", e))?;
                feed.entries.into_iter().map(FeedEntry::from).collect()
            }
            Some("rss") => {
                let xml = flatten_text_elements(xml)?;
                let rss: Rss = from_str(&xml).map_err(|e| FetchError::parse("rss feed", e))?;
                rss.channel.items.into_iter().map(FeedEntry::from).collect()
            }
            Some(other) => {
                tracing::warn!(root = other, "response is not a feed; treating as empty");
                Vec::new()
            }
            None => Vec::new(),
        };

        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(permalink) = entry
                .link
                .as_deref()
                .and_then(|l| absolute_permalink(l, &self.base_url))
            else {
                tracing::debug!(title = %entry.title, "feed entry without usable link skipped");
                continue;
            };
            out.push(NormalizedResult {
                title: collapse_whitespace(&entry.title),
                body_text: truncate_chars(&plain_text(&entry.summary), self.body_chars),
                published_at: entry
                    .published
                    .as_deref()
                    .map(PublishedAt::parse)
                    .unwrap_or(PublishedAt::Unknown),
                permalink,
                author: None,
                score: None,
                subreddit: None,
                external_url: None,
            });
        }

        histogram!("watch_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(out)
    }
}

#[async_trait]
impl SourceAdapter for FeedAdapter {
    async fn fetch(&self, request: &SearchRequest) -> Result<Vec<NormalizedResult>, FetchError> {
        match &self.mode {
            Mode::Fixture(xml) => self.parse_feed(xml),
            Mode::Http { client, timeout } => {
                let url = self.search_url(request);
                tracing::debug!(%url, "fetching search feed");
                let resp = client
                    .get(&url)
                    .send()
                    .await
                    .map_err(|e| FetchError::from_reqwest(e, *timeout))?;
                let status = resp.status();
                if !status.is_success() {
                    counter!("watch_http_status_errors_total").increment(1);
                    return Err(FetchError::Status {
                        status: status.as_u16(),
                        url,
                    });
                }
                let body = resp
                    .text()
                    .await
                    .map_err(|e| FetchError::from_reqwest(e, *timeout))?;
                self.parse_feed(&body)
            }
        }
    }

    fn name(&self) -> &'static str {
        "feed"
    }

    fn display_cap(&self, _request: &SearchRequest) -> usize {
        self.display_cap
    }
}

/// Elements whose content is read as text. Markup nested inside them (an xhtml `<div>`,
/// a stray `<b>` in a description) is dropped and its text kept.
const TEXT_ELEMENTS: [&[u8]; 4] = [b"title", b"summary", b"content", b"description"];

/// Rewrite `xml` so text elements hold only text and CDATA.
fn flatten_text_elements(xml: &str) -> Result<String, FetchError> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    // Open elements below the current text element; 0 while outside one.
    let mut depth = 0usize;
    let mut inside = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| FetchError::parse("feed", e))?;
        let keep = match &event {
            Event::Eof => break,
            Event::Start(e) if !inside => {
                inside = TEXT_ELEMENTS.contains(&e.local_name().as_ref());
                true
            }
            Event::End(_) if inside && depth == 0 => {
                inside = false;
                true
            }
            Event::Start(_) if inside => {
                depth += 1;
                false
            }
            Event::End(_) if inside => {
                depth -= 1;
                false
            }
            Event::Empty(_) if inside => false,
            Event::Comment(_) | Event::PI(_) if inside => false,
            _ => true,
        };
        let written = if keep {
            writer.write_event(event)
        } else {
            writer.write_event(Event::Text(BytesText::new(" ")))
        };
        written.map_err(|e| FetchError::parse("feed", e))?;
    }

    String::from_utf8(writer.into_inner()).map_err(|e| FetchError::parse("feed", e))
}

/// Local name of the first element, lowercased. `None` for an empty document.
fn root_element(xml: &str) -> Result<Option<String>, FetchError> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let name = e.local_name();
                return Ok(Some(
                    String::from_utf8_lossy(name.as_ref()).to_ascii_lowercase(),
                ));
            }
            Ok(Event::Eof) => return Ok(None),
            Ok(_) => continue,
            Err(e) => return Err(FetchError::parse("feed", e)),
        }
    }
}
