use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::counter;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use tokio::sync::Mutex;

use crate::config::SourceSection;
use crate::error::{ConfigError, FetchError};
use crate::source::types::{NormalizedResult, PublishedAt, SearchRequest, SourceAdapter};
use crate::source::{absolute_permalink, http_client, truncate_chars, REDDIT_WEB_BASE};

pub const DEFAULT_API_BASE: &str = "https://oauth.reddit.com";
pub const DEFAULT_AUTH_URL: &str = "https://www.reddit.com/api/v1/access_token";

/// Reddit caps search listings at 100.
const MAX_BACKEND_LIMIT: usize = 100;
/// Refresh the bearer token this long before it expires.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Opaque app credentials. Supplied by configuration, never embedded.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Thing>,
}

#[derive(Debug, Deserialize)]
struct Thing {
    #[serde(default)]
    data: Post,
}

/// One search hit. Every field is optional: a field of the wrong type reads as absent
/// instead of failing the whole listing.
#[derive(Debug, Default, Deserialize)]
struct Post {
    #[serde(default, deserialize_with = "lenient")]
    title: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    selftext: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    permalink: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    subreddit: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    author: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    score: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    created_utc: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    url: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    is_self: Option<bool>,
}

fn lenient<'de, D, T>(de: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<serde_json::Value>::deserialize(de)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Authenticated search strategy (OAuth2 client credentials).
pub struct ApiAdapter {
    mode: Mode,
    api_base_url: String,
    body_chars: usize,
}

enum Mode {
    Fixture(String),
    Http {
        client: Client,
        credentials: Credentials,
        auth_url: String,
        timeout: Duration,
        token: Mutex<Option<CachedToken>>,
    },
}

impl ApiAdapter {
    pub const DEFAULT_BODY_CHARS: usize = 200;

    /// Serve a stored search listing (JSON) instead of hitting the network.
    pub fn from_fixture(json: &str) -> Self {
        Self {
            mode: Mode::Fixture(json.to_string()),
            api_base_url: DEFAULT_API_BASE.to_string(),
            body_chars: Self::DEFAULT_BODY_CHARS,
        }
    }

    pub fn new(
        credentials: Credentials,
        api_base_url: &str,
        auth_url: &str,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let client = http_client(&credentials.user_agent, timeout)?;
        Ok(Self {
            mode: Mode::Http {
                client,
                credentials,
                auth_url: auth_url.to_string(),
                timeout,
                token: Mutex::new(None),
            },
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            body_chars: Self::DEFAULT_BODY_CHARS,
        })
    }

    pub fn from_config(cfg: &SourceSection, credentials: Credentials) -> Result<Self, ConfigError> {
        Ok(
            Self::new(credentials, &cfg.api_base_url, &cfg.auth_url, cfg.timeout())?
                .with_body_chars(cfg.body_chars),
        )
    }

    pub fn with_body_chars(mut self, n: usize) -> Self {
        self.body_chars = n;
        self
    }

    /// Global search (`r/all`), newest first, backend limit clamped to 1..=100.
    pub fn search_url(&self, request: &SearchRequest) -> String {
        format!(
            "{}/r/all/search?q={}&sort={}&limit={}&raw_json=1",
            self.api_base_url,
            request.encoded_query(),
            request.sort.as_str(),
            request.limit.clamp(1, MAX_BACKEND_LIMIT)
        )
    }

    pub fn parse_listing(&self, json: &str) -> Result<Vec<NormalizedResult>, FetchError> {
        let listing: Listing =
            serde_json::from_str(json).map_err(|e| FetchError::parse("search listing", e))?;

        let mut out = Vec::with_capacity(listing.data.children.len());
        for Thing { data: post } in listing.data.children {
            let title = post.title.unwrap_or_default();
            let Some(permalink) = post
                .permalink
                .as_deref()
                .and_then(|p| absolute_permalink(p, REDDIT_WEB_BASE))
            else {
                tracing::debug!(%title, "post without usable permalink skipped");
                continue;
            };
            let (body_text, external_url) = if post.is_self.unwrap_or(false) {
                let selftext = post.selftext.unwrap_or_default();
                (truncate_chars(&selftext, self.body_chars), None)
            } else {
                (String::new(), post.url)
            };
            out.push(NormalizedResult {
                title,
                body_text,
                published_at: post
                    .created_utc
                    .map(|secs| PublishedAt::from_unix(secs as i64))
                    .unwrap_or(PublishedAt::Unknown),
                permalink,
                author: post.author,
                score: post.score,
                subreddit: post.subreddit,
                external_url,
            });
        }
        Ok(out)
    }
}

async fn bearer_token(
    client: &Client,
    credentials: &Credentials,
    auth_url: &str,
    timeout: Duration,
    cache: &Mutex<Option<CachedToken>>,
) -> Result<String, FetchError> {
    let mut guard = cache.lock().await;
    if let Some(tok) = guard.as_ref() {
        if Instant::now() + TOKEN_REFRESH_MARGIN < tok.expires_at {
            return Ok(tok.value.clone());
        }
    }

    tracing::debug!("requesting reddit access token");
    let resp = client
        .post(auth_url)
        .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
        .form(&[("grant_type", "client_credentials")])
        .send()
        .await
        .map_err(|e| FetchError::from_reqwest(e, timeout))?;

    let status = resp.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(FetchError::Auth(format!("token endpoint returned {status}")));
    }
    if !status.is_success() {
        return Err(FetchError::Status {
            status: status.as_u16(),
            url: auth_url.to_string(),
        });
    }
    let body: TokenResponse = resp
        .json()
        .await
        .map_err(|e| FetchError::parse("token response", e))?;

    let value = body.access_token;
    *guard = Some(CachedToken {
        value: value.clone(),
        expires_at: Instant::now() + Duration::from_secs(body.expires_in),
    });
    Ok(value)
}

#[async_trait]
impl SourceAdapter for ApiAdapter {
    async fn fetch(&self, request: &SearchRequest) -> Result<Vec<NormalizedResult>, FetchError> {
        match &self.mode {
            Mode::Fixture(json) => self.parse_listing(json),
            Mode::Http {
                client,
                credentials,
                auth_url,
                timeout,
                token,
            } => {
                let bearer = bearer_token(client, credentials, auth_url, *timeout, token).await?;
                let url = self.search_url(request);
                tracing::debug!(%url, "searching reddit api");
                let resp = client
                    .get(&url)
                    .bearer_auth(&bearer)
                    .send()
                    .await
                    .map_err(|e| FetchError::from_reqwest(e, *timeout))?;

                let status = resp.status();
                if status == StatusCode::UNAUTHORIZED {
                    // Token revoked or expired early; the next cycle re-authenticates.
                    token.lock().await.take();
                    return Err(FetchError::Auth("search rejected bearer token".into()));
                }
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
                self.parse_listing(&body)
            }
        }
    }

    fn name(&self) -> &'static str {
        "api"
    }

    fn display_cap(&self, request: &SearchRequest) -> usize {
        request.limit.clamp(1, MAX_BACKEND_LIMIT)
    }
}
