// src/config/mod.rs
//! Settings for the watcher: TOML file, `.env`/process env overrides, credentials.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::source::api::{DEFAULT_API_BASE, DEFAULT_AUTH_URL};
use crate::source::{Credentials, SearchRequest, REDDIT_WEB_BASE};

pub const ENV_CONFIG_PATH: &str = "WATCH_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/watch.toml";

const ENV_CLIENT_ID: &str = "REDDIT_CLIENT_ID";
const ENV_CLIENT_SECRET: &str = "REDDIT_CLIENT_SECRET";
const ENV_USER_AGENT: &str = "REDDIT_USER_AGENT";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub watch: WatchSection,
    pub source: SourceSection,
    pub server: ServerSection,
    pub credentials: CredentialsSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSection {
    /// Non-empty keyword starts polling at boot.
    pub keyword: String,
    pub interval_secs: u64,
    pub strict_filter: bool,
    pub limit: usize,
    pub phrase_match: bool,
    pub progress_steps: u32,
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            keyword: String::new(),
            interval_secs: 30 * 60,
            strict_filter: false,
            limit: SearchRequest::DEFAULT_LIMIT,
            phrase_match: false,
            progress_steps: 100,
        }
    }
}

impl WatchSection {
    /// Build a request for `keyword` using these defaults.
    pub fn request(&self, keyword: &str) -> Result<SearchRequest, ConfigError> {
        Ok(SearchRequest::new(keyword, self.interval_secs)?
            .with_limit(self.limit)?
            .with_strict_filter(self.strict_filter)
            .with_phrase_match(self.phrase_match))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Feed,
    Api,
}

impl std::str::FromStr for SourceKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "feed" | "rss" => Ok(Self::Feed),
            "api" => Ok(Self::Api),
            other => Err(ConfigError::invalid(
                "source.kind",
                format!("unknown source `{other}` (expected feed|api)"),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSection {
    pub kind: SourceKind,
    pub feed_base_url: String,
    pub api_base_url: String,
    pub auth_url: String,
    /// Sent by the feed strategy. The API strategy uses the credential user agent.
    pub user_agent: String,
    pub timeout_secs: u64,
    pub display_cap: usize,
    pub body_chars: usize,
}

impl Default for SourceSection {
    fn default() -> Self {
        Self {
            kind: SourceKind::Feed,
            feed_base_url: REDDIT_WEB_BASE.to_string(),
            api_base_url: DEFAULT_API_BASE.to_string(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            user_agent: concat!("reddit-watch/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 10,
            display_cap: 10,
            body_chars: 200,
        }
    }
}

impl SourceSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsSection {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub user_agent: Option<String>,
}

impl std::fmt::Debug for CredentialsSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsSection")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl WatchConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: WatchConfig = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Resolve config with fallbacks, then apply env overrides:
    /// 1) $WATCH_CONFIG_PATH (must exist)
    /// 2) config/watch.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self, ConfigError> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(ConfigError::MissingFile(ENV_CONFIG_PATH));
            }
            Self::load_from(&pb)?
        } else {
            let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
            if default_p.exists() {
                Self::load_from(&default_p)?
            } else {
                tracing::debug!("no config file found; using defaults");
                Self::default()
            }
        };
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(kw) = std::env::var("WATCH_KEYWORD") {
            self.watch.keyword = kw;
        }
        if let Ok(v) = std::env::var("WATCH_INTERVAL_SECS") {
            self.watch.interval_secs = v
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid("WATCH_INTERVAL_SECS", format!("`{v}` is not a number")))?;
        }
        if let Ok(bind) = std::env::var("WATCH_BIND") {
            self.server.bind = bind;
        }
        if let Ok(kind) = std::env::var("WATCH_SOURCE") {
            self.source.kind = kind.parse()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watch.interval_secs == 0 {
            return Err(ConfigError::invalid("watch.interval_secs", "must be > 0"));
        }
        if self.watch.limit == 0 {
            return Err(ConfigError::invalid("watch.limit", "must be > 0"));
        }
        if self.watch.progress_steps == 0 {
            return Err(ConfigError::invalid("watch.progress_steps", "must be > 0"));
        }
        if self.source.timeout_secs == 0 {
            return Err(ConfigError::invalid("source.timeout_secs", "must be > 0"));
        }
        if self.source.display_cap == 0 {
            return Err(ConfigError::invalid("source.display_cap", "must be > 0"));
        }
        Ok(())
    }

    /// API credentials; environment wins over the `[credentials]` table. Blank counts as missing.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        fn pick(
            env: &'static str,
            field: &'static str,
            fallback: &Option<String>,
        ) -> Result<String, ConfigError> {
            std::env::var(env)
                .ok()
                .or_else(|| fallback.clone())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::MissingCredential { field, env })
        }

        Ok(Credentials {
            client_id: pick(ENV_CLIENT_ID, "client_id", &self.credentials.client_id)?,
            client_secret: pick(
                ENV_CLIENT_SECRET,
                "client_secret",
                &self.credentials.client_secret,
            )?,
            user_agent: pick(ENV_USER_AGENT, "user_agent", &self.credentials.user_agent)?,
        })
    }

    /// Request to start with at boot, if a keyword is configured.
    pub fn initial_request(&self) -> Result<Option<SearchRequest>, ConfigError> {
        if self.watch.keyword.trim().is_empty() {
            return Ok(None);
        }
        self.watch.request(&self.watch.keyword).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn clear_env() {
        for k in [
            ENV_CONFIG_PATH,
            "WATCH_KEYWORD",
            "WATCH_INTERVAL_SECS",
            "WATCH_BIND",
            "WATCH_SOURCE",
            ENV_CLIENT_ID,
            ENV_CLIENT_SECRET,
            ENV_USER_AGENT,
        ] {
            env::remove_var(k);
        }
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let cfg = WatchConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.watch.interval_secs, 1800);
        assert_eq!(cfg.watch.progress_steps, 100);
        assert_eq!(cfg.source.kind, SourceKind::Feed);
        assert_eq!(cfg.source.display_cap, 10);
        assert_eq!(cfg.source.timeout_secs, 10);
        assert!(cfg.initial_request().unwrap().is_none());
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = WatchConfig::from_toml_str("[watch]\ninterval_secs = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "watch.interval_secs", .. }));
    }

    #[test]
    fn source_kind_parses() {
        assert_eq!("API".parse::<SourceKind>().unwrap(), SourceKind::Api);
        assert_eq!("rss".parse::<SourceKind>().unwrap(), SourceKind::Feed);
        assert!("praw".parse::<SourceKind>().is_err());
    }

    #[serial_test::serial]
    #[test]
    fn credentials_env_wins_and_blank_is_missing() {
        clear_env();
        let cfg = WatchConfig::from_toml_str(
            r#"
            [credentials]
            client_id = "from-file"
            client_secret = "s3cret"
            user_agent = "  "
            "#,
        )
        .unwrap();

        let err = cfg.credentials().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingCredential { field: "user_agent", .. }
        ));

        env::set_var(ENV_USER_AGENT, "watch-test/1.0");
        env::set_var(ENV_CLIENT_ID, "from-env");
        let creds = cfg.credentials().unwrap();
        assert_eq!(creds.client_id, "from-env");
        assert_eq!(creds.client_secret, "s3cret");
        assert_eq!(creds.user_agent, "watch-test/1.0");
        clear_env();
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_path_then_overrides() {
        clear_env();
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();

        // No file anywhere: defaults.
        let cfg = WatchConfig::load_default().unwrap();
        assert!(cfg.watch.keyword.is_empty());

        // Missing explicit path is an error.
        env::set_var(ENV_CONFIG_PATH, tmp.path().join("nope.toml"));
        assert!(matches!(
            WatchConfig::load_default().unwrap_err(),
            ConfigError::MissingFile(_)
        ));

        let p = tmp.path().join("watch.toml");
        fs::write(&p, "[watch]\nkeyword = \"rust\"\ninterval_secs = 60\n").unwrap();
        env::set_var(ENV_CONFIG_PATH, &p);
        env::set_var("WATCH_INTERVAL_SECS", "120");
        let cfg = WatchConfig::load_default().unwrap();
        let req = cfg.initial_request().unwrap().unwrap();
        assert_eq!(req.keyword, "rust");
        assert_eq!(req.interval_secs, 120);

        env::set_var("WATCH_INTERVAL_SECS", "soon");
        assert!(WatchConfig::load_default().is_err());

        clear_env();
        env::set_current_dir(&old).unwrap();
    }
}
