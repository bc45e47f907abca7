//! Configuration loading
//!
//! Loads `voron-serials.toml`. Resolution order:
//! 1. explicit path (`--config`)
//! 2. `VORON_SERIALS_CONFIG` environment variable
//! 3. `./voron-serials.toml`
//! 4. `~/.config/voron-serials/config.toml`
//!
//! Only an explicitly named file has to exist; otherwise defaults apply.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::store::CacheStore;

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Root configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SerialsConfig {
    /// Subreddit holding the sidebar registry and the request queue.
    #[serde(default = "default_subreddit")]
    pub subreddit: String,

    /// Account that posts the "Congrats on ..." comments.
    #[serde(default = "default_bot_username")]
    pub bot_username: String,

    /// User agent template; `{username}` is replaced with `--username`.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub predict: PredictConfig,
}

fn default_subreddit() -> String {
    crate::DEFAULT_SUBREDDIT.to_string()
}

fn default_bot_username() -> String {
    "VoronSerialBot".to_string()
}

fn default_user_agent() -> String {
    "rust:voronserials:1.0 (by u/{username})".to_string()
}

/// Cache file locations.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    #[serde(default = "default_registry_path")]
    pub registry: PathBuf,

    #[serde(default = "default_comments_path")]
    pub comments: PathBuf,
}

fn default_registry_path() -> PathBuf {
    PathBuf::from(crate::DEFAULT_REGISTRY_FILENAME)
}

fn default_comments_path() -> PathBuf {
    PathBuf::from(crate::DEFAULT_COMMENTS_FILENAME)
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            registry: default_registry_path(),
            comments: default_comments_path(),
        }
    }
}

/// Request pacing and page retry policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FetchConfig {
    /// Pause after each submission lookup and between comment pages.
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,

    /// Extra attempts for a page that failed with a transient error.
    #[serde(default = "default_max_page_retries")]
    pub max_page_retries: u32,

    /// Wait before retrying a failed page, unless the server asks for longer.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_throttle_ms() -> u64 {
    1000
}

fn default_max_page_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    5000
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            throttle_ms: default_throttle_ms(),
            max_page_retries: default_max_page_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl FetchConfig {
    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// No pauses at all; used by tests.
    pub fn unthrottled() -> Self {
        Self {
            throttle_ms: 0,
            max_page_retries: default_max_page_retries(),
            retry_delay_ms: 0,
        }
    }
}

/// Predictor inputs that have to be curated by hand.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PredictConfig {
    /// Lineage whose numbering is predicted.
    #[serde(default = "default_lineage")]
    pub lineage: String,

    /// Flair text that marks a serial request post.
    #[serde(default = "default_request_flair")]
    pub request_flair: String,

    /// Request post ids expected to be rejected by the moderators.
    #[serde(default)]
    pub rejects: BTreeSet<String>,

    /// Requests created up to this time (epoch seconds) have been reviewed
    /// for rejects; later ones are flagged as unchecked.
    #[serde(default = "default_rejects_checked_through")]
    pub rejects_checked_through: f64,
}

fn default_lineage() -> String {
    "V2".to_string()
}

fn default_request_flair() -> String {
    "Serial Request:snoo_scream:".to_string()
}

fn default_rejects_checked_through() -> f64 {
    1631821827.0
}

impl Default for PredictConfig {
    fn default() -> Self {
        Self {
            lineage: default_lineage(),
            request_flair: default_request_flair(),
            rejects: BTreeSet::new(),
            rejects_checked_through: default_rejects_checked_through(),
        }
    }
}

impl Default for SerialsConfig {
    fn default() -> Self {
        Self {
            subreddit: default_subreddit(),
            bot_username: default_bot_username(),
            user_agent: default_user_agent(),
            cache: CacheConfig::default(),
            fetch: FetchConfig::default(),
            predict: PredictConfig::default(),
        }
    }
}

impl SerialsConfig {
    /// Environment variable for config path override
    pub const ENV_CONFIG_PATH: &'static str = "VORON_SERIALS_CONFIG";

    /// Default config filename in the working directory
    pub const DEFAULT_CONFIG_FILENAME: &'static str = "voron-serials.toml";

    /// Load configuration, using `explicit` when given.
    ///
    /// A file named explicitly (argument or environment) must exist; the
    /// implicit locations fall back to defaults when absent.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_path(path);
        }
        if let Ok(path) = std::env::var(Self::ENV_CONFIG_PATH) {
            return Self::load_from_path(Path::new(&path));
        }
        match Self::find_config_file() {
            Some(path) => Self::load_from_path(&path),
            None => {
                tracing::debug!("no voron-serials config found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded config");
        Self::parse(&contents)
    }

    /// Parse configuration from a TOML string
    pub fn parse(contents: &str) -> Result<Self> {
        let cfg: SerialsConfig = toml::from_str(contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn find_config_file() -> Option<PathBuf> {
        let cwd_config = PathBuf::from(Self::DEFAULT_CONFIG_FILENAME);
        if cwd_config.exists() {
            return Some(cwd_config);
        }
        dirs::home_dir()
            .map(|home| Self::user_config_path(&home))
            .filter(|path| path.exists())
    }

    /// `~/.config/voron-serials/config.toml`, on every platform.
    fn user_config_path(home: &Path) -> PathBuf {
        home.join(".config").join("voron-serials").join("config.toml")
    }

    fn validate(&self) -> Result<()> {
        if self.subreddit.trim().is_empty() {
            return Err(ConfigError::Validation("subreddit must not be empty".into()));
        }
        if self.bot_username.trim().is_empty() {
            return Err(ConfigError::Validation(
                "bot_username must not be empty".into(),
            ));
        }
        let lineage = &self.predict.lineage;
        if lineage.is_empty() || lineage.contains('.') {
            return Err(ConfigError::Validation(format!(
                "predict.lineage must be a bare prefix like \"V2\", got {lineage:?}"
            )));
        }
        if !self.predict.rejects_checked_through.is_finite() {
            return Err(ConfigError::Validation(
                "predict.rejects_checked_through must be a finite timestamp".into(),
            ));
        }
        Ok(())
    }

    /// User agent with `{username}` filled in.
    pub fn user_agent_for(&self, username: &str) -> String {
        self.user_agent.replace("{username}", username)
    }

    pub fn cache_store(&self) -> CacheStore {
        CacheStore::new(&self.cache.registry, &self.cache.comments)
    }
}
