use crate::error::ConfigError;
use crate::planner::generate_date_range;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use url::Url;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Remote site + WebDriver session
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    #[serde(default = "default_true")]
    pub headless: bool,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// How long a calendar page gets to render its ride panels.
    #[serde(default = "default_content_wait_secs")]
    pub content_wait_secs: u64,

    #[serde(default = "default_consent_wait_secs")]
    pub consent_wait_secs: u64,

    #[serde(default = "default_login_wait_secs")]
    pub login_wait_secs: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

/// Inclusive millisecond range for one pacing step.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }
}

/// Human-cadence delays between browser actions
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PacingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_keystroke")]
    pub keystroke: DelayRange,
    #[serde(default = "default_between_fields")]
    pub between_fields: DelayRange,
    #[serde(default = "default_before_submit")]
    pub before_submit: DelayRange,
    #[serde(default = "default_after_login")]
    pub after_login: DelayRange,
    #[serde(default = "default_after_consent")]
    pub after_consent: DelayRange,
    #[serde(default = "default_after_navigation")]
    pub after_navigation: DelayRange,
}

/// What to ingest
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct IngestConfig {
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
    #[serde(default)]
    pub park_ids: Vec<String>,
    #[serde(default)]
    pub exclude_months: Vec<u32>,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// Site login. Never printed.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_base_url() -> String {
    "https://queue-times.com".to_string()
}
fn default_webdriver_url() -> String {
    "http://localhost:9515".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_content_wait_secs() -> u64 {
    5
}
fn default_consent_wait_secs() -> u64 {
    5
}
fn default_login_wait_secs() -> u64 {
    60
}
fn default_poll_interval_ms() -> u64 {
    250
}
fn default_max_retries() -> usize {
    3
}
fn default_keystroke() -> DelayRange {
    DelayRange::new(100, 300)
}
fn default_between_fields() -> DelayRange {
    DelayRange::new(500, 1000)
}
fn default_before_submit() -> DelayRange {
    DelayRange::new(1000, 2000)
}
fn default_after_login() -> DelayRange {
    DelayRange::new(2000, 3000)
}
fn default_after_consent() -> DelayRange {
    DelayRange::new(500, 1000)
}
fn default_after_navigation() -> DelayRange {
    DelayRange::new(2000, 4000)
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/queue_data.duckdb")
}
fn default_true() -> bool {
    true
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            webdriver_url: default_webdriver_url(),
            headless: true,
            timeout_secs: default_timeout_secs(),
            content_wait_secs: default_content_wait_secs(),
            consent_wait_secs: default_consent_wait_secs(),
            login_wait_secs: default_login_wait_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            max_retries: default_max_retries(),
        }
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            keystroke: default_keystroke(),
            between_fields: default_between_fields(),
            before_submit: default_before_submit(),
            after_login: default_after_login(),
            after_consent: default_after_consent(),
            after_navigation: default_after_navigation(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            run_migrations: true,
        }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::Environment::with_prefix("QT")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("ingest.park_ids")
                    .with_list_parse_key("ingest.exclude_months")
                    .try_parsing(true),
            )
            .build()?;

        Ok(cfg.try_deserialize()?)
    }

    /// Checks everything a run needs before any network activity.
    /// Returns the candidate dates so callers don't parse the window twice.
    pub fn validate(&self) -> Result<Vec<NaiveDate>, ConfigError> {
        if self.ingest.start_date.trim().is_empty() {
            return Err(ConfigError::Missing("ingest.start_date"));
        }
        if self.ingest.end_date.trim().is_empty() {
            return Err(ConfigError::Missing("ingest.end_date"));
        }
        if self.ingest.park_ids.iter().all(|p| p.trim().is_empty()) {
            return Err(ConfigError::Missing("ingest.park_ids"));
        }
        self.site_url()?;

        generate_date_range(
            &self.ingest.start_date,
            &self.ingest.end_date,
            &self.ingest.exclude_months,
        )
    }

    pub fn site_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.scraper.base_url)
            .ok()
            .filter(|u| u.host_str().is_some())
            .ok_or_else(|| ConfigError::InvalidUrl(self.scraper.base_url.clone()))
    }
}

impl Credentials {
    /// `QT_USERNAME` / `QT_PASSWORD`, after `.env` has been loaded.
    pub fn from_env() -> Result<Self, ConfigError> {
        let read = |key: &'static str| {
            std::env::var(key)
                .ok()
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(key))
        };
        Ok(Self {
            username: read("QT_USERNAME")?,
            password: read("QT_PASSWORD")?,
        })
    }
}
