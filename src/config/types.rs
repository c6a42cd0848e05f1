use crate::storage::{CatalogItem, UnitKey};
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for the harvester
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub harvester: HarvesterConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub ban: BanConfig,
    pub output: OutputConfig,
    #[serde(default, rename = "origin")]
    pub origins: Vec<OriginConfig>,
    #[serde(default)]
    pub catalog: Vec<CatalogEntry>,
}

impl Config {
    /// Looks up an origin by its label
    pub fn origin(&self, name: &str) -> Option<&OriginConfig> {
        self.origins.iter().find(|origin| origin.name == name)
    }

    /// Expands the catalog into one work unit per (group, subject, origin)
    pub fn catalog_items(&self) -> Vec<CatalogItem> {
        let mut items = Vec::new();
        for entry in &self.catalog {
            for subject in &entry.subjects {
                for origin in &self.origins {
                    items.push(CatalogItem {
                        key: UnitKey::new(&origin.name, &entry.group, subject),
                        priority: entry.priority.unwrap_or(origin.priority),
                        total_pages_estimate: 0,
                    });
                }
            }
        }
        items
    }
}

/// Scheduler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HarvesterConfig {
    /// Number of concurrent workers
    #[serde(rename = "worker-count")]
    pub worker_count: usize,

    /// Lower bound of the politeness delay between fetches
    #[serde(rename = "min-delay-seconds")]
    pub min_delay_seconds: f64,

    /// Upper bound of the politeness delay between fetches
    #[serde(rename = "max-delay-seconds")]
    pub max_delay_seconds: f64,

    /// Global ceiling on outbound requests in any trailing hour
    #[serde(rename = "requests-per-hour")]
    pub requests_per_hour: usize,

    /// Number of fetch results buffered before a flush
    #[serde(rename = "batch-size")]
    pub batch_size: usize,

    /// Completed units between checkpoints
    #[serde(rename = "checkpoint-interval-units")]
    pub checkpoint_interval_units: u64,

    /// Delay multiplier applied during night hours
    #[serde(rename = "night-mode-multiplier", default = "default_night_multiplier")]
    pub night_mode_multiplier: f64,

    /// Local hour at which night mode starts (inclusive)
    #[serde(rename = "night-hours-start", default = "default_night_start")]
    pub night_hours_start: u32,

    /// Local hour at which night mode ends (exclusive)
    #[serde(rename = "night-hours-end", default = "default_night_end")]
    pub night_hours_end: u32,

    /// Upper bound on pages walked for one unit
    #[serde(rename = "max-pages-per-unit", default = "default_max_pages")]
    pub max_pages_per_unit: u32,

    /// Pause after a failed claim before retrying
    #[serde(rename = "claim-backoff-seconds", default = "default_claim_backoff")]
    pub claim_backoff_seconds: f64,

    /// Flush attempts before a batch is dropped
    #[serde(rename = "flush-retry-attempts", default = "default_flush_attempts")]
    pub flush_retry_attempts: u32,

    /// Base of the linear back-off between flush attempts
    #[serde(rename = "flush-backoff-seconds", default = "default_flush_backoff")]
    pub flush_backoff_seconds: f64,
}

impl HarvesterConfig {
    pub fn claim_backoff(&self) -> Duration {
        Duration::from_secs_f64(self.claim_backoff_seconds)
    }

    pub fn flush_backoff(&self) -> Duration {
        Duration::from_secs_f64(self.flush_backoff_seconds)
    }
}

fn default_night_multiplier() -> f64 {
    1.5
}

fn default_night_start() -> u32 {
    23
}

fn default_night_end() -> u32 {
    7
}

fn default_max_pages() -> u32 {
    50
}

fn default_claim_backoff() -> f64 {
    5.0
}

fn default_flush_attempts() -> u32 {
    3
}

fn default_flush_backoff() -> f64 {
    2.0
}

/// HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// Client default, sent when `user-agents` is empty
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    /// Pool of agents; each request picks one at random
    #[serde(rename = "user-agents")]
    pub user_agents: Vec<String>,

    #[serde(rename = "timeout-seconds")]
    pub timeout_seconds: u64,

    /// Attempts per fetch, including the first
    #[serde(rename = "retry-attempts")]
    pub retry_attempts: u32,

    #[serde(rename = "retry-delay-seconds")]
    pub retry_delay_seconds: f64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: format!(
                "Mozilla/5.0 (compatible; review-harvester/{})",
                env!("CARGO_PKG_VERSION")
            ),
            user_agents: Vec::new(),
            timeout_seconds: 30,
            retry_attempts: 3,
            retry_delay_seconds: 2.0,
        }
    }
}

/// Blocking-indicator rules
#[derive(Debug, Clone, Deserialize)]
pub struct BanConfig {
    /// HTTP statuses treated as a block indicator
    #[serde(rename = "blocked-statuses")]
    pub blocked_statuses: Vec<u16>,

    /// Case-insensitive body phrases treated as a block indicator
    #[serde(rename = "blocked-phrases")]
    pub blocked_phrases: Vec<String>,
}

impl Default for BanConfig {
    fn default() -> Self {
        Self {
            blocked_statuses: vec![403, 429, 503],
            blocked_phrases: [
                "captcha",
                "robot",
                "blocked",
                "access denied",
                "rate limit",
                "too many requests",
                "temporarily unavailable",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// One content source and the selectors used to extract its records
#[derive(Debug, Clone, Deserialize)]
pub struct OriginConfig {
    /// Origin label, e.g. "drom.ru"
    pub name: String,

    /// URL template with `{group}`, `{subject}` and optional `{page}`
    #[serde(rename = "url-template")]
    pub url_template: String,

    #[serde(default = "default_priority")]
    pub priority: i64,

    /// Record kind stored with every record of this origin
    #[serde(default = "default_kind")]
    pub kind: String,

    #[serde(rename = "record-selector")]
    pub record_selector: String,

    #[serde(rename = "title-selector")]
    pub title_selector: String,

    #[serde(rename = "body-selector")]
    pub body_selector: String,

    #[serde(rename = "author-selector", default)]
    pub author_selector: Option<String>,

    #[serde(rename = "link-selector", default)]
    pub link_selector: Option<String>,

    #[serde(rename = "rating-selector", default)]
    pub rating_selector: Option<String>,

    #[serde(rename = "year-selector", default)]
    pub year_selector: Option<String>,

    #[serde(rename = "mileage-selector", default)]
    pub mileage_selector: Option<String>,

    #[serde(rename = "pros-selector", default)]
    pub pros_selector: Option<String>,

    #[serde(rename = "cons-selector", default)]
    pub cons_selector: Option<String>,
}

impl OriginConfig {
    /// Every configured selector, paired with its config key
    pub fn selectors(&self) -> Vec<(&'static str, &str)> {
        let mut selectors = vec![
            ("record-selector", self.record_selector.as_str()),
            ("title-selector", self.title_selector.as_str()),
            ("body-selector", self.body_selector.as_str()),
        ];
        let optional = [
            ("author-selector", &self.author_selector),
            ("link-selector", &self.link_selector),
            ("rating-selector", &self.rating_selector),
            ("year-selector", &self.year_selector),
            ("mileage-selector", &self.mileage_selector),
            ("pros-selector", &self.pros_selector),
            ("cons-selector", &self.cons_selector),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                selectors.push((name, value.as_str()));
            }
        }
        selectors
    }
}

fn default_priority() -> i64 {
    1
}

fn default_kind() -> String {
    "review".to_string()
}

/// A group and the subjects crawled under it on every origin
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    pub group: String,
    pub subjects: Vec<String>,

    /// Overrides the origin priority for this group's units
    #[serde(default)]
    pub priority: Option<i64>,
}
