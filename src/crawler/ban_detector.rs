//! Blocking detection with escalating recovery delays
//!
//! Every fetch outcome is classified as a block indicator, a clean success or
//! neutral. Consecutive indicators drive the shared `BanState`.

use crate::config::BanConfig;
use crate::crawler::fetcher::{Document, NetworkError, NetworkErrorKind};
use crate::state::{BanState, BLOCK_THRESHOLD};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// How one fetch outcome affects the ban state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Blocked status or blocking phrase in the body
    Indicator,
    /// Successful fetch with no blocking phrase
    Clean,
    /// Timeout, refused connection or an unrelated error status
    Neutral,
}

/// Statuses and phrases that indicate blocking
#[derive(Debug, Clone)]
pub struct BlockRules {
    statuses: Vec<u16>,
    phrases: Vec<String>,
}

impl BlockRules {
    pub fn from_config(config: &BanConfig) -> Self {
        Self {
            statuses: config.blocked_statuses.clone(),
            phrases: config
                .blocked_phrases
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
        }
    }

    /// Returns the first configured phrase contained in `body`
    pub fn matching_phrase(&self, body: &str) -> Option<&str> {
        let body = body.to_lowercase();
        self.phrases
            .iter()
            .find(|phrase| body.contains(phrase.as_str()))
            .map(String::as_str)
    }

    pub fn classify(&self, outcome: &Result<Document, NetworkError>) -> Signal {
        match outcome {
            Ok(document) => {
                if self.statuses.contains(&document.status)
                    || self.matching_phrase(&document.body).is_some()
                {
                    Signal::Indicator
                } else {
                    Signal::Clean
                }
            }
            Err(error) => match error.kind {
                NetworkErrorKind::HttpStatus(status) if self.statuses.contains(&status) => {
                    Signal::Indicator
                }
                _ => Signal::Neutral,
            },
        }
    }
}

impl Default for BlockRules {
    fn default() -> Self {
        Self::from_config(&BanConfig::default())
    }
}

#[derive(Debug, Default)]
struct Counters {
    consecutive_failures: u32,
    last_failure: Option<Instant>,
}

/// Shared blocking detector
#[derive(Debug)]
pub struct BanDetector {
    rules: BlockRules,
    counters: Mutex<Counters>,
}

impl BanDetector {
    pub fn new(rules: BlockRules) -> Self {
        Self {
            rules,
            counters: Mutex::new(Counters::default()),
        }
    }

    pub fn rules(&self) -> &BlockRules {
        &self.rules
    }

    fn counters(&self) -> std::sync::MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Classifies a fetch outcome and updates the counter
    pub fn observe(&self, outcome: &Result<Document, NetworkError>) -> Signal {
        let signal = self.rules.classify(outcome);
        match signal {
            Signal::Indicator => self.record_indicator(),
            Signal::Clean => self.record_success(),
            Signal::Neutral => {}
        }
        signal
    }

    /// Counts one block indicator
    pub fn record_indicator(&self) {
        let mut counters = self.counters();
        counters.consecutive_failures = counters.consecutive_failures.saturating_add(1);
        counters.last_failure = Some(Instant::now());

        let count = counters.consecutive_failures;
        if count == BLOCK_THRESHOLD {
            warn!(
                "Blocking suspected after {} consecutive indicators; pausing for {:?}",
                count,
                BanState::recovery_delay(count)
            );
        } else {
            warn!("Block indicator #{}", count);
        }
    }

    /// Resets the counter after a clean success
    pub fn record_success(&self) {
        let mut counters = self.counters();
        if counters.consecutive_failures >= BLOCK_THRESHOLD {
            info!("Clean response received; block state cleared");
        }
        counters.consecutive_failures = 0;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.counters().consecutive_failures
    }

    pub fn last_failure(&self) -> Option<Instant> {
        self.counters().last_failure
    }

    pub fn state(&self) -> BanState {
        BanState::from_failures(self.consecutive_failures())
    }

    pub fn is_likely_blocked(&self) -> bool {
        self.state().is_blocked()
    }

    /// Pause required before the next fetch at the current failure count
    pub fn recovery_delay(&self) -> Duration {
        BanState::recovery_delay(self.consecutive_failures())
    }
}

impl Default for BanDetector {
    fn default() -> Self {
        Self::new(BlockRules::default())
    }
}
