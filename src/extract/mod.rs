//! Record extraction
//!
//! An `Extractor` turns one fetched page into zero or more `Record`s. Each
//! origin label maps to exactly one extractor through the `ExtractorRegistry`.

mod record;
mod selector;

pub use record::{content_fingerprint, Record, FINGERPRINT_BODY_CHARS};
pub use selector::SelectorExtractor;

use crate::config::Config;
use crate::crawler::Document;
use crate::storage::UnitKey;
use crate::{ConfigError, HarvestError};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while extracting records from a page
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    #[error("Invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Page matched {matched} record elements but none had a title or body")]
    NoUsableRecords { matched: usize },
}

/// The work unit a page belongs to
#[derive(Debug, Clone)]
pub struct UnitContext {
    pub key: UnitKey,
    pub kind: String,
    /// 1-based page number within the unit
    pub page: u32,
}

impl UnitContext {
    pub fn new(key: UnitKey, kind: impl Into<String>) -> Self {
        Self {
            key,
            kind: kind.into(),
            page: 1,
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }
}

/// Site-specific record extraction
pub trait Extractor: Send + Sync {
    /// Extracts records from one page of a unit
    ///
    /// An empty vector means the page had no records (end of pagination).
    fn extract(&self, document: &Document, ctx: &UnitContext) -> Result<Vec<Record>, ParseError>;
}

/// An origin's extractor together with how its records are labelled
#[derive(Clone)]
pub struct OriginExtractor {
    pub kind: String,
    pub url_template: String,
    pub extractor: Arc<dyn Extractor>,
}

/// Maps origin labels to extractors
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    origins: HashMap<String, OriginExtractor>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a selector extractor for every configured origin
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        for origin in &config.origins {
            let extractor = SelectorExtractor::from_origin(origin)
                .map_err(|e| ConfigError::InvalidSelector(e.to_string()))?;
            registry.register(
                &origin.name,
                &origin.kind,
                &origin.url_template,
                Arc::new(extractor),
            );
        }
        Ok(registry)
    }

    /// Registers or replaces the extractor for an origin
    pub fn register(
        &mut self,
        origin: &str,
        kind: &str,
        url_template: &str,
        extractor: Arc<dyn Extractor>,
    ) {
        self.origins.insert(
            origin.to_string(),
            OriginExtractor {
                kind: kind.to_string(),
                url_template: url_template.to_string(),
                extractor,
            },
        );
    }

    /// Looks up the extractor for an origin label
    pub fn get(&self, origin: &str) -> Result<&OriginExtractor, HarvestError> {
        self.origins
            .get(origin)
            .ok_or_else(|| HarvestError::UnknownOrigin(origin.to_string()))
    }

    pub fn len(&self) -> usize {
        self.origins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }
}
