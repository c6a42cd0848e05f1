//! Configuration module for the harvester
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use review_harvester::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvester.toml")).unwrap();
//! println!("Hourly ceiling: {}", config.harvester.requests_per_hour);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    BanConfig, CatalogEntry, Config, FetcherConfig, HarvesterConfig, OriginConfig, OutputConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
