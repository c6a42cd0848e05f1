//! Output module for reporting harvest progress
//!
//! This module handles loading queue, record and checkpoint statistics from
//! the database and printing them for `--stats`.

pub mod stats;

pub use stats::{load_statistics, print_statistics, render_statistics, HarvestStatistics};
