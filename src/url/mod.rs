//! URL handling module
//!
//! This module provides canonical URL normalization for record fingerprints
//! and rendering of per-unit URLs from origin templates.

mod normalize;
mod template;

pub use normalize::normalize_url;
pub use template::{has_page_placeholder, render_unit_url, validate_template};
