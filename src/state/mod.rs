//! State module for tracking harvest progress
//!
//! # Components
//!
//! - `UnitState`: Tracks the lifecycle of a work unit (pending, processing, completed)
//! - `BanState`: Classifies crawl health from consecutive block indicators

mod ban_state;
mod unit_state;

// Re-export main types
pub use ban_state::{BanState, BLOCK_THRESHOLD};
pub use unit_state::UnitState;
