//! Statistics generation from the harvest database
//!
//! This module provides functionality for extracting and displaying
//! queue progress and record totals from the storage layer.

use crate::state::UnitState;
use crate::storage::{Checkpoint, CheckpointStore, QueueStore, RecordStore, StoreStats};
use crate::HarvestError;
use std::collections::HashMap;
use std::fmt::Write;

/// Harvest statistics summary
#[derive(Debug, Clone)]
pub struct HarvestStatistics {
    /// Count of units by state
    pub units_by_state: HashMap<UnitState, u64>,

    /// Total number of work units
    pub total_units: u64,

    /// Records persisted, broken down by origin and kind
    pub records: StoreStats,

    /// Most recent progress checkpoint, if any
    pub latest_checkpoint: Option<Checkpoint>,
}

impl HarvestStatistics {
    pub fn units_in(&self, state: UnitState) -> u64 {
        self.units_by_state.get(&state).copied().unwrap_or(0)
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(HarvestStatistics)` - Successfully loaded statistics
/// * `Err(HarvestError)` - Failed to query statistics
pub fn load_statistics<S>(storage: &S) -> Result<HarvestStatistics, HarvestError>
where
    S: QueueStore + RecordStore + CheckpointStore,
{
    Ok(HarvestStatistics {
        units_by_state: storage.count_units_by_state()?,
        total_units: storage.count_units()?,
        records: storage.record_stats()?,
        latest_checkpoint: storage.latest_checkpoint()?,
    })
}

/// Renders statistics as the text printed by `--stats`
pub fn render_statistics(stats: &HarvestStatistics) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "=== Harvest Statistics ===\n");

    let _ = writeln!(out, "Work Units ({}):", stats.total_units);
    for state in UnitState::all_states() {
        let count = stats.units_in(state);
        let percentage = if stats.total_units > 0 {
            (count as f64 / stats.total_units as f64) * 100.0
        } else {
            0.0
        };
        let _ = writeln!(out, "  {}: {} ({:.1}%)", state, count, percentage);
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "Records: {}", stats.records.total_records);
    if !stats.records.by_origin.is_empty() {
        let _ = writeln!(out, "  By origin:");
        for (origin, count) in sorted_counts(&stats.records.by_origin) {
            let _ = writeln!(out, "    {}: {}", origin, count);
        }
    }
    if !stats.records.by_kind.is_empty() {
        let _ = writeln!(out, "  By kind:");
        for (kind, count) in sorted_counts(&stats.records.by_kind) {
            let _ = writeln!(out, "    {}: {}", kind, count);
        }
    }
    let _ = writeln!(out);

    match &stats.latest_checkpoint {
        Some(checkpoint) => {
            let _ = writeln!(
                out,
                "Last checkpoint ({}): {}/{} units ({:.1}%), {} records",
                checkpoint.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
                checkpoint.completed_units,
                checkpoint.total_units,
                checkpoint.progress_percent(),
                checkpoint.records_saved
            );
            if let Some(unit) = &checkpoint.in_flight {
                let _ = writeln!(out, "  Last unit: {}", unit);
            }
        }
        None => {
            let _ = writeln!(out, "No checkpoints recorded");
        }
    }

    out
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &HarvestStatistics) {
    print!("{}", render_statistics(stats));
}

/// Sorts counts descending, then by name
fn sorted_counts(counts: &HashMap<String, u64>) -> Vec<(&String, &u64)> {
    let mut sorted: Vec<_> = counts.iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{Record, UnitContext};
    use crate::storage::{CatalogItem, SqliteStorage, UnitKey};

    #[test]
    fn test_load_statistics() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let camry = UnitKey::new("drom.ru", "toyota", "camry");
        storage
            .replace_units(&[
                CatalogItem {
                    key: camry.clone(),
                    priority: 1,
                    total_pages_estimate: 0,
                },
                CatalogItem {
                    key: UnitKey::new("drive2.ru", "toyota", "camry"),
                    priority: 1,
                    total_pages_estimate: 0,
                },
            ])
            .unwrap();
        let ctx = UnitContext::new(camry, "review");
        storage
            .save_records(&[Record::new(&ctx, "https://drom.ru/1", "t", "b")])
            .unwrap();

        let stats = load_statistics(&storage).unwrap();
        assert_eq!(stats.total_units, 2);
        assert_eq!(stats.units_in(UnitState::Pending), 2);
        assert_eq!(stats.records.total_records, 1);
        assert!(stats.latest_checkpoint.is_none());
    }

    #[test]
    fn test_render_statistics() {
        let mut units_by_state = HashMap::new();
        units_by_state.insert(UnitState::Completed, 3);
        units_by_state.insert(UnitState::Pending, 1);

        let mut by_origin = HashMap::new();
        by_origin.insert("drom.ru".to_string(), 7);
        by_origin.insert("drive2.ru".to_string(), 9);

        let stats = HarvestStatistics {
            units_by_state: units_by_state.clone(),
            total_units: 4,
            records: StoreStats {
                total_records: 16,
                by_origin,
                by_kind: HashMap::new(),
            },
            latest_checkpoint: Some(Checkpoint::from_counts(&units_by_state, None, 16)),
        };

        let text = render_statistics(&stats);
        assert!(text.contains("completed: 3 (75.0%)"));
        assert!(text.contains("Records: 16"));
        assert!(text.find("drive2.ru").unwrap() < text.find("drom.ru").unwrap());
        assert!(text.contains("3/4 units (75.0%)"));
    }
}
