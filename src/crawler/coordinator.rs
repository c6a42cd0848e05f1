//! Harvest coordinator - wires the scheduler components into one run
//!
//! A run:
//! 1. Re-queues units an interrupted run left in `processing`
//! 2. Initializes the queue from the catalog when it is empty (or on `--fresh`)
//! 3. Runs the worker pool until the queue drains or it is stopped
//! 4. Flushes buffered results and writes a final checkpoint

use crate::config::Config;
use crate::crawler::ban_detector::{BanDetector, BlockRules};
use crate::crawler::checkpoint::Checkpointer;
use crate::crawler::fetcher::{Fetcher, HttpFetcher};
use crate::crawler::pool::{PoolSettings, WorkerPool};
use crate::crawler::queue::TaskQueue;
use crate::crawler::rate_limiter::RateLimiter;
use crate::crawler::sink::ResultSink;
use crate::extract::ExtractorRegistry;
use crate::state::UnitState;
use crate::storage::SqliteStorage;
use crate::HarvestError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Outcome of one harvest run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub records_saved: u64,
    pub duplicates_skipped: u64,
    /// Results lost to failed flushes; their units stay `processing`
    pub dropped_results: u64,
    /// Units re-queued from an interrupted run at startup
    pub recovered: u64,
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    /// Whether the run ended because it was stopped
    pub stopped: bool,
    pub elapsed: Duration,
}

/// Main harvester structure
pub struct Harvester {
    config: Arc<Config>,
    queue: TaskQueue,
    limiter: Arc<RateLimiter>,
    detector: Arc<BanDetector>,
    sink: Arc<ResultSink>,
    checkpointer: Arc<Checkpointer>,
    pool: WorkerPool,
    fresh: bool,
}

impl Harvester {
    /// Creates a harvester that fetches over HTTP with selector extractors
    ///
    /// # Arguments
    ///
    /// * `config` - The validated harvester configuration
    /// * `storage` - The opened database
    ///
    /// # Returns
    ///
    /// * `Ok(Harvester)` - Successfully created harvester
    /// * `Err(HarvestError)` - HTTP client or selector setup failed
    pub fn new(config: Config, storage: SqliteStorage) -> Result<Self, HarvestError> {
        let fetcher = HttpFetcher::new(&config.fetcher, &config.ban)?;
        let extractors = ExtractorRegistry::from_config(&config)?;
        Ok(Self::with_components(
            config,
            Arc::new(Mutex::new(storage)),
            Arc::new(fetcher),
            extractors,
        ))
    }

    /// Creates a harvester from explicit components
    pub fn with_components(
        config: Config,
        storage: Arc<Mutex<SqliteStorage>>,
        fetcher: Arc<dyn Fetcher>,
        extractors: ExtractorRegistry,
    ) -> Self {
        let settings = &config.harvester;
        let queue = TaskQueue::new(storage.clone());
        let limiter = Arc::new(RateLimiter::new(settings.requests_per_hour));
        let detector = Arc::new(BanDetector::new(BlockRules::from_config(&config.ban)));
        let sink = Arc::new(ResultSink::new(
            storage.clone(),
            queue.clone(),
            settings.batch_size,
            settings.flush_retry_attempts,
            settings.flush_backoff(),
        ));
        let checkpointer = Arc::new(Checkpointer::new(
            storage,
            queue.clone(),
            settings.checkpoint_interval_units,
        ));

        let pool = WorkerPool::new(
            queue.clone(),
            limiter.clone(),
            detector.clone(),
            sink.clone(),
            checkpointer.clone(),
            fetcher,
            Arc::new(extractors),
            PoolSettings::from_config(settings),
        );

        Self {
            config: Arc::new(config),
            queue,
            limiter,
            detector,
            sink,
            checkpointer,
            pool,
            fresh: false,
        }
    }

    /// Rebuilds the queue from the catalog on the next run, discarding progress
    pub fn fresh(mut self, fresh: bool) -> Self {
        self.fresh = fresh;
        self
    }

    /// Token that stops the run once cancelled
    pub fn stop_handle(&self) -> CancellationToken {
        self.pool.stop_handle()
    }

    pub fn stop(&self) {
        self.pool.stop();
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn ban_detector(&self) -> &Arc<BanDetector> {
        &self.detector
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Re-queues every unit as `pending`
    pub fn reset(&self) -> Result<usize, HarvestError> {
        let count = self.queue.reset()?;
        info!("Reset {} units to pending", count);
        Ok(count)
    }

    /// Runs the harvest until the queue drains or the run is stopped
    pub async fn run(&self) -> Result<RunSummary, HarvestError> {
        let started = Instant::now();

        let recovered = self.queue.recover()?;
        if recovered > 0 {
            warn!(
                "Re-queued {} units left processing by an interrupted run",
                recovered
            );
        }

        if self.fresh || self.queue.is_empty()? {
            let catalog = self.config.catalog_items();
            let inserted = self.queue.initialize(&catalog)?;
            info!("Initialized queue with {} units from the catalog", inserted);
        }

        let before = self.queue.stats()?;
        info!(
            "Starting harvest: {} pending, {} completed",
            count(&before, UnitState::Pending),
            count(&before, UnitState::Completed)
        );

        let pool_result = self.pool.run(self.config.harvester.worker_count).await;

        // Buffered results are persisted even if a worker task died
        let report = self.sink.flush().await;
        self.checkpointer.record_flush(&report);
        if let Err(e) = self.checkpointer.force() {
            warn!("Final checkpoint failed: {}", e);
        }

        let pool_summary = pool_result?;
        let after = self.queue.stats()?;
        let summary = RunSummary {
            processed: pool_summary.processed,
            succeeded: pool_summary.succeeded,
            failed: pool_summary.failed,
            records_saved: self.sink.records_saved(),
            duplicates_skipped: self.sink.duplicates_skipped(),
            dropped_results: self.sink.dropped_results(),
            recovered: recovered as u64,
            pending: count(&after, UnitState::Pending),
            processing: count(&after, UnitState::Processing),
            completed: count(&after, UnitState::Completed),
            stopped: self.pool.stop_handle().is_cancelled(),
            elapsed: started.elapsed(),
        };

        info!(
            "Harvest {}: {} units processed ({} failed), {} records saved in {:?}",
            if summary.stopped { "stopped" } else { "finished" },
            summary.processed,
            summary.failed,
            summary.records_saved,
            summary.elapsed
        );
        Ok(summary)
    }
}

fn count(counts: &HashMap<UnitState, u64>, state: UnitState) -> u64 {
    counts.get(&state).copied().unwrap_or(0)
}
