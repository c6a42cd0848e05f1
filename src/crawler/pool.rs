//! Bounded pool of crawl workers
//!
//! Each worker repeatedly claims a unit, walks its pages under the shared
//! rate limit and ban state, hands the outcome to the result sink and sleeps
//! a politeness delay. Workers exit when the queue is drained or the stop
//! token is cancelled.

use crate::config::HarvesterConfig;
use crate::crawler::ban_detector::{BanDetector, Signal};
use crate::crawler::checkpoint::Checkpointer;
use crate::crawler::fetcher::Fetcher;
use crate::crawler::politeness::Politeness;
use crate::crawler::queue::TaskQueue;
use crate::crawler::rate_limiter::RateLimiter;
use crate::crawler::sink::{FetchResult, ResultSink, UnitError};
use crate::extract::{ExtractorRegistry, UnitContext};
use crate::storage::WorkUnit;
use crate::url::{has_page_placeholder, render_unit_url};
use crate::HarvestError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Per-worker behavior that does not depend on shared state
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub politeness: Politeness,
    pub max_pages_per_unit: u32,
    pub claim_backoff: Duration,
}

impl PoolSettings {
    pub fn from_config(config: &HarvesterConfig) -> Self {
        Self {
            politeness: Politeness::from_config(config),
            max_pages_per_unit: config.max_pages_per_unit.max(1),
            claim_backoff: config.claim_backoff(),
        }
    }
}

/// Aggregate unit outcomes of one pool run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolSummary {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    processed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

/// How the page walk of one unit ended
#[derive(Debug)]
enum Walk {
    /// The walk reached its last page or stopped on an error
    Finished(FetchResult),
    /// The pool was stopped between fetches
    Interrupted(FetchResult),
}

/// Runs crawl workers over a shared queue
#[derive(Clone)]
pub struct WorkerPool {
    queue: TaskQueue,
    limiter: Arc<RateLimiter>,
    detector: Arc<BanDetector>,
    sink: Arc<ResultSink>,
    checkpointer: Arc<Checkpointer>,
    fetcher: Arc<dyn Fetcher>,
    extractors: Arc<ExtractorRegistry>,
    settings: PoolSettings,
    stop: CancellationToken,
    counters: Arc<Counters>,
}

impl WorkerPool {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: TaskQueue,
        limiter: Arc<RateLimiter>,
        detector: Arc<BanDetector>,
        sink: Arc<ResultSink>,
        checkpointer: Arc<Checkpointer>,
        fetcher: Arc<dyn Fetcher>,
        extractors: Arc<ExtractorRegistry>,
        settings: PoolSettings,
    ) -> Self {
        Self {
            queue,
            limiter,
            detector,
            sink,
            checkpointer,
            fetcher,
            extractors,
            settings,
            stop: CancellationToken::new(),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Token that stops every worker once cancelled
    pub fn stop_handle(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Asks all workers to exit
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Unit outcomes counted so far
    pub fn summary(&self) -> PoolSummary {
        PoolSummary {
            processed: self.counters.processed.load(Ordering::Relaxed),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Runs `worker_count` workers until the queue drains or the pool is stopped
    pub async fn run(&self, worker_count: usize) -> Result<PoolSummary, HarvestError> {
        let worker_count = worker_count.max(1);
        info!("Starting {} workers", worker_count);

        let handles: Vec<_> = (1..=worker_count)
            .map(|id| {
                let worker = self.clone();
                tokio::spawn(async move { worker.worker_loop(id).await })
            })
            .collect();

        let mut failures = Vec::new();
        for handle in handles {
            if let Err(e) = handle.await {
                failures.push(e.to_string());
            }
        }

        if !failures.is_empty() {
            return Err(HarvestError::Worker(failures.join("; ")));
        }

        let summary = self.summary();
        info!(
            "Workers finished: {} units processed, {} succeeded, {} failed",
            summary.processed, summary.succeeded, summary.failed
        );
        Ok(summary)
    }

    async fn worker_loop(&self, id: usize) {
        debug!("Worker {} started", id);

        loop {
            if self.stop.is_cancelled() {
                debug!("Worker {} stopping", id);
                break;
            }

            let unit = match self.queue.claim_next() {
                Ok(Some(unit)) => unit,
                Ok(None) => {
                    debug!("Worker {} found no pending units", id);
                    break;
                }
                Err(e) => {
                    warn!(
                        "Worker {} failed to claim a unit: {}; retrying in {:?}",
                        id, e, self.settings.claim_backoff
                    );
                    if self.pause(self.settings.claim_backoff).await {
                        break;
                    }
                    continue;
                }
            };

            debug!("Worker {} claimed {}", id, unit.key);
            self.checkpointer.unit_started(&unit.key);
            let walk = self.process_unit(&unit).await;
            self.checkpointer.unit_finished(&unit.key);

            let (result, interrupted) = match walk {
                Walk::Finished(result) => (result, false),
                Walk::Interrupted(result) if result.pages_fetched == 0 => {
                    self.release(id, &unit);
                    break;
                }
                Walk::Interrupted(result) => {
                    info!(
                        "Worker {} stopped during {}; keeping {} fetched pages",
                        id, unit.key, result.pages_fetched
                    );
                    (result, true)
                }
            };

            self.record_outcome(id, &result);
            if let Some(report) = self.sink.accept(result).await {
                self.checkpointer.record_flush(&report);
            }

            if interrupted || self.pause(self.settings.politeness.next_delay()).await {
                break;
            }
        }
    }

    /// Hands back a unit that was stopped before any page was fetched
    fn release(&self, id: usize, unit: &WorkUnit) {
        match self.queue.release(&unit.key) {
            Ok(_) => info!(
                "Worker {} stopped before fetching {}; returned it to pending",
                id, unit.key
            ),
            // recover() re-queues it at the next start
            Err(e) => warn!("Worker {} could not release {}: {}", id, unit.key, e),
        }
    }

    /// Walks every page of one unit
    ///
    /// A stop interrupts the sleeps between fetches, never a fetch itself.
    async fn process_unit(&self, unit: &WorkUnit) -> Walk {
        let mut result = FetchResult::new(unit.key.clone());

        let origin = match self.extractors.get(&unit.key.origin) {
            Ok(origin) => origin,
            Err(_) => {
                result.fail(UnitError::UnknownOrigin(unit.key.origin.clone()));
                return Walk::Finished(result);
            }
        };

        let last_page = if has_page_placeholder(&origin.url_template) {
            self.settings.max_pages_per_unit
        } else {
            1
        };
        let ctx = UnitContext::new(unit.key.clone(), origin.kind.clone());

        for page in 1..=last_page {
            if page > 1 && self.pause(self.settings.politeness.next_delay()).await {
                return Walk::Interrupted(result);
            }

            let url = match render_unit_url(&origin.url_template, &unit.key, page) {
                Ok(url) => url,
                Err(e) => {
                    result.fail(UnitError::Url(e.to_string()));
                    break;
                }
            };
            if page == 1 {
                result.url = url.to_string();
            }

            if self.detector.is_likely_blocked() {
                let delay = self.detector.recovery_delay();
                warn!(
                    "Likely blocked after {} indicators; pausing {:?} before {}",
                    self.detector.consecutive_failures(),
                    delay,
                    url
                );
                if self.pause(delay).await {
                    return Walk::Interrupted(result);
                }
            }

            tokio::select! {
                _ = self.stop.cancelled() => return Walk::Interrupted(result),
                _ = self.limiter.await_slot() => {}
            }

            let outcome = self.fetcher.fetch(&url).await;
            let signal = self.detector.observe(&outcome);
            result.pages_fetched += 1;

            let document = match outcome {
                Ok(_) if signal == Signal::Indicator => {
                    result.fail(UnitError::Blocked(url.to_string()));
                    break;
                }
                Ok(document) => document,
                // Sites answer past-the-end pages with 404
                Err(e) if page > 1 && e.status() == Some(404) => {
                    debug!("{} ends at page {}", unit.key, page - 1);
                    break;
                }
                Err(e) => {
                    result.fail(e.into());
                    break;
                }
            };

            match origin
                .extractor
                .extract(&document, &ctx.clone().with_page(page))
            {
                Ok(records) if records.is_empty() => {
                    trace!("{} page {} has no records", unit.key, page);
                    break;
                }
                Ok(records) => {
                    trace!("{} page {}: {} records", unit.key, page, records.len());
                    result.records.extend(records);
                }
                Err(e) => {
                    result.fail(e.into());
                    break;
                }
            }
        }

        Walk::Finished(result)
    }

    fn record_outcome(&self, id: usize, result: &FetchResult) {
        self.counters.processed.fetch_add(1, Ordering::Relaxed);

        match &result.error {
            None => {
                self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
                info!(
                    "Worker {} finished {}: {} records from {} pages",
                    id,
                    result.unit,
                    result.records.len(),
                    result.pages_fetched
                );
            }
            Some(error) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!("Worker {} failed {}: {}", id, result.unit, error);
            }
        }
    }

    /// Sleeps unless stopped first; returns `true` if the pool was stopped
    async fn pause(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return self.stop.is_cancelled();
        }
        tokio::select! {
            _ = self.stop.cancelled() => true,
            _ = tokio::time::sleep(duration) => false,
        }
    }
}
