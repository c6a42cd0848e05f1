//! Crawl scheduler
//!
//! This module contains the politeness-aware scheduling core, including:
//! - HTTP fetching with bounded retries
//! - The persistent work-unit queue
//! - The global hourly rate limiter and the blocking detector
//! - The worker pool, the batching result sink and progress checkpoints
//! - Overall run coordination

mod ban_detector;
mod checkpoint;
mod coordinator;
mod fetcher;
mod politeness;
mod pool;
mod queue;
mod rate_limiter;
mod sink;

pub use ban_detector::{BanDetector, BlockRules, Signal};
pub use checkpoint::{Checkpointer, SharedCheckpointStore};
pub use coordinator::{Harvester, RunSummary};
pub use fetcher::{build_http_client, Document, Fetcher, HttpFetcher, NetworkError, NetworkErrorKind};
pub use politeness::{NightWindow, Politeness};
pub use pool::{PoolSettings, PoolSummary, WorkerPool};
pub use queue::{SharedQueueStore, TaskQueue};
pub use rate_limiter::RateLimiter;
pub use sink::{FetchResult, FlushReport, ResultSink, SharedRecordStore, UnitError};
