//! Integration tests for the harvester
//!
//! The end-to-end HTTP test serves review pages from a wiremock server.
//! Timing-sensitive tests use in-process fetchers on a paused tokio clock.

use async_trait::async_trait;
use review_harvester::config::{parse_config, Config};
use review_harvester::crawler::{
    Document, Fetcher, Harvester, NetworkError, NetworkErrorKind, TaskQueue,
};
use review_harvester::extract::{Extractor, ExtractorRegistry, ParseError, Record, UnitContext};
use review_harvester::state::UnitState;
use review_harvester::storage::{RecordStore, SqliteStorage, UnitKey};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{method, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REVIEW_PAGE: &str = r#"<html><body>
  <div class="review"><h3>Comfortable and cheap to run</h3><div class="text">Ten years, no major repairs.</div></div>
  <div class="review"><h3>Noisy cabin</h3><div class="text">Road noise above 90 km/h.</div></div>
</body></html>"#;

const EMPTY_PAGE: &str = "<html><body><p>No more reviews</p></body></html>";

/// Builds a configuration with two origins and two subjects (four units)
fn create_test_config(alpha_template: &str, beta_template: &str, db_path: &str) -> Config {
    parse_config(&format!(
        r#"
[harvester]
worker-count = 2
min-delay-seconds = 0.0
max-delay-seconds = 0.0
requests-per-hour = 1000
batch-size = 3
checkpoint-interval-units = 2
max-pages-per-unit = 5

[fetcher]
user-agent = "TestHarvester/1.0"
timeout-seconds = 5
retry-attempts = 1
retry-delay-seconds = 0.01

[output]
database-path = "{db_path}"

[[origin]]
name = "alpha"
url-template = "{alpha_template}"
record-selector = "div.review"
title-selector = "h3"
body-selector = "div.text"

[[origin]]
name = "beta"
url-template = "{beta_template}"
kind = "journal"
record-selector = "div.review"
title-selector = "h3"
body-selector = "div.text"

[[catalog]]
group = "toyota"
subjects = ["camry", "corolla"]
"#
    ))
    .unwrap()
}

fn stub_config() -> Config {
    create_test_config(
        "https://alpha.example/{group}/{subject}/",
        "https://beta.example/{group}/{subject}/",
        "unused.db",
    )
}

fn in_memory() -> Arc<Mutex<SqliteStorage>> {
    Arc::new(Mutex::new(SqliteStorage::new_in_memory().unwrap()))
}

/// Registers `extractor` for both test origins
fn registry(config: &Config, extractor: Arc<dyn Extractor>) -> ExtractorRegistry {
    let mut registry = ExtractorRegistry::new();
    for origin in &config.origins {
        registry.register(&origin.name, &origin.kind, &origin.url_template, extractor.clone());
    }
    registry
}

/// One record per page, unique per URL
struct UrlRecord;

impl Extractor for UrlRecord {
    fn extract(&self, document: &Document, ctx: &UnitContext) -> Result<Vec<Record>, ParseError> {
        Ok(vec![Record::new(ctx, document.url.as_str(), "review", &document.body)])
    }
}

/// Identical record on every page of every unit
struct SameRecord;

impl Extractor for SameRecord {
    fn extract(&self, _document: &Document, ctx: &UnitContext) -> Result<Vec<Record>, ParseError> {
        Ok(vec![Record::new(
            ctx,
            "https://alpha.example/shared",
            "syndicated review",
            "Same text everywhere",
        )])
    }
}

/// Serves a fixed body and records every request with its time
#[derive(Default)]
struct RecordingFetcher {
    requests: Mutex<Vec<(Url, Instant)>>,
    blocked: bool,
    /// Cancelled when the n-th request arrives
    stop_after: Mutex<Option<(usize, CancellationToken)>>,
}

impl RecordingFetcher {
    fn times(&self) -> Vec<Instant> {
        self.requests.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }

    fn counts_by_url(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for (url, _) in self.requests.lock().unwrap().iter() {
            *counts.entry(url.to_string()).or_insert(0) += 1;
        }
        counts
    }
}

#[async_trait]
impl Fetcher for RecordingFetcher {
    async fn fetch(&self, url: &Url) -> Result<Document, NetworkError> {
        let calls = {
            let mut requests = self.requests.lock().unwrap();
            requests.push((url.clone(), Instant::now()));
            requests.len()
        };
        if let Some((n, token)) = self.stop_after.lock().unwrap().as_ref() {
            if calls == *n {
                token.cancel();
            }
        }
        if self.blocked {
            return Err(NetworkError::new(
                NetworkErrorKind::HttpStatus(403),
                url,
                "Forbidden",
            ));
        }
        Ok(Document::new(url.clone(), 200, "a decent car"))
    }
}

#[tokio::test]
async fn test_full_harvest_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex("^/alpha/toyota/[a-z]+/$"))
        .respond_with(ResponseTemplate::new(200).set_body_string(REVIEW_PAGE))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex("^/beta/toyota/[a-z]+/$"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(REVIEW_PAGE))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex("^/beta/toyota/[a-z]+/$"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(EMPTY_PAGE))
        .expect(2)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("harvest.db");
    let config = create_test_config(
        &format!("{}/alpha/{{group}}/{{subject}}/", server.uri()),
        &format!("{}/beta/{{group}}/{{subject}}/?page={{page}}", server.uri()),
        db_path.to_str().unwrap(),
    );

    let storage = SqliteStorage::new(&db_path).unwrap();
    let harvester = Harvester::new(config, storage).unwrap();
    let summary = harvester.run().await.unwrap();

    assert_eq!(summary.processed, 4);
    assert_eq!(summary.succeeded, 4);
    assert_eq!(summary.pending, 0);
    assert_eq!(summary.processing, 0);
    assert_eq!(summary.completed, 4);
    assert_eq!(summary.records_saved, 8);

    let stats = harvester.queue().stats().unwrap();
    assert_eq!(stats[&UnitState::Pending], 0);
    assert_eq!(stats[&UnitState::Processing], 0);
    assert_eq!(stats[&UnitState::Completed], 4);

    let beta = harvester
        .queue()
        .get(&UnitKey::new("beta", "toyota", "camry"))
        .unwrap()
        .unwrap();
    assert_eq!(beta.pages_processed, 2);
    assert_eq!(beta.records_found, 2);

    // The file is durable and readable by a fresh connection
    let reopened = SqliteStorage::new(&db_path).unwrap();
    let record_stats = reopened.record_stats().unwrap();
    assert_eq!(record_stats.total_records, 8);
    assert_eq!(record_stats.by_origin["alpha"], 4);
    assert_eq!(record_stats.by_kind["journal"], 4);
}

#[tokio::test(start_paused = true)]
async fn test_always_blocked_fetcher_waits_for_recovery() {
    let mut config = stub_config();
    config.harvester.worker_count = 1;

    let fetcher = Arc::new(RecordingFetcher {
        blocked: true,
        ..RecordingFetcher::default()
    });
    let extractors = registry(&config, Arc::new(UrlRecord));
    let harvester = Harvester::with_components(config, in_memory(), fetcher.clone(), extractors);

    let summary = harvester.run().await.unwrap();
    assert_eq!(summary.processed, 4);
    assert_eq!(summary.failed, 4);
    assert_eq!(summary.completed, 4);
    assert_eq!(summary.records_saved, 0);
    assert!(harvester.ban_detector().is_likely_blocked());

    let times = fetcher.times();
    assert_eq!(times.len(), 4);
    let gap = times[3].duration_since(times[2]);
    assert!(gap >= Duration::from_secs(30), "4th fetch after {:?}", gap);
    assert!(times[2].duration_since(times[0]) < Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn test_interrupted_unit_is_reprocessed_once() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("harvest.db");
    let config = stub_config();

    // A previous process claimed one unit and died
    let crashed_key = {
        let storage: Arc<Mutex<SqliteStorage>> =
            Arc::new(Mutex::new(SqliteStorage::new(&db_path).unwrap()));
        let queue = TaskQueue::new(storage);
        queue.initialize(&config.catalog_items()).unwrap();
        let unit = queue.claim_next().unwrap().unwrap();
        assert_eq!(queue.stats().unwrap()[&UnitState::Processing], 1);
        unit.key
    };

    let storage = Arc::new(Mutex::new(SqliteStorage::new(&db_path).unwrap()));
    let fetcher = Arc::new(RecordingFetcher::default());
    let extractors = registry(&config, Arc::new(UrlRecord));
    let harvester = Harvester::with_components(config, storage, fetcher.clone(), extractors);

    let summary = harvester.run().await.unwrap();
    assert_eq!(summary.recovered, 1);
    assert_eq!(summary.processed, 4);
    assert_eq!(summary.completed, 4);

    let counts = fetcher.counts_by_url();
    assert_eq!(counts.len(), 4);
    assert!(counts.values().all(|&n| n == 1));
    let crashed_url = format!(
        "https://{}.example/{}/{}/",
        crashed_key.origin, crashed_key.group, crashed_key.subject
    );
    assert_eq!(counts[&crashed_url], 1);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_content_saved_once() {
    let config = stub_config();
    let fetcher = Arc::new(RecordingFetcher::default());
    let extractors = registry(&config, Arc::new(SameRecord));
    let harvester = Harvester::with_components(config, in_memory(), fetcher, extractors);

    let summary = harvester.run().await.unwrap();
    assert_eq!(summary.completed, 4);
    assert_eq!(summary.records_saved, 1);
    assert_eq!(summary.duplicates_skipped, 3);
    assert_eq!(harvester.queue().total_records().unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_lets_current_unit_finish() {
    let mut config = stub_config();
    config.harvester.worker_count = 1;

    let storage = in_memory();
    let extractors = registry(&config, Arc::new(UrlRecord));
    let fetcher = Arc::new(RecordingFetcher::default());
    let harvester = Harvester::with_components(config, storage, fetcher.clone(), extractors);
    *fetcher.stop_after.lock().unwrap() = Some((2, harvester.stop_handle()));

    let summary = harvester.run().await.unwrap();
    assert!(summary.stopped);
    assert_eq!(fetcher.times().len(), 2);
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.pending, 2);
    assert_eq!(summary.processing, 0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_mid_pagination_keeps_fetched_pages() {
    let mut config = create_test_config(
        "https://alpha.example/{group}/{subject}/?page={page}",
        "https://beta.example/{group}/{subject}/?page={page}",
        "unused.db",
    );
    config.harvester.worker_count = 1;

    let storage = in_memory();
    let extractors = registry(&config, Arc::new(UrlRecord));
    let fetcher = Arc::new(RecordingFetcher::default());
    let harvester = Harvester::with_components(config, storage, fetcher.clone(), extractors);
    *fetcher.stop_after.lock().unwrap() = Some((1, harvester.stop_handle()));

    let summary = harvester.run().await.unwrap();
    assert!(summary.stopped);
    assert_eq!(fetcher.times().len(), 1);
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.processing, 0);
    assert_eq!(summary.pending, 3);
    assert_eq!(summary.records_saved, 1);
}

#[test]
fn test_concurrent_claims_across_connections() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("harvest.db");
    let config = stub_config();

    {
        let queue = TaskQueue::new(Arc::new(Mutex::new(SqliteStorage::new(&db_path).unwrap())));
        let mut catalog = Vec::new();
        for i in 0..15 {
            for mut item in config.catalog_items() {
                item.key.subject = format!("{}-{}", item.key.subject, i);
                catalog.push(item);
            }
        }
        assert_eq!(queue.initialize(&catalog).unwrap(), 60);
    }

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let db_path = db_path.clone();
            std::thread::spawn(move || {
                let queue =
                    TaskQueue::new(Arc::new(Mutex::new(SqliteStorage::new(&db_path).unwrap())));
                let mut claimed = Vec::new();
                while let Some(unit) = queue.claim_next().unwrap() {
                    claimed.push(unit.key);
                }
                claimed
            })
        })
        .collect();

    let mut all: Vec<UnitKey> = Vec::new();
    for handle in handles {
        all.extend(handle.join().unwrap());
    }
    let unique: std::collections::HashSet<_> = all.iter().cloned().collect();
    assert_eq!(all.len(), 60);
    assert_eq!(unique.len(), 60);
}
