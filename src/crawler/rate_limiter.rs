//! Global sliding-window rate limiter
//!
//! One instance is shared by every worker. The window holds the send times of
//! requests in the trailing hour; a caller that finds the window full sleeps
//! until the oldest entry ages out (plus jitter) and then re-checks.

use rand::Rng;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

const WINDOW: Duration = Duration::from_secs(3600);
const JITTER_MIN_SECS: f64 = 1.0;
const JITTER_MAX_SECS: f64 = 5.0;

/// Hard ceiling on outbound requests per trailing hour
#[derive(Debug)]
pub struct RateLimiter {
    capacity: usize,
    window: Duration,
    requests: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter allowing `requests_per_hour` requests in any hour
    pub fn new(requests_per_hour: usize) -> Self {
        Self::with_window(requests_per_hour, WINDOW)
    }

    /// Creates a limiter with a custom window length
    pub fn with_window(capacity: usize, window: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            window,
            requests: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Blocks until a request may be sent, then records it
    ///
    /// Eviction, the capacity check and the reservation happen under one lock;
    /// the lock is released while sleeping.
    pub async fn await_slot(&self) {
        loop {
            let wait = {
                let mut requests = self.requests.lock().await;
                let now = Instant::now();

                while let Some(&oldest) = requests.front() {
                    if now.duration_since(oldest) >= self.window {
                        requests.pop_front();
                    } else {
                        break;
                    }
                }

                if requests.len() < self.capacity {
                    requests.push_back(now);
                    debug!("Rate slot reserved ({}/{})", requests.len(), self.capacity);
                    return;
                }

                let oldest = match requests.front() {
                    Some(&oldest) => oldest,
                    None => continue,
                };
                let jitter = rand::thread_rng().gen_range(JITTER_MIN_SECS..=JITTER_MAX_SECS);
                self.window.saturating_sub(now.duration_since(oldest))
                    + Duration::from_secs_f64(jitter)
            };

            info!(
                "Hourly request ceiling of {} reached; waiting {:.0}s",
                self.capacity,
                wait.as_secs_f64()
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Number of requests currently inside the window
    pub async fn in_window(&self) -> usize {
        let requests = self.requests.lock().await;
        let now = Instant::now();
        requests
            .iter()
            .filter(|&&sent| now.duration_since(sent) < self.window)
            .count()
    }
}
