//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the harvester, including:
//! - Building HTTP clients with the configured user agent
//! - Rotating user agents per request
//! - GET requests to fetch page content
//! - Bounded retry of transient failures
//! - Error classification into timeout, refused and HTTP status

use crate::config::{BanConfig, FetcherConfig};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::header::USER_AGENT;
use reqwest::{redirect::Policy, Client};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// A fetched page
#[derive(Debug, Clone)]
pub struct Document {
    /// URL that was requested
    pub url: Url,
    /// URL after redirects
    pub final_url: Url,
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: String,
}

impl Document {
    /// Creates a document that was served without redirects
    pub fn new(url: Url, status: u16, body: impl Into<String>) -> Self {
        Self {
            final_url: url.clone(),
            url,
            status,
            body: body.into(),
        }
    }
}

/// Category of a failed fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    Timeout,
    Refused,
    HttpStatus(u16),
    Other,
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Refused => write!(f, "connection refused"),
            Self::HttpStatus(status) => write!(f, "HTTP {}", status),
            Self::Other => write!(f, "network error"),
        }
    }
}

/// A typed fetch failure
#[derive(Debug, Clone, Error)]
#[error("{kind} for {url}: {message}")]
pub struct NetworkError {
    pub kind: NetworkErrorKind,
    pub url: String,
    pub message: String,
}

impl NetworkError {
    pub fn new(kind: NetworkErrorKind, url: &Url, message: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.to_string(),
            message: message.into(),
        }
    }

    /// Returns the HTTP status if the failure was a status response
    pub fn status(&self) -> Option<u16> {
        match self.kind {
            NetworkErrorKind::HttpStatus(status) => Some(status),
            _ => None,
        }
    }
}

/// Source of raw documents
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches one URL
    ///
    /// Non-success HTTP statuses are returned as `NetworkErrorKind::HttpStatus`.
    async fn fetch(&self, url: &Url) -> Result<Document, NetworkError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The fetcher configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &FetcherConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.timeout_seconds))
        .connect_timeout(Duration::from_secs(config.timeout_seconds.min(10)))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// reqwest-backed fetcher with bounded retries
///
/// # Retry Logic
///
/// | Condition | Action |
/// |-----------|--------|
/// | Timeout | Retry with linear delay |
/// | Connection refused | Retry with linear delay |
/// | HTTP 5xx not in the block list | Retry with linear delay |
/// | HTTP status in the block list | Immediate failure |
/// | Other HTTP error | Immediate failure |
pub struct HttpFetcher {
    client: Client,
    user_agents: Vec<String>,
    retry_attempts: u32,
    retry_delay: Duration,
    blocked_statuses: Vec<u16>,
}

impl HttpFetcher {
    /// Creates a fetcher from the fetcher and block-rule configuration
    pub fn new(config: &FetcherConfig, ban: &BanConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
            user_agents: config.user_agents.clone(),
            retry_attempts: config.retry_attempts.max(1),
            retry_delay: Duration::from_secs_f64(config.retry_delay_seconds),
            blocked_statuses: ban.blocked_statuses.clone(),
        })
    }

    fn is_retryable(&self, error: &NetworkError) -> bool {
        match error.kind {
            NetworkErrorKind::Timeout | NetworkErrorKind::Refused => true,
            // Retrying into a block only extends it
            NetworkErrorKind::HttpStatus(status) => {
                status >= 500 && !self.blocked_statuses.contains(&status)
            }
            NetworkErrorKind::Other => false,
        }
    }

    /// Picks a random agent from the pool; `None` keeps the client default
    fn pick_user_agent(&self) -> Option<&str> {
        self.user_agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
    }

    async fn fetch_once(&self, url: &Url) -> Result<Document, NetworkError> {
        let mut request = self.client.get(url.clone());
        if let Some(agent) = self.pick_user_agent() {
            request = request.header(USER_AGENT, agent);
        }

        let response = request
            .send()
            .await
            .map_err(|e| classify_error(url, e))?;

        let status = response.status();
        let final_url = response.url().clone();

        if !status.is_success() {
            return Err(NetworkError::new(
                NetworkErrorKind::HttpStatus(status.as_u16()),
                url,
                status.canonical_reason().unwrap_or("unexpected status"),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| classify_error(url, e))?;

        Ok(Document {
            url: url.clone(),
            final_url,
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<Document, NetworkError> {
        let mut attempt = 1;
        loop {
            match self.fetch_once(url).await {
                Ok(document) => return Ok(document),
                Err(error) if attempt < self.retry_attempts && self.is_retryable(&error) => {
                    tracing::debug!(
                        "Attempt {}/{} failed: {}; retrying",
                        attempt,
                        self.retry_attempts,
                        error
                    );
                    tokio::time::sleep(self.retry_delay * attempt).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

fn classify_error(url: &Url, error: reqwest::Error) -> NetworkError {
    let kind = if error.is_timeout() {
        NetworkErrorKind::Timeout
    } else if error.is_connect() {
        NetworkErrorKind::Refused
    } else {
        NetworkErrorKind::Other
    };
    NetworkError::new(kind, url, error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_config() -> FetcherConfig {
        FetcherConfig {
            user_agent: "TestHarvester/1.0".to_string(),
            user_agents: Vec::new(),
            timeout_seconds: 2,
            retry_attempts: 3,
            retry_delay_seconds: 0.01,
        }
    }

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(&create_test_config(), &BanConfig::default()).unwrap()
    }

    fn page_url(server: &MockServer, p: &str) -> Url {
        Url::parse(&format!("{}{}", server.uri(), p)).unwrap()
    }

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client(&create_test_config()).is_ok());
    }

    #[test]
    fn test_network_error_status() {
        let url = Url::parse("https://drom.ru/").unwrap();
        let error = NetworkError::new(NetworkErrorKind::HttpStatus(429), &url, "Too Many Requests");
        assert_eq!(error.status(), Some(429));
        assert!(error.to_string().contains("HTTP 429"));

        let timeout = NetworkError::new(NetworkErrorKind::Timeout, &url, "slow");
        assert_eq!(timeout.status(), None);
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/reviews"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
            .mount(&server)
            .await;

        let document = fetcher()
            .fetch(&page_url(&server, "/reviews"))
            .await
            .unwrap();
        assert_eq!(document.status, 200);
        assert_eq!(document.body, "<html>ok</html>");
    }

    #[tokio::test]
    async fn test_transient_5xx_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
            .mount(&server)
            .await;

        let document = fetcher()
            .fetch(&page_url(&server, "/flaky"))
            .await
            .unwrap();
        assert_eq!(document.body, "recovered");
    }

    #[tokio::test]
    async fn test_block_status_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blocked"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let error = fetcher()
            .fetch(&page_url(&server, "/blocked"))
            .await
            .unwrap_err();
        assert_eq!(error.kind, NetworkErrorKind::HttpStatus(503));
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let error = fetcher()
            .fetch(&page_url(&server, "/missing"))
            .await
            .unwrap_err();
        assert_eq!(error.status(), Some(404));
    }

    #[tokio::test]
    async fn test_exhausted_retries_return_last_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(502))
            .expect(3)
            .mount(&server)
            .await;

        let error = fetcher()
            .fetch(&page_url(&server, "/down"))
            .await
            .unwrap_err();
        assert_eq!(error.kind, NetworkErrorKind::HttpStatus(502));
    }

    #[tokio::test]
    async fn test_refused_connection() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let url = Url::parse(&format!("http://127.0.0.1:{}/gone", port)).unwrap();

        let error = fetcher().fetch(&url).await.unwrap_err();
        assert_eq!(error.kind, NetworkErrorKind::Refused);
    }

    #[tokio::test]
    async fn test_default_user_agent_without_pool() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ua"))
            .and(header("user-agent", "TestHarvester/1.0"))
            .respond_with(ResponseTemplate::new(200).set_body_string("default"))
            .expect(1)
            .mount(&server)
            .await;

        let document = fetcher().fetch(&page_url(&server, "/ua")).await.unwrap();
        assert_eq!(document.body, "default");
    }

    #[tokio::test]
    async fn test_user_agent_rotates_from_pool() {
        let server = MockServer::start().await;
        for (agent, body) in [("AgentOne/1.0", "one"), ("AgentTwo/2.0", "two")] {
            Mock::given(method("GET"))
                .and(path("/ua"))
                .and(header("user-agent", agent))
                .respond_with(ResponseTemplate::new(200).set_body_string(body))
                .mount(&server)
                .await;
        }

        let mut config = create_test_config();
        config.user_agents = vec!["AgentOne/1.0".to_string(), "AgentTwo/2.0".to_string()];
        let fetcher = HttpFetcher::new(&config, &BanConfig::default()).unwrap();

        // Any other agent falls through to wiremock's 404
        for _ in 0..10 {
            let document = fetcher.fetch(&page_url(&server, "/ua")).await.unwrap();
            assert!(document.body == "one" || document.body == "two");
        }
    }
}
