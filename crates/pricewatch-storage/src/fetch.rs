//! HTTP fetching, per-store pacing and the collection retry policy.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE};
use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info_span, Instrument};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// The store is refusing automated traffic; worth a long cool-off.
    Blocked,
    Failed,
}

pub fn classify_status(status: StatusCode) -> StatusClass {
    if status == StatusCode::FORBIDDEN
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::SERVICE_UNAVAILABLE
    {
        StatusClass::Blocked
    } else {
        StatusClass::Failed
    }
}

/// Bounded, linearly backed-off attempts per (product, store, url).
///
/// Failures are usually anti-bot cool-offs, so the delay is coarse:
/// `base_delay × attempt` after each failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Sleep after the failed attempt number `attempt` (1-based).
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub accept_language: Option<String>,
    pub global_concurrency: usize,
    pub per_store_concurrency: usize,
    pub accept_invalid_certs: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            accept_language: Some("pt-BR,pt;q=0.9,en;q=0.8".to_string()),
            global_concurrency: 4,
            per_store_concurrency: 1,
            accept_invalid_certs: false,
        }
    }
}

#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    global_limit: Arc<Semaphore>,
    per_store_limit: usize,
    per_store: Mutex<HashMap<String, Arc<Semaphore>>>,
}

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: StatusCode,
    pub final_url: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
}

impl FetchError {
    pub fn is_blocked(&self) -> bool {
        match self {
            FetchError::HttpStatus { status, .. } => StatusCode::from_u16(*status)
                .map(|s| classify_status(s) == StatusClass::Blocked)
                .unwrap_or(false),
            FetchError::Request(_) => false,
        }
    }
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(lang) = &config.accept_language {
            headers.insert(
                ACCEPT_LANGUAGE,
                HeaderValue::from_str(lang).context("invalid accept-language header")?,
            );
        }

        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout)
            .default_headers(headers)
            .danger_accept_invalid_certs(config.accept_invalid_certs);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;

        Ok(Self {
            client,
            global_limit: Arc::new(Semaphore::new(config.global_concurrency.max(1))),
            per_store_limit: config.per_store_concurrency.max(1),
            per_store: Mutex::new(HashMap::new()),
        })
    }

    async fn per_store_semaphore(&self, store: &str) -> Arc<Semaphore> {
        let mut map = self.per_store.lock().await;
        map.entry(store.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_store_limit)))
            .clone()
    }

    /// One GET attempt. Retrying is the caller's decision.
    pub async fn fetch_page(&self, store: &str, url: &str) -> Result<FetchedPage, FetchError> {
        let _global = self.global_limit.acquire().await.expect("semaphore not closed");
        let per_store = self.per_store_semaphore(store).await;
        let _store = per_store.acquire().await.expect("semaphore not closed");

        let span = info_span!("http_fetch", store, url);
        self.get_page(url).instrument(span).await
    }

    async fn get_page(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        let final_url = resp.url().to_string();

        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: final_url,
            });
        }

        let body = resp.text().await?;
        debug!(%status, bytes = body.len(), "fetched page");
        Ok(FetchedPage {
            status,
            final_url,
            body,
        })
    }
}

/// Keeps a minimum, jittered gap between consecutive requests to the same store.
#[derive(Debug)]
pub struct RequestPacer {
    min_delay: Duration,
    jitter: Duration,
    last_request: Mutex<HashMap<String, Instant>>,
}

impl RequestPacer {
    pub fn new(min_delay: Duration, jitter: Duration) -> Self {
        Self {
            min_delay,
            jitter,
            last_request: Mutex::new(HashMap::new()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    fn spacing(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.min_delay;
        }
        let max_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        let extra = rand::rng().random_range(0..=max_ms);
        self.min_delay + Duration::from_millis(extra)
    }

    /// Wait until `store` may be contacted again, then mark it as contacted now.
    pub async fn wait_turn(&self, store: &str) {
        let wait = {
            let last = self.last_request.lock().await;
            last.get(store)
                .map(|prev| self.spacing().saturating_sub(prev.elapsed()))
                .unwrap_or_default()
        };

        if !wait.is_zero() {
            debug!(store, wait_ms = wait.as_millis() as u64, "pacing request");
            tokio::time::sleep(wait).await;
        }

        self.last_request
            .lock()
            .await
            .insert(store.to_string(), Instant::now());
    }
}
