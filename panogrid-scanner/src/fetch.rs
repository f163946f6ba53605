use crate::error::{Result, ScanError};
use reqwest::{Client, StatusCode};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Byte-fetch primitive.
///
/// `Ok(Some(bytes))` on success, `Ok(None)` when the server answered with a
/// status that will not change on retry, and `Err` for everything worth
/// retrying (network errors, timeouts, 408/429/5xx).
pub trait Fetcher: Send + Sync {
    fn fetch(
        &self,
        url: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent("panogrid/0.1")
            .connect_timeout(Duration::from_secs(4))
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self { client })
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let parsed = Url::parse(url).map_err(|e| ScanError::InvalidUrl(format!("{url}: {e}")))?;
        debug!("GET {}", parsed);

        let response = self.client.get(parsed).timeout(timeout).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(Some(response.bytes().await?.to_vec()));
        }
        if is_retryable(status) {
            return Err(ScanError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        debug!("{} answered {}, not retrying", url, status);
        Ok(None)
    }
}

/// Canned reply for [`MemoryFetcher`].
#[derive(Debug, Clone, PartialEq)]
pub enum Canned {
    Body(Vec<u8>),
    NotFound,
    NetworkError,
}

/// In-memory fetcher keyed by exact URL. Each URL holds a queue of replies;
/// the last one repeats once the queue is down to it. Unknown URLs answer
/// [`Canned::NotFound`].
#[derive(Default)]
pub struct MemoryFetcher {
    replies: Mutex<HashMap<String, VecDeque<Canned>>>,
    calls: Mutex<Vec<String>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(self, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.push(url, Canned::Body(body.into()));
        self
    }

    pub fn push(&self, url: impl Into<String>, reply: Canned) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.entry(url.into()).or_default().push_back(reply);
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == url).count()
    }

    fn respond(&self, url: &str) -> Result<Option<Vec<u8>>> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(url.to_string());
        }
        let reply = {
            let mut replies = self
                .replies
                .lock()
                .map_err(|_| ScanError::Other("fetcher lock poisoned".into()))?;
            match replies.get_mut(url) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };
        match reply.unwrap_or(Canned::NotFound) {
            Canned::Body(body) => Ok(Some(body)),
            Canned::NotFound => Ok(None),
            Canned::NetworkError => Err(ScanError::Other(format!("connection reset: {url}"))),
        }
    }
}

impl Fetcher for MemoryFetcher {
    fn fetch(
        &self,
        url: &str,
        _timeout: Duration,
    ) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send {
        let reply = self.respond(url);
        async move { reply }
    }
}

/// Exponential backoff: each failed attempt sleeps for the current timeout and
/// then doubles it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub base_timeout: Duration,
    pub retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_timeout: Duration::from_secs(4),
            retries: 8,
        }
    }
}

/// Fetch `url` under `policy`. Never fails: terminal statuses and exhausted
/// retries both come back as `None`.
pub async fn request_retry<F: Fetcher>(
    fetcher: &F,
    url: &str,
    policy: RetryPolicy,
) -> Option<Vec<u8>> {
    let mut timeout = policy.base_timeout;
    let attempts = policy.retries.max(1);
    for attempt in 1..=attempts {
        match fetcher.fetch(url, timeout).await {
            Ok(body) => return body,
            Err(e) => {
                warn!("Attempt {}/{} for {} failed: {}", attempt, attempts, url, e);
                if attempt < attempts {
                    tokio::time::sleep(timeout).await;
                    timeout *= 2;
                }
            }
        }
    }
    warn!("Giving up on {} after {} attempts", url, attempts);
    None
}
