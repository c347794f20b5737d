#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Upstream content retrieval for the depot mirror engine
//!
//! The fetcher issues GET requests against `base_url + relative_path`,
//! classifies failures into not-found / transient / permanent, and retries
//! transient ones with bounded exponential backoff. Payloads are consumed
//! as chunk streams so large artifacts never require a second in-memory
//! copy.

mod backoff;

use bytes::{Bytes, BytesMut};
use depot_errors::{Error, FetchError};
use futures::{Stream, StreamExt};
use reqwest::{Client, Response, StatusCode};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Chunk stream of a fetched payload
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, Error>> + Send>>;

/// Fetcher configuration
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub pool_idle_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    /// Retry attempts for transient failures, in addition to the first try
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
    pub user_agent: String,
    /// Refuse payloads larger than this when buffering
    pub max_payload_bytes: Option<u64>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300), // 5 minutes for large artifacts
            connect_timeout: Duration::from_secs(30),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 10,
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
            user_agent: format!("depot/{}", env!("CARGO_PKG_VERSION")),
            max_payload_bytes: None,
        }
    }
}

/// Response established against the upstream, ready to be streamed
pub struct FetchedPayload {
    pub content_length: Option<u64>,
    pub stream: ByteStream,
}

/// HTTP fetcher with connection pooling and retry logic
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
    fetch_count: Arc<AtomicU64>,
}

impl Fetcher {
    /// Create a new fetcher
    ///
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| FetchError::Permanent {
                url: String::new(),
                message: format!("client construction failed: {e}"),
            })?;

        Ok(Self {
            client,
            config,
            fetch_count: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Create with default configuration
    ///
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn with_defaults() -> Result<Self, Error> {
        Self::new(FetchConfig::default())
    }

    /// Number of upstream GET transfers started so far.
    ///
    /// Counts whole fetch operations, not retry attempts; used to observe
    /// request-coalescing behavior.
    #[must_use]
    pub fn fetch_count(&self) -> u64 {
        self.fetch_count.load(Ordering::SeqCst)
    }

    /// Resolve `relative_path` against `base_url`
    ///
    /// # Errors
    /// Returns `FetchError::InvalidUrl` if the join is not a valid URL.
    pub fn unit_url(base_url: &Url, relative_path: &str) -> Result<Url, Error> {
        base_url
            .join(relative_path.trim_start_matches('/'))
            .map_err(|e| FetchError::InvalidUrl(format!("{base_url} + {relative_path}: {e}")).into())
    }

    /// Fetch a payload into memory, retrying transient failures.
    ///
    /// The body is still consumed chunk-wise and checked against the
    /// configured payload size limit as it accumulates.
    ///
    /// # Errors
    /// Returns `FetchError::NotFound` for a 404, `FetchError::Permanent`
    /// for other non-retryable failures, and the last `FetchError::Transient`
    /// once retries are exhausted.
    pub async fn fetch(&self, base_url: &Url, relative_path: &str) -> Result<Bytes, Error> {
        let limit = self.config.max_payload_bytes;
        self.fetch_with(base_url, relative_path, |payload| async move {
            collect_stream(payload, limit).await
        })
        .await
    }

    /// Fetch a payload and hand the established chunk stream to `consume`,
    /// retrying the whole transfer on transient failure.
    ///
    /// `consume` runs once per attempt and must be prepared to start over
    /// from a fresh stream; a transient error returned by it (for example a
    /// connection reset mid-body) triggers the same backoff-and-retry as a
    /// failure to establish the response.
    ///
    /// # Errors
    /// Same taxonomy as [`fetch`](Self::fetch); non-transient errors from
    /// `consume` propagate immediately.
    pub async fn fetch_with<T, F, Fut>(
        &self,
        base_url: &Url,
        relative_path: &str,
        mut consume: F,
    ) -> Result<T, Error>
    where
        F: FnMut(FetchedPayload) -> Fut,
        Fut: std::future::Future<Output = Result<T, Error>>,
    {
        let url = Self::unit_url(base_url, relative_path)?;
        self.fetch_count.fetch_add(1, Ordering::SeqCst);

        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = self.config.retry_delay(attempt);
                debug!(url = %url, attempt, delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), "retrying fetch");
                tokio::time::sleep(delay).await;
            }

            let result = match self.establish(&url).await {
                Ok(response) => {
                    let content_length = response.content_length();
                    let stream = body_stream(response, url.clone());
                    consume(FetchedPayload {
                        content_length,
                        stream,
                    })
                    .await
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let retryable = matches!(&e, Error::Fetch(fe) if fe.is_retryable());
                    if !retryable {
                        return Err(e);
                    }
                    warn!(url = %url, attempt, error = %e, "transient fetch failure");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            FetchError::Transient {
                url: url.to_string(),
                message: "retries exhausted".to_string(),
            }
            .into()
        }))
    }

    /// Issue one GET and classify the outcome
    async fn establish(&self, url: &Url) -> Result<Response, Error> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| classify_request_error(&e, url))?;

        classify_status(response, url)
    }
}

/// Map a reqwest send error into the fetch taxonomy
fn classify_request_error(error: &reqwest::Error, url: &Url) -> Error {
    let message = error.to_string();
    let url = url.to_string();
    if error.is_timeout() || error.is_connect() {
        FetchError::Transient { url, message }.into()
    } else if error.is_redirect() {
        FetchError::Permanent {
            url,
            message: format!("redirect loop: {message}"),
        }
        .into()
    } else {
        FetchError::Permanent { url, message }.into()
    }
}

/// Map a response status into the fetch taxonomy
fn classify_status(response: Response, url: &Url) -> Result<Response, Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = url.to_string();
    let err = if status == StatusCode::NOT_FOUND {
        FetchError::NotFound { url }
    } else if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        FetchError::Transient {
            url,
            message: format!("HTTP {status}"),
        }
    } else {
        FetchError::Permanent {
            url,
            message: format!("HTTP {status}"),
        }
    };
    Err(err.into())
}

/// Wrap a response body as a chunk stream; mid-body errors are transient
fn body_stream(response: Response, url: Url) -> ByteStream {
    Box::pin(response.bytes_stream().map(move |chunk| {
        chunk.map_err(|e| {
            FetchError::Transient {
                url: url.to_string(),
                message: format!("body read failed: {e}"),
            }
            .into()
        })
    }))
}

/// Accumulate a chunk stream, enforcing the payload size limit
async fn collect_stream(payload: FetchedPayload, limit: Option<u64>) -> Result<Bytes, Error> {
    let mut stream = payload.stream;
    let mut buf = BytesMut::with_capacity(
        usize::try_from(payload.content_length.unwrap_or(0)).unwrap_or(0),
    );

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        buf.extend_from_slice(&chunk);
        if let Some(limit) = limit {
            if buf.len() as u64 > limit {
                return Err(FetchError::TooLarge {
                    url: String::new(),
                    bytes: buf.len() as u64,
                }
                .into());
            }
        }
    }

    Ok(buf.freeze())
}
