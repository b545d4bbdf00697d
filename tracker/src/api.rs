//! Backend API used by the tracker.
//!
//! Two endpoints matter to read tracking:
//!
//! - `POST /api/content/batch-read` with `{"ids": [...]}` marks a batch read.
//!   The batch succeeds or fails as a whole.
//! - `GET /api/content/stats` returns aggregate counts (`total`, `unread`,
//!   `read`) and is refreshed after every successful batch.
//!
//! Responses use the backend envelope `{"code": 0, "data": ..., "message": "ok"}`.
//! A non-zero `code` is a failure even on HTTP 200.
//!
//! The batch commit has no request timeout. A hung request holds back only
//! the ids it carries until it settles.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Mutex, PoisonError};

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::types::{ContentStats, ItemId};

const BATCH_READ_PATH: &str = "/api/content/batch-read";
const STATS_PATH: &str = "/api/content/stats";

/// Errors returned by the backend API.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Transport-level failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server returned a non-success status.
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    /// Backend envelope reported an error code.
    #[error("backend error {code}: {message}")]
    Backend { code: i64, message: String },

    /// Response carried no `data` where some was required.
    #[error("response carried no data")]
    MissingData,

    /// Response body could not be decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API key contains characters not allowed in a header.
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
}

/// Operations the tracker needs from the backend.
pub trait ContentApi: Send + Sync + 'static {
    /// Marks every id in the batch read. Fails as a whole.
    fn mark_read(&self, ids: &[ItemId]) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Fetches aggregate read counts.
    fn fetch_stats(&self) -> impl Future<Output = Result<ContentStats, ApiError>> + Send;
}

#[derive(Serialize)]
struct BatchReadRequest<'a> {
    ids: &'a [ItemId],
}

#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    code: i64,
    data: Option<T>,
    #[serde(default)]
    message: String,
}

/// HTTP client for the content backend.
#[derive(Debug, Clone)]
pub struct HttpContentApi {
    base_url: String,
    client: Client,
}

impl HttpContentApi {
    /// Creates a client for `base_url`, sending `api_key` as `X-API-Key` if given.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InvalidHeader` if the key is not a valid header value
    /// and `ApiError::Http` if the client cannot be built.
    pub fn new(base_url: impl Into<String>, api_key: Option<&str>) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            let mut value = HeaderValue::from_str(key)?;
            value.set_sensitive(true);
            headers.insert("X-API-Key", value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .pool_max_idle_per_host(10)
            .build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl ContentApi for HttpContentApi {
    async fn mark_read(&self, ids: &[ItemId]) -> Result<(), ApiError> {
        let url = self.url(BATCH_READ_PATH);
        debug!(url = %url, ids = ids.len(), "Sending batch read");

        let response = self
            .client
            .post(&url)
            .json(&BatchReadRequest { ids })
            .send()
            .await?;

        let body = read_success_body(response).await?;
        if body.trim().is_empty() {
            return Ok(());
        }

        let envelope: Envelope<serde_json::Value> = serde_json::from_str(&body)?;
        check_code(&envelope)?;
        Ok(())
    }

    async fn fetch_stats(&self) -> Result<ContentStats, ApiError> {
        let url = self.url(STATS_PATH);
        let response = self.client.get(&url).send().await?;
        let body = read_success_body(response).await?;

        let envelope: Envelope<ContentStats> = serde_json::from_str(&body)?;
        check_code(&envelope)?;
        envelope.data.ok_or(ApiError::MissingData)
    }
}

async fn read_success_body(response: Response) -> Result<String, ApiError> {
    let status = response.status();
    let body = response.text().await?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(ApiError::Status {
            status: status.as_u16(),
            message: body,
        })
    }
}

fn check_code<T>(envelope: &Envelope<T>) -> Result<(), ApiError> {
    if envelope.code == 0 {
        Ok(())
    } else {
        Err(ApiError::Backend {
            code: envelope.code,
            message: envelope.message.clone(),
        })
    }
}

/// API that commits nothing and only logs what it would have sent.
///
/// Stats report only the ids this instance has "committed".
#[derive(Debug, Default)]
pub struct DryRunApi {
    committed: Mutex<HashSet<ItemId>>,
}

impl DryRunApi {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn committed_count(&self) -> usize {
        self.committed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl ContentApi for DryRunApi {
    async fn mark_read(&self, ids: &[ItemId]) -> Result<(), ApiError> {
        let listed: Vec<&str> = ids.iter().map(ItemId::as_str).collect();
        info!(ids = ?listed, "Dry run: would mark batch read");
        self.committed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(ids.iter().cloned());
        Ok(())
    }

    async fn fetch_stats(&self) -> Result<ContentStats, ApiError> {
        let read = self.committed_count() as u64;
        Ok(ContentStats {
            total: read,
            unread: 0,
            read,
        })
    }
}
