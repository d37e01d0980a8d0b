//! HTTP fetch utilities + timestamped snapshot persistence for WOF.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, Semaphore};
use tracing::info_span;
use uuid::Uuid;

pub const CRATE_NAME: &str = "wof-storage";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub global_concurrency: usize,
    pub per_source_concurrency: usize,
    pub backoff: BackoffPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
            global_concurrency: 16,
            per_source_concurrency: 4,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// One outgoing GET. `source_id` scopes the per-source concurrency limit;
/// query pairs and headers are appended to the bare URL.
#[derive(Debug, Clone, Default)]
pub struct FetchRequest<'a> {
    pub source_id: &'a str,
    pub url: &'a str,
    pub query: &'a [(&'a str, String)],
    pub headers: &'a [(&'a str, &'a str)],
}

impl<'a> FetchRequest<'a> {
    pub fn get(source_id: &'a str, url: &'a str) -> Self {
        Self {
            source_id,
            url,
            query: &[],
            headers: &[],
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub final_url: String,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl FetchedResponse {
    pub fn is_json(&self) -> bool {
        self.content_type.contains("application/json")
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed after retries: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("invalid url {url}: {message}")]
    InvalidUrl { url: String, message: String },
}

/// Retrying GET client with bounded global and per-source concurrency.
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    global_limit: Arc<Semaphore>,
    per_source_limit: usize,
    per_source: Mutex<HashMap<String, Arc<Semaphore>>>,
    backoff: BackoffPolicy,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;

        Ok(Self {
            client,
            global_limit: Arc::new(Semaphore::new(config.global_concurrency.max(1))),
            per_source_limit: config.per_source_concurrency.max(1),
            per_source: Mutex::new(HashMap::new()),
            backoff: config.backoff,
        })
    }

    async fn per_source_semaphore(&self, source_id: &str) -> Arc<Semaphore> {
        let mut map = self.per_source.lock().await;
        map.entry(source_id.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_source_limit)))
            .clone()
    }

    pub async fn fetch(&self, request: FetchRequest<'_>) -> Result<FetchedResponse, FetchError> {
        let url = if request.query.is_empty() {
            reqwest::Url::parse(request.url)
        } else {
            reqwest::Url::parse_with_params(request.url, request.query.iter().cloned())
        }
        .map_err(|err| FetchError::InvalidUrl {
            url: request.url.to_string(),
            message: err.to_string(),
        })?;

        let _global = self.global_limit.acquire().await.expect("semaphore not closed");
        let per_source = self.per_source_semaphore(request.source_id).await;
        let _source = per_source.acquire().await.expect("semaphore not closed");

        let span = info_span!("http_fetch", source_id = request.source_id, url = %url);
        let _guard = span.enter();

        let mut last_request_error: Option<reqwest::Error> = None;

        for attempt in 0..=self.backoff.max_retries {
            let mut builder = self.client.get(url.clone());
            for (name, value) in request.headers {
                builder = builder.header(*name, *value);
            }

            match builder.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let final_url = resp.url().to_string();
                    let content_type = resp
                        .headers()
                        .get(reqwest::header::CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_lowercase();

                    if status.is_success() {
                        let body = resp.bytes().await?.to_vec();
                        return Ok(FetchedResponse {
                            status,
                            final_url,
                            content_type,
                            body,
                        });
                    }

                    let disposition = classify_status(status);
                    if disposition == RetryDisposition::Retryable && attempt < self.backoff.max_retries
                    {
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }

                    return Err(FetchError::HttpStatus {
                        status: status.as_u16(),
                        url: final_url,
                    });
                }
                Err(err) => {
                    let disposition = classify_reqwest_error(&err);
                    if disposition == RetryDisposition::Retryable && attempt < self.backoff.max_retries
                    {
                        last_request_error = Some(err);
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }
                    return Err(FetchError::Request(err));
                }
            }
        }

        Err(FetchError::Request(
            last_request_error.expect("retry loop should capture a request error"),
        ))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotEnvelope<T> {
    saved_at: DateTime<Utc>,
    data: T,
}

/// Named, timestamped JSON snapshots with atomic temp-file rename.
/// The persistent tier of the location hierarchy cache.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.json"))
    }

    pub async fn save<T: Serialize>(
        &self,
        name: &str,
        saved_at: DateTime<Utc>,
        data: &T,
    ) -> anyhow::Result<()> {
        let path = self.path_for(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating snapshot directory {}", parent.display()))?;
        }

        let envelope = SnapshotEnvelope { saved_at, data };
        let bytes = serde_json::to_vec(&envelope).context("serializing snapshot")?;

        let temp_path = path
            .parent()
            .expect("snapshot path always has parent")
            .join(format!(".{}.tmp", Uuid::new_v4()));

        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("opening temp snapshot file {}", temp_path.display()))?;
        file.write_all(&bytes)
            .await
            .with_context(|| format!("writing temp snapshot file {}", temp_path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("flushing temp snapshot file {}", temp_path.display()))?;
        drop(file);

        match fs::rename(&temp_path, &path).await {
            Ok(()) => Ok(()),
            Err(err) => {
                let _ = fs::remove_file(&temp_path).await;
                Err(err).with_context(|| {
                    format!(
                        "atomically renaming snapshot {} -> {}",
                        temp_path.display(),
                        path.display()
                    )
                })
            }
        }
    }

    /// Load a snapshot no older than `max_age` at instant `now`. Missing,
    /// corrupt, or stale snapshots all read as absent.
    pub async fn load<T: DeserializeOwned>(
        &self,
        name: &str,
        now: DateTime<Utc>,
        max_age: Duration,
    ) -> Option<(T, DateTime<Utc>)> {
        let path = self.path_for(name);
        let bytes = fs::read(&path).await.ok()?;
        let envelope: SnapshotEnvelope<T> = serde_json::from_slice(&bytes).ok()?;
        let age = now.signed_duration_since(envelope.saved_at);
        if age < chrono::Duration::zero() {
            return None;
        }
        if age.to_std().ok()? > max_age {
            return None;
        }
        Some((envelope.data, envelope.saved_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn backoff_logic_is_exponential_and_capped() {
        let policy = BackoffPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(350));
    }

    #[test]
    fn server_errors_and_throttling_are_retryable() {
        assert_eq!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR),
            RetryDisposition::Retryable
        );
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            RetryDisposition::Retryable
        );
        assert_eq!(
            classify_status(StatusCode::NOT_FOUND),
            RetryDisposition::NonRetryable
        );
    }

    #[tokio::test]
    async fn snapshot_roundtrip_within_ttl() {
        let dir = tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path());
        let saved_at = Utc::now();

        store
            .save("locations", saved_at, &vec!["Belgique".to_string()])
            .await
            .expect("save");

        let loaded: Option<(Vec<String>, _)> = store
            .load("locations", saved_at + chrono::Duration::hours(1), Duration::from_secs(12 * 3600))
            .await;
        let (data, stamp) = loaded.expect("fresh snapshot");
        assert_eq!(data, vec!["Belgique".to_string()]);
        assert_eq!(stamp, saved_at);
    }

    #[tokio::test]
    async fn stale_snapshot_reads_as_absent() {
        let dir = tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path());
        let saved_at = Utc::now();

        store
            .save("locations", saved_at, &vec![1, 2, 3])
            .await
            .expect("save");

        let loaded: Option<(Vec<i32>, _)> = store
            .load("locations", saved_at + chrono::Duration::hours(13), Duration::from_secs(12 * 3600))
            .await;
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn corrupt_snapshot_reads_as_absent() {
        let dir = tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path());
        tokio::fs::write(store.path_for("locations"), b"not json")
            .await
            .expect("write");

        let loaded: Option<(Vec<i32>, _)> = store
            .load("locations", Utc::now(), Duration::from_secs(3600))
            .await;
        assert!(loaded.is_none());
    }
}
