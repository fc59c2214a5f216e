//! Object storage access
//!
//! The scanner only ever needs two things from a storage backend: list one
//! page of entries under a prefix and turn an object path into a public URL.
//! `ObjectStorage` captures exactly that, `HttpObjectStorage` implements it
//! against a Supabase-style storage API, and `InMemoryStorage` provides a
//! deterministic backend for tests and local dry runs.

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroU32;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

use super::config::StorageConfig;

/// Failures surfaced by a storage backend. The scanner retries everything
/// except `Cancelled`, which aborts the scan immediately.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage configuration invalid: {0}")]
    Configuration(String),

    #[error("storage listing failed for prefix '{prefix}': {source}")]
    Request {
        prefix: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("storage API returned {status} for prefix '{prefix}'")]
    Status { prefix: String, status: StatusCode },

    #[error("storage listing for prefix '{prefix}' returned malformed JSON: {source}")]
    Decode {
        prefix: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("storage operation cancelled")]
    Cancelled,
}

/// One entry of a listing page, as reported by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageEntry {
    pub name: String,

    /// Object id. Folder placeholders come back without one.
    pub id: Option<String>,

    /// Backend metadata blob (mimetype, size, ...). Absent for folders.
    pub metadata: Option<serde_json::Value>,

    /// Explicit directory flag. Newer backends send it; when present it is
    /// authoritative and overrides any inference from the other fields.
    #[serde(default, alias = "isDirectory")]
    pub is_directory: Option<bool>,
}

impl StorageEntry {
    /// Whether this entry is a folder placeholder rather than an object.
    ///
    /// The explicit flag wins when the backend sends one. Otherwise fall
    /// back to the legacy inference: no id, no metadata and no dot in the
    /// name means folder.
    pub fn is_folder(&self) -> bool {
        match self.is_directory {
            Some(flag) => flag,
            None => self.id.is_none() && self.metadata.is_none() && !self.name.contains('.'),
        }
    }
}

/// Listing access to an object storage bucket.
///
/// `list` must return entries sorted by name so repeated scans of an
/// unchanged bucket produce the same flat file order, which resume via
/// `scan_cursor` depends on.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// One page of entries directly under `prefix`, sorted by name,
    /// starting at `offset` and at most `limit` entries long.
    async fn list(
        &self,
        prefix: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<StorageEntry>, StorageError>;

    /// Public URL for the object at `path`.
    fn public_url(&self, path: &str) -> String;
}

#[derive(Serialize)]
struct ListRequest<'a> {
    prefix: &'a str,
    limit: u32,
    offset: u32,
    #[serde(rename = "sortBy")]
    sort_by: SortBy,
}

#[derive(Serialize)]
struct SortBy {
    column: &'static str,
    order: &'static str,
}

/// Storage client talking to a Supabase-style storage API with client-side
/// rate limiting.
pub struct HttpObjectStorage {
    client: Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    endpoint: String,
    bucket: String,
}

impl HttpObjectStorage {
    pub fn new(config: &StorageConfig) -> Result<Self, StorageError> {
        let endpoint = config.endpoint.trim_end_matches('/').to_string();
        if endpoint.is_empty() {
            return Err(StorageError::Configuration(
                "storage endpoint is not set".to_string(),
            ));
        }
        Url::parse(&endpoint).map_err(|e| {
            StorageError::Configuration(format!("storage endpoint '{endpoint}' is not a URL: {e}"))
        })?;
        if config.bucket.trim().is_empty() {
            return Err(StorageError::Configuration(
                "storage bucket is not set".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        if let Some(api_key) = config.api_key.as_deref() {
            let bearer = HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|_| {
                StorageError::Configuration(
                    "storage API key contains characters not valid in a header".to_string(),
                )
            })?;
            let bare = HeaderValue::from_str(api_key).map_err(|_| {
                StorageError::Configuration(
                    "storage API key contains characters not valid in a header".to_string(),
                )
            })?;
            headers.insert(AUTHORIZATION, bearer);
            headers.insert(HeaderName::from_static("apikey"), bare);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .default_headers(headers)
            .build()
            .map_err(|e| {
                StorageError::Configuration(format!("failed to create HTTP client: {e}"))
            })?;

        let quota = Quota::per_second(
            NonZeroU32::new(config.max_requests_per_second).ok_or_else(|| {
                StorageError::Configuration("rate limit must be greater than 0".to_string())
            })?,
        );

        Ok(Self {
            client,
            rate_limiter: RateLimiter::direct(quota),
            endpoint,
            bucket: config.bucket.clone(),
        })
    }
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    async fn list(
        &self,
        prefix: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<StorageEntry>, StorageError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/object/list/{}", self.endpoint, self.bucket);
        debug!(
            "Listing storage page: prefix='{}' offset={} limit={}",
            prefix, offset, limit
        );

        let response = self
            .client
            .post(&url)
            .json(&ListRequest {
                prefix,
                limit,
                offset,
                sort_by: SortBy {
                    column: "name",
                    order: "asc",
                },
            })
            .send()
            .await
            .map_err(|source| StorageError::Request {
                prefix: prefix.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::Status {
                prefix: prefix.to_string(),
                status,
            });
        }

        response
            .json::<Vec<StorageEntry>>()
            .await
            .map_err(|source| StorageError::Decode {
                prefix: prefix.to_string(),
                source,
            })
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/object/public/{}/{}", self.endpoint, self.bucket, path)
    }
}

/// Deterministic in-memory storage backend.
///
/// Seeded with full object paths, it reproduces the real backend's listing
/// behavior: one level of children per call, folders synthesized from path
/// segments, entries sorted by name, offset pagination. Tests can inject a
/// number of failing responses per prefix to exercise retry handling.
pub struct InMemoryStorage {
    paths: Vec<String>,
    base_url: String,
    explicit_directory_flags: bool,
    injected_failures: Mutex<HashMap<String, u32>>,
}

impl InMemoryStorage {
    pub fn new(paths: &[&str]) -> Self {
        let mut paths: Vec<String> = paths.iter().map(|p| p.trim_matches('/').to_string()).collect();
        paths.sort();
        paths.dedup();
        Self {
            paths,
            base_url: "memory://bucket".to_string(),
            explicit_directory_flags: true,
            injected_failures: Mutex::new(HashMap::new()),
        }
    }

    /// Stop sending `is_directory` flags so listings look like an older
    /// backend and folder detection has to use the legacy inference.
    pub fn without_directory_flags(mut self) -> Self {
        self.explicit_directory_flags = false;
        self
    }

    /// The next `times` listings of `prefix` fail with a 503 before the
    /// backend recovers.
    pub fn fail_listing(&self, prefix: &str, times: u32) {
        if let Ok(mut failures) = self.injected_failures.lock() {
            failures.insert(prefix.to_string(), times);
        }
    }

    fn children_of(&self, prefix: &str) -> Vec<StorageEntry> {
        let prefix = prefix.trim_matches('/');
        // name -> is_folder, BTreeMap for the sorted order the contract wants
        let mut children: BTreeMap<String, bool> = BTreeMap::new();
        for path in &self.paths {
            let remainder = if prefix.is_empty() {
                path.as_str()
            } else {
                match path.strip_prefix(prefix).and_then(|r| r.strip_prefix('/')) {
                    Some(remainder) => remainder,
                    None => continue,
                }
            };
            if remainder.is_empty() {
                continue;
            }
            match remainder.split_once('/') {
                Some((folder, _)) => {
                    children.insert(folder.to_string(), true);
                }
                None => {
                    children.insert(remainder.to_string(), false);
                }
            }
        }

        children
            .into_iter()
            .map(|(name, is_folder)| {
                if is_folder {
                    StorageEntry {
                        name,
                        id: None,
                        metadata: None,
                        is_directory: self.explicit_directory_flags.then_some(true),
                    }
                } else {
                    StorageEntry {
                        id: Some(format!("obj-{name}")),
                        metadata: Some(serde_json::json!({ "mimetype": "image/jpeg" })),
                        is_directory: self.explicit_directory_flags.then_some(false),
                        name,
                    }
                }
            })
            .collect()
    }
}

#[async_trait]
impl ObjectStorage for InMemoryStorage {
    async fn list(
        &self,
        prefix: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<StorageEntry>, StorageError> {
        if let Ok(mut failures) = self.injected_failures.lock() {
            if let Some(remaining) = failures.get_mut(prefix) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(StorageError::Status {
                        prefix: prefix.to_string(),
                        status: StatusCode::SERVICE_UNAVAILABLE,
                    });
                }
            }
        }

        Ok(self
            .children_of(prefix)
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}
