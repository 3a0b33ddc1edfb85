//! Offline cache worker.
//!
//! Every client request flows through [`OfflineWorker::handle`], which picks a
//! strategy from the method and path: API reads go to the network first and
//! degrade to a synthesized 503, other reads are served from the cache first,
//! and writes bypass the cache entirely.

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const CACHE_NAME: &str = "rc-vocabulary-ai-v1";
pub const API_PREFIX: &str = "/api/";

/// App shell fetched on install.
pub const SHELL_ASSETS: &[&str] = &["/", "/index.html", "/styles.css", "/manifest.webmanifest"];

const OFFLINE_MESSAGE: &str = "Offline: cannot reach server";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStrategy {
    /// Left to the network untouched.
    Passthrough,
    NetworkFirst,
    CacheFirst,
}

pub fn select_strategy(method: &Method, path: &str) -> CacheStrategy {
    if *method != Method::GET {
        CacheStrategy::Passthrough
    } else if path.starts_with(API_PREFIX) {
        CacheStrategy::NetworkFirst
    } else {
        CacheStrategy::CacheFirst
    }
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<String>,
}

impl FetchRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: None,
        }
    }

    pub fn post_json(path: impl Into<String>, body: String) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            body: Some(body),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn offline() -> Self {
        Self {
            status: 503,
            content_type: Some("application/json".to_string()),
            body: json!({ "error": OFFLINE_MESSAGE }).to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Network(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("failed to fetch {path}: {source}")]
    Fetch { path: String, source: FetchError },
    #[error("{path} returned status {status}")]
    Status { path: String, status: u16 },
}

/// The network side of the worker.
pub trait Fetcher: Send + Sync {
    fn fetch<'a>(&'a self, request: &'a FetchRequest)
    -> BoxFuture<'a, Result<FetchResponse, FetchError>>;
}

/// Fetches relative paths against a base URL.
pub struct ReqwestFetcher {
    http: Client,
    base_url: String,
}

impl ReqwestFetcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn send(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self.http.request(request.method.clone(), url);
        if let Some(body) = &request.body {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body.clone());
        }
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());
        let body = response.text().await?;
        Ok(FetchResponse {
            status,
            content_type,
            body,
        })
    }
}

impl Fetcher for ReqwestFetcher {
    fn fetch<'a>(
        &'a self,
        request: &'a FetchRequest,
    ) -> BoxFuture<'a, Result<FetchResponse, FetchError>> {
        self.send(request).boxed()
    }
}

type CacheEntries = BTreeMap<String, FetchResponse>;

/// Named caches of responses keyed by request path.
#[derive(Default)]
pub struct CacheStorage {
    caches: RwLock<BTreeMap<String, CacheEntries>>,
}

/// Serializable copy of every cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub caches: BTreeMap<String, CacheEntries>,
}

impl CacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn restore(snapshot: CacheSnapshot) -> Self {
        Self {
            caches: RwLock::new(snapshot.caches),
        }
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        CacheSnapshot {
            caches: self.caches.read().clone(),
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.caches.read().keys().cloned().collect()
    }

    pub fn lookup(&self, cache: &str, path: &str) -> Option<FetchResponse> {
        self.caches.read().get(cache)?.get(path).cloned()
    }

    pub fn put(&self, cache: &str, path: &str, response: FetchResponse) {
        self.caches
            .write()
            .entry(cache.to_string())
            .or_default()
            .insert(path.to_string(), response);
    }

    /// Merges a fully populated batch into a cache under one lock.
    fn commit(&self, cache: &str, entries: CacheEntries) {
        self.caches
            .write()
            .entry(cache.to_string())
            .or_default()
            .extend(entries);
    }

    fn retain_only(&self, cache: &str) -> Vec<String> {
        let mut guard = self.caches.write();
        let stale: Vec<String> = guard.keys().filter(|key| *key != cache).cloned().collect();
        for key in &stale {
            guard.remove(key);
        }
        stale
    }
}

pub struct OfflineWorker<F> {
    fetcher: F,
    storage: Arc<CacheStorage>,
    cache_name: String,
}

impl<F: Fetcher> OfflineWorker<F> {
    pub fn new(fetcher: F, storage: Arc<CacheStorage>) -> Self {
        Self::with_cache_name(fetcher, storage, CACHE_NAME)
    }

    pub fn with_cache_name(
        fetcher: F,
        storage: Arc<CacheStorage>,
        cache_name: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            storage,
            cache_name: cache_name.into(),
        }
    }

    pub fn storage(&self) -> &Arc<CacheStorage> {
        &self.storage
    }

    /// Pre-caches the shell. Nothing is written unless every asset loads.
    pub async fn install(&self) -> Result<usize, InstallError> {
        let mut staged = CacheEntries::new();
        for path in SHELL_ASSETS {
            let request = FetchRequest::get(*path);
            let response =
                self.fetcher
                    .fetch(&request)
                    .await
                    .map_err(|source| InstallError::Fetch {
                        path: path.to_string(),
                        source,
                    })?;
            if !response.is_success() {
                return Err(InstallError::Status {
                    path: path.to_string(),
                    status: response.status,
                });
            }
            staged.insert(path.to_string(), response);
        }
        let count = staged.len();
        self.storage.commit(&self.cache_name, staged);
        info!(cache = %self.cache_name, assets = count, "offline shell cached");
        Ok(count)
    }

    /// Drops every cache left behind by an earlier version.
    pub fn activate(&self) -> Vec<String> {
        let removed = self.storage.retain_only(&self.cache_name);
        if !removed.is_empty() {
            info!(removed = ?removed, "stale offline caches deleted");
        }
        removed
    }

    pub async fn handle(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        match select_strategy(&request.method, &request.path) {
            CacheStrategy::Passthrough => self.fetcher.fetch(request).await,
            CacheStrategy::NetworkFirst => match self.fetcher.fetch(request).await {
                Ok(response) => Ok(response),
                Err(err) => {
                    warn!(path = %request.path, error = %err, "network unavailable, answering offline");
                    Ok(FetchResponse::offline())
                }
            },
            CacheStrategy::CacheFirst => {
                if let Some(cached) = self.storage.lookup(&self.cache_name, &request.path) {
                    debug!(path = %request.path, "served from offline cache");
                    return Ok(cached);
                }
                let response = self.fetcher.fetch(request).await?;
                if response.is_success() {
                    self.storage
                        .put(&self.cache_name, &request.path, response.clone());
                }
                Ok(response)
            }
        }
    }
}
