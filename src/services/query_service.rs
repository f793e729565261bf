use crate::error::{ApiError, Result};
use crate::services::request_service::RequestService;
use crate::services::session_service::SessionService;
use backon::{ExponentialBuilder, Retryable};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What a read query resolves to when the request pipeline gives up on a
/// 401.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnauthorizedBehavior {
    /// Resolve to `None` and let the caller render an empty state.
    ReturnNone,
    /// Clear the session (observers see `Anonymous`) and resolve to `None`.
    Logout,
    /// Surface the error to the caller.
    #[default]
    Propagate,
}

#[derive(Debug)]
struct CacheEntry {
    value: serde_json::Value,
    fetched_at: Instant,
}

/// Read-side cache over the request pipeline: per-key freshness window,
/// bounded retry with backoff, and a configurable 401 policy. Entries are
/// last-write-wins in resolution order. Dropping the future returned by
/// [`fetch`](Self::fetch) cancels the underlying request.
///
/// Mutations do not belong here; they go through [`RequestService`]
/// directly and are never retried.
#[derive(Debug, Clone)]
pub struct QueryService {
    requests: RequestService,
    session: SessionService,
    cache: Arc<DashMap<String, CacheEntry>>,
    ttl: Duration,
    max_attempts: usize,
}

impl QueryService {
    #[must_use]
    pub fn new(
        requests: RequestService,
        session: SessionService,
        ttl: Duration,
        max_attempts: usize,
    ) -> Self {
        Self { requests, session, cache: Arc::new(DashMap::new()), ttl, max_attempts }
    }

    /// Fetches `path`, serving from cache while the entry under `key` is
    /// fresh.
    ///
    /// # Errors
    /// Propagates the request error once the retry budget is spent.
    /// Unauthorized results follow `on_unauthorized` instead.
    pub async fn fetch<T: DeserializeOwned>(
        &self,
        key: &str,
        path: &str,
        on_unauthorized: UnauthorizedBehavior,
    ) -> Result<Option<T>> {
        if let Some(entry) = self.cache.get(key) {
            if entry.fetched_at.elapsed() < self.ttl {
                tracing::trace!(key, "Query served from cache");
                return decode(entry.value.clone()).map(Some);
            }
        }

        match self.fetch_with_retry(path).await {
            Ok(value) => {
                self.cache
                    .insert(key.to_string(), CacheEntry { value: value.clone(), fetched_at: Instant::now() });
                decode(value).map(Some)
            }
            Err(ApiError::Unauthorized) => match on_unauthorized {
                UnauthorizedBehavior::ReturnNone => Ok(None),
                UnauthorizedBehavior::Logout => {
                    self.session.invalidate();
                    Ok(None)
                }
                UnauthorizedBehavior::Propagate => Err(ApiError::Unauthorized),
            },
            Err(e) => Err(e),
        }
    }

    /// Drops the cached entry under `key`; the next fetch goes to the
    /// network. Mutation call sites use this after writing.
    pub fn invalidate(&self, key: &str) {
        self.cache.remove(key);
    }

    pub fn invalidate_all(&self) {
        self.cache.clear();
    }

    async fn fetch_with_retry(&self, path: &str) -> Result<serde_json::Value> {
        let retries = self.max_attempts.saturating_sub(1);
        (|| async { self.requests.get::<serde_json::Value>(path).await })
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_millis(200))
                    .with_max_times(retries),
            )
            .when(ApiError::is_retryable)
            .notify(|err, dur| tracing::debug!(error = %err, retry_in = ?dur, "Retrying query"))
            .await
    }
}

fn decode<T: DeserializeOwned>(value: serde_json::Value) -> Result<T> {
    serde_json::from_value(value).map_err(|_| ApiError::InvalidResponse)
}
