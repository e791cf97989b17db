//! Query execution engine.
//!
//! Resolves a key to data through the store. Concurrent loads of one key share
//! a single in-flight request; results of superseded requests are discarded by
//! the store and the waiting callers follow the newer request instead.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use metrics::{counter, histogram};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::RequestError;

use super::entry::{CacheEntry, RequestId};
use super::keys::QueryKey;
use super::lock::lock_or_recover;
use super::store::{CacheStore, Listener, Resolution, Subscription};

const SOURCE: &str = "cache::engine";
const METRIC_HIT: &str = "atelier_query_hit_total";
const METRIC_MISS: &str = "atelier_query_miss_total";
const METRIC_DEDUP: &str = "atelier_query_dedup_total";
const METRIC_DISCARDED: &str = "atelier_query_discarded_total";
const METRIC_FETCH_MS: &str = "atelier_query_fetch_ms";

/// How many superseded requests a single `load` follows before returning what it has.
const MAX_SUPERSEDED_FOLLOWS: usize = 8;

/// Produces the server value for one query key.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self) -> Result<Value, RequestError>;
}

/// Adapts an async closure into a [`Fetcher`].
pub struct FnFetcher<F>(F);

#[async_trait]
impl<F, Fut> Fetcher for FnFetcher<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, RequestError>> + Send,
{
    async fn fetch(&self) -> Result<Value, RequestError> {
        (self.0)().await
    }
}

pub fn fetcher_fn<F, Fut>(f: F) -> Arc<dyn Fetcher>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, RequestError>> + Send + 'static,
{
    Arc::new(FnFetcher(f))
}

#[derive(Debug, Clone)]
struct FetchOutcome {
    result: Result<Value, RequestError>,
    resolution: Resolution,
}

type SharedFetch = Shared<BoxFuture<'static, FetchOutcome>>;

struct InFlight {
    request_id: RequestId,
    future: SharedFetch,
}

struct EngineInner {
    store: Arc<CacheStore>,
    in_flight: Mutex<HashMap<QueryKey, InFlight>>,
    watched: Mutex<HashMap<QueryKey, Vec<(u64, Arc<dyn Fetcher>)>>>,
    next_watch: Mutex<u64>,
}

/// Cheap to clone; all clones share one in-flight table.
#[derive(Clone)]
pub struct QueryEngine {
    inner: Arc<EngineInner>,
}

impl QueryEngine {
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                store,
                in_flight: Mutex::new(HashMap::new()),
                watched: Mutex::new(HashMap::new()),
                next_watch: Mutex::new(0),
            }),
        }
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.inner.store
    }

    /// Resolve `key` to data.
    ///
    /// Fresh data is returned without network access. Otherwise the caller joins
    /// the in-flight request for the key, or issues one.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn load(
        &self,
        key: &QueryKey,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Value, RequestError> {
        let mut outcome = None;
        for _ in 0..MAX_SUPERSEDED_FOLLOWS {
            let entry = self.inner.store.get(key);
            if entry.is_fresh()
                && let Some(data) = entry.data
            {
                counter!(METRIC_HIT).increment(1);
                return Ok(data);
            }
            counter!(METRIC_MISS).increment(1);

            let fetched = self.begin(key, &fetcher, false).await;
            if fetched.resolution == Resolution::Applied {
                return fetched.result;
            }
            debug!("Joined request was superseded, following the newer one");
            outcome = Some(fetched);
        }

        match outcome {
            Some(fetched) => fetched.result,
            None => Err(RequestError::network("no request was issued")),
        }
    }

    /// `load` followed by deserialization into `T`.
    pub async fn load_as<T: DeserializeOwned>(
        &self,
        key: &QueryKey,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<T, RequestError> {
        let value = self.load(key, fetcher).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Issue a new request for `key` regardless of its state.
    ///
    /// Any request already in flight for the key is superseded.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn refetch(
        &self,
        key: &QueryKey,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Value, RequestError> {
        let fetched = self.begin(key, &fetcher, true).await;
        if fetched.resolution == Resolution::Applied {
            return fetched.result;
        }
        self.load(key, fetcher).await
    }

    /// Return the current snapshot immediately and start a background fetch if
    /// the entry is not fresh. Requires a Tokio runtime for the background fetch.
    pub fn observe(&self, key: &QueryKey, fetcher: Arc<dyn Fetcher>) -> CacheEntry {
        let entry = self.inner.store.get(key);
        if entry.is_fresh() || entry.is_fetching() {
            return entry;
        }
        drop(self.begin(key, &fetcher, false));
        self.inner.store.get(key)
    }

    /// Subscribe to `key` and keep it loaded.
    ///
    /// The fetcher is remembered while the watch lives so that invalidating the
    /// key refetches it immediately.
    pub fn watch(&self, key: &QueryKey, fetcher: Arc<dyn Fetcher>, listener: Listener) -> Watch {
        let subscription = self.inner.store.subscribe(key, listener);
        let id = {
            let mut next = lock_or_recover(&self.inner.next_watch, SOURCE, "watch");
            *next += 1;
            *next
        };
        lock_or_recover(&self.inner.watched, SOURCE, "watch")
            .entry(key.clone())
            .or_default()
            .push((id, Arc::clone(&fetcher)));
        self.observe(key, fetcher);

        Watch {
            id,
            engine: Arc::downgrade(&self.inner),
            subscription: Some(subscription),
        }
    }

    /// Refetch every watched key among `keys`. Keys nobody watches stay stale
    /// until their next observation.
    pub fn refetch_watched(&self, keys: &[QueryKey]) -> usize {
        let targets: Vec<(QueryKey, Arc<dyn Fetcher>)> = {
            let watched = lock_or_recover(&self.inner.watched, SOURCE, "refetch_watched");
            keys.iter()
                .filter_map(|key| {
                    watched
                        .get(key)
                        .and_then(|list| list.first())
                        .map(|(_, fetcher)| (key.clone(), Arc::clone(fetcher)))
                })
                .collect()
        };

        for (key, fetcher) in &targets {
            drop(self.begin(key, fetcher, false));
        }
        if !targets.is_empty() {
            debug!(count = targets.len(), "Refetching watched keys");
        }
        targets.len()
    }

    pub fn is_watched(&self, key: &QueryKey) -> bool {
        lock_or_recover(&self.inner.watched, SOURCE, "is_watched").contains_key(key)
    }

    pub fn in_flight_count(&self) -> usize {
        lock_or_recover(&self.inner.in_flight, SOURCE, "in_flight_count").len()
    }

    /// Forget every watch registration. Used at session teardown.
    pub fn clear_watches(&self) {
        lock_or_recover(&self.inner.watched, SOURCE, "clear_watches").clear();
    }

    /// Join or issue the request for `key` and return its shared outcome.
    fn begin(&self, key: &QueryKey, fetcher: &Arc<dyn Fetcher>, force: bool) -> SharedFetch {
        let mut in_flight = lock_or_recover(&self.inner.in_flight, SOURCE, "begin");
        let (mut ticket, mut deferred) = self.inner.store.begin_fetch(key, force);

        if !ticket.issued {
            if let Some(existing) = in_flight.get(key)
                && existing.request_id == ticket.request_id
            {
                counter!(METRIC_DEDUP).increment(1);
                let future = existing.future.clone();
                drop(in_flight);
                deferred.fire();
                return future;
            }
            // Marked fetching outside this engine; take the key over with a new request.
            deferred.fire();
            (ticket, deferred) = self.inner.store.begin_fetch(key, true);
        }

        let future = self.spawn_fetch(key.clone(), ticket.request_id, Arc::clone(fetcher));
        in_flight.insert(
            key.clone(),
            InFlight {
                request_id: ticket.request_id,
                future: future.clone(),
            },
        );
        drop(in_flight);
        deferred.fire();
        future
    }

    fn spawn_fetch(
        &self,
        key: QueryKey,
        request_id: RequestId,
        fetcher: Arc<dyn Fetcher>,
    ) -> SharedFetch {
        let store = Arc::clone(&self.inner.store);
        let engine: Weak<EngineInner> = Arc::downgrade(&self.inner);

        let future = async move {
            let started_at = Instant::now();
            let result = fetcher.fetch().await;
            histogram!(METRIC_FETCH_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);

            let resolution = store.complete(&key, request_id, result.clone());
            if resolution == Resolution::Discarded {
                counter!(METRIC_DISCARDED).increment(1);
            }

            if let Some(engine) = engine.upgrade() {
                let mut in_flight = lock_or_recover(&engine.in_flight, SOURCE, "finish");
                if in_flight
                    .get(&key)
                    .is_some_and(|current| current.request_id == request_id)
                {
                    in_flight.remove(&key);
                }
            }

            FetchOutcome { result, resolution }
        }
        .boxed()
        .shared();

        // Drive the request to completion even if every caller stops waiting.
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(future.clone());
        }
        future
    }
}

/// A live subscription plus the fetcher registration that keeps the key loaded.
#[must_use = "dropping a watch unsubscribes immediately"]
pub struct Watch {
    id: u64,
    engine: Weak<EngineInner>,
    subscription: Option<Subscription>,
}

impl Watch {
    pub fn key(&self) -> Option<&QueryKey> {
        self.subscription.as_ref().map(Subscription::key)
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Watch {
    fn drop(&mut self) {
        let Some(subscription) = self.subscription.take() else {
            return;
        };
        if let Some(engine) = self.engine.upgrade() {
            let mut watched = lock_or_recover(&engine.watched, SOURCE, "unwatch");
            if let Some(list) = watched.get_mut(subscription.key()) {
                list.retain(|(id, _)| *id != self.id);
                if list.is_empty() {
                    watched.remove(subscription.key());
                }
            }
        }
        drop(subscription);
    }
}
