//! Cache store.
//!
//! Owns every `CacheEntry` for the session. All state transitions go through
//! the narrow operation set below, each applied under one lock; listeners are
//! notified after the lock is released.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use lru::LruCache;
use metrics::counter;
use serde_json::Value;
use time::OffsetDateTime;
use tracing::debug;

use crate::error::RequestError;

use super::config::CacheConfig;
use super::entry::{CacheEntry, EntryStatus, RequestId};
use super::keys::QueryKey;
use super::lock::lock_or_recover;

const SOURCE: &str = "cache::store";
const METRIC_INVALIDATED: &str = "atelier_cache_invalidated_total";
const METRIC_EVICTED: &str = "atelier_cache_evict_total";

/// Callback fired on every status or data transition of one key.
pub type Listener = Arc<dyn Fn(&CacheEntry) + Send + Sync>;

/// Outcome of `mark_fetching`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub request_id: RequestId,
    /// False when the key was already fetching and the ticket names the existing request.
    pub issued: bool,
}

/// Outcome of completing a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Applied,
    /// A newer request was issued, or the entry was invalidated or overwritten meanwhile.
    Discarded,
}

struct Slot {
    entry: CacheEntry,
    last_issued: u64,
}

impl Slot {
    fn new(key: QueryKey) -> Self {
        Self {
            entry: CacheEntry::absent(key),
            last_issued: 0,
        }
    }
}

struct Inner {
    slots: LruCache<QueryKey, Slot>,
    listeners: HashMap<QueryKey, Vec<(u64, Listener)>>,
    next_listener: u64,
}

type Pending = Vec<(Listener, CacheEntry)>;

pub struct CacheStore {
    config: CacheConfig,
    inner: Mutex<Inner>,
    /// Source of request ids. Store-wide so ids never repeat for a key whose slot was evicted.
    next_request: AtomicU64,
}

impl CacheStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            config: config.clone(),
            inner: Mutex::new(Inner {
                slots: LruCache::unbounded(),
                listeners: HashMap::new(),
                next_listener: 0,
            }),
            next_request: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Read an entry, creating an absent one if the key was never seen.
    ///
    /// A fresh entry older than `stale_after` is transitioned to stale first.
    pub fn get(&self, key: &QueryKey) -> CacheEntry {
        let mut pending = Pending::new();
        let entry = {
            let mut inner = lock_or_recover(&self.inner, SOURCE, "get");
            let stale_after = self.config.stale_after;
            let slot = self.slot_mut(&mut inner, key);
            let mut aged = false;
            if let (Some(max_age), EntryStatus::Fresh, Some(updated)) =
                (stale_after, slot.entry.status, slot.entry.last_updated)
            {
                let age_ms = (OffsetDateTime::now_utc() - updated).whole_milliseconds();
                if u128::try_from(age_ms).unwrap_or(0) >= max_age.as_millis() {
                    slot.entry.status = EntryStatus::Stale;
                    aged = true;
                }
            }
            let entry = slot.entry.clone();
            if aged {
                debug!(key = %key, "Cache entry aged into stale");
                collect_listeners(&inner, &entry, &mut pending);
            }
            entry
        };
        notify(pending);
        entry
    }

    /// Read an entry without creating it or touching recency.
    pub fn peek(&self, key: &QueryKey) -> Option<CacheEntry> {
        lock_or_recover(&self.inner, SOURCE, "peek")
            .slots
            .peek(key)
            .map(|slot| slot.entry.clone())
    }

    /// Store fresh data for a key.
    ///
    /// Supersedes any in-flight request for the key, whose result will be discarded.
    pub fn put(&self, key: &QueryKey, data: Value) {
        self.transition(key, "put", |slot| {
            apply_fresh(&mut slot.entry, data);
            true
        });
        debug!(key = %key, "Cache entry stored");
    }

    /// Begin a fetch. If the key is already fetching, returns the existing request instead.
    pub fn mark_fetching(&self, key: &QueryKey) -> FetchTicket {
        let (ticket, deferred) = self.begin_fetch(key, false);
        deferred.fire();
        ticket
    }

    /// Issue a new request for `key` even if one is in flight, superseding it.
    pub fn force_fetching(&self, key: &QueryKey) -> FetchTicket {
        let (ticket, deferred) = self.begin_fetch(key, true);
        deferred.fire();
        ticket
    }

    /// Transition to fetching and hand back the listener calls instead of running them,
    /// so the caller can finish its own bookkeeping first.
    pub(crate) fn begin_fetch(&self, key: &QueryKey, force: bool) -> (FetchTicket, Deferred) {
        let mut ticket = None;
        let (_, pending) = self.transition_deferred(key, "mark_fetching", |slot| {
            if let (false, EntryStatus::Fetching, Some(existing)) =
                (force, slot.entry.status, slot.entry.in_flight)
            {
                ticket = Some(FetchTicket {
                    request_id: existing,
                    issued: false,
                });
                return false;
            }
            slot.last_issued = self.next_request.fetch_add(1, Ordering::Relaxed) + 1;
            let request_id = RequestId(slot.last_issued);
            slot.entry.status = EntryStatus::Fetching;
            slot.entry.in_flight = Some(request_id);
            ticket = Some(FetchTicket {
                request_id,
                issued: true,
            });
            true
        });
        // The closure always runs, so the ticket is always populated.
        let ticket = ticket.unwrap_or(FetchTicket {
            request_id: RequestId(0),
            issued: false,
        });
        (ticket, Deferred(pending))
    }

    /// Record a failed fetch. Prior data is kept; returns false unless the key was fetching.
    pub fn mark_error(&self, key: &QueryKey, error: RequestError) -> bool {
        self.transition(key, "mark_error", |slot| {
            if slot.entry.status != EntryStatus::Fetching {
                return false;
            }
            apply_error(&mut slot.entry, error);
            true
        })
    }

    /// Apply the outcome of `request_id` if it is still the latest request for the key.
    pub fn complete(
        &self,
        key: &QueryKey,
        request_id: RequestId,
        result: Result<Value, RequestError>,
    ) -> Resolution {
        let mut resolution = Resolution::Discarded;
        self.transition(key, "complete", |slot| {
            let current = slot.entry.in_flight == Some(request_id)
                && slot.last_issued == request_id.0
                && slot.entry.status == EntryStatus::Fetching;
            if !current {
                return false;
            }
            match result {
                Ok(data) => apply_fresh(&mut slot.entry, data),
                Err(error) => apply_error(&mut slot.entry, error),
            }
            resolution = Resolution::Applied;
            true
        });
        if resolution == Resolution::Discarded {
            debug!(key = %key, request_id = request_id.0, "Discarded out-of-order fetch result");
        }
        resolution
    }

    /// Mark every entry under `prefix` stale, keeping its data.
    ///
    /// Returns the keys that were marked.
    pub fn invalidate(&self, prefix: &QueryKey) -> Vec<QueryKey> {
        self.invalidate_many(std::slice::from_ref(prefix))
    }

    /// Mark every entry under any of `prefixes` stale as one step.
    ///
    /// Listeners run only after the whole set has transitioned.
    pub fn invalidate_many(&self, prefixes: &[QueryKey]) -> Vec<QueryKey> {
        let mut pending = Pending::new();
        let mut marked = Vec::new();
        {
            let mut inner = lock_or_recover(&self.inner, SOURCE, "invalidate");
            for (key, slot) in inner.slots.iter_mut() {
                if !prefixes.iter().any(|prefix| prefix.is_prefix_of(key)) {
                    continue;
                }
                if slot.entry.status == EntryStatus::Absent {
                    continue;
                }
                slot.entry.status = EntryStatus::Stale;
                slot.entry.in_flight = None;
                marked.push(key.clone());
            }
            for key in &marked {
                if let Some(slot) = inner.slots.peek(key) {
                    collect_listeners(&inner, &slot.entry, &mut pending);
                }
            }
        }

        if !marked.is_empty() {
            counter!(METRIC_INVALIDATED).increment(marked.len() as u64);
            debug!(count = marked.len(), "Cache entries invalidated");
        }
        notify(pending);
        marked
    }

    /// Register interest in one exact key.
    ///
    /// The returned handle unsubscribes when dropped or when `unsubscribe` is called.
    pub fn subscribe(self: &Arc<Self>, key: &QueryKey, listener: Listener) -> Subscription {
        let mut inner = lock_or_recover(&self.inner, SOURCE, "subscribe");
        inner.next_listener += 1;
        let id = inner.next_listener;
        inner
            .listeners
            .entry(key.clone())
            .or_default()
            .push((id, listener));
        Subscription {
            id,
            key: key.clone(),
            store: Arc::downgrade(self),
        }
    }

    fn remove_listener(&self, key: &QueryKey, id: u64) {
        let mut inner = lock_or_recover(&self.inner, SOURCE, "unsubscribe");
        if let Some(list) = inner.listeners.get_mut(key) {
            list.retain(|(listener_id, _)| *listener_id != id);
            if list.is_empty() {
                inner.listeners.remove(key);
            }
        }
    }

    pub fn subscriber_count(&self, key: &QueryKey) -> usize {
        lock_or_recover(&self.inner, SOURCE, "subscriber_count")
            .listeners
            .get(key)
            .map_or(0, Vec::len)
    }

    pub fn is_observed(&self, key: &QueryKey) -> bool {
        self.subscriber_count(key) > 0
    }

    /// Drop one entry entirely. Listeners stay registered.
    pub fn remove(&self, key: &QueryKey) -> Option<CacheEntry> {
        lock_or_recover(&self.inner, SOURCE, "remove")
            .slots
            .pop(key)
            .map(|slot| slot.entry)
    }

    /// Drop every entry and every listener. Used at session teardown.
    pub fn clear(&self) {
        let mut inner = lock_or_recover(&self.inner, SOURCE, "clear");
        inner.slots.clear();
        inner.listeners.clear();
    }

    pub fn keys(&self) -> Vec<QueryKey> {
        lock_or_recover(&self.inner, SOURCE, "keys")
            .slots
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        lock_or_recover(&self.inner, SOURCE, "len").slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `apply` against the slot for `key`; notify listeners when it reports a change.
    fn transition<F>(&self, key: &QueryKey, op: &'static str, apply: F) -> bool
    where
        F: FnOnce(&mut Slot) -> bool,
    {
        let (changed, pending) = self.transition_deferred(key, op, apply);
        notify(pending);
        changed
    }

    fn transition_deferred<F>(&self, key: &QueryKey, op: &'static str, apply: F) -> (bool, Pending)
    where
        F: FnOnce(&mut Slot) -> bool,
    {
        let mut pending = Pending::new();
        let mut inner = lock_or_recover(&self.inner, SOURCE, op);
        let slot = self.slot_mut(&mut inner, key);
        let changed = apply(slot);
        if changed {
            let entry = slot.entry.clone();
            collect_listeners(&inner, &entry, &mut pending);
        }
        (changed, pending)
    }

    fn slot_mut<'a>(&self, inner: &'a mut Inner, key: &QueryKey) -> &'a mut Slot {
        if !inner.slots.contains(key) {
            inner.slots.put(key.clone(), Slot::new(key.clone()));
            self.evict_idle(inner, key);
        }
        inner
            .slots
            .get_or_insert_mut(key.clone(), || Slot::new(key.clone()))
    }

    /// Evict least-recently-used entries that are neither fetching nor observed.
    fn evict_idle(&self, inner: &mut Inner, keep: &QueryKey) {
        let max = self.config.max_entries_non_zero().get();
        let overflow = inner.slots.len().saturating_sub(max);
        if overflow == 0 {
            return;
        }

        let victims: Vec<QueryKey> = inner
            .slots
            .iter()
            .rev()
            .filter(|(key, slot)| {
                *key != keep
                    && slot.entry.status != EntryStatus::Fetching
                    && !inner.listeners.contains_key(*key)
            })
            .take(overflow)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &victims {
            inner.slots.pop(key);
        }
        if !victims.is_empty() {
            counter!(METRIC_EVICTED).increment(victims.len() as u64);
            debug!(count = victims.len(), "Evicted idle cache entries");
        }
    }
}

fn apply_fresh(entry: &mut CacheEntry, data: Value) {
    entry.data = Some(data);
    entry.status = EntryStatus::Fresh;
    entry.error = None;
    entry.in_flight = None;
    entry.last_updated = Some(OffsetDateTime::now_utc());
}

fn apply_error(entry: &mut CacheEntry, error: RequestError) {
    entry.status = EntryStatus::Error;
    entry.error = Some(error);
    entry.in_flight = None;
}

fn collect_listeners(inner: &Inner, entry: &CacheEntry, pending: &mut Pending) {
    if let Some(list) = inner.listeners.get(&entry.key) {
        pending.extend(
            list.iter()
                .map(|(_, listener)| (Arc::clone(listener), entry.clone())),
        );
    }
}

fn notify(pending: Pending) {
    for (listener, entry) in pending {
        listener(&entry);
    }
}

/// Listener calls held back until the caller releases its own locks.
#[must_use = "deferred notifications must be fired"]
pub(crate) struct Deferred(Pending);

impl Deferred {
    pub(crate) fn fire(self) {
        notify(self.0);
    }
}

/// Handle for a registered listener.
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    key: QueryKey,
    store: Weak<CacheStore>,
}

impl Subscription {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            store.remove_listener(&self.key, self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("key", &self.key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    fn store() -> Arc<CacheStore> {
        Arc::new(CacheStore::new(&CacheConfig::default()))
    }

    fn journals_page(page: u32) -> QueryKey {
        QueryKey::new("journals").param("page", page)
    }

    #[test]
    fn get_creates_absent_entry() {
        let store = store();
        let key = journals_page(1);
        assert!(store.peek(&key).is_none());

        let entry = store.get(&key);
        assert_eq!(entry.status, EntryStatus::Absent);
        assert!(entry.data.is_none());
        assert!(store.peek(&key).is_some());
    }

    #[test]
    fn put_marks_fresh_and_clears_error() {
        let store = store();
        let key = journals_page(1);
        let ticket = store.mark_fetching(&key);
        assert!(ticket.issued);
        assert!(store.mark_error(&key, RequestError::network("down")));

        store.put(&key, json!([1, 2, 3]));
        let entry = store.get(&key);
        assert_eq!(entry.status, EntryStatus::Fresh);
        assert_eq!(entry.data, Some(json!([1, 2, 3])));
        assert!(entry.error.is_none());
        assert!(entry.last_updated.is_some());
    }

    #[test]
    fn mark_fetching_is_idempotent_while_in_flight() {
        let store = store();
        let key = journals_page(1);

        let first = store.mark_fetching(&key);
        let second = store.mark_fetching(&key);
        assert!(first.issued);
        assert!(!second.issued);
        assert_eq!(first.request_id, second.request_id);
    }

    #[test]
    fn request_ids_increase_across_keys() {
        let store = store();
        let key = journals_page(1);

        let first = store.mark_fetching(&key);
        store.complete(&key, first.request_id, Ok(json!([])));
        store.invalidate(&key);
        let second = store.mark_fetching(&key);
        assert!(second.request_id > first.request_id);

        let other = store.mark_fetching(&journals_page(2));
        assert!(other.request_id > second.request_id);
    }

    #[test]
    fn mark_error_keeps_previous_data() {
        let store = store();
        let key = journals_page(1);
        store.put(&key, json!(["a"]));
        store.invalidate(&key);
        store.mark_fetching(&key);

        assert!(store.mark_error(&key, RequestError::http(500, "boom")));
        let entry = store.get(&key);
        assert_eq!(entry.status, EntryStatus::Error);
        assert_eq!(entry.data, Some(json!(["a"])));
        assert_eq!(entry.error, Some(RequestError::http(500, "boom")));
    }

    #[test]
    fn mark_error_without_prior_fetch_leaves_no_data() {
        let store = store();
        let key = journals_page(1);
        store.mark_fetching(&key);
        store.mark_error(&key, RequestError::network("down"));
        assert!(store.get(&key).data.is_none());
    }

    #[test]
    fn mark_error_requires_fetching() {
        let store = store();
        let key = journals_page(1);
        store.put(&key, json!([]));
        assert!(!store.mark_error(&key, RequestError::network("down")));
        assert_eq!(store.get(&key).status, EntryStatus::Fresh);
    }

    #[test]
    fn invalidate_prefix_marks_children_stale_and_keeps_data() {
        let store = store();
        let page = journals_page(1);
        let author = QueryKey::new("journals").param("authorId", 7);
        let posts = QueryKey::new("posts");
        store.put(&page, json!(["a", "b", "c"]));
        store.put(&author, json!(["a"]));
        store.put(&posts, json!([]));

        let marked = store.invalidate(&QueryKey::new("journals"));
        assert_eq!(marked.len(), 2);

        let page_entry = store.get(&page);
        assert_eq!(page_entry.status, EntryStatus::Stale);
        assert_eq!(page_entry.data, Some(json!(["a", "b", "c"])));
        assert_eq!(store.get(&author).status, EntryStatus::Stale);
        assert_eq!(store.get(&posts).status, EntryStatus::Fresh);
    }

    #[test]
    fn invalidate_supersedes_in_flight_fetch() {
        let store = store();
        let key = journals_page(1);
        store.put(&key, json!(["old"]));
        store.invalidate(&key);
        let ticket = store.mark_fetching(&key);

        store.invalidate(&key);
        let resolution = store.complete(&key, ticket.request_id, Ok(json!(["pre-write"])));

        assert_eq!(resolution, Resolution::Discarded);
        let entry = store.get(&key);
        assert_eq!(entry.status, EntryStatus::Stale);
        assert_eq!(entry.data, Some(json!(["old"])));
    }

    #[test]
    fn complete_discards_older_request() {
        let store = store();
        let key = journals_page(1);
        let a = store.mark_fetching(&key);
        store.invalidate(&key);
        let b = store.mark_fetching(&key);

        assert_eq!(
            store.complete(&key, b.request_id, Ok(json!("b"))),
            Resolution::Applied
        );
        assert_eq!(
            store.complete(&key, a.request_id, Ok(json!("a"))),
            Resolution::Discarded
        );
        assert_eq!(store.get(&key).data, Some(json!("b")));
    }

    #[test]
    fn invalidation_notifies_after_whole_set_transitions() {
        let store = store();
        let a = journals_page(1);
        let b = journals_page(2);
        store.put(&a, json!(1));
        store.put(&b, json!(2));

        let observed = Arc::new(Mutex::new(Vec::new()));
        let probe = Arc::clone(&store);
        let seen = Arc::clone(&observed);
        let other = b.clone();
        let _sub = store.subscribe(
            &a,
            Arc::new(move |_entry: &CacheEntry| {
                let status = probe.peek(&other).map(|entry| entry.status);
                seen.lock().expect("probe lock").push(status);
            }),
        );

        store.invalidate(&QueryKey::new("journals"));
        let statuses = observed.lock().expect("probe lock").clone();
        assert_eq!(statuses, vec![Some(EntryStatus::Stale)]);
    }

    #[test]
    fn subscription_fires_on_transitions_until_dropped() {
        let store = store();
        let key = journals_page(1);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let sub = store.subscribe(
            &key,
            Arc::new(move |_: &CacheEntry| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        store.mark_fetching(&key);
        store.put(&key, json!([]));
        store.put(&journals_page(2), json!([]));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.subscriber_count(&key), 1);

        sub.unsubscribe();
        store.invalidate(&key);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!store.is_observed(&key));
    }

    #[test]
    fn stale_after_ages_fresh_entries() {
        let config = CacheConfig {
            stale_after: Some(Duration::ZERO),
            ..Default::default()
        };
        let store = CacheStore::new(&config);
        let key = journals_page(1);
        store.put(&key, json!([]));

        let entry = store.get(&key);
        assert_eq!(entry.status, EntryStatus::Stale);
        assert_eq!(entry.data, Some(json!([])));
    }

    #[test]
    fn eviction_skips_observed_and_fetching_entries() {
        let config = CacheConfig {
            max_entries: 2,
            ..Default::default()
        };
        let store = Arc::new(CacheStore::new(&config));
        let watched = journals_page(1);
        let fetching = journals_page(2);
        store.put(&watched, json!([]));
        let _sub = store.subscribe(&watched, Arc::new(|_: &CacheEntry| {}));
        store.mark_fetching(&fetching);

        store.put(&journals_page(3), json!([]));
        store.put(&journals_page(4), json!([]));

        assert!(store.peek(&watched).is_some());
        assert!(store.peek(&fetching).is_some());
        assert!(store.peek(&journals_page(3)).is_none());
        assert!(store.peek(&journals_page(4)).is_some());
    }

    #[test]
    fn eviction_of_invalidated_fetch_keeps_request_order() {
        let config = CacheConfig {
            max_entries: 1,
            ..Default::default()
        };
        let store = CacheStore::new(&config);
        let key = journals_page(1);
        let early = store.mark_fetching(&key);

        // Invalidation leaves the slot idle; the next insert evicts it mid-fetch.
        store.invalidate(&QueryKey::new("journals"));
        store.put(&QueryKey::new("posts"), json!([]));
        assert!(store.peek(&key).is_none());

        let late = store.mark_fetching(&key);
        assert!(late.issued);
        assert!(late.request_id > early.request_id);

        assert_eq!(
            store.complete(&key, early.request_id, Ok(json!("pre-write"))),
            Resolution::Discarded
        );
        assert_eq!(
            store.complete(&key, late.request_id, Ok(json!("post-write"))),
            Resolution::Applied
        );
        let entry = store.get(&key);
        assert_eq!(entry.status, EntryStatus::Fresh);
        assert_eq!(entry.data, Some(json!("post-write")));
    }

    #[test]
    fn eviction_prefers_least_recently_used() {
        let config = CacheConfig {
            max_entries: 2,
            ..Default::default()
        };
        let store = CacheStore::new(&config);
        store.put(&journals_page(1), json!(1));
        store.put(&journals_page(2), json!(2));
        store.get(&journals_page(1));
        store.put(&journals_page(3), json!(3));

        assert!(store.peek(&journals_page(1)).is_some());
        assert!(store.peek(&journals_page(2)).is_none());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn clear_drops_entries_and_listeners() {
        let store = store();
        let key = journals_page(1);
        store.put(&key, json!([]));
        let _sub = store.subscribe(&key, Arc::new(|_: &CacheEntry| {}));

        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.subscriber_count(&key), 0);
    }
}
