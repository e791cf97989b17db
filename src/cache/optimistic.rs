//! Optimistic toggles.
//!
//! A toggle flips its displayed value as soon as the user acts and reconciles
//! with the server once the write resolves. While a write is pending, further
//! toggles of the same entity are rejected rather than queued.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use metrics::counter;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::RequestError;

use super::lock::lock_or_recover;

const SOURCE: &str = "cache::optimistic";
const METRIC_REJECTED: &str = "atelier_toggle_rejected_total";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TogglePhase {
    Idle,
    Pending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToggleState<K> {
    pub entity: K,
    /// Value shown to the user.
    pub assumed_value: bool,
    /// Value confirmed by the server; `None` until a write resolves.
    pub committed_value: Option<bool>,
    pub phase: TogglePhase,
    /// Displayed value before the pending toggle.
    pub previous_value: bool,
    pub started_at: Instant,
    generation: u64,
}

impl<K> ToggleState<K> {
    pub fn is_pending(&self) -> bool {
        self.phase == TogglePhase::Pending
    }
}

/// A toggle that reached the server.
#[derive(Debug, Clone, PartialEq)]
pub struct ToggleOutcome<K> {
    /// Final state, always `Idle` with `assumed_value == committed_value`.
    pub state: ToggleState<K>,
    /// True when the server answered with a value other than the assumed one.
    pub reconciled: bool,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToggleError {
    #[error("a toggle is already pending for this entity")]
    Busy,
    #[error("toggle failed and was reverted to {reverted_to}: {source}")]
    Failed {
        reverted_to: bool,
        #[source]
        source: RequestError,
    },
    /// The toggle was expired while its write was outstanding; the late result was ignored.
    #[error("toggle expired before the write resolved")]
    Expired,
}

pub type ToggleListener<K> = Arc<dyn Fn(&ToggleState<K>) + Send + Sync>;

/// Per-entity toggle state. State is discarded once a toggle resolves.
pub struct OptimisticToggles<K> {
    states: Mutex<HashMap<K, ToggleState<K>>>,
    listeners: Mutex<Vec<(u64, ToggleListener<K>)>>,
    generation: AtomicU64,
    next_listener: AtomicU64,
}

impl<K> Default for OptimisticToggles<K>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> OptimisticToggles<K>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
{
    pub fn new() -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            listeners: Mutex::new(Vec::new()),
            generation: AtomicU64::new(0),
            next_listener: AtomicU64::new(0),
        }
    }

    /// Flip `entity` and run `write` with the assumed value.
    ///
    /// `current` is the displayed value before the toggle. `write` returns the
    /// value the server settled on, which wins over the assumed one.
    pub async fn toggle<F, Fut>(
        &self,
        entity: K,
        current: bool,
        write: F,
    ) -> Result<ToggleOutcome<K>, ToggleError>
    where
        F: FnOnce(bool) -> Fut,
        Fut: Future<Output = Result<bool, RequestError>>,
    {
        let started = {
            let mut states = lock_or_recover(&self.states, SOURCE, "toggle");
            if states.get(&entity).is_some_and(ToggleState::is_pending) {
                counter!(METRIC_REJECTED).increment(1);
                debug!(entity = ?entity, "Toggle rejected while pending");
                return Err(ToggleError::Busy);
            }

            let state = ToggleState {
                entity: entity.clone(),
                assumed_value: !current,
                committed_value: None,
                phase: TogglePhase::Pending,
                previous_value: current,
                started_at: Instant::now(),
                generation: self.generation.fetch_add(1, Ordering::Relaxed) + 1,
            };
            states.insert(entity.clone(), state.clone());
            state
        };
        self.notify(&started);

        let mut guard = AbandonGuard {
            toggles: self,
            entity: entity.clone(),
            generation: started.generation,
            armed: true,
        };
        let result = write(started.assumed_value).await;
        guard.armed = false;

        let resolved = {
            let mut states = lock_or_recover(&self.states, SOURCE, "resolve");
            match states.get(&entity) {
                Some(state) if state.generation == started.generation && state.is_pending() => {}
                _ => {
                    warn!(entity = ?entity, "Ignoring write result for expired toggle");
                    return Err(ToggleError::Expired);
                }
            }
            states.remove(&entity)
        };
        let Some(mut state) = resolved else {
            return Err(ToggleError::Expired);
        };
        state.phase = TogglePhase::Idle;

        match result {
            Ok(server_value) => {
                let reconciled = server_value != state.assumed_value;
                state.assumed_value = server_value;
                state.committed_value = Some(server_value);
                if reconciled {
                    info!(entity = ?entity, server_value, "Toggle reconciled to server value");
                }
                self.notify(&state);
                Ok(ToggleOutcome { state, reconciled })
            }
            Err(source) => {
                state.assumed_value = state.previous_value;
                debug!(entity = ?entity, error = %source, "Toggle reverted");
                self.notify(&state);
                Err(ToggleError::Failed {
                    reverted_to: state.previous_value,
                    source,
                })
            }
        }
    }

    /// Pending state for `entity`, if a write is outstanding.
    pub fn state(&self, entity: &K) -> Option<ToggleState<K>> {
        lock_or_recover(&self.states, SOURCE, "state")
            .get(entity)
            .cloned()
    }

    /// Value to render: the assumed value while pending, otherwise `fallback`.
    pub fn displayed(&self, entity: &K, fallback: bool) -> bool {
        self.state(entity)
            .map_or(fallback, |state| state.assumed_value)
    }

    pub fn is_pending(&self, entity: &K) -> bool {
        self.state(entity).is_some_and(|state| state.is_pending())
    }

    /// Revert every toggle pending for at least `older_than`.
    ///
    /// Their writes may still land on the server; results arriving afterwards
    /// are ignored and reported as [`ToggleError::Expired`].
    pub fn expire_pending(&self, older_than: Duration) -> Vec<K> {
        let expired: Vec<ToggleState<K>> = {
            let mut states = lock_or_recover(&self.states, SOURCE, "expire_pending");
            let keys: Vec<K> = states
                .iter()
                .filter(|(_, state)| state.is_pending() && state.started_at.elapsed() >= older_than)
                .map(|(key, _)| key.clone())
                .collect();
            keys.iter().filter_map(|key| states.remove(key)).collect()
        };

        let mut entities = Vec::with_capacity(expired.len());
        for mut state in expired {
            state.phase = TogglePhase::Idle;
            state.assumed_value = state.previous_value;
            warn!(entity = ?state.entity, "Pending toggle expired and was reverted");
            self.notify(&state);
            entities.push(state.entity);
        }
        entities
    }

    /// Register a callback for every toggle transition. Returns an id for `unsubscribe`.
    pub fn subscribe(&self, listener: ToggleListener<K>) -> u64 {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed) + 1;
        lock_or_recover(&self.listeners, SOURCE, "subscribe").push((id, listener));
        id
    }

    pub fn unsubscribe(&self, id: u64) {
        lock_or_recover(&self.listeners, SOURCE, "unsubscribe")
            .retain(|(listener_id, _)| *listener_id != id);
    }

    /// Drop all state and listeners.
    pub fn clear(&self) {
        lock_or_recover(&self.states, SOURCE, "clear").clear();
        lock_or_recover(&self.listeners, SOURCE, "clear").clear();
    }

    fn notify(&self, state: &ToggleState<K>) {
        let listeners: Vec<ToggleListener<K>> = lock_or_recover(&self.listeners, SOURCE, "notify")
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(state);
        }
    }
}

/// Reverts a pending toggle whose future is dropped before its write resolves.
struct AbandonGuard<'a, K>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
{
    toggles: &'a OptimisticToggles<K>,
    entity: K,
    generation: u64,
    armed: bool,
}

impl<K> Drop for AbandonGuard<'_, K>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
{
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let abandoned = {
            let mut states = lock_or_recover(&self.toggles.states, SOURCE, "abandon");
            match states.get(&self.entity) {
                Some(state) if state.generation == self.generation && state.is_pending() => {
                    states.remove(&self.entity)
                }
                _ => None,
            }
        };
        if let Some(mut state) = abandoned {
            state.phase = TogglePhase::Idle;
            state.assumed_value = state.previous_value;
            debug!(entity = ?state.entity, "Toggle dropped while pending; reverted");
            self.toggles.notify(&state);
        }
    }
}
