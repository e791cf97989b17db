//! Mutation pipeline.
//!
//! Sends one write and, once the server confirms it, invalidates every key the
//! write declares as affected. A failed write changes nothing in the cache.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use reqwest::Method;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::RequestError;
use crate::transport::Transport;

use super::engine::QueryEngine;
use super::keys::QueryKey;
use super::store::CacheStore;

const METRIC_MUTATION: &str = "atelier_mutation_total";
const METRIC_MUTATION_MS: &str = "atelier_mutation_ms";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Delete,
    Custom(String),
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => f.write_str("create"),
            Self::Update => f.write_str("update"),
            Self::Delete => f.write_str("delete"),
            Self::Custom(name) => f.write_str(name),
        }
    }
}

/// One write: the request to send and the keys it makes stale.
///
/// Consumed by [`MutationPipeline::mutate`], so a descriptor is executed at most once.
#[derive(Debug, Clone)]
pub struct MutationDescriptor {
    pub operation: Operation,
    /// Resource name used in logs, e.g. `journal`.
    pub target: String,
    pub method: Method,
    pub path: String,
    pub payload: Option<Value>,
    pub affected_keys: Vec<QueryKey>,
}

impl MutationDescriptor {
    pub fn new(
        operation: Operation,
        target: impl Into<String>,
        method: Method,
        path: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            target: target.into(),
            method,
            path: path.into(),
            payload: None,
            affected_keys: Vec::new(),
        }
    }

    #[must_use]
    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    #[must_use]
    pub fn affects(mut self, key: QueryKey) -> Self {
        if !self.affected_keys.contains(&key) {
            self.affected_keys.push(key);
        }
        self
    }

    #[must_use]
    pub fn affects_all(self, keys: impl IntoIterator<Item = QueryKey>) -> Self {
        keys.into_iter().fold(self, Self::affects)
    }
}

#[derive(Clone)]
pub struct MutationPipeline {
    transport: Arc<dyn Transport>,
    store: Arc<CacheStore>,
    engine: QueryEngine,
}

impl MutationPipeline {
    pub fn new(transport: Arc<dyn Transport>, engine: QueryEngine) -> Self {
        Self {
            transport,
            store: Arc::clone(engine.store()),
            engine,
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Execute the write and, on success, invalidate the affected keys.
    ///
    /// Invalidation completes before this returns, so a read issued afterwards
    /// never sees pre-write data as fresh.
    pub async fn mutate(&self, descriptor: MutationDescriptor) -> Result<Value, RequestError> {
        let MutationDescriptor {
            operation,
            target,
            method,
            path,
            payload,
            affected_keys,
        } = descriptor;
        let started_at = Instant::now();

        let result = match self.transport.request(method, &path, payload).await {
            Ok(response) => response.into_result(),
            Err(err) => Err(err),
        };
        histogram!(METRIC_MUTATION_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);

        let value = match result {
            Ok(value) => value,
            Err(err) => {
                let outcome = match &err {
                    RequestError::Network { .. } => "network_error",
                    RequestError::Http { .. } => "rejected",
                    RequestError::Decode { .. } => "decode_error",
                };
                counter!(METRIC_MUTATION, "outcome" => outcome).increment(1);
                warn!(
                    %operation,
                    resource = %target,
                    path = %path,
                    error = %err,
                    "Mutation failed; cache left untouched"
                );
                return Err(err);
            }
        };

        let marked = self.store.invalidate_many(&affected_keys);
        let refetched = if self.store.config().refetch_on_invalidate {
            self.engine.refetch_watched(&marked)
        } else {
            0
        };
        counter!(METRIC_MUTATION, "outcome" => "success").increment(1);
        info!(
            %operation,
            resource = %target,
            path = %path,
            invalidated = marked.len(),
            refetched,
            "Mutation applied"
        );

        Ok(value)
    }
}
