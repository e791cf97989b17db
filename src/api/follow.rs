//! Follow toggles backed by the shared cache.

use std::sync::Arc;
use std::time::Duration;

use atelier_api_types::{FollowStatus, UserId};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::cache::{CacheStore, MutationPipeline, OptimisticToggles, ToggleError, ToggleOutcome};
use crate::error::RequestError;

use super::client::AtelierClient;
use super::{keys, mutations};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FollowError {
    /// The current follow status could not be read, so nothing was toggled.
    #[error("failed to read follow status: {0}")]
    Status(#[source] RequestError),
    #[error(transparent)]
    Toggle(#[from] ToggleError),
}

#[derive(Clone)]
pub struct FollowController {
    client: AtelierClient,
    pipeline: MutationPipeline,
    store: Arc<CacheStore>,
    toggles: Arc<OptimisticToggles<UserId>>,
    pending_timeout: Duration,
}

impl FollowController {
    pub fn new(client: AtelierClient, pipeline: MutationPipeline, store: Arc<CacheStore>) -> Self {
        let pending_timeout = store.config().pending_toggle_timeout;
        Self {
            client,
            pipeline,
            store,
            toggles: Arc::new(OptimisticToggles::new()),
            pending_timeout,
        }
    }

    pub fn toggles(&self) -> &Arc<OptimisticToggles<UserId>> {
        &self.toggles
    }

    /// Server follow status for `user`, served from cache when fresh.
    pub async fn status(&self, user: UserId) -> Result<FollowStatus, RequestError> {
        self.client.follow_status(user).await
    }

    /// Value a view should render: the assumed value while a toggle is
    /// pending, otherwise the cached status. `None` when nothing is known yet.
    pub fn displayed(&self, user: UserId) -> Option<bool> {
        match self.toggles.state(&user) {
            Some(state) => Some(state.assumed_value),
            None => self.cached(user),
        }
    }

    /// Flip the follow relationship with `user`.
    ///
    /// A second call while the first write is outstanding fails with
    /// [`ToggleError::Busy`] and sends nothing.
    pub async fn toggle(&self, user: UserId) -> Result<ToggleOutcome<UserId>, FollowError> {
        let current = match self.displayed(user) {
            Some(current) => current,
            None => self.status(user).await.map_err(FollowError::Status)?.following,
        };

        let pipeline = self.pipeline.clone();
        let outcome = self
            .toggles
            .toggle(user, current, |target| async move {
                let response = pipeline
                    .mutate(mutations::set_following(user, target))
                    .await?;
                Ok(server_following(&response).unwrap_or(target))
            })
            .await?;

        if let Some(following) = outcome.state.committed_value {
            self.store.put(
                &keys::follow_status(user),
                serde_json::json!({ "following": following }),
            );
            debug!(user, following, "Follow status committed to cache");
        }
        Ok(outcome)
    }

    /// Revert toggles pending longer than the configured timeout.
    pub fn expire_pending(&self) -> Vec<UserId> {
        self.toggles.expire_pending(self.pending_timeout)
    }

    fn cached(&self, user: UserId) -> Option<bool> {
        self.store
            .peek(&keys::follow_status(user))
            .and_then(|entry| entry.data)
            .as_ref()
            .and_then(server_following)
    }
}

fn server_following(value: &Value) -> Option<bool> {
    serde_json::from_value::<FollowStatus>(value.clone())
        .ok()
        .map(|status| status.following)
}
