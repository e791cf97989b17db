//! Session lifecycle.
//!
//! A session owns one cache store and everything built on it. Nothing is
//! global: two sessions never share entries, subscriptions or toggle state.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::api::{AtelierClient, FollowController};
use crate::cache::{CacheConfig, CacheStore, MutationPipeline, QueryEngine};
use crate::config::Settings;
use crate::error::RequestError;
use crate::transport::{ReqwestTransport, Transport};

#[derive(Clone)]
pub struct Session {
    id: Uuid,
    store: Arc<CacheStore>,
    engine: QueryEngine,
    pipeline: MutationPipeline,
    client: AtelierClient,
    follow: FollowController,
}

impl Session {
    pub fn new(config: &CacheConfig, transport: Arc<dyn Transport>) -> Self {
        let store = Arc::new(CacheStore::new(config));
        let engine = QueryEngine::new(Arc::clone(&store));
        let pipeline = MutationPipeline::new(transport, engine.clone());
        let client = AtelierClient::new(engine.clone(), pipeline.clone());
        let follow = FollowController::new(client.clone(), pipeline.clone(), Arc::clone(&store));
        let id = Uuid::new_v4();

        info!(session = %id, max_entries = config.max_entries, "Session started");

        Self {
            id,
            store,
            engine,
            pipeline,
            client,
            follow,
        }
    }

    /// Build a session talking HTTP to the configured site.
    pub fn from_settings(settings: &Settings) -> Result<Self, RequestError> {
        let transport = ReqwestTransport::new(
            &settings.api.base_url,
            settings.api.timeout,
            settings.api.user_agent.as_deref(),
        )?;
        Ok(Self::new(&CacheConfig::from(settings), Arc::new(transport)))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    pub fn pipeline(&self) -> &MutationPipeline {
        &self.pipeline
    }

    pub fn client(&self) -> &AtelierClient {
        &self.client
    }

    pub fn follow(&self) -> &FollowController {
        &self.follow
    }

    /// Drop every entry, subscription, watch and toggle state.
    pub fn shutdown(&self) {
        let entries = self.store.len();
        self.engine.clear_watches();
        self.store.clear();
        self.follow.toggles().clear();
        info!(session = %self.id, entries, "Session closed");
    }
}
