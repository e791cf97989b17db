//! Typed access to platform resources through the cache.

use std::sync::Arc;

use async_trait::async_trait;
use atelier_api_types::{
    Category, CategoryId, CategoryRequest, FollowStatus, Journal, JournalCreateRequest,
    JournalId, JournalUpdateRequest, ListPage, Post, PostCreateRequest, PostId,
    PostUpdateRequest, Project, ProjectCreateRequest, ProjectId, ProjectUpdateRequest,
    SiteSettings, SiteSettingsPatch, UserId,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::cache::{
    CacheEntry, Fetcher, Listener, MutationDescriptor, MutationPipeline, QueryEngine, QueryKey,
    Watch,
};
use crate::error::RequestError;
use crate::transport::Transport;

use super::mutations::{self, PostScope};
use super::{keys, paths};

/// Reads one API path.
pub struct ResourceFetcher {
    transport: Arc<dyn Transport>,
    path: String,
}

impl ResourceFetcher {
    pub fn new(transport: Arc<dyn Transport>, path: impl Into<String>) -> Self {
        Self {
            transport,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[async_trait]
impl Fetcher for ResourceFetcher {
    async fn fetch(&self) -> Result<Value, RequestError> {
        self.transport.get(&self.path).await
    }
}

#[derive(Clone)]
pub struct AtelierClient {
    transport: Arc<dyn Transport>,
    engine: QueryEngine,
    pipeline: MutationPipeline,
}

impl AtelierClient {
    pub fn new(engine: QueryEngine, pipeline: MutationPipeline) -> Self {
        Self {
            transport: Arc::clone(pipeline.transport()),
            engine,
            pipeline,
        }
    }

    pub fn fetcher(&self, path: impl Into<String>) -> Arc<dyn Fetcher> {
        Arc::new(ResourceFetcher::new(Arc::clone(&self.transport), path))
    }

    async fn read<T: DeserializeOwned>(
        &self,
        key: QueryKey,
        path: String,
    ) -> Result<T, RequestError> {
        self.engine.load_as(&key, self.fetcher(path)).await
    }

    async fn write<T: DeserializeOwned>(
        &self,
        descriptor: MutationDescriptor,
    ) -> Result<T, RequestError> {
        let value = self.pipeline.mutate(descriptor).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Current snapshot of `key`, refreshed in the background when not fresh.
    pub fn observe(&self, key: &QueryKey, path: impl Into<String>) -> CacheEntry {
        self.engine.observe(key, self.fetcher(path))
    }

    /// Keep `key` loaded and report every transition to `listener`.
    pub fn watch(&self, key: &QueryKey, path: impl Into<String>, listener: Listener) -> Watch {
        self.engine.watch(key, self.fetcher(path), listener)
    }

    pub async fn journals(&self, page: u32) -> Result<ListPage<Journal>, RequestError> {
        self.read(keys::journal_list(page), paths::journal_list(page))
            .await
    }

    pub async fn journals_by_author(
        &self,
        author: UserId,
        page: u32,
    ) -> Result<ListPage<Journal>, RequestError> {
        self.read(
            keys::journals_by_author_page(author, page),
            paths::journals_by_author(author, page),
        )
        .await
    }

    pub async fn journal(&self, id: JournalId) -> Result<Journal, RequestError> {
        self.read(keys::journal(id), paths::journal(id)).await
    }

    pub async fn create_journal(
        &self,
        author: UserId,
        request: &JournalCreateRequest,
    ) -> Result<Journal, RequestError> {
        self.write(mutations::create_journal(author, request)?).await
    }

    pub async fn update_journal(
        &self,
        author: UserId,
        id: JournalId,
        request: &JournalUpdateRequest,
    ) -> Result<Journal, RequestError> {
        self.write(mutations::update_journal(author, id, request)?)
            .await
    }

    pub async fn delete_journal(&self, author: UserId, id: JournalId) -> Result<(), RequestError> {
        self.pipeline
            .mutate(mutations::delete_journal(author, id))
            .await
            .map(drop)
    }

    pub async fn posts(&self, page: u32) -> Result<ListPage<Post>, RequestError> {
        self.read(keys::post_list(page), paths::post_list(page)).await
    }

    pub async fn posts_in_journal(
        &self,
        journal: JournalId,
    ) -> Result<ListPage<Post>, RequestError> {
        self.read(
            keys::posts_in_journal(journal),
            paths::posts_in_journal(journal),
        )
        .await
    }

    pub async fn posts_in_project(
        &self,
        project: ProjectId,
    ) -> Result<ListPage<Post>, RequestError> {
        self.read(
            keys::posts_in_project(project),
            paths::posts_in_project(project),
        )
        .await
    }

    pub async fn post(&self, id: PostId) -> Result<Post, RequestError> {
        self.read(keys::post(id), paths::post(id)).await
    }

    pub async fn create_post(&self, request: &PostCreateRequest) -> Result<Post, RequestError> {
        self.write(mutations::create_post(request)?).await
    }

    pub async fn update_post(
        &self,
        id: PostId,
        scope: PostScope,
        request: &PostUpdateRequest,
    ) -> Result<Post, RequestError> {
        self.write(mutations::update_post(id, scope, request)?)
            .await
    }

    pub async fn delete_post(&self, id: PostId, scope: PostScope) -> Result<(), RequestError> {
        self.pipeline
            .mutate(mutations::delete_post(id, scope))
            .await
            .map(drop)
    }

    pub async fn projects(&self, page: u32) -> Result<ListPage<Project>, RequestError> {
        self.read(keys::project_list(page), paths::project_list(page))
            .await
    }

    pub async fn projects_by_owner(
        &self,
        owner: UserId,
    ) -> Result<ListPage<Project>, RequestError> {
        self.read(
            keys::projects_by_owner(owner),
            paths::projects_by_owner(owner),
        )
        .await
    }

    pub async fn project(&self, id: ProjectId) -> Result<Project, RequestError> {
        self.read(keys::project(id), paths::project(id)).await
    }

    pub async fn create_project(
        &self,
        request: &ProjectCreateRequest,
    ) -> Result<Project, RequestError> {
        self.write(mutations::create_project(request)?).await
    }

    pub async fn update_project(
        &self,
        id: ProjectId,
        request: &ProjectUpdateRequest,
    ) -> Result<Project, RequestError> {
        self.write(mutations::update_project(id, request)?).await
    }

    pub async fn delete_project(&self, id: ProjectId) -> Result<(), RequestError> {
        self.pipeline
            .mutate(mutations::delete_project(id))
            .await
            .map(drop)
    }

    pub async fn categories(&self) -> Result<Vec<Category>, RequestError> {
        self.read(keys::categories(), paths::CATEGORIES.to_string())
            .await
    }

    pub async fn create_category(
        &self,
        request: &CategoryRequest,
    ) -> Result<Category, RequestError> {
        self.write(mutations::create_category(request)?).await
    }

    pub async fn update_category(
        &self,
        id: CategoryId,
        request: &CategoryRequest,
    ) -> Result<Category, RequestError> {
        self.write(mutations::update_category(id, request)?).await
    }

    pub async fn delete_category(&self, id: CategoryId) -> Result<(), RequestError> {
        self.pipeline
            .mutate(mutations::delete_category(id))
            .await
            .map(drop)
    }

    pub async fn site_settings(&self) -> Result<SiteSettings, RequestError> {
        self.read(keys::site_settings(), paths::SITE_SETTINGS.to_string())
            .await
    }

    pub async fn update_site_settings(
        &self,
        patch: &SiteSettingsPatch,
    ) -> Result<SiteSettings, RequestError> {
        self.write(mutations::update_site_settings(patch)?).await
    }

    pub async fn follow_status(&self, user: UserId) -> Result<FollowStatus, RequestError> {
        self.read(keys::follow_status(user), paths::follow_status(user))
            .await
    }
}
