//! Mutation catalog.
//!
//! Each write the platform supports is declared here once, together with the
//! keys it makes stale. Call sites build descriptors through these functions
//! and never list affected keys themselves.

use atelier_api_types::{
    CategoryId, CategoryRequest, JournalCreateRequest, JournalId, JournalUpdateRequest, Post,
    PostCreateRequest, PostId, PostUpdateRequest, ProjectCreateRequest, ProjectId,
    ProjectUpdateRequest, SiteSettingsPatch, UserId,
};
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;

use crate::cache::{MutationDescriptor, Operation, QueryKey};
use crate::error::RequestError;

use super::{keys, paths};

/// Where a post is listed, beyond the global post collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostScope {
    pub journal_id: Option<JournalId>,
    pub project_id: Option<ProjectId>,
}

impl PostScope {
    pub fn of(post: &Post) -> Self {
        Self {
            journal_id: post.journal_id,
            project_id: post.project_id,
        }
    }

    fn affected_keys(self) -> Vec<QueryKey> {
        let mut affected = vec![keys::posts()];
        if let Some(journal) = self.journal_id {
            affected.push(keys::journal(journal));
        }
        if let Some(project) = self.project_id {
            affected.push(keys::project(project));
        }
        affected
    }
}

fn body<T: Serialize>(payload: &T) -> Result<Value, RequestError> {
    Ok(serde_json::to_value(payload)?)
}

fn journal_keys(author: UserId) -> [QueryKey; 2] {
    [keys::journals(), keys::journals_by_author(author)]
}

pub fn create_journal(
    author: UserId,
    request: &JournalCreateRequest,
) -> Result<MutationDescriptor, RequestError> {
    Ok(
        MutationDescriptor::new(Operation::Create, "journal", Method::POST, paths::JOURNALS)
            .payload(body(request)?)
            .affects_all(journal_keys(author)),
    )
}

pub fn update_journal(
    author: UserId,
    id: JournalId,
    request: &JournalUpdateRequest,
) -> Result<MutationDescriptor, RequestError> {
    Ok(
        MutationDescriptor::new(Operation::Update, "journal", Method::PUT, paths::journal(id))
            .payload(body(request)?)
            .affects_all(journal_keys(author)),
    )
}

pub fn delete_journal(author: UserId, id: JournalId) -> MutationDescriptor {
    MutationDescriptor::new(Operation::Delete, "journal", Method::DELETE, paths::journal(id))
        .affects_all(journal_keys(author))
        .affects(keys::posts_in_journal(id))
}

pub fn create_post(request: &PostCreateRequest) -> Result<MutationDescriptor, RequestError> {
    let scope = PostScope {
        journal_id: request.journal_id,
        project_id: request.project_id,
    };
    Ok(
        MutationDescriptor::new(Operation::Create, "post", Method::POST, paths::POSTS)
            .payload(body(request)?)
            .affects_all(scope.affected_keys()),
    )
}

pub fn update_post(
    id: PostId,
    scope: PostScope,
    request: &PostUpdateRequest,
) -> Result<MutationDescriptor, RequestError> {
    Ok(
        MutationDescriptor::new(Operation::Update, "post", Method::PUT, paths::post(id))
            .payload(body(request)?)
            .affects_all(scope.affected_keys()),
    )
}

pub fn delete_post(id: PostId, scope: PostScope) -> MutationDescriptor {
    MutationDescriptor::new(Operation::Delete, "post", Method::DELETE, paths::post(id))
        .affects_all(scope.affected_keys())
}

pub fn create_project(request: &ProjectCreateRequest) -> Result<MutationDescriptor, RequestError> {
    Ok(
        MutationDescriptor::new(Operation::Create, "project", Method::POST, paths::PROJECTS)
            .payload(body(request)?)
            .affects(keys::projects()),
    )
}

pub fn update_project(
    id: ProjectId,
    request: &ProjectUpdateRequest,
) -> Result<MutationDescriptor, RequestError> {
    Ok(
        MutationDescriptor::new(Operation::Update, "project", Method::PUT, paths::project(id))
            .payload(body(request)?)
            .affects(keys::projects()),
    )
}

pub fn delete_project(id: ProjectId) -> MutationDescriptor {
    MutationDescriptor::new(Operation::Delete, "project", Method::DELETE, paths::project(id))
        .affects(keys::projects())
}

// Projects embed their category ids, so category writes reach project views too.
fn category_keys() -> [QueryKey; 2] {
    [keys::categories(), keys::projects()]
}

pub fn create_category(request: &CategoryRequest) -> Result<MutationDescriptor, RequestError> {
    Ok(
        MutationDescriptor::new(Operation::Create, "category", Method::POST, paths::CATEGORIES)
            .payload(body(request)?)
            .affects_all(category_keys()),
    )
}

pub fn update_category(
    id: CategoryId,
    request: &CategoryRequest,
) -> Result<MutationDescriptor, RequestError> {
    Ok(MutationDescriptor::new(
        Operation::Update,
        "category",
        Method::PUT,
        paths::category(id),
    )
    .payload(body(request)?)
    .affects_all(category_keys()))
}

pub fn delete_category(id: CategoryId) -> MutationDescriptor {
    MutationDescriptor::new(
        Operation::Delete,
        "category",
        Method::DELETE,
        paths::category(id),
    )
    .affects_all(category_keys())
}

pub fn update_site_settings(
    patch: &SiteSettingsPatch,
) -> Result<MutationDescriptor, RequestError> {
    Ok(MutationDescriptor::new(
        Operation::Update,
        "site-settings",
        Method::PUT,
        paths::SITE_SETTINGS,
    )
    .payload(body(patch)?)
    .affects(keys::site_settings()))
}

/// Follow (`true`) or unfollow (`false`) `target`.
pub fn set_following(target: UserId, following: bool) -> MutationDescriptor {
    let (operation, method) = if following {
        (Operation::Custom("follow".to_string()), Method::POST)
    } else {
        (Operation::Custom("unfollow".to_string()), Method::DELETE)
    };
    MutationDescriptor::new(operation, "user", method, paths::follow(target)).affects_all([
        keys::follow_status(target),
        keys::followers(target),
        keys::viewer_following(),
    ])
}
