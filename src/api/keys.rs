//! Query keys for every platform resource.
//!
//! Collections are single-segment keys so that invalidating one covers every
//! page, filter and detail view below it.

use atelier_api_types::{JournalId, PostId, ProjectId, UserId};

use crate::cache::QueryKey;

pub const JOURNALS: &str = "journals";
pub const POSTS: &str = "posts";
pub const PROJECTS: &str = "projects";
pub const CATEGORIES: &str = "categories";
pub const SITE_SETTINGS: &str = "site-settings";
pub const USERS: &str = "users";
pub const VIEWER: &str = "viewer";

pub fn journals() -> QueryKey {
    QueryKey::new(JOURNALS)
}

pub fn journal_list(page: u32) -> QueryKey {
    journals().param("page", page)
}

pub fn journals_by_author(author: UserId) -> QueryKey {
    journals().param("authorId", author)
}

pub fn journals_by_author_page(author: UserId, page: u32) -> QueryKey {
    journals_by_author(author).param("page", page)
}

pub fn journal(id: JournalId) -> QueryKey {
    journals().with(id)
}

pub fn posts() -> QueryKey {
    QueryKey::new(POSTS)
}

pub fn post_list(page: u32) -> QueryKey {
    posts().param("page", page)
}

pub fn posts_in_journal(journal: JournalId) -> QueryKey {
    posts().param("journalId", journal)
}

pub fn posts_in_project(project: ProjectId) -> QueryKey {
    posts().param("projectId", project)
}

pub fn post(id: PostId) -> QueryKey {
    posts().with(id)
}

pub fn projects() -> QueryKey {
    QueryKey::new(PROJECTS)
}

pub fn project_list(page: u32) -> QueryKey {
    projects().param("page", page)
}

pub fn projects_by_owner(owner: UserId) -> QueryKey {
    projects().param("ownerId", owner)
}

pub fn project(id: ProjectId) -> QueryKey {
    projects().with(id)
}

pub fn categories() -> QueryKey {
    QueryKey::new(CATEGORIES)
}

pub fn site_settings() -> QueryKey {
    QueryKey::new(SITE_SETTINGS)
}

pub fn user(id: UserId) -> QueryKey {
    QueryKey::new(USERS).with(id)
}

pub fn follow_status(user_id: UserId) -> QueryKey {
    user(user_id).with("follow-status")
}

pub fn followers(user_id: UserId) -> QueryKey {
    user(user_id).with("followers")
}

/// Accounts the signed-in user follows.
pub fn viewer_following() -> QueryKey {
    QueryKey::new(VIEWER).with("following")
}
