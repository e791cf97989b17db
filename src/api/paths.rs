//! Request paths of the platform API.

use atelier_api_types::{CategoryId, JournalId, PostId, ProjectId, UserId};

pub const JOURNALS: &str = "/api/journals";
pub const POSTS: &str = "/api/posts";
pub const PROJECTS: &str = "/api/projects";
pub const CATEGORIES: &str = "/api/categories";
pub const SITE_SETTINGS: &str = "/api/site-settings";

pub fn journal_list(page: u32) -> String {
    format!("{JOURNALS}?page={page}")
}

pub fn journals_by_author(author: UserId, page: u32) -> String {
    format!("{JOURNALS}?authorId={author}&page={page}")
}

pub fn journal(id: JournalId) -> String {
    format!("{JOURNALS}/{id}")
}

pub fn post_list(page: u32) -> String {
    format!("{POSTS}?page={page}")
}

pub fn posts_in_journal(journal: JournalId) -> String {
    format!("{POSTS}?journalId={journal}")
}

pub fn posts_in_project(project: ProjectId) -> String {
    format!("{POSTS}?projectId={project}")
}

pub fn post(id: PostId) -> String {
    format!("{POSTS}/{id}")
}

pub fn project_list(page: u32) -> String {
    format!("{PROJECTS}?page={page}")
}

pub fn projects_by_owner(owner: UserId) -> String {
    format!("{PROJECTS}?ownerId={owner}")
}

pub fn project(id: ProjectId) -> String {
    format!("{PROJECTS}/{id}")
}

pub fn category(id: CategoryId) -> String {
    format!("{CATEGORIES}/{id}")
}

pub fn follow_status(user: UserId) -> String {
    format!("/api/users/{user}/follow-status")
}

/// `POST` follows, `DELETE` unfollows.
pub fn follow(user: UserId) -> String {
    format!("/api/users/{user}/follow")
}
