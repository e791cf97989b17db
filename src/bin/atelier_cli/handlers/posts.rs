#![deny(clippy::all, clippy::pedantic)]

use std::path::PathBuf;

use atelier::api::PostScope;
use atelier_api_types::{PostCreateRequest, PostUpdateRequest};

use crate::args::PostsCmd;
use crate::client::{CliError, Ctx};
use crate::io::{read_opt_value, read_value};
use crate::print::{print_deleted, print_json};

pub async fn handle(ctx: &Ctx, cmd: PostsCmd) -> Result<(), CliError> {
    match cmd {
        PostsCmd::List {
            page,
            journal,
            project,
        } => list(ctx, page, journal, project).await,
        PostsCmd::Get { id } => get(ctx, id).await,
        PostsCmd::Create {
            title,
            body,
            body_file,
            journal,
            project,
        } => {
            let request = PostCreateRequest {
                title,
                body: read_value(body, body_file)?,
                journal_id: journal,
                project_id: project,
            };
            create(ctx, request).await
        }
        PostsCmd::Update {
            id,
            title,
            body,
            body_file,
        } => update(ctx, id, title, body, body_file).await,
        PostsCmd::Delete { id } => delete(ctx, id).await,
    }
}

async fn list(
    ctx: &Ctx,
    page: u32,
    journal: Option<i64>,
    project: Option<i64>,
) -> Result<(), CliError> {
    let posts = match (journal, project) {
        (Some(journal), _) => ctx.client().posts_in_journal(journal).await?,
        (None, Some(project)) => ctx.client().posts_in_project(project).await?,
        (None, None) => ctx.client().posts(page).await?,
    };
    print_json(&posts)
}

async fn get(ctx: &Ctx, id: i64) -> Result<(), CliError> {
    let post = ctx.client().post(id).await?;
    print_json(&post)
}

async fn create(ctx: &Ctx, request: PostCreateRequest) -> Result<(), CliError> {
    let post = ctx.client().create_post(&request).await?;
    print_json(&post)
}

async fn update(
    ctx: &Ctx,
    id: i64,
    title: Option<String>,
    body: Option<String>,
    body_file: Option<PathBuf>,
) -> Result<(), CliError> {
    let request = PostUpdateRequest {
        title,
        body: read_opt_value(body, body_file)?,
    };
    if request.title.is_none() && request.body.is_none() {
        return Err(CliError::InvalidInput(
            "nothing to update (pass --title, --body or --body-file)".into(),
        ));
    }
    let scope = PostScope::of(&ctx.client().post(id).await?);
    let post = ctx.client().update_post(id, scope, &request).await?;
    print_json(&post)
}

async fn delete(ctx: &Ctx, id: i64) -> Result<(), CliError> {
    let scope = PostScope::of(&ctx.client().post(id).await?);
    ctx.client().delete_post(id, scope).await?;
    print_deleted(id)
}
