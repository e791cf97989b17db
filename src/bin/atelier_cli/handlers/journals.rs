#![deny(clippy::all, clippy::pedantic)]

use std::path::PathBuf;

use atelier_api_types::{JournalCreateRequest, JournalUpdateRequest};

use crate::args::JournalsCmd;
use crate::client::{CliError, Ctx};
use crate::io::read_opt_value;
use crate::print::{print_deleted, print_json};

pub async fn handle(ctx: &Ctx, cmd: JournalsCmd) -> Result<(), CliError> {
    match cmd {
        JournalsCmd::List { page, author } => list(ctx, page, author).await,
        JournalsCmd::Get { id } => get(ctx, id).await,
        JournalsCmd::Create {
            author,
            title,
            description,
            description_file,
        } => create(ctx, author, title, description, description_file).await,
        JournalsCmd::Update {
            id,
            title,
            description,
            description_file,
        } => update(ctx, id, title, description, description_file).await,
        JournalsCmd::Delete { id } => delete(ctx, id).await,
    }
}

async fn list(ctx: &Ctx, page: u32, author: Option<i64>) -> Result<(), CliError> {
    let journals = match author {
        Some(author) => ctx.client().journals_by_author(author, page).await?,
        None => ctx.client().journals(page).await?,
    };
    print_json(&journals)
}

async fn get(ctx: &Ctx, id: i64) -> Result<(), CliError> {
    let journal = ctx.client().journal(id).await?;
    print_json(&journal)
}

async fn create(
    ctx: &Ctx,
    author: i64,
    title: String,
    description: Option<String>,
    description_file: Option<PathBuf>,
) -> Result<(), CliError> {
    let request = JournalCreateRequest {
        title,
        description: read_opt_value(description, description_file)?,
    };
    let journal = ctx.client().create_journal(author, &request).await?;
    print_json(&journal)
}

async fn update(
    ctx: &Ctx,
    id: i64,
    title: Option<String>,
    description: Option<String>,
    description_file: Option<PathBuf>,
) -> Result<(), CliError> {
    let request = JournalUpdateRequest {
        title,
        description: read_opt_value(description, description_file)?,
    };
    // The author's list is among the affected views, so resolve the owner first.
    let current = ctx.client().journal(id).await?;
    let journal = ctx
        .client()
        .update_journal(current.author_id, id, &request)
        .await?;
    print_json(&journal)
}

async fn delete(ctx: &Ctx, id: i64) -> Result<(), CliError> {
    let current = ctx.client().journal(id).await?;
    ctx.client().delete_journal(current.author_id, id).await?;
    print_deleted(id)
}
