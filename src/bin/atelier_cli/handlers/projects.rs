#![deny(clippy::all, clippy::pedantic)]

use atelier_api_types::{ProjectCreateRequest, ProjectUpdateRequest};

use crate::args::ProjectsCmd;
use crate::client::{CliError, Ctx};
use crate::print::{print_deleted, print_json};

pub async fn handle(ctx: &Ctx, cmd: ProjectsCmd) -> Result<(), CliError> {
    match cmd {
        ProjectsCmd::List { page, owner } => {
            let projects = match owner {
                Some(owner) => ctx.client().projects_by_owner(owner).await?,
                None => ctx.client().projects(page).await?,
            };
            print_json(&projects)
        }
        ProjectsCmd::Get { id } => print_json(&ctx.client().project(id).await?),
        ProjectsCmd::Create {
            name,
            summary,
            categories,
        } => {
            let request = ProjectCreateRequest {
                name,
                summary,
                category_ids: categories,
            };
            print_json(&ctx.client().create_project(&request).await?)
        }
        ProjectsCmd::Update {
            id,
            name,
            summary,
            categories,
        } => {
            let request = ProjectUpdateRequest {
                name,
                summary,
                category_ids: categories,
            };
            print_json(&ctx.client().update_project(id, &request).await?)
        }
        ProjectsCmd::Delete { id } => {
            ctx.client().delete_project(id).await?;
            print_deleted(id)
        }
    }
}
