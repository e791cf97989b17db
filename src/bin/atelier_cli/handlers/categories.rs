#![deny(clippy::all, clippy::pedantic)]

use atelier_api_types::CategoryRequest;

use crate::args::CategoriesCmd;
use crate::client::{CliError, Ctx};
use crate::print::{print_deleted, print_json};

pub async fn handle(ctx: &Ctx, cmd: CategoriesCmd) -> Result<(), CliError> {
    match cmd {
        CategoriesCmd::List => print_json(&ctx.client().categories().await?),
        CategoriesCmd::Create { name } => {
            let category = ctx
                .client()
                .create_category(&CategoryRequest { name })
                .await?;
            print_json(&category)
        }
        CategoriesCmd::Update { id, name } => {
            let category = ctx
                .client()
                .update_category(id, &CategoryRequest { name })
                .await?;
            print_json(&category)
        }
        CategoriesCmd::Delete { id } => {
            ctx.client().delete_category(id).await?;
            print_deleted(id)
        }
    }
}
