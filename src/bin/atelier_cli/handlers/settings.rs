#![deny(clippy::all, clippy::pedantic)]

use atelier_api_types::SiteSettingsPatch;

use crate::args::SettingsCmd;
use crate::client::{CliError, Ctx};
use crate::print::print_json;

pub async fn handle(ctx: &Ctx, cmd: SettingsCmd) -> Result<(), CliError> {
    match cmd {
        SettingsCmd::Get => get(ctx).await,
        SettingsCmd::Update {
            site_name,
            tagline,
            registrations_open,
        } => {
            let patch = SiteSettingsPatch {
                site_name,
                tagline,
                registrations_open,
            };
            update(ctx, patch).await
        }
    }
}

async fn get(ctx: &Ctx) -> Result<(), CliError> {
    let settings = ctx.client().site_settings().await?;
    print_json(&settings)
}

async fn update(ctx: &Ctx, patch: SiteSettingsPatch) -> Result<(), CliError> {
    if patch == SiteSettingsPatch::default() {
        return Err(CliError::InvalidInput("nothing to update".into()));
    }
    let settings = ctx.client().update_site_settings(&patch).await?;
    print_json(&settings)
}
