//! atelier-cli: command-line client for the Atelier platform.
//! Every command runs through one cache session, so reads issued by a command
//! reuse what earlier steps of the same command already loaded.
#![deny(clippy::all, clippy::pedantic)]

mod args;
mod client;
mod handlers;
mod io;
mod print;

use atelier::{config, telemetry};
use clap::Parser;

use args::{Cli, Commands};
use client::{CliError, Ctx};
use handlers::{categories, follow, journals, posts, projects, settings};

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    let settings = config::load(&cli.config)?;
    telemetry::init(&settings.logging)?;
    let ctx = Ctx::new(&settings)?;

    let result = match cli.command {
        Commands::Journals(cmd) => journals::handle(&ctx, cmd.action).await,
        Commands::Posts(cmd) => posts::handle(&ctx, cmd.action).await,
        Commands::Projects(cmd) => projects::handle(&ctx, cmd.action).await,
        Commands::Categories(cmd) => categories::handle(&ctx, cmd.action).await,
        Commands::Settings(cmd) => settings::handle(&ctx, cmd.action).await,
        Commands::Follow(cmd) => follow::handle(&ctx, cmd.action).await,
    };

    ctx.session.shutdown();
    result
}
