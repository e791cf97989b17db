#![deny(clippy::all, clippy::pedantic)]

use serde_json::json;

use crate::args::FollowCmd;
use crate::client::{CliError, Ctx};
use crate::print::print_json;

pub async fn handle(ctx: &Ctx, cmd: FollowCmd) -> Result<(), CliError> {
    match cmd {
        FollowCmd::Status { user } => {
            let status = ctx.follow().status(user).await?;
            print_json(&json!({ "user": user, "following": status.following }))
        }
        FollowCmd::Toggle { user } => {
            let outcome = ctx.follow().toggle(user).await?;
            print_json(&json!({
                "user": user,
                "following": outcome.state.assumed_value,
                "reconciled": outcome.reconciled,
            }))
        }
    }
}
