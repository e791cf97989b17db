#![deny(clippy::all, clippy::pedantic)]

use serde::Serialize;

use crate::client::CliError;

pub fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let out = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::InvalidInput(format!("failed to render output: {e}")))?;
    println!("{out}");
    Ok(())
}

/// Print the `{"deleted": id}` acknowledgement for delete commands.
pub fn print_deleted(id: i64) -> Result<(), CliError> {
    print_json(&serde_json::json!({ "deleted": id }))
}
