//! Query command - iterated (paginated) queries

use anyhow::{bail, Context, Result};
use edge_client::{Command, EdgeClient};
use serde_json::Value;

use crate::output::OutputContext;

/// Run a paginated command to exhaustion and print every record
pub async fn query(
    client: &EdgeClient,
    command: &str,
    params: Option<&str>,
    ctx: &OutputContext,
) -> Result<()> {
    let params = match params {
        Some(json) => match serde_json::from_str::<Value>(json).context("Invalid JSON in --params")? {
            Value::Object(map) => map,
            _ => bail!("--params must be a JSON object"),
        },
        None => serde_json::Map::new(),
    };

    let records = client
        .run_iterated_command(Command::with_params(command, params))
        .await
        .with_context(|| format!("Query {} failed", command))?;

    ctx.print_records(&records);
    if ctx.format == crate::output::OutputFormat::Table {
        ctx.info(&format!("{} records", records.len()));
    }
    Ok(())
}
