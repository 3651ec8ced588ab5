//! Bulk commands - tags, profile, settings, definition, undeploy, delete

use anyhow::{anyhow, bail, Context, Result};
use edge_client::commands::{self, DeleteSelector};
use edge_client::{BatchResult, CommandBatch, EdgeClient};

use crate::output::{format_codes, CommandRow, OutputContext};

/// Add or remove tags on every device
pub async fn tags(
    client: &EdgeClient,
    add: bool,
    tags: &[String],
    devices: &[String],
    ctx: &OutputContext,
) -> Result<()> {
    let batch = if add {
        commands::tag_add(devices, tags)
    } else {
        commands::tag_delete(devices, tags)
    };
    submit(client, batch, devices, ctx).await
}

/// Move every device to a device profile, given by id or by name
pub async fn profile(
    client: &EdgeClient,
    profile_id: Option<&str>,
    profile_name: Option<&str>,
    devices: &[String],
    ctx: &OutputContext,
) -> Result<()> {
    let profile_id = match (profile_id, profile_name) {
        (Some(id), _) => id.to_string(),
        (None, Some(name)) => client
            .find_profile_id(name)
            .await
            .context("Failed to list profiles")?
            .ok_or_else(|| anyhow!("Profile '{}' not found", name))?,
        (None, None) => bail!("Either --profile-id or --profile-name is required"),
    };

    submit(client, commands::profile_change(devices, &profile_id), devices, ctx).await
}

/// Push one settings value per device
pub async fn settings(
    client: &EdgeClient,
    devices: &[String],
    values: &[String],
    ctx: &OutputContext,
) -> Result<()> {
    let batch = commands::settings_push(devices, values)?;
    submit(client, batch, devices, ctx).await
}

/// Move every device to another thing definition, given by key or by name
pub async fn change_def(
    client: &EdgeClient,
    def_key: Option<&str>,
    def_name: Option<&str>,
    devices: &[String],
    ctx: &OutputContext,
) -> Result<()> {
    let def_key = match (def_key, def_name) {
        (Some(key), _) => key.to_string(),
        (None, Some(name)) => client
            .find_thing_def_key(name)
            .await
            .context("Failed to list thing definitions")?
            .ok_or_else(|| anyhow!("Thing definition '{}' not found", name))?,
        (None, None) => bail!("Either --def-key or --def-name is required"),
    };

    submit(client, commands::definition_change(devices, &def_key), devices, ctx).await
}

/// Clear the data destination of every device
pub async fn undeploy(client: &EdgeClient, devices: &[String], ctx: &OutputContext) -> Result<()> {
    submit(client, commands::undeploy(devices), devices, ctx).await
}

/// Delete things selected by keys, ids, tags or a query
pub async fn delete(
    client: &EdgeClient,
    selector: DeleteSelector,
    ctx: &OutputContext,
) -> Result<()> {
    let batch = commands::delete_things(&selector)?;
    submit(client, batch, &[], ctx).await
}

async fn submit(
    client: &EdgeClient,
    batch: CommandBatch,
    devices: &[String],
    ctx: &OutputContext,
) -> Result<()> {
    let total = batch.len();
    let result = client
        .run_commands(batch)
        .await
        .context("Bulk request failed")?;

    ctx.print(&command_rows(&result, devices));

    let failed = result.failures().count();
    if failed > 0 {
        bail!("{} of {} commands failed", failed, total);
    }
    ctx.success(&format!("All {} commands succeeded", total));
    Ok(())
}

/// One row per label; ordinal labels map back to `devices`
fn command_rows(result: &BatchResult, devices: &[String]) -> Vec<CommandRow> {
    result
        .iter()
        .map(|(label, entry)| {
            let device = label
                .parse::<usize>()
                .ok()
                .and_then(|ordinal| ordinal.checked_sub(1))
                .and_then(|index| devices.get(index))
                .cloned()
                .unwrap_or_else(|| "-".to_string());
            CommandRow {
                label: label.to_string(),
                device,
                status: if entry.success { "ok" } else { "failed" }.to_string(),
                error_codes: format_codes(&entry.error_codes),
            }
        })
        .collect()
}
