//! Onboard command - provision devices from inventory

use anyhow::{bail, Result};
use edge_client::{DeviceOutcome, EdgeClient, OnboardingPlan};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};

use crate::output::{OnboardRow, OutputContext};

/// Onboard every device, one at a time, with a progress bar
pub async fn onboard(
    client: &EdgeClient,
    devices: Vec<String>,
    profile_id: &str,
    def_id: &str,
    tags: Vec<String>,
    ctx: &OutputContext,
) -> Result<()> {
    let plan = OnboardingPlan::new(devices, profile_id, def_id, tags)?;
    let total = plan.devices().len();

    let pb = if ctx.quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(total as u64)
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );

    let mut rows = Vec::with_capacity(total);
    let mut outcomes = Box::pin(client.onboard_stream(plan));
    while let Some(outcome) = outcomes.next().await {
        pb.set_message(outcome.device.clone());
        if let Err(e) = &outcome.result {
            pb.println(format!("{}: {}", outcome.device, e));
        }
        rows.push(onboard_row(outcome));
        pb.inc(1);
    }
    pb.finish_and_clear();

    ctx.print(&rows);

    let failed = rows.iter().filter(|row| row.status != "onboarded").count();
    if failed > 0 {
        ctx.error(&format!("{} of {} devices failed to onboard", failed, total));
        bail!("Onboarding incomplete");
    }
    ctx.success(&format!("Onboarded {} devices", total));
    Ok(())
}

fn onboard_row(outcome: DeviceOutcome) -> OnboardRow {
    match outcome.result {
        Ok(thing) => OnboardRow {
            device: outcome.device,
            status: "onboarded".to_string(),
            thing_id: thing.thing_id,
            detail: format!("inventory {}, endpoint {}", thing.inventory_id, thing.iot_id),
        },
        Err(e) => OnboardRow {
            device: outcome.device,
            status: format!("failed at {}", e.step()),
            thing_id: String::new(),
            detail: e.to_string(),
        },
    }
}
