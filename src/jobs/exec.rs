use anyhow::Result;
use serde::Serialize;

use super::{light_rule, JobContext};
use crate::utils;

const MAX_LOGGED_LINES: usize = 200;

#[derive(Debug, Serialize)]
pub struct CommandOutput {
    pub command: String,
    pub output: String,
}

#[derive(Debug, Serialize)]
pub struct Outcome {
    pub device: String,
    pub host: String,
    pub results: Vec<CommandOutput>,
}

/// Run show commands over SSH on an inventory device and log their output
pub async fn run(ctx: &JobContext, device_name: &str, commands: &[String]) -> Result<Outcome> {
    if commands.is_empty() {
        anyhow::bail!("No commands given");
    }

    let device = ctx.nautobot.get_device_by_name(device_name).await?;
    let host = device
        .primary_host()
        .ok_or_else(|| anyhow::anyhow!("Device {} has no primary IP", device_name))?;
    let credentials = ctx
        .nautobot
        .resolve_credentials(&device, &ctx.config.default_credentials())
        .await;

    tracing::info!("Running {} command(s) on {} ({}) via SSH", commands.len(), device_name, host);
    let pairs = utils::ssh_run_commands_async(
        &host,
        ctx.config.ssh_port,
        &credentials,
        commands,
        ctx.config.device_timeout_secs,
    )
    .await
    .map_err(|e| anyhow::anyhow!("SSH to {} failed: {}", host, e))?;

    let mut results = Vec::with_capacity(pairs.len());
    for (command, output) in pairs {
        tracing::info!("{}", light_rule());
        tracing::info!("{}# {}", device_name, command);
        for line in utils::truncate_lines(&output, MAX_LOGGED_LINES).lines() {
            tracing::info!("{}", line);
        }
        results.push(CommandOutput { command, output });
    }

    Ok(Outcome {
        device: device_name.to_string(),
        host,
        results,
    })
}
