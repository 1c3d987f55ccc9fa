//! Push a device's Golden Config intended configuration through its driver.

use anyhow::Result;
use serde::Serialize;

use super::{banner, success, JobContext};
use crate::drivers::{self, DriverError, NetworkDriver};
use crate::nautobot::NbPlatform;
use crate::utils::truncate_lines;

#[derive(Debug, Clone)]
pub struct Options {
    pub device: String,
    pub dry_run: bool,
    pub replace: bool,
    pub commit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployStatus {
    NoChanges,
    DryRun,
    Committed,
    NotCommitted,
    ConnectionFailed,
    RolledBack,
    Failed,
}

#[derive(Debug, Serialize)]
pub struct Outcome {
    pub device: String,
    pub status: DeployStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Outcome {
    fn new(device: &str, status: DeployStatus) -> Self {
        Self { device: device.to_string(), status, diff: None, error: None }
    }
}

pub async fn run(ctx: &JobContext, opts: &Options) -> Result<Outcome> {
    banner(&format!("Starting provisioning for device: {}", opts.device));

    let device = ctx.nautobot.get_device_by_name(&opts.device).await?;
    let name = device.display_name();

    tracing::info!("Validating device configuration...");
    let platform_ref = device
        .platform
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("Device {} has no platform configured", name))?;
    let platform: NbPlatform = ctx.nautobot.get_platform(&platform_ref.id).await?;
    if platform.napalm_driver.is_empty() {
        return Err(anyhow::anyhow!(
            "Device {} platform '{}' has no NAPALM driver configured",
            name,
            platform.name
        ));
    }
    let host = device
        .primary_ipv4_host()
        .ok_or_else(|| anyhow::anyhow!("Device {} has no primary IPv4 address", name))?;
    success("Device validation passed");

    let credentials = ctx
        .nautobot
        .resolve_credentials(&device, &ctx.config.default_credentials())
        .await;

    tracing::info!("{}", super::heavy_rule());
    tracing::info!("Fetching intended configuration from Golden Config...");
    let intended = match ctx.nautobot.get_intended_config(&device.id).await? {
        Some(cfg) => cfg,
        None => {
            tracing::warn!("No Golden Config intended configuration found for {}", name);
            tracing::error!("Please run the Golden Config 'Generate Intended Configurations' job first");
            return Err(anyhow::anyhow!("No intended configuration available. Cannot proceed."));
        }
    };
    success("Found existing intended config");
    tracing::info!("Config preview:\n{}", truncate_lines(&intended, 10));

    tracing::info!("{}", super::heavy_rule());
    tracing::info!("Connecting to device and deploying configuration...");
    tracing::info!("Device IP: {}", host);
    tracing::info!("NAPALM Driver: {}", platform.napalm_driver);
    tracing::info!("Mode: {}", if opts.dry_run { "DRY RUN" } else { "LIVE DEPLOYMENT" });
    tracing::info!("Method: {}", if opts.replace { "REPLACE" } else { "MERGE" });

    let options = ctx.driver_options(&platform.napalm_driver, platform.napalm_args.as_ref())?;

    tracing::info!("Opening connection to {}...", host);
    let outcome = match drivers::open_driver(&platform.napalm_driver, &host, credentials, &options).await {
        Ok(mut driver) => {
            success(&format!("Connected to {}", name));
            deploy_config(driver.as_mut(), &name, &intended, opts).await
        }
        Err(e) => report_failure(&name, e),
    };

    if !matches!(
        outcome.status,
        DeployStatus::ConnectionFailed | DeployStatus::RolledBack | DeployStatus::Failed
    ) {
        tracing::info!("{}", super::heavy_rule());
        success(&format!("Provisioning completed for {}", name));
        tracing::info!("{}", super::heavy_rule());
    }
    Ok(outcome)
}

/// Load, diff and commit or discard `config` on an open driver.
///
/// The driver is closed before returning, whatever the result.
pub async fn deploy_config(driver: &mut dyn NetworkDriver, device: &str, config: &str, opts: &Options) -> Outcome {
    let outcome = match load_and_apply(driver, device, config, opts).await {
        Ok(outcome) => outcome,
        Err(e) => {
            let discard = matches!(e, DriverError::Other(_));
            let outcome = report_failure(device, e);
            if discard {
                tracing::info!("Attempting to discard configuration changes...");
                match driver.discard_config().await {
                    Ok(()) => tracing::info!("Configuration changes discarded"),
                    Err(e) => tracing::error!("Could not discard config: {}", e),
                }
            }
            outcome
        }
    };

    match driver.close().await {
        Ok(()) => tracing::info!("Connection closed"),
        Err(e) => tracing::warn!("Error closing connection: {}", e),
    }
    outcome
}

async fn load_and_apply(
    driver: &mut dyn NetworkDriver,
    device: &str,
    config: &str,
    opts: &Options,
) -> Result<Outcome, DriverError> {
    tracing::info!("Loading configuration to device...");
    if opts.replace {
        tracing::warn!("REPLACE mode: Entire configuration will be replaced!");
        driver.load_replace_candidate(config).await?;
    } else {
        tracing::info!("MERGE mode: Configuration will be merged with existing");
        driver.load_merge_candidate(config).await?;
    }
    success("Configuration loaded successfully");

    tracing::info!("Generating configuration diff...");
    let diff = driver.compare_config().await?;
    if diff.trim().is_empty() {
        tracing::info!("No configuration changes detected");
        driver.discard_config().await?;
        return Ok(Outcome::new(device, DeployStatus::NoChanges));
    }

    tracing::info!("Configuration changes:");
    tracing::info!("{}", super::heavy_rule());
    tracing::info!("{}", diff);
    tracing::info!("{}", super::heavy_rule());

    let status = if opts.dry_run {
        tracing::warn!("DRY RUN mode: Discarding configuration changes");
        driver.discard_config().await?;
        tracing::info!("To apply these changes, run again with 'Dry run mode' unchecked");
        DeployStatus::DryRun
    } else if opts.commit {
        tracing::info!("Committing configuration changes...");
        driver.commit_config().await?;
        success("Configuration committed successfully and saved to startup-config");

        tracing::info!("Verifying configuration...");
        let facts = driver.get_facts().await?;
        success(&format!("Device {} is running with new configuration", facts.hostname));
        DeployStatus::Committed
    } else {
        tracing::warn!("Commit disabled: Changes loaded but not committed");
        driver.discard_config().await?;
        DeployStatus::NotCommitted
    };

    Ok(Outcome { diff: Some(diff), ..Outcome::new(device, status) })
}

fn report_failure(device: &str, err: DriverError) -> Outcome {
    let status = match &err {
        DriverError::Connection(_) => {
            tracing::error!("Connection error: {}", err);
            tracing::error!(
                "Please verify:\n  - Device is reachable\n  - Credentials are correct\n  - Management interface is configured\n  - SSH/API is enabled on device"
            );
            DeployStatus::ConnectionFailed
        }
        DriverError::Commit(_) | DriverError::Replace(_) => {
            tracing::error!("Configuration deployment error: {}", err);
            tracing::error!("Configuration has been rolled back");
            DeployStatus::RolledBack
        }
        DriverError::Unsupported(_) | DriverError::Other(_) => {
            tracing::error!("Unexpected error during deployment: {}", err);
            DeployStatus::Failed
        }
    };
    Outcome { error: Some(err.to_string()), ..Outcome::new(device, status) }
}
