use anyhow::Result;
use serde::Serialize;

use super::{success, JobContext};
use crate::dialect::{self, Platform, Service, ServiceSelection};
use crate::models::{outcome, DeviceOutcome, ServicesContext};
use crate::nautobot::{DeviceFilter, NbDevice};

#[derive(Debug, Clone)]
pub struct Options {
    pub devices: Vec<String>,
    pub services: ServiceSelection,
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
pub struct Outcome {
    pub dry_run: bool,
    pub devices: Vec<DeviceOutcome>,
}

/// Commands for one device, or the reason it was skipped
#[derive(Debug, PartialEq)]
pub enum Plan {
    Commands { platform: Platform, commands: Vec<String> },
    Skip(String),
}

/// Decide what to send to a device from its config context
pub fn plan_device(name: &str, config_context: Option<&serde_json::Value>, services: ServiceSelection) -> Result<Plan> {
    let raw = match config_context {
        Some(raw) => raw,
        None => return Ok(Plan::Skip(format!("No config context found for {} - skipping", name))),
    };
    if raw.get("platform_specific").is_none() {
        return Ok(Plan::Skip(format!("No platform_specific config context for {} - skipping", name)));
    }

    let ctx: ServicesContext = serde_json::from_value(raw.clone())
        .map_err(|e| anyhow::anyhow!("Invalid config context for {}: {}", name, e))?;
    let mgmt = ctx
        .platform_specific
        .as_ref()
        .map(|p| p.management_interface.as_str())
        .unwrap_or_default();

    let platform = match Platform::detect(mgmt) {
        Some(p) => p,
        None => return Ok(Plan::Skip(format!("Unknown platform for {} - skipping", name))),
    };
    tracing::info!("Detected platform {} for {}", platform.label(), name);

    for service in Service::ALL {
        if services.enabled(service) && service.present_in(&ctx) {
            tracing::info!("Building {} configuration for {}", service.label(), name);
        }
    }

    let commands = dialect::build_commands(&ctx, platform, services);
    if commands.is_empty() {
        return Ok(Plan::Skip(format!("No configuration commands generated for {}", name)));
    }
    Ok(Plan::Commands { platform, commands })
}

pub async fn run(ctx: &JobContext, opts: &Options) -> Result<Outcome> {
    // An empty name filter would select the whole inventory
    if opts.devices.is_empty() {
        anyhow::bail!("No devices selected");
    }
    let devices = ctx.nautobot.list_devices(&DeviceFilter::names(&opts.devices)).await?;
    if devices.is_empty() {
        return Err(anyhow::anyhow!("No devices matched {:?}", opts.devices));
    }

    tracing::info!(
        "{}Configuring network services on {} devices",
        if opts.dry_run { "DRY RUN - " } else { "" },
        devices.len()
    );
    tracing::info!(
        "Services: NTP={}, DNS={}, Syslog={}, SNMP={}",
        opts.services.ntp,
        opts.services.dns,
        opts.services.syslog,
        opts.services.snmp
    );

    let mut results = Vec::new();
    for device in &devices {
        let result = configure_device(ctx, device, opts).await;
        results.push(result);
    }

    if opts.dry_run {
        success("DRY RUN completed - Review commands above");
    } else {
        success("Network services configuration completed!");
    }

    Ok(Outcome { dry_run: opts.dry_run, devices: results })
}

async fn configure_device(ctx: &JobContext, device: &NbDevice, opts: &Options) -> DeviceOutcome {
    let name = device.display_name();
    tracing::info!("{}", super::heavy_rule());
    tracing::info!(
        "Processing device: {} ({})",
        name,
        device.platform.as_ref().map(|p| p.label()).unwrap_or("no platform")
    );

    let config_context = match ctx.nautobot.get_config_context(&device.id).await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to read config context for {}: {}", name, e);
            return DeviceOutcome::new(&name, outcome::FAILED).with_detail(e.to_string());
        }
    };

    let (platform, commands) = match plan_device(&name, config_context.as_ref(), opts.services) {
        Ok(Plan::Commands { platform, commands }) => (platform, commands),
        Ok(Plan::Skip(reason)) => {
            tracing::warn!("{}", reason);
            return DeviceOutcome::new(&name, outcome::SKIPPED).with_detail(reason);
        }
        Err(e) => {
            tracing::error!("{}", e);
            return DeviceOutcome::new(&name, outcome::FAILED).with_detail(e.to_string());
        }
    };

    tracing::info!("Configuration commands for {}:", name);
    tracing::info!("{}", super::light_rule());
    for cmd in &commands {
        tracing::info!("  {}", cmd);
    }
    tracing::info!("{}", super::light_rule());

    if opts.dry_run {
        tracing::info!("DRY RUN - Configuration not applied to {}", name);
        return DeviceOutcome::new(&name, outcome::DRY_RUN).with_commands(commands);
    }

    let host = match device.primary_ipv4_host() {
        Some(h) => h,
        None => {
            tracing::error!("No primary IP address for {} - cannot connect", name);
            return DeviceOutcome::new(&name, outcome::FAILED)
                .with_detail("no primary IPv4 address")
                .with_commands(commands);
        }
    };

    match platform {
        Platform::Arista => {
            let save_command = config_context
                .as_ref()
                .and_then(|c| serde_json::from_value::<ServicesContext>(c.clone()).ok())
                .and_then(|c| c.platform_specific)
                .map(|p| p.save_command())
                .unwrap_or_else(|| "write memory".to_string());

            match apply_arista(ctx, &name, &host, &commands, &save_command).await {
                Ok(()) => {
                    success(&format!("Configuration applied successfully to {}", name));
                    DeviceOutcome::new(&name, outcome::APPLIED).with_commands(commands)
                }
                Err(e) => {
                    tracing::error!("Failed to apply configuration to {}: {}", name, e);
                    DeviceOutcome::new(&name, outcome::FAILED)
                        .with_detail(e.to_string())
                        .with_commands(commands)
                }
            }
        }
        Platform::Nokia => {
            tracing::warn!("Nokia configuration push not implemented yet for {}", name);
            tracing::info!("Commands to apply manually:\n{}", commands.join("\n"));
            DeviceOutcome::new(&name, outcome::MANUAL).with_commands(commands)
        }
    }
}

async fn apply_arista(ctx: &JobContext, name: &str, host: &str, commands: &[String], save_command: &str) -> Result<()> {
    let client = ctx.eapi(host, ctx.config.default_credentials())?;
    tracing::info!("Connecting to {} at {}...", name, host);
    client.config(commands).await?;
    client.save(save_command).await?;
    Ok(())
}
