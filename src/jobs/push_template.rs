use anyhow::Result;
use serde::Serialize;

use super::{heavy_rule, success, JobContext};
use crate::models::{outcome, DeviceOutcome};
use crate::nautobot::{DeviceFilter, NbDevice};
use crate::render::{self, BuiltinTemplate};
use crate::utils;

/// Loopback addresses mirror the management address: 172.20.20.11 -> 10.99.1.11
const LOOPBACK_NETWORK: &str = "10.99.1";

#[derive(Debug, Clone)]
pub struct Options {
    /// Empty means every device matching `role`
    pub devices: Vec<String>,
    pub role: Option<String>,
    pub template: BuiltinTemplate,
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
pub struct Outcome {
    pub template: String,
    pub dry_run: bool,
    pub devices: Vec<DeviceOutcome>,
}

pub fn loopback_ip(management_ip: &str) -> Option<String> {
    utils::last_octet(management_ip).map(|o| format!("{}.{}", LOOPBACK_NETWORK, o))
}

/// Render `template` for one device and return the lines to send
pub async fn render_for_device(
    ctx: &JobContext,
    device: &NbDevice,
    host: &str,
    template: BuiltinTemplate,
) -> Result<Vec<String>> {
    let interfaces = ctx.nautobot.list_interfaces(&device.id).await?;
    tracing::info!("Found {} interfaces - states from Nautobot:", interfaces.len());
    for iface in interfaces.iter().take(5) {
        tracing::info!("  {}: {}", iface.name, if iface.enabled { "ENABLED" } else { "DISABLED" });
    }
    if interfaces.len() > 5 {
        tracing::info!("  ... and {} more", interfaces.len() - 5);
    }

    let loopback = loopback_ip(host).ok_or_else(|| anyhow::anyhow!("Invalid management IP {}", host))?;
    tracing::info!("Loopback IP (based on mgmt IP): {}", loopback);

    let mut context = tera::Context::new();
    context.insert("device", device);
    context.insert("interfaces", &interfaces);
    context.insert("loopback_ip", &loopback);

    let rendered = render::render_str(template.name(), template.source(), &context)?;
    Ok(render::config_lines(&rendered))
}

pub async fn run(ctx: &JobContext, opts: &Options) -> Result<Outcome> {
    let filter = DeviceFilter {
        names: opts.devices.clone(),
        role: opts.role.clone(),
        ..Default::default()
    };
    let devices = ctx.nautobot.list_devices(&filter).await?;
    tracing::info!("Found {} devices in Nautobot", devices.len());

    let mut results = Vec::new();
    for device in &devices {
        let name = device.display_name();
        let Some(host) = device.primary_host() else {
            tracing::warn!("Skip {}: no primary IP", name);
            results.push(DeviceOutcome::new(&name, outcome::SKIPPED).with_detail("no primary IP"));
            continue;
        };

        let lines = match render_for_device(ctx, device, &host, opts.template).await {
            Ok(lines) => lines,
            Err(e) => {
                tracing::error!("Failed to render {} for {}: {}", opts.template.name(), name, e);
                results.push(DeviceOutcome::new(&name, outcome::FAILED).with_detail(e.to_string()));
                continue;
            }
        };

        tracing::info!("Rendered config for {}:", name);
        for line in &lines {
            tracing::info!("{}", line);
        }
        tracing::info!("{}", heavy_rule());

        if opts.dry_run {
            results.push(DeviceOutcome::new(&name, outcome::DRY_RUN).with_commands(lines));
            continue;
        }
        if lines.is_empty() {
            results.push(DeviceOutcome::new(&name, outcome::SKIPPED).with_detail("nothing to push"));
            continue;
        }

        let pushed = async {
            let eapi = ctx.eapi(&host, ctx.config.default_credentials())?;
            eapi.config(&lines).await?;
            eapi.save("write memory").await
        }
        .await;

        match pushed {
            Ok(()) => {
                success(&format!("Configuration applied to {} ({})", name, host));
                results.push(DeviceOutcome::new(&name, outcome::APPLIED).with_commands(lines));
            }
            Err(e) => {
                tracing::error!("Failed to push config to {}: {}", name, e);
                results.push(DeviceOutcome::new(&name, outcome::FAILED).with_detail(e.to_string()));
            }
        }
    }

    Ok(Outcome {
        template: opts.template.name().to_string(),
        dry_run: opts.dry_run,
        devices: results,
    })
}
