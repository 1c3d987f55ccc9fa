//! Direct eAPI configuration of a single host: hostname, one interface,
//! or the basic bring-up of the lab's Arista switches.

use anyhow::Result;

use super::{success, JobContext};
use crate::models::{lab, outcome, DeviceOutcome};
use crate::utils;

const SAVE_COMMAND: &str = "write memory";

#[derive(Debug, Clone)]
pub struct InterfaceSettings {
    pub name: String,
    /// Address with prefix length, e.g. `172.10.10.11/24`
    pub ip_address: String,
    pub enabled: bool,
    pub save: bool,
}

pub fn interface_commands(settings: &InterfaceSettings) -> Vec<String> {
    vec![
        format!("interface {}", settings.name),
        format!("ip address {}", settings.ip_address),
        if settings.enabled { "no shutdown" } else { "shutdown" }.to_string(),
    ]
}

pub fn basic_commands(hostname: &str) -> Vec<String> {
    vec![
        format!("hostname {}", hostname),
        "interface Management0".to_string(),
        "no shutdown".to_string(),
        "interface Ethernet1".to_string(),
        "no shutdown".to_string(),
    ]
}

fn validate_host(host: &str) -> Result<()> {
    if !utils::is_valid_ipv4(host) && !utils::is_valid_hostname(host) {
        anyhow::bail!("Invalid host: {}", host);
    }
    Ok(())
}

async fn push(ctx: &JobContext, host: &str, commands: &[String], save: bool) -> Result<()> {
    let eapi = ctx.eapi(host, ctx.config.default_credentials())?;
    eapi.config(commands).await?;
    if save {
        eapi.save(SAVE_COMMAND).await?;
    }
    Ok(())
}

pub async fn set_hostname(ctx: &JobContext, host: &str, hostname: &str) -> Result<DeviceOutcome> {
    validate_host(host)?;
    if !utils::is_valid_hostname(hostname) {
        anyhow::bail!("Invalid hostname: {}", hostname);
    }

    let commands = vec![format!("hostname {}", hostname)];
    push(ctx, host, &commands, true).await?;
    success(&format!("Completed hostname configuration on {}", hostname));
    Ok(DeviceOutcome::new(host, outcome::APPLIED).with_commands(commands))
}

pub async fn configure_interface(ctx: &JobContext, host: &str, settings: &InterfaceSettings) -> Result<DeviceOutcome> {
    validate_host(host)?;
    utils::parse_ipv4_cidr(&settings.ip_address).map_err(|e| anyhow::anyhow!(e))?;

    let commands = interface_commands(settings);
    push(ctx, host, &commands, settings.save).await?;
    success(&format!(
        "Configured {} with IP {} on {}",
        settings.name, settings.ip_address, host
    ));
    Ok(DeviceOutcome::new(host, outcome::APPLIED).with_commands(commands))
}

/// Hostname plus Management0/Ethernet1 enable on every lab EOS switch
pub async fn basic_lab_config(ctx: &JobContext) -> Result<Vec<DeviceOutcome>> {
    let mut results = Vec::new();
    for dev in lab::DEVICES.iter().filter(|d| d.driver == "eos") {
        let commands = basic_commands(dev.name);
        match push(ctx, dev.ip, &commands, true).await {
            Ok(()) => {
                success(&format!("Configured {} ({})", dev.name, dev.ip));
                results.push(DeviceOutcome::new(dev.name, outcome::APPLIED).with_commands(commands));
            }
            Err(e) => {
                tracing::error!("Failed to configure {} ({}): {}", dev.name, dev.ip, e);
                results.push(DeviceOutcome::new(dev.name, outcome::FAILED).with_detail(e.to_string()));
            }
        }
    }
    Ok(results)
}
