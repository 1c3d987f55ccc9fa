use anyhow::Result;
use serde::Serialize;

use super::{banner, JobContext};
use crate::nautobot::DeviceFilter;

pub const DEFAULT_INTERFACE: &str = "Ethernet2";

#[derive(Debug, Clone)]
pub struct Options {
    pub devices: Vec<String>,
    pub interface: String,
}

/// One row of the diagnostic table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterfaceCheck {
    pub device: String,
    pub interface: String,
    /// `ENABLED`, `SHUTDOWN`, `NOT FOUND` or `ERROR`
    pub status: String,
    pub link: String,
    pub vlan: String,
    pub problem: String,
}

impl InterfaceCheck {
    fn unknown(device: &str, interface: &str, status: &str, link: String, problem: &str) -> Self {
        Self {
            device: device.to_string(),
            interface: interface.to_string(),
            status: status.to_string(),
            link,
            vlan: "N/A".to_string(),
            problem: problem.to_string(),
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.status == "SHUTDOWN"
    }
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub checks: Vec<InterfaceCheck>,
    pub shutdown: Vec<String>,
}

async fn check_interface(ctx: &JobContext, device: &str, host: &str, interface: &str) -> InterfaceCheck {
    let status = async {
        let eapi = ctx.eapi(host, ctx.config.default_credentials())?;
        eapi.interface_status(interface).await
    }
    .await;

    match status {
        Ok(Some(s)) => {
            let shutdown = s.is_shutdown();
            InterfaceCheck {
                device: device.to_string(),
                interface: interface.to_string(),
                status: if shutdown { "SHUTDOWN" } else { "ENABLED" }.to_string(),
                link: s.link_status,
                vlan: s.vlan.unwrap_or_else(|| "N/A".to_string()),
                problem: if shutdown { "YES" } else { "NO" }.to_string(),
            }
        }
        Ok(None) => InterfaceCheck::unknown(device, interface, "NOT FOUND", "N/A".to_string(), "UNKNOWN"),
        Err(e) => {
            let mut link = e.to_string();
            link.truncate(30);
            InterfaceCheck::unknown(device, interface, "ERROR", link, "ERROR")
        }
    }
}

/// Fixed-width text table of the checks
pub fn format_table(checks: &[InterfaceCheck]) -> String {
    let headers = ["Device", "Interface", "Status", "Link State", "VLAN", "Is Problem?"];
    let rows: Vec<[&str; 6]> = checks
        .iter()
        .map(|c| [c.device.as_str(), &c.interface, &c.status, &c.link, &c.vlan, &c.problem])
        .collect();

    let mut widths = headers.map(str::len);
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row.iter()) {
            *w = (*w).max(cell.len());
        }
    }

    let line = |cells: &[&str]| {
        cells
            .iter()
            .zip(widths.iter())
            .map(|(c, w)| format!("{:<width$}", c, width = *w))
            .collect::<Vec<_>>()
            .join(" | ")
    };
    let separator = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("-+-");

    let mut out = vec![line(&headers[..]), separator];
    out.extend(rows.iter().map(|r| line(&r[..])));
    out.join("\n")
}

pub async fn run(ctx: &JobContext, opts: &Options) -> Result<Report> {
    banner("DIAGNOSTIC: Checking Interface Status");
    tracing::info!("Checking if {} interfaces are enabled...", opts.interface);

    let devices = ctx.nautobot.list_devices(&DeviceFilter::names(&opts.devices)).await?;

    let mut checks = Vec::new();
    for device in &devices {
        let name = device.display_name();
        let Some(host) = device.primary_host() else {
            tracing::warn!("Skip {}: no primary IP", name);
            continue;
        };
        tracing::info!("Checking {} ({})...", name, host);
        checks.push(check_interface(ctx, &name, &host, &opts.interface).await);
    }

    banner("DIAGNOSTIC RESULTS");
    for line in format_table(&checks).lines() {
        tracing::info!("{}", line);
    }

    banner("SUMMARY");
    let shutdown: Vec<String> = checks.iter().filter(|c| c.is_shutdown()).map(|c| c.device.clone()).collect();
    if shutdown.is_empty() {
        tracing::info!("No problems found - all {} interfaces are enabled", opts.interface);
        tracing::info!("If connectivity still fails, check VLAN configuration, routing and firewall rules");
    } else {
        tracing::warn!("Found {} PROBLEM(S):", shutdown.len());
        for device in &shutdown {
            tracing::warn!("  {} {} is SHUTDOWN", device, opts.interface);
        }
        tracing::info!("Run push-template with the connectivity-fix template to enable these interfaces");
    }

    Ok(Report { checks, shutdown })
}
