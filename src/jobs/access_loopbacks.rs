use anyhow::Result;
use serde::Serialize;
use std::net::Ipv4Addr;

use super::{success, JobContext};
use crate::models::{outcome, status_name, DeviceOutcome};
use crate::nautobot::DeviceFilter;
use crate::utils;

pub const ACCESS_ROLE: &str = "Access Switch";

#[derive(Debug, Serialize)]
pub struct Outcome {
    pub subnet: String,
    pub devices: Vec<DeviceOutcome>,
}

/// Loopback0/Loopback1 addresses for the `idx`th device; Loopback1 reuses
/// Loopback0's address once the subnet runs out
pub fn loopback_pair(hosts: &[Ipv4Addr], idx: usize) -> Option<(Ipv4Addr, Ipv4Addr)> {
    let lo0 = *hosts.get(idx)?;
    let lo1 = hosts.get(idx + 1).copied().unwrap_or(lo0);
    Some((lo0, lo1))
}

pub fn loopback_commands(lo0: Ipv4Addr, lo1: Ipv4Addr) -> Vec<String> {
    vec![
        "configure terminal".to_string(),
        "interface Loopback0".to_string(),
        format!(" ip address {}/32", lo0),
        " no shutdown".to_string(),
        "exit".to_string(),
        "interface Loopback1".to_string(),
        format!(" ip address {}/32", lo1),
        " no shutdown".to_string(),
        "exit".to_string(),
        "end".to_string(),
        "write memory".to_string(),
    ]
}

/// Give every active access switch two /32 loopbacks from `subnet`
pub async fn run(ctx: &JobContext, subnet: Option<&str>) -> Result<Outcome> {
    let subnet = subnet.unwrap_or(&ctx.config.access_loopback_subnet).to_string();
    let hosts = utils::subnet_hosts(&subnet).map_err(|e| anyhow::anyhow!(e))?;

    let filter = DeviceFilter {
        role: Some(ACCESS_ROLE.to_string()),
        status: Some(status_name::ACTIVE.to_string()),
        ..Default::default()
    };
    let mut targets = ctx.nautobot.list_devices(&filter).await?;
    targets.sort_by_key(|d| d.display_name());
    tracing::info!("Found {} access switches", targets.len());

    let mut results = Vec::new();
    for (idx, device) in targets.iter().enumerate() {
        let name = device.display_name();
        let Some(host) = device.primary_host() else {
            tracing::warn!("Skip {}: no primary IP", name);
            results.push(DeviceOutcome::new(&name, outcome::SKIPPED).with_detail("no primary IP"));
            continue;
        };
        let Some((lo0, lo1)) = loopback_pair(&hosts, idx) else {
            tracing::warn!("Skip {}: subnet {} has no address left", name, subnet);
            results.push(DeviceOutcome::new(&name, outcome::SKIPPED).with_detail("subnet exhausted"));
            continue;
        };

        let commands = loopback_commands(lo0, lo1);
        let pushed = async {
            let eapi = ctx.eapi(&host, ctx.config.default_credentials())?;
            eapi.execute(&commands).await
        }
        .await;

        match pushed {
            Ok(_) => {
                success(&format!("Configured loopbacks on {} ({})", name, host));
                results.push(DeviceOutcome::new(&name, outcome::APPLIED).with_commands(commands));
            }
            Err(e) => {
                tracing::error!("Failed to configure loopbacks on {}: {}", name, e);
                results.push(DeviceOutcome::new(&name, outcome::FAILED).with_detail(e.to_string()));
            }
        }
    }

    Ok(Outcome { subnet, devices: results })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::testing;
    use httpmock::prelude::*;

    #[test]
    fn test_loopback_pair_clamps_at_end() {
        let hosts = utils::subnet_hosts("10.99.1.0/30").unwrap();
        assert_eq!(hosts.len(), 2);
        assert_eq!(
            loopback_pair(&hosts, 0),
            Some((Ipv4Addr::new(10, 99, 1, 1), Ipv4Addr::new(10, 99, 1, 2)))
        );
        assert_eq!(
            loopback_pair(&hosts, 1),
            Some((Ipv4Addr::new(10, 99, 1, 2), Ipv4Addr::new(10, 99, 1, 2)))
        );
        assert_eq!(loopback_pair(&hosts, 2), None);
    }

    #[test]
    fn test_commands_end_with_save() {
        let cmds = loopback_commands(Ipv4Addr::new(10, 99, 1, 1), Ipv4Addr::new(10, 99, 1, 2));
        assert_eq!(cmds[0], "configure terminal");
        assert_eq!(cmds[2], " ip address 10.99.1.1/32");
        assert_eq!(cmds[6], " ip address 10.99.1.2/32");
        assert_eq!(cmds.last().map(String::as_str), Some("write memory"));
    }

    #[tokio::test]
    async fn test_run_configures_switches_in_name_order() {
        let nautobot = MockServer::start_async().await;
        nautobot
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/dcim/devices/")
                    .query_param("role", "Access Switch")
                    .query_param("status", "Active");
                then.status(200).json_body(testing::page(serde_json::json!([
                    testing::device_json("d2", "access2", None),
                    testing::device_json("d1", "access1", Some("127.0.0.1"))
                ])));
            })
            .await;
        let device = MockServer::start_async().await;
        let push = device
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/command-api")
                    .body_includes("ip address 10.99.1.1/32")
                    .body_includes("ip address 10.99.1.2/32");
                then.status(200).json_body(serde_json::json!({"jsonrpc": "2.0", "id": "1", "result": []}));
            })
            .await;

        let ctx = testing::context(&nautobot.base_url(), device.port());
        let result = run(&ctx, None).await.unwrap();

        assert_eq!(result.subnet, "10.99.1.0/24");
        assert_eq!(result.devices[0].device, "access1");
        assert_eq!(result.devices[0].status, outcome::APPLIED);
        assert_eq!(result.devices[1].device, "access2");
        assert_eq!(result.devices[1].status, outcome::SKIPPED);
        push.assert_async().await;
    }
}
