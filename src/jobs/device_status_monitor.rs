use anyhow::Result;
use serde::Serialize;

use super::{Connector, JobContext};
use crate::drivers::{Facts, NetworkDriver};
use crate::models::{lab, status_name};
use crate::nautobot::{DeviceFilter, DevicePatch, NbDevice};

#[derive(Debug, Clone)]
pub struct Options {
    /// Empty means every lab device
    pub device: Option<String>,
    pub check_interfaces: bool,
    pub check_system: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self { device: None, check_interfaces: true, check_system: true }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InterfaceSummary {
    pub total: usize,
    pub up: usize,
    pub up_list: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatus {
    pub device: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facts: Option<Facts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interfaces: Option<InterfaceSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Devices named by `device`, or the whole lab set
pub(crate) async fn select_lab_devices(ctx: &JobContext, device: Option<&str>) -> Result<Vec<NbDevice>> {
    let names: Vec<String> = match device.filter(|d| !d.is_empty()) {
        Some(d) => vec![d.to_string()],
        None => lab::device_names().into_iter().map(String::from).collect(),
    };
    ctx.nautobot.list_devices(&DeviceFilter::names(&names)).await
}

pub async fn run(ctx: &JobContext, opts: &Options) -> Result<Vec<DeviceStatus>> {
    run_with(ctx, ctx, opts).await
}

pub async fn run_with(ctx: &JobContext, connector: &dyn Connector, opts: &Options) -> Result<Vec<DeviceStatus>> {
    tracing::info!("Starting device status monitoring...");

    let devices = select_lab_devices(ctx, opts.device.as_deref()).await?;
    if devices.is_empty() {
        tracing::warn!("No devices found to monitor");
        return Ok(Vec::new());
    }

    let mut results = Vec::new();
    for device in &devices {
        let name = device.display_name();
        tracing::info!("Monitoring device: {}", name);

        let target = match lab::find(&name) {
            Some(t) => t,
            None => {
                tracing::warn!("Unknown device type for {}", name);
                continue;
            }
        };

        let result = match connector
            .connect(target.driver, target.ip, ctx.config.default_credentials())
            .await
        {
            Ok(mut conn) => {
                tracing::info!("Connected to {} ({})", name, target.ip);
                let checked = check_device(conn.as_mut(), &name, opts).await;
                if let Err(e) = conn.close().await {
                    tracing::warn!("Error closing connection to {}: {}", name, e);
                }
                checked
            }
            Err(e) => Err(e.into()),
        };

        let status = match result {
            Ok(status) => {
                set_status(ctx, device, status_name::ACTIVE).await;
                status
            }
            Err(e) => {
                tracing::error!("Failed to connect to {}: {}", name, e);
                set_status(ctx, device, status_name::FAILED).await;
                DeviceStatus {
                    device: name.clone(),
                    status: "failed".to_string(),
                    facts: None,
                    interfaces: None,
                    error: Some(e.to_string()),
                }
            }
        };
        results.push(status);
    }

    tracing::info!("Device monitoring complete!");
    tracing::info!("Results: {}", serde_json::to_string(&results).unwrap_or_default());
    Ok(results)
}

async fn check_device(conn: &mut dyn NetworkDriver, name: &str, opts: &Options) -> Result<DeviceStatus> {
    let mut status = DeviceStatus {
        device: name.to_string(),
        status: "connected".to_string(),
        facts: None,
        interfaces: None,
        error: None,
    };

    if opts.check_system {
        let facts = conn.get_facts().await?;
        tracing::info!(
            "System: {} - {}",
            if facts.hostname.is_empty() { "Unknown" } else { &facts.hostname },
            if facts.os_version.is_empty() { "Unknown" } else { &facts.os_version }
        );
        status.facts = Some(facts);
    }

    if opts.check_interfaces {
        let interfaces = conn.get_interfaces().await?;
        let up_list: Vec<String> = interfaces
            .iter()
            .filter(|(_, i)| i.is_up)
            .map(|(n, _)| n.clone())
            .collect();
        tracing::info!("Interfaces up: {}/{}", up_list.len(), interfaces.len());
        status.interfaces = Some(InterfaceSummary { total: interfaces.len(), up: up_list.len(), up_list });
    }

    Ok(status)
}

async fn set_status(ctx: &JobContext, device: &NbDevice, status: &str) {
    let found = match ctx.nautobot.get_status_by_name(status).await {
        Ok(Some(s)) => s,
        Ok(None) => {
            tracing::warn!("{} status not found in Nautobot", status);
            return;
        }
        Err(e) => {
            tracing::warn!("Could not look up {} status: {}", status, e);
            return;
        }
    };

    let patch = DevicePatch { status: Some(found.id), ..Default::default() };
    if let Err(e) = ctx.nautobot.update_device(&device.id, &patch).await {
        tracing::warn!("Failed to set {} status on {}: {}", status, device.display_name(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::fake::FakeDriver;
    use crate::drivers::Interface;
    use crate::jobs::testing::{self, FakeConnector};
    use httpmock::prelude::*;

    fn access1() -> FakeDriver {
        let mut d = FakeDriver {
            facts: Facts { hostname: "access1".into(), os_version: "4.30.1F".into(), ..Default::default() },
            ..Default::default()
        };
        d.interfaces.insert("Ethernet1".into(), Interface { is_up: true, ..Default::default() });
        d.interfaces.insert("Ethernet2".into(), Interface { is_up: false, ..Default::default() });
        d
    }

    #[tokio::test]
    async fn test_reachable_device_goes_active_unreachable_goes_failed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/dcim/devices/").query_param("name", "access1").query_param("name", "rtr1");
                then.status(200).json_body(testing::page(serde_json::json!([
                    testing::device_json("d1", "access1", None),
                    testing::device_json("d4", "rtr1", None),
                    testing::device_json("d9", "workstation1", None)
                ])));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/extras/statuses/").query_param("name", "Active");
                then.status(200).json_body(testing::page(serde_json::json!([{"id": "st-active", "name": "Active"}])));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/extras/statuses/").query_param("name", "Failed");
                then.status(200).json_body(testing::page(serde_json::json!([])));
            })
            .await;
        let activate = server
            .mock_async(|when, then| {
                when.method(PATCH).path("/api/dcim/devices/d1/").json_body(serde_json::json!({"status": "st-active"}));
                then.status(200).json_body(serde_json::json!({"id": "d1", "name": "access1"}));
            })
            .await;
        let rtr_patch = server
            .mock_async(|when, then| {
                when.method(PATCH).path("/api/dcim/devices/d4/");
                then.status(200).json_body(serde_json::json!({"id": "d4", "name": "rtr1"}));
            })
            .await;

        let ctx = testing::context(&server.base_url(), 1);
        let fake = access1();
        let mut connector = FakeConnector::default();
        connector.drivers.insert("172.20.20.11".into(), fake.clone());

        let results = run_with(&ctx, &connector, &Options::default()).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].status, "connected");
        let ifaces = results[0].interfaces.as_ref().unwrap();
        assert_eq!((ifaces.total, ifaces.up), (2, 1));
        assert_eq!(ifaces.up_list, vec!["Ethernet1".to_string()]);
        assert_eq!(results[1].status, "failed");
        assert!(results[1].error.as_deref().unwrap().contains("unreachable"));

        activate.assert_async().await;
        assert_eq!(rtr_patch.hits_async().await, 0);
        assert_eq!(fake.calls(), vec!["open", "get_facts", "get_interfaces", "close"]);
    }

    #[tokio::test]
    async fn test_no_devices_found() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/dcim/devices/").query_param("name", "ghost");
                then.status(200).json_body(testing::page(serde_json::json!([])));
            })
            .await;

        let ctx = testing::context(&server.base_url(), 1);
        let opts = Options { device: Some("ghost".into()), ..Default::default() };
        let results = run_with(&ctx, &FakeConnector::default(), &opts).await.unwrap();
        assert!(results.is_empty());
    }
}
