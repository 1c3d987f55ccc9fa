use anyhow::Result;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use super::device_status_monitor::select_lab_devices;
use super::{Connector, JobContext};
use crate::drivers::{Facts, Interface, LldpNeighbor, NetworkDriver};
use crate::models::lab;
use crate::nautobot::{InterfacePatch, NbDevice};

#[derive(Debug, Clone)]
pub struct Options {
    pub device: Option<String>,
    pub discover_interfaces: bool,
    pub discover_neighbors: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self { device: None, discover_interfaces: true, discover_neighbors: true }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct Discovery {
    pub device: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facts: Option<Facts>,
    pub interfaces: BTreeMap<String, Interface>,
    pub neighbors: BTreeMap<String, Vec<LldpNeighbor>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn run(ctx: &JobContext, opts: &Options) -> Result<Vec<Discovery>> {
    run_with(ctx, ctx, opts).await
}

pub async fn run_with(ctx: &JobContext, connector: &dyn Connector, opts: &Options) -> Result<Vec<Discovery>> {
    tracing::info!("Starting network discovery...");

    let devices = select_lab_devices(ctx, opts.device.as_deref()).await?;
    if devices.is_empty() {
        tracing::warn!("No devices found to discover");
        return Ok(Vec::new());
    }

    let mut results = Vec::new();
    for device in &devices {
        let name = device.display_name();
        tracing::info!("Discovering device: {}", name);

        let target = match lab::find(&name) {
            Some(t) => t,
            None => {
                tracing::warn!("Unknown device type for {}", name);
                continue;
            }
        };

        let discovered = match connector
            .connect(target.driver, target.ip, ctx.config.default_credentials())
            .await
        {
            Ok(mut conn) => {
                tracing::info!("Connected to {} ({})", name, target.ip);
                let result = discover_device(ctx, device, conn.as_mut(), opts).await;
                if let Err(e) = conn.close().await {
                    tracing::warn!("Error closing connection to {}: {}", name, e);
                }
                result
            }
            Err(e) => Err(e.into()),
        };

        match discovered {
            Ok(d) => results.push(d),
            Err(e) => {
                tracing::error!("Discovery failed for {}: {}", name, e);
                results.push(Discovery { device: name, error: Some(e.to_string()), ..Default::default() });
            }
        }
    }

    tracing::info!("Network discovery complete!");
    tracing::info!("Discovered {} devices", results.len());
    Ok(results)
}

async fn discover_device(
    ctx: &JobContext,
    device: &NbDevice,
    conn: &mut dyn NetworkDriver,
    opts: &Options,
) -> Result<Discovery> {
    let name = device.display_name();
    let facts = conn.get_facts().await?;
    tracing::info!("Device: {} - {} - {}", facts.hostname, facts.model, facts.os_version);

    let mut discovery = Discovery { device: name.clone(), facts: Some(facts), ..Default::default() };

    if opts.discover_interfaces {
        let interfaces = conn.get_interfaces().await?;
        tracing::info!("Found {} interfaces", interfaces.len());

        let known: HashMap<String, String> = ctx
            .nautobot
            .list_interfaces(&device.id)
            .await?
            .into_iter()
            .map(|i| (i.name, i.id))
            .collect();

        for (iface, data) in &interfaces {
            tracing::info!("Interface {}: {} - {}", iface, data.is_up, data.speed);
            match known.get(iface) {
                Some(id) => {
                    let patch = InterfacePatch { enabled: Some(data.is_up), ..Default::default() };
                    if let Err(e) = ctx.nautobot.update_interface(id, &patch).await {
                        tracing::warn!("Failed to update {} on {}: {}", iface, name, e);
                    }
                }
                None => tracing::warn!("Interface {} not found in Nautobot for {}", iface, name),
            }
        }
        discovery.interfaces = interfaces;
    }

    if opts.discover_neighbors {
        match conn.get_lldp_neighbors().await {
            Ok(neighbors) => {
                tracing::info!("Found {} LLDP neighbors", neighbors.len());
                for (port, list) in &neighbors {
                    for n in list {
                        tracing::info!("Port {} -> {} ({})", port, n.hostname, n.port);
                    }
                }
                discovery.neighbors = neighbors;
            }
            Err(e) => tracing::warn!("LLDP discovery failed for {}: {}", name, e),
        }
    }

    Ok(discovery)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::fake::FakeDriver;
    use crate::jobs::testing::{self, FakeConnector};
    use httpmock::prelude::*;

    async fn nautobot_with_access1() -> MockServer {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/dcim/devices/").query_param("name", "access1");
                then.status(200).json_body(testing::page(serde_json::json!([
                    testing::device_json("d1", "access1", None)
                ])));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/dcim/interfaces/").query_param("device_id", "d1");
                then.status(200).json_body(testing::page(serde_json::json!([{"id": "i1", "name": "Ethernet1"}])));
            })
            .await;
        server
    }

    fn switch(fail_lldp: bool) -> FakeDriver {
        let mut d = FakeDriver { fail_lldp, ..Default::default() };
        d.interfaces.insert("Ethernet1".into(), Interface { is_up: false, is_enabled: true, ..Default::default() });
        d.interfaces.insert("Ethernet9".into(), Interface { is_up: true, ..Default::default() });
        d.neighbors.insert(
            "Ethernet1".into(),
            vec![LldpNeighbor { hostname: "dist1".into(), port: "ethernet-1/1".into() }],
        );
        d
    }

    #[tokio::test]
    async fn test_discovery_updates_enabled_from_link_state() {
        let server = nautobot_with_access1().await;
        let disable = server
            .mock_async(|when, then| {
                when.method(PATCH).path("/api/dcim/interfaces/i1/").json_body(serde_json::json!({"enabled": false}));
                then.status(200).json_body(serde_json::json!({"id": "i1", "name": "Ethernet1"}));
            })
            .await;

        let ctx = testing::context(&server.base_url(), 1);
        let mut connector = FakeConnector::default();
        connector.drivers.insert("172.20.20.11".into(), switch(false));

        let opts = Options { device: Some("access1".into()), ..Default::default() };
        let results = run_with(&ctx, &connector, &opts).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].interfaces.len(), 2);
        assert_eq!(results[0].neighbors["Ethernet1"][0].hostname, "dist1");
        disable.assert_async().await;
    }

    #[tokio::test]
    async fn test_lldp_failure_is_a_warning() {
        let server = nautobot_with_access1().await;
        server
            .mock_async(|when, then| {
                when.method(PATCH).path("/api/dcim/interfaces/i1/");
                then.status(200).json_body(serde_json::json!({"id": "i1", "name": "Ethernet1"}));
            })
            .await;

        let ctx = testing::context(&server.base_url(), 1);
        let mut connector = FakeConnector::default();
        connector.drivers.insert("172.20.20.11".into(), switch(true));

        let opts = Options { device: Some("access1".into()), ..Default::default() };
        let results = run_with(&ctx, &connector, &opts).await.unwrap();

        assert!(results[0].error.is_none());
        assert!(results[0].facts.is_some());
        assert!(results[0].neighbors.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_device_records_error() {
        let server = nautobot_with_access1().await;
        let ctx = testing::context(&server.base_url(), 1);
        let opts = Options { device: Some("access1".into()), ..Default::default() };
        let results = run_with(&ctx, &FakeConnector::default(), &opts).await.unwrap();
        assert_eq!(results[0].error.as_deref(), Some("connection error: 172.20.20.11 unreachable"));
    }
}
