use anyhow::Result;
use serde::Serialize;
use std::collections::HashMap;

use super::{success, JobContext};
use crate::drivers::{self, DriverError, NetworkDriver};
use crate::models::status_name;
use crate::nautobot::{DevicePatch, InterfacePatch, IpAddressCreate, NbDevice};

#[derive(Debug, Default, Serialize)]
pub struct Outcome {
    pub device: String,
    pub hostname: String,
    pub serial: String,
    pub interfaces_created: usize,
    pub interfaces_updated: usize,
    pub ips_created: usize,
    pub ips_assigned: usize,
}

/// Nautobot interface type implied by an interface name
pub fn interface_type(name: &str) -> &'static str {
    if name.contains("Management") || name.contains("Ethernet") {
        "1000base-t"
    } else if name.contains("Loopback") {
        "virtual"
    } else {
        "other"
    }
}

pub async fn run(ctx: &JobContext, device_name: &str) -> Result<Outcome> {
    tracing::info!("Starting sync for device: {}", device_name);
    let device = ctx.nautobot.get_device_by_name(device_name).await?;

    let credentials = ctx
        .nautobot
        .resolve_credentials(&device, &ctx.config.default_credentials())
        .await;

    let platform = match &device.platform {
        Some(p) => ctx.nautobot.get_platform(&p.id).await?,
        None => return Err(anyhow::anyhow!("Device {} has no platform or NAPALM driver configured", device_name)),
    };
    if platform.napalm_driver.is_empty() {
        return Err(anyhow::anyhow!("Device {} has no platform or NAPALM driver configured", device_name));
    }
    tracing::info!("Using NAPALM driver: {}", platform.napalm_driver);

    let host = device
        .primary_ipv4_host()
        .ok_or_else(|| anyhow::anyhow!("Device {} has no primary IPv4 address", device_name))?;
    tracing::info!("Connecting to {}...", host);

    let options = ctx.driver_options(&platform.napalm_driver, platform.napalm_args.as_ref())?;
    let mut driver = match drivers::open_driver(&platform.napalm_driver, &host, credentials, &options).await {
        Ok(d) => d,
        Err(e @ DriverError::Connection(_)) => {
            tracing::error!("Connection error: {}", e);
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };
    success(&format!("Connected to {}", device_name));

    let result = sync_from_driver(ctx, &device, driver.as_mut()).await;
    if let Err(e) = driver.close().await {
        tracing::warn!("Error closing connection: {}", e);
    }

    match result {
        Ok(outcome) => {
            success(&format!("Device sync completed for {}", outcome.hostname));
            Ok(outcome)
        }
        Err(e) => {
            tracing::error!("Error syncing device: {}", e);
            Err(e)
        }
    }
}

/// Copy facts, interfaces and interface addresses from an open driver into Nautobot
pub async fn sync_from_driver(ctx: &JobContext, device: &NbDevice, driver: &mut dyn NetworkDriver) -> Result<Outcome> {
    let nb = &ctx.nautobot;
    let mut outcome = Outcome { device: device.display_name(), ..Default::default() };

    tracing::info!("Fetching device facts...");
    let facts = driver.get_facts().await?;
    tracing::info!("Device facts: {:?}", facts);

    let mut patch = DevicePatch::default();
    if !facts.hostname.is_empty() {
        patch.name = Some(facts.hostname.clone());
    }
    if !facts.serial_number.is_empty() {
        patch.serial = Some(facts.serial_number.clone());
    }
    if !facts.model.is_empty() {
        tracing::info!("Model: {}", facts.model);
    }
    if !facts.os_version.is_empty() {
        tracing::info!("OS Version: {}", facts.os_version);
    }
    let updated = nb.update_device(&device.id, &patch).await?;
    outcome.hostname = updated.display_name();
    outcome.serial = updated.serial.clone();
    success(&format!("Updated device {}", outcome.hostname));

    tracing::info!("Fetching interfaces...");
    let interfaces = driver.get_interfaces().await?;
    tracing::info!("Found {} interfaces", interfaces.len());

    let status = status_id(ctx, device).await?;

    let mut interface_ids: HashMap<String, String> = HashMap::new();
    for (name, data) in &interfaces {
        tracing::debug!("Processing interface: {}", name);
        let (iface, created) = nb.get_or_create_interface(&device.id, name, "other", &status).await?;

        let patch = InterfacePatch {
            iface_type: Some(interface_type(name).to_string()),
            description: Some(data.description.clone()),
            mac_address: Some(data.mac_address.clone()).filter(|m| !m.is_empty()),
            mtu: Some(if data.mtu > 0 { data.mtu } else { 1500 }),
            enabled: Some(data.is_enabled),
        };
        nb.update_interface(&iface.id, &patch).await?;

        if created {
            tracing::info!("Created interface: {}", name);
            outcome.interfaces_created += 1;
        } else {
            tracing::debug!("Updated interface: {}", name);
            outcome.interfaces_updated += 1;
        }
        interface_ids.insert(name.clone(), iface.id);
    }

    tracing::info!("Fetching interface IP addresses...");
    if let Err(e) = sync_addresses(ctx, driver, &interface_ids, &status, &mut outcome).await {
        tracing::warn!("Could not fetch interface IPs: {}", e);
    }

    Ok(outcome)
}

async fn sync_addresses(
    ctx: &JobContext,
    driver: &dyn NetworkDriver,
    interface_ids: &HashMap<String, String>,
    status: &str,
    outcome: &mut Outcome,
) -> Result<()> {
    let nb = &ctx.nautobot;
    let interface_ips = driver.get_interfaces_ip().await?;

    for (name, ips) in &interface_ips {
        let iface_id = match interface_ids.get(name) {
            Some(id) => id,
            None => {
                tracing::warn!("Interface {} not found for IP assignment", name);
                continue;
            }
        };

        for (addr, prefix_len) in &ips.ipv4 {
            let address = format!("{}/{}", addr, prefix_len);
            let (ip, created) = match nb.get_ip_address_by_address(&address).await? {
                Some(existing) if existing.status.as_ref().map(|s| s.id.as_str()) != Some(status) => {
                    let patch = serde_json::json!({ "status": status });
                    (nb.update_ip_address(&existing.id, &patch).await?, false)
                }
                Some(existing) => (existing, false),
                None => {
                    let ip = nb
                        .create_ip_address(&IpAddressCreate {
                            address: address.clone(),
                            status: status.to_string(),
                            description: String::new(),
                            namespace: None,
                        })
                        .await?;
                    (ip, true)
                }
            };

            if nb.assign_ip_to_interface(&ip.id, iface_id).await? {
                outcome.ips_assigned += 1;
            }
            if created {
                tracing::info!("Created IP {} on {}", address, name);
                outcome.ips_created += 1;
            } else {
                tracing::debug!("Updated IP {} on {}", address, name);
            }
        }
    }
    Ok(())
}

/// Status id for created objects: the device's own status, else `Active`
async fn status_id(ctx: &JobContext, device: &NbDevice) -> Result<String> {
    if let Some(status) = &device.status {
        return Ok(status.id.clone());
    }
    match ctx.nautobot.get_status_by_name(status_name::ACTIVE).await? {
        Some(status) => Ok(status.id),
        None => Err(anyhow::anyhow!("Status '{}' not found in Nautobot", status_name::ACTIVE)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::fake::FakeDriver;
    use crate::drivers::{Facts, Interface, InterfaceIps};
    use crate::jobs::testing;
    use httpmock::prelude::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_interface_type() {
        assert_eq!(interface_type("Management0"), "1000base-t");
        assert_eq!(interface_type("Ethernet1"), "1000base-t");
        assert_eq!(interface_type("Loopback0"), "virtual");
        assert_eq!(interface_type("Port-Channel1"), "other");
    }

    fn fake_switch() -> FakeDriver {
        let mut interfaces = BTreeMap::new();
        interfaces.insert(
            "Ethernet1".to_string(),
            Interface { is_up: true, is_enabled: true, description: "uplink".into(), mac_address: "aa:c1:ab:00:00:01".into(), mtu: 9214, speed: 1000.0 },
        );
        interfaces.insert("Loopback0".to_string(), Interface { is_enabled: true, ..Default::default() });

        let mut ips = InterfaceIps::default();
        ips.ipv4.insert("10.0.0.1".into(), 31);
        let mut interface_ips = BTreeMap::new();
        interface_ips.insert("Ethernet1".to_string(), ips);
        interface_ips.insert("Vlan99".to_string(), InterfaceIps::default());

        FakeDriver {
            facts: Facts { hostname: "access1".into(), serial_number: "SN123".into(), model: "cEOSLab".into(), ..Default::default() },
            interfaces,
            interface_ips,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_sync_updates_inventory() {
        let server = MockServer::start_async().await;

        let device_patch = server
            .mock_async(|when, then| {
                when.method(PATCH).path("/api/dcim/devices/d1/").json_body(serde_json::json!({"name": "access1", "serial": "SN123"}));
                then.status(200).json_body(serde_json::json!({"id": "d1", "name": "access1", "serial": "SN123"}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/dcim/interfaces/").query_param("name", "Ethernet1");
                then.status(200).json_body(testing::page(serde_json::json!([{"id": "i1", "name": "Ethernet1"}])));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/dcim/interfaces/").query_param("name", "Loopback0");
                then.status(200).json_body(testing::page(serde_json::json!([])));
            })
            .await;
        let create_loopback = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/dcim/interfaces/").json_body(serde_json::json!({
                    "device": "d1", "name": "Loopback0", "type": "other", "status": "st1"
                }));
                then.status(201).json_body(serde_json::json!({"id": "i2", "name": "Loopback0"}));
            })
            .await;
        let patch_eth = server
            .mock_async(|when, then| {
                when.method(PATCH).path("/api/dcim/interfaces/i1/").json_body(serde_json::json!({
                    "type": "1000base-t", "description": "uplink", "mac_address": "aa:c1:ab:00:00:01", "mtu": 9214, "enabled": true
                }));
                then.status(200).json_body(serde_json::json!({"id": "i1", "name": "Ethernet1"}));
            })
            .await;
        let patch_lo = server
            .mock_async(|when, then| {
                when.method(PATCH).path("/api/dcim/interfaces/i2/").json_body(serde_json::json!({
                    "type": "virtual", "description": "", "mtu": 1500, "enabled": true
                }));
                then.status(200).json_body(serde_json::json!({"id": "i2", "name": "Loopback0"}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/ipam/ip-addresses/").query_param("address", "10.0.0.1/31");
                then.status(200).json_body(testing::page(serde_json::json!([])));
            })
            .await;
        let create_ip = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/ipam/ip-addresses/");
                then.status(201).json_body(serde_json::json!({"id": "ip9", "address": "10.0.0.1/31"}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/ipam/ip-address-to-interface/");
                then.status(200).json_body(testing::page(serde_json::json!([])));
            })
            .await;
        let assign = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/ipam/ip-address-to-interface/").json_body(serde_json::json!({"ip_address": "ip9", "interface": "i1"}));
                then.status(201).json_body(serde_json::json!({"id": "a1"}));
            })
            .await;

        let ctx = testing::context(&server.base_url(), 1);
        let device: NbDevice = serde_json::from_value(testing::device_json("d1", "access1", Some("172.20.20.11"))).unwrap();
        let mut driver = fake_switch();
        let out = sync_from_driver(&ctx, &device, &mut driver).await.unwrap();

        assert_eq!(out.hostname, "access1");
        assert_eq!(out.serial, "SN123");
        assert_eq!(out.interfaces_created, 1);
        assert_eq!(out.interfaces_updated, 1);
        assert_eq!(out.ips_created, 1);
        assert_eq!(out.ips_assigned, 1);
        device_patch.assert_async().await;
        create_loopback.assert_async().await;
        patch_eth.assert_async().await;
        patch_lo.assert_async().await;
        create_ip.assert_async().await;
        assign.assert_async().await;
    }

    #[tokio::test]
    async fn test_device_without_status_uses_active_id() {
        let server = MockServer::start_async().await;
        let lookup = server
            .mock_async(|when, then| {
                when.method(GET).path("/api/extras/statuses/").query_param("name", "Active");
                then.status(200).json_body(testing::page(serde_json::json!([{"id": "st-active", "name": "Active"}])));
            })
            .await;

        let ctx = testing::context(&server.base_url(), 1);
        let mut raw = testing::device_json("d1", "access1", None);
        raw["status"] = serde_json::Value::Null;
        let device: NbDevice = serde_json::from_value(raw).unwrap();
        assert_eq!(status_id(&ctx, &device).await.unwrap(), "st-active");
        lookup.assert_async().await;

        let with_status: NbDevice = serde_json::from_value(testing::device_json("d2", "access2", None)).unwrap();
        assert_eq!(status_id(&ctx, &with_status).await.unwrap(), "st1");
        assert_eq!(lookup.hits_async().await, 1);
    }

    #[tokio::test]
    async fn test_address_failure_is_only_a_warning() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(PATCH).path("/api/dcim/devices/d1/");
                then.status(200).json_body(serde_json::json!({"id": "d1", "name": "access1"}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/dcim/interfaces/");
                then.status(200).json_body(testing::page(serde_json::json!([{"id": "i1", "name": "Ethernet1"}])));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(PATCH).path("/api/dcim/interfaces/i1/");
                then.status(200).json_body(serde_json::json!({"id": "i1", "name": "Ethernet1"}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/ipam/ip-addresses/");
                then.status(503).body("unavailable");
            })
            .await;

        let ctx = testing::context(&server.base_url(), 1);
        let device: NbDevice = serde_json::from_value(testing::device_json("d1", "access1", None)).unwrap();
        let mut driver = fake_switch();
        let out = sync_from_driver(&ctx, &device, &mut driver).await.unwrap();
        assert_eq!(out.interfaces_updated, 2);
        assert_eq!(out.ips_created, 0);
    }
}
