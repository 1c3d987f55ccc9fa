//! Populate Nautobot with the containerlab topology: a fresh site, tags,
//! the management prefix, VLANs, platforms, roles, the four lab devices
//! and their `eth0` management addresses.

use anyhow::Result;
use serde::Serialize;
use std::collections::HashMap;

use super::{success, JobContext};
use crate::models::{lab, status_name};
use crate::nautobot::{
    DeviceCreate, IpAddressCreate, LocationCreate, LocationTypeCreate, NbStatus, PlatformCreate, PrefixCreate,
    VlanCreate,
};
use crate::utils;

pub const DEFAULT_MANAGEMENT_SUBNET: &str = "172.20.20.0/24";

const TAGS: &[(&str, &str)] = &[
    ("lab", "2196f3"),
    ("containerlab", "4caf50"),
    ("automation", "ff9800"),
    ("demo", "9c27b0"),
];

const TAG_CONTENT_TYPES: &[&str] = &[
    "dcim.device",
    "dcim.interface",
    "dcim.location",
    "ipam.ipaddress",
    "ipam.prefix",
    "ipam.vlan",
];

/// Objects the job attaches to the site
const SITE_CONTENT_TYPES: &[&str] = &["dcim.device", "ipam.prefix", "ipam.vlan"];

const VLANS: &[(u16, &str)] = &[(10, "Management"), (20, "Data"), (30, "Voice")];

/// Platform name, NAPALM driver, manufacturer, device type model
const PLATFORMS: &[(&str, &str, &str, &str)] = &[
    ("arista_eos", "eos", "Arista", "cEOS"),
    ("nokia_srl", "srl", "Nokia", "SR Linux"),
    ("nokia_sros", "sros", "Nokia", "SR OS"),
];

const ROLES: &[(&str, &str)] = &[
    ("Access Switch", "2196f3"),
    ("Distribution Switch", "ff9800"),
    ("Router", "f44336"),
];

/// Device name, role, platform
const DEVICES: &[(&str, &str, &str)] = &[
    ("access1", "Access Switch", "arista_eos"),
    ("access2", "Access Switch", "arista_eos"),
    ("dist1", "Distribution Switch", "nokia_srl"),
    ("rtr1", "Router", "nokia_sros"),
];

#[derive(Debug, Clone)]
pub struct Options {
    /// Accepted for compatibility; the site always gets a generated unique name
    pub site_name: String,
    pub management_subnet: String,
    pub create_vlans: bool,
    pub create_tags: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            site_name: "Lab Data Center".to_string(),
            management_subnet: DEFAULT_MANAGEMENT_SUBNET.to_string(),
            create_vlans: true,
            create_tags: true,
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct Outcome {
    pub site: String,
    pub prefix: String,
    pub tags: Vec<String>,
    pub vlans: Vec<u16>,
    pub devices: Vec<String>,
    pub ip_addresses: Vec<String>,
}

pub async fn run(ctx: &JobContext, opts: &Options) -> Result<Outcome> {
    tracing::info!("Starting pre-flight lab setup...");
    let (_, prefix_len) = utils::parse_ipv4_cidr(&opts.management_subnet)
        .map_err(|e| anyhow::anyhow!("Invalid management subnet {}: {}", opts.management_subnet, e))?;

    setup(ctx, opts, prefix_len).await.map_err(|e| {
        tracing::error!("Error during lab setup: {}", e);
        e
    })
}

async fn setup(ctx: &JobContext, opts: &Options, prefix_len: u8) -> Result<Outcome> {
    let nb = &ctx.nautobot;
    let status = active_status(ctx).await?;

    let (mut site_type, created) = nb
        .get_or_create_location_type(&LocationTypeCreate {
            name: "Site".to_string(),
            description: "Site location type".to_string(),
            nestable: false,
            content_types: SITE_CONTENT_TYPES.iter().map(|ct| ct.to_string()).collect(),
        })
        .await?;
    if created {
        tracing::info!("Created Site location type");
    } else {
        for ct in SITE_CONTENT_TYPES {
            if nb.add_location_type_content_type(&site_type, ct).await? {
                tracing::info!("Allowed {} on Site location type", ct);
                site_type.content_types.push(ct.to_string());
            }
        }
    }

    let site_name = format!("Containerlab-Lab-{}-{}", chrono::Utc::now().timestamp(), ctx.short_run_id());
    tracing::debug!("Ignoring requested site name {}", opts.site_name);
    tracing::info!("Creating unique site: {}", site_name);
    let (site, _) = nb
        .get_or_create_location(&LocationCreate {
            name: site_name.clone(),
            location_type: site_type.id.clone(),
            status: status.id.clone(),
            parent: None,
            description: String::new(),
        })
        .await?;
    tracing::info!("Created site: {}", site_name);

    let mut outcome = Outcome { site: site_name, ..Default::default() };

    if opts.create_tags {
        let content_types: Vec<String> = TAG_CONTENT_TYPES.iter().map(|s| s.to_string()).collect();
        for (name, color) in TAGS {
            let (tag, created) = nb.get_or_create_tag(name, color, content_types.clone()).await?;
            if created {
                tracing::info!("Created tag: {}", tag.name);
            }
            outcome.tags.push(tag.name);
        }
    }

    let (prefix, created) = nb
        .get_or_create_prefix(&PrefixCreate {
            prefix: opts.management_subnet.clone(),
            status: status.id.clone(),
            location: Some(site.id.clone()),
            description: "Management network for lab devices".to_string(),
        })
        .await?;
    if created {
        tracing::info!("Created prefix: {}", prefix.prefix);
    } else {
        tracing::info!("Using existing prefix: {}", prefix.prefix);
    }
    outcome.prefix = prefix.prefix;

    if opts.create_vlans {
        for (vid, name) in VLANS {
            let (vlan, created) = nb
                .get_or_create_vlan(&VlanCreate {
                    vid: *vid,
                    name: name.to_string(),
                    description: format!("{} VLAN", name),
                    status: status.id.clone(),
                    location: Some(site.id.clone()),
                })
                .await?;
            if created {
                tracing::info!("Created VLAN: {} (VID: {})", vlan.name, vlan.vid);
            } else {
                tracing::info!("Using existing VLAN: {} (VID: {})", vlan.name, vlan.vid);
            }
            outcome.vlans.push(vlan.vid);
        }
    }

    let devices = create_devices(ctx, &site.id, &status).await?;
    outcome.devices = devices.keys().cloned().collect();
    outcome.devices.sort();

    for (name, _, _) in DEVICES {
        let (Some(device_id), Some(target)) = (devices.get(*name), lab::find(name)) else {
            tracing::warn!("Device {} not found, skipping interface/IP creation", name);
            continue;
        };
        let address = format!("{}/{}", target.ip, prefix_len);
        create_management_ip(ctx, name, device_id, &address, &status).await?;
        outcome.ip_addresses.push(address);
    }

    success("Pre-flight lab setup completed successfully!");
    Ok(outcome)
}

/// `Active`, or the first status Nautobot knows about
async fn active_status(ctx: &JobContext) -> Result<NbStatus> {
    if let Some(status) = ctx.nautobot.get_status_by_name(status_name::ACTIVE).await? {
        return Ok(status);
    }
    let status = ctx
        .nautobot
        .list_statuses()
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("No status objects found. Please create at least one status."))?;
    tracing::info!("Using status: {}", status.name);
    Ok(status)
}

/// Platforms, roles, device types and the lab devices; returns device name -> id
async fn create_devices(ctx: &JobContext, site_id: &str, status: &NbStatus) -> Result<HashMap<String, String>> {
    let nb = &ctx.nautobot;

    let mut platforms = HashMap::new();
    let mut device_types = HashMap::new();
    for (name, napalm_driver, manufacturer, model) in PLATFORMS {
        let (platform, created) = nb
            .get_or_create_platform(&PlatformCreate {
                name: name.to_string(),
                description: format!("{} platform", name),
                napalm_driver: napalm_driver.to_string(),
                network_driver: name.to_string(),
            })
            .await?;
        if created {
            tracing::info!("Created platform: {}", name);
        }
        platforms.insert(*name, platform.id);

        let device_type = nb.get_or_create_device_type(manufacturer, model).await?;
        device_types.insert(*name, device_type.id);
    }

    let mut roles = HashMap::new();
    for (name, color) in ROLES {
        let (role, created) = nb.get_or_create_role(name, color, vec!["dcim.device".to_string()]).await?;
        if created {
            tracing::info!("Created role: {}", name);
        }
        roles.insert(*name, role.id);
    }

    let mut devices = HashMap::new();
    for (name, role, platform) in DEVICES {
        let (Some(role_id), Some(platform_id), Some(type_id)) =
            (roles.get(role), platforms.get(platform), device_types.get(platform))
        else {
            continue;
        };
        let (device, created) = nb
            .get_or_create_device(&DeviceCreate {
                name: name.to_string(),
                device_type: type_id.clone(),
                role: role_id.clone(),
                location: site_id.to_string(),
                status: status.id.clone(),
                platform: Some(platform_id.clone()),
            })
            .await?;
        if created {
            tracing::info!("Created device: {}", name);
        } else {
            tracing::info!("Using existing device: {}", name);
        }
        devices.insert(name.to_string(), device.id);
    }
    Ok(devices)
}

async fn create_management_ip(
    ctx: &JobContext,
    device_name: &str,
    device_id: &str,
    address: &str,
    status: &NbStatus,
) -> Result<()> {
    let nb = &ctx.nautobot;
    let (iface, created) = nb.get_or_create_interface(device_id, "eth0", "1000base-t", &status.id).await?;
    if created {
        tracing::info!("Created interface eth0 for {}", device_name);
    }

    let ip = match nb.get_ip_address_by_address(address).await? {
        Some(ip) => {
            tracing::info!("Using existing IP: {}", address);
            ip
        }
        None => {
            let ip = nb
                .create_ip_address(&IpAddressCreate {
                    address: address.to_string(),
                    status: status.id.clone(),
                    description: format!("Management IP for {}", device_name),
                    namespace: None,
                })
                .await?;
            tracing::info!("Created IP: {} for {}", address, device_name);
            ip
        }
    };
    nb.assign_ip_to_interface(&ip.id, &iface.id).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::testing;
    use httpmock::prelude::*;

    /// Every lookup misses and every POST echoes a generic object
    async fn empty_nautobot(server: &MockServer) {
        for path in [
            "/api/dcim/location-types/",
            "/api/dcim/locations/",
            "/api/extras/tags/",
            "/api/ipam/prefixes/",
            "/api/ipam/vlans/",
            "/api/dcim/platforms/",
            "/api/dcim/manufacturers/",
            "/api/dcim/device-types/",
            "/api/extras/roles/",
            "/api/dcim/devices/",
            "/api/dcim/interfaces/",
            "/api/ipam/ip-addresses/",
            "/api/ipam/ip-address-to-interface/",
        ] {
            server
                .mock_async(move |when, then| {
                    when.method(GET).path(path);
                    then.status(200).json_body(testing::page(serde_json::json!([])));
                })
                .await;
            server
                .mock_async(move |when, then| {
                    when.method(POST).path(path);
                    then.status(201).json_body(serde_json::json!({
                        "id": "obj1", "name": "created", "model": "cEOS", "prefix": "172.20.20.0/24",
                        "vid": 10, "address": "172.20.20.11/24"
                    }));
                })
                .await;
        }
    }

    #[tokio::test]
    async fn test_builds_lab_in_fresh_nautobot() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/extras/statuses/").query_param("name", "Active");
                then.status(200).json_body(testing::page(serde_json::json!([{"id": "st1", "name": "Active"}])));
            })
            .await;
        empty_nautobot(&server).await;
        let ctx = testing::context(&server.base_url(), 1);
        let outcome = run(&ctx, &Options::default()).await.unwrap();

        assert!(outcome.site.starts_with("Containerlab-Lab-"));
        assert!(outcome.site.ends_with(&ctx.short_run_id()));
        assert_eq!(outcome.tags.len(), 4);
        assert_eq!(outcome.vlans.len(), 3);
        assert_eq!(outcome.devices, vec!["access1", "access2", "dist1", "rtr1"]);
        assert_eq!(
            outcome.ip_addresses,
            vec!["172.20.20.11/24", "172.20.20.12/24", "172.20.20.13/24", "172.20.20.14/24"]
        );
    }

    #[tokio::test]
    async fn test_new_site_type_allows_lab_objects() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/extras/statuses/").query_param("name", "Active");
                then.status(200).json_body(testing::page(serde_json::json!([{"id": "st1", "name": "Active"}])));
            })
            .await;
        let create_type = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/dcim/location-types/")
                    .body_includes(r#""content_types":["dcim.device","ipam.prefix","ipam.vlan"]"#);
                then.status(201).json_body(serde_json::json!({
                    "id": "lt1", "name": "Site", "content_types": ["dcim.device", "ipam.prefix", "ipam.vlan"]
                }));
            })
            .await;
        empty_nautobot(&server).await;

        let ctx = testing::context(&server.base_url(), 1);
        run(&ctx, &Options::default()).await.unwrap();
        create_type.assert_async().await;
    }

    #[tokio::test]
    async fn test_existing_site_type_gets_missing_content_types() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/extras/statuses/").query_param("name", "Active");
                then.status(200).json_body(testing::page(serde_json::json!([{"id": "st1", "name": "Active"}])));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/dcim/location-types/").query_param("name", "Site");
                then.status(200).json_body(testing::page(serde_json::json!([
                    {"id": "lt1", "name": "Site", "content_types": ["dcim.device"]}
                ])));
            })
            .await;
        let add_prefix = server
            .mock_async(|when, then| {
                when.method(PATCH)
                    .path("/api/dcim/location-types/lt1/")
                    .body_includes(r#"["dcim.device","ipam.prefix"]"#);
                then.status(200).json_body(serde_json::json!({"id": "lt1"}));
            })
            .await;
        let add_vlan = server
            .mock_async(|when, then| {
                when.method(PATCH)
                    .path("/api/dcim/location-types/lt1/")
                    .body_includes(r#"["dcim.device","ipam.prefix","ipam.vlan"]"#);
                then.status(200).json_body(serde_json::json!({"id": "lt1"}));
            })
            .await;
        empty_nautobot(&server).await;

        let ctx = testing::context(&server.base_url(), 1);
        run(&ctx, &Options::default()).await.unwrap();
        add_prefix.assert_async().await;
        add_vlan.assert_async().await;
    }

    #[tokio::test]
    async fn test_skips_tags_and_vlans_when_disabled() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/extras/statuses/").query_param("name", "Active");
                then.status(200).json_body(testing::page(serde_json::json!([{"id": "st1", "name": "Active"}])));
            })
            .await;
        empty_nautobot(&server).await;

        let ctx = testing::context(&server.base_url(), 1);
        let opts = Options { create_tags: false, create_vlans: false, ..Default::default() };
        let outcome = run(&ctx, &opts).await.unwrap();
        assert!(outcome.tags.is_empty());
        assert!(outcome.vlans.is_empty());
        assert_eq!(outcome.devices.len(), 4);
    }

    #[tokio::test]
    async fn test_falls_back_to_first_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/extras/statuses/").query_param("name", "Active");
                then.status(200).json_body(testing::page(serde_json::json!([])));
            })
            .await;
        let all = server
            .mock_async(|when, then| {
                when.method(GET).path("/api/extras/statuses/").query_param("limit", "1000");
                then.status(200).json_body(testing::page(serde_json::json!([{"id": "st9", "name": "Planned"}])));
            })
            .await;

        let ctx = testing::context(&server.base_url(), 1);
        let status = active_status(&ctx).await.unwrap();
        all.assert_async().await;
        assert_eq!(status.name, "Planned");
    }

    #[tokio::test]
    async fn test_invalid_subnet_is_rejected() {
        let ctx = testing::context("http://127.0.0.1:1", 1);
        let opts = Options { management_subnet: "not-a-subnet".into(), ..Default::default() };
        let err = run(&ctx, &opts).await.unwrap_err();
        assert!(err.to_string().starts_with("Invalid management subnet not-a-subnet"));
    }
}
