//! Object-change handlers for devices and interfaces.
//!
//! Payloads follow Nautobot's webhook body: `event`, `model`, `data` and
//! the `snapshots.prechange` / `snapshots.postchange` pair used to work out
//! which fields changed.

use anyhow::Result;
use serde::Deserialize;
use std::collections::BTreeMap;

use super::{success, JobContext};
use crate::models::{change_action, outcome, DeviceOutcome};
use crate::nautobot::{NbDevice, NbInterface};

const PHYSICAL_PREFIXES: &[&str] = &["ethernet", "gigabitethernet", "tengigabitethernet", "eth"];

/// Fields whose change warrants re-pushing the interface config
const RELEVANT_FIELDS: &[&str] = &["description", "enabled", "mode", "mtu", "type"];

const DEFAULT_MTU: u32 = 1500;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Snapshots {
    #[serde(default)]
    pub prechange: Option<serde_json::Value>,
    #[serde(default)]
    pub postchange: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    pub event: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub snapshots: Snapshots,
}

impl WebhookPayload {
    pub fn action(&self) -> &str {
        change_action::normalize(&self.event)
    }

    /// Who sent the change, for the receive log
    pub fn sender(&self) -> String {
        let model = if self.model.is_empty() { "object" } else { self.model.as_str() };
        format!("{} change by {}", model, self.username.as_deref().unwrap_or("unknown user"))
    }

    pub fn object_id(&self) -> Option<&str> {
        self.data.get("id").and_then(|v| v.as_str())
    }

    /// `display`, then `name`, then the id
    pub fn object_repr(&self) -> String {
        ["display", "name", "id"]
            .iter()
            .find_map(|k| self.data.get(*k).and_then(|v| v.as_str()))
            .unwrap_or("unknown")
            .to_string()
    }

    /// Post-change values of every field that differs from the pre-change snapshot
    pub fn changed_fields(&self) -> BTreeMap<String, serde_json::Value> {
        let Some(serde_json::Value::Object(post)) = &self.snapshots.postchange else {
            return BTreeMap::new();
        };
        let pre = self.snapshots.prechange.as_ref();
        post.iter()
            .filter(|(k, v)| pre.and_then(|p| p.get(k.as_str())) != Some(*v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

pub fn is_physical_interface(name: &str) -> bool {
    let lower = name.to_lowercase();
    PHYSICAL_PREFIXES.iter().any(|p| lower.starts_with(p))
}

/// `interface`, description, admin state and a non-default MTU
pub fn build_interface_config(iface: &NbInterface) -> Vec<String> {
    let mut commands = vec![format!("interface {}", iface.name)];

    if iface.description.is_empty() {
        commands.push("no description".to_string());
    } else {
        commands.push(format!("description {}", iface.description));
    }

    commands.push(if iface.enabled { "no shutdown" } else { "shutdown" }.to_string());

    if let Some(mtu) = iface.mtu.filter(|m| *m != 0 && *m != DEFAULT_MTU) {
        commands.push(format!("mtu {}", mtu));
    }
    commands
}

fn is_eos_platform(device: &NbDevice) -> bool {
    let name = device
        .platform
        .as_ref()
        .map(|p| p.label().to_lowercase())
        .unwrap_or_default();
    name.contains("arista") || name.contains("eos")
}

/// Push an interface create/update to the device; deletes are ignored
pub async fn interface_hook(ctx: &JobContext, payload: &WebhookPayload, commit: bool) -> Result<DeviceOutcome> {
    let action = payload.action();
    let repr = payload.object_repr();
    tracing::info!("Interface {}: {} (commit={}); {}", action, repr, commit, payload.sender());

    if action == change_action::DELETED {
        tracing::warn!("Cannot sync delete to device - interface object no longer exists");
        return Ok(DeviceOutcome::new(&repr, outcome::SKIPPED).with_detail("interface deleted"));
    }

    let id = payload
        .object_id()
        .ok_or_else(|| anyhow::anyhow!("Interface hook payload has no object id"))?;
    let iface = ctx.nautobot.get_interface(id).await?;

    let Some(device_ref) = iface.device.as_ref() else {
        tracing::info!("Interface {} has no device - skipping", iface.name);
        return Ok(DeviceOutcome::new(&iface.name, outcome::SKIPPED).with_detail("no device"));
    };

    if !is_physical_interface(&iface.name) {
        tracing::info!("Interface {} is not physical - skipping device config", iface.name);
        return Ok(DeviceOutcome::new(&iface.name, outcome::SKIPPED).with_detail("not a physical interface"));
    }

    let device = ctx.nautobot.get_device(&device_ref.id).await?;
    let name = device.display_name();
    let Some(host) = device.primary_host() else {
        tracing::warn!("Device {} has no primary IP - cannot connect", name);
        return Ok(DeviceOutcome::new(&name, outcome::SKIPPED).with_detail("no primary IP"));
    };

    match action {
        change_action::CREATED => {
            tracing::info!("Configuring new interface {} on device {}", iface.name, name);
        }
        change_action::UPDATED => {
            let changed = payload.changed_fields();
            tracing::info!("Updating interface {} on device {}", iface.name, name);
            tracing::info!("Changed fields: {:?}", changed.keys().collect::<Vec<_>>());
            if !RELEVANT_FIELDS.iter().any(|f| changed.contains_key(*f)) {
                tracing::info!("No relevant fields changed - skipping device update");
                return Ok(DeviceOutcome::new(&name, outcome::SKIPPED).with_detail("no relevant fields changed"));
            }
        }
        other => {
            tracing::info!("Interface action '{}' - no handler defined", other);
            return Ok(DeviceOutcome::new(&name, outcome::SKIPPED).with_detail(format!("unhandled action {}", other)));
        }
    }

    let commands = build_interface_config(&iface);
    if !commit {
        tracing::info!("Dry-run mode - would configure:\n{}", commands.join("\n"));
        return Ok(DeviceOutcome::new(&name, outcome::DRY_RUN).with_commands(commands));
    }

    if !is_eos_platform(&device) {
        tracing::warn!("Platform of {} not supported for automatic config - only Arista EOS", name);
        return Ok(DeviceOutcome::new(&name, outcome::SKIPPED)
            .with_detail("unsupported platform")
            .with_commands(commands));
    }

    let credentials = ctx.nautobot.resolve_credentials(&device, &ctx.config.default_credentials()).await;
    let pushed = async {
        let eapi = ctx.eapi(&host, credentials)?;
        eapi.config(&commands).await?;
        eapi.save("write memory").await
    }
    .await;

    match pushed {
        Ok(()) => {
            success(&format!("Successfully configured interface {} on {}", iface.name, name));
            Ok(DeviceOutcome::new(&name, outcome::APPLIED).with_commands(commands))
        }
        Err(e) => {
            tracing::error!("Failed to configure interface {}: {}", iface.name, e);
            Ok(DeviceOutcome::new(&name, outcome::FAILED)
                .with_detail(e.to_string())
                .with_commands(commands))
        }
    }
}

/// Log a device change; returns the logged message
pub fn device_hook(payload: &WebhookPayload) -> String {
    let id = payload.object_id().unwrap_or("?");
    let repr = payload.object_repr();
    tracing::debug!("Device webhook: {}", payload.sender());
    let message = match payload.action() {
        change_action::CREATED => format!("Device created: {} ({})", repr, id),
        change_action::UPDATED => {
            let changes = serde_json::to_string(&payload.changed_fields()).unwrap_or_default();
            format!("Device updated: {} ({}); changes={}", repr, id, changes)
        }
        change_action::DELETED => format!("Device deleted: {} ({})", repr, id),
        other => {
            let msg = format!("Device action '{}' for {} ({})", other, repr, id);
            tracing::info!("{}", msg);
            return msg;
        }
    };
    success(&message);
    message
}
