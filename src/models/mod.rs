use serde::{Deserialize, Serialize};

/// Device login used by eAPI, JSON-RPC and SSH transports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Canonical Nautobot status names used by the jobs
pub mod status_name {
    pub const ACTIVE: &str = "Active";
    pub const FAILED: &str = "Failed";
}

/// Canonical object-change actions delivered to hooks
pub mod change_action {
    pub const CREATED: &str = "created";
    pub const UPDATED: &str = "updated";
    pub const DELETED: &str = "deleted";

    /// Normalize both the webhook ("create") and job-hook ("created") spellings
    pub fn normalize(action: &str) -> &str {
        match action {
            "create" | CREATED => CREATED,
            "update" | UPDATED => UPDATED,
            "delete" | DELETED => DELETED,
            other => other,
        }
    }
}

/// Static containerlab topology the lab jobs target
pub mod lab {
    /// A lab device and how to reach it
    pub struct LabDevice {
        pub name: &'static str,
        pub driver: &'static str,
        pub ip: &'static str,
    }

    pub const DEVICES: &[LabDevice] = &[
        LabDevice { name: "access1", driver: "eos", ip: "172.20.20.11" },
        LabDevice { name: "access2", driver: "eos", ip: "172.20.20.12" },
        LabDevice { name: "dist1", driver: "nokia_srl", ip: "172.20.20.13" },
        LabDevice { name: "rtr1", driver: "nokia_srl", ip: "172.20.20.14" },
    ];

    pub fn find(name: &str) -> Option<&'static LabDevice> {
        DEVICES.iter().find(|d| d.name == name)
    }

    pub fn device_names() -> Vec<&'static str> {
        DEVICES.iter().map(|d| d.name).collect()
    }
}

/// Subset of a device's config context consumed by the services builder.
///
/// Each section is an `Option` so "key present" and "key absent" stay distinct:
/// a section is only built when its key exists in the context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServicesContext {
    #[serde(default)]
    pub ntp_servers: Option<Vec<String>>,
    #[serde(default)]
    pub dns_servers: Option<Vec<String>>,
    #[serde(default)]
    pub syslog_hosts: Option<Vec<SyslogHost>>,
    #[serde(default)]
    pub snmp: Option<SnmpSettings>,
    #[serde(default)]
    pub domain_name: Option<String>,
    #[serde(default)]
    pub platform_specific: Option<PlatformSpecific>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyslogHost {
    pub host: String,
    #[serde(default = "default_syslog_port")]
    pub port: u16,
}

fn default_syslog_port() -> u16 {
    514
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnmpSettings {
    #[serde(default)]
    pub community: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformSpecific {
    #[serde(default)]
    pub management_interface: String,
    #[serde(default)]
    pub ntp_source_interface: Option<String>,
    #[serde(default)]
    pub logging: Option<LoggingSettings>,
    #[serde(default)]
    pub cli_commands: Option<CliCommands>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default)]
    pub source_interface: Option<String>,
    /// Number or string in the context data
    #[serde(default)]
    pub buffer_size: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliCommands {
    #[serde(default)]
    pub save_config: Option<String>,
}

impl PlatformSpecific {
    /// Command that persists running config, `write memory` unless overridden
    pub fn save_command(&self) -> String {
        self.cli_commands
            .as_ref()
            .and_then(|c| c.save_config.clone())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "write memory".to_string())
    }
}

/// Render a scalar JSON value the way it appears on a CLI, treating empty
/// strings, zero, false and null as absent.
pub fn scalar_to_cli(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        serde_json::Value::Bool(true) => Some("true".to_string()),
        _ => None,
    }
}

/// Per-device outcome recorded by multi-device jobs
#[derive(Debug, Clone, Serialize)]
pub struct DeviceOutcome {
    pub device: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<String>,
}

impl DeviceOutcome {
    pub fn new(device: &str, status: &str) -> Self {
        Self {
            device: device.to_string(),
            status: status.to_string(),
            detail: None,
            commands: Vec::new(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_commands(mut self, commands: Vec<String>) -> Self {
        self.commands = commands;
        self
    }
}

/// Canonical per-device outcome values
pub mod outcome {
    pub const APPLIED: &str = "applied";
    pub const DRY_RUN: &str = "dry_run";
    pub const SKIPPED: &str = "skipped";
    pub const FAILED: &str = "failed";
    pub const MANUAL: &str = "manual";
}
