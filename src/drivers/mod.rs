//! Vendor-neutral device driver interface.
//!
//! `NetworkDriver` covers the getters and the candidate-config workflow the
//! jobs rely on: load a merge or replace candidate, diff it against running
//! config, then commit or discard. `open_driver` picks an implementation from
//! a platform's driver name.

pub mod eos;
pub mod srl;

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::Credentials;

pub use eos::EosDriver;
pub use srl::SrlDriver;

/// Driver failure, split by how callers react to it
#[derive(Debug)]
pub enum DriverError {
    /// Device unreachable, login refused or timed out
    Connection(String),
    /// Commit rejected by the device
    Commit(String),
    /// Replace candidate could not be loaded
    Replace(String),
    /// No driver for the requested platform
    Unsupported(String),
    Other(String),
}

impl std::fmt::Display for DriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverError::Connection(msg) => write!(f, "connection error: {}", msg),
            DriverError::Commit(msg) => write!(f, "commit error: {}", msg),
            DriverError::Replace(msg) => write!(f, "replace config error: {}", msg),
            DriverError::Unsupported(msg) => write!(f, "unsupported driver: {}", msg),
            DriverError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for DriverError {}

impl DriverError {
    /// Classify a transport error; network-level failures become `Connection`
    pub fn from_transport(err: anyhow::Error) -> Self {
        if let Some(req) = err.downcast_ref::<reqwest::Error>() {
            if req.is_connect() || req.is_timeout() {
                return DriverError::Connection(err.to_string());
            }
            if req.status().map(|s| s.as_u16() == 401 || s.as_u16() == 403).unwrap_or(false) {
                return DriverError::Connection(err.to_string());
            }
        }
        let msg = err.to_string();
        if msg.contains("connection") && msg.contains("failed") {
            return DriverError::Connection(msg);
        }
        DriverError::Other(msg)
    }
}

pub type DriverResult<T> = std::result::Result<T, DriverError>;

#[derive(Debug, Clone, Default, Serialize)]
pub struct Facts {
    pub hostname: String,
    pub fqdn: String,
    pub vendor: String,
    pub model: String,
    pub os_version: String,
    pub serial_number: String,
    pub uptime: f64,
    pub interface_list: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Interface {
    pub is_up: bool,
    pub is_enabled: bool,
    pub description: String,
    pub mac_address: String,
    pub mtu: u32,
    /// Mbit/s
    pub speed: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InterfaceIps {
    /// address -> prefix length
    pub ipv4: BTreeMap<String, u8>,
    pub ipv6: BTreeMap<String, u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LldpNeighbor {
    pub hostname: String,
    pub port: String,
}

/// Connection options, usually taken from the platform's `napalm_args`
#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub transport: String,
    pub port: Option<u16>,
    pub timeout_secs: u64,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            transport: "https".to_string(),
            port: None,
            timeout_secs: 10,
        }
    }
}

impl DriverOptions {
    /// Overlay `napalm_args` (object, or JSON-encoded string) on `base`
    pub fn from_napalm_args(args: Option<&serde_json::Value>, base: DriverOptions) -> anyhow::Result<Self> {
        let parsed;
        let args = match args {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => {
                parsed = serde_json::from_str::<serde_json::Value>(s)
                    .map_err(|e| anyhow::anyhow!("Invalid napalm_args JSON: {}", e))?;
                &parsed
            }
            Some(v @ serde_json::Value::Object(_)) => v,
            _ => return Ok(base),
        };

        let mut opts = base;
        if let Some(t) = args.get("transport").and_then(|v| v.as_str()) {
            opts.transport = t.to_string();
        }
        if let Some(p) = args.get("port") {
            opts.port = p
                .as_u64()
                .or_else(|| p.as_str().and_then(|s| s.parse().ok()))
                .and_then(|n| u16::try_from(n).ok());
        }
        if let Some(t) = args.get("timeout").and_then(|v| v.as_u64()) {
            opts.timeout_secs = t;
        }
        Ok(opts)
    }

    fn port_or(&self, default: u16) -> u16 {
        self.port.unwrap_or(default)
    }
}

/// NAPALM-style device driver
#[async_trait]
pub trait NetworkDriver: Send + Sync {
    /// Verify the device answers with the supplied credentials
    async fn open(&mut self) -> DriverResult<()>;
    async fn get_facts(&self) -> DriverResult<Facts>;
    async fn get_interfaces(&self) -> DriverResult<BTreeMap<String, Interface>>;
    async fn get_interfaces_ip(&self) -> DriverResult<BTreeMap<String, InterfaceIps>>;
    async fn get_lldp_neighbors(&self) -> DriverResult<BTreeMap<String, Vec<LldpNeighbor>>>;
    async fn load_merge_candidate(&mut self, config: &str) -> DriverResult<()>;
    async fn load_replace_candidate(&mut self, config: &str) -> DriverResult<()>;
    /// Diff of the loaded candidate against running config; empty when unchanged
    async fn compare_config(&self) -> DriverResult<String>;
    async fn commit_config(&mut self) -> DriverResult<()>;
    async fn discard_config(&mut self) -> DriverResult<()>;
    async fn close(&mut self) -> DriverResult<()>;
}

/// Driver names accepted by `open_driver`
pub mod driver_name {
    pub const EOS: &[&str] = &["eos", "arista_eos"];
    pub const SRL: &[&str] = &["srl", "nokia_srl"];
}

/// Build and open a driver for `name` (NAPALM driver naming)
pub async fn open_driver(
    name: &str,
    host: &str,
    credentials: Credentials,
    options: &DriverOptions,
) -> DriverResult<Box<dyn NetworkDriver>> {
    let mut driver: Box<dyn NetworkDriver> = if driver_name::EOS.contains(&name) {
        Box::new(EosDriver::new(host, credentials, options)?)
    } else if driver_name::SRL.contains(&name) {
        Box::new(SrlDriver::new(host, credentials, options)?)
    } else {
        return Err(DriverError::Unsupported(name.to_string()));
    };

    driver.open().await?;
    Ok(driver)
}
