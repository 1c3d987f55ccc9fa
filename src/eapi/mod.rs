use anyhow::{Context as _, Result};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use crate::models::Credentials;

/// Transport settings shared by every eAPI connection
#[derive(Debug, Clone)]
pub struct EapiSettings {
    pub transport: String,
    pub port: u16,
    pub timeout_secs: u64,
}

impl Default for EapiSettings {
    fn default() -> Self {
        Self {
            transport: "https".to_string(),
            port: 443,
            timeout_secs: 10,
        }
    }
}

/// Output encoding requested from `runCmds`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Text,
}

impl Format {
    fn as_str(&self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Text => "text",
        }
    }
}

/// Command failure reported by the device (JSON-RPC error object)
#[derive(Debug, Clone)]
pub struct EapiError {
    pub code: i64,
    pub message: String,
    pub errors: Vec<String>,
}

impl std::fmt::Display for EapiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "eAPI error {}: {}", self.code, self.message)?;
        if !self.errors.is_empty() {
            write!(f, " ({})", self.errors.join("; "))?;
        }
        Ok(())
    }
}

impl std::error::Error for EapiError {}

#[derive(Debug, Serialize)]
struct RunCmdsParams<'a> {
    version: u8,
    cmds: &'a [String],
    format: &'static str,
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'static str,
    params: RunCmdsParams<'a>,
    id: String,
}

/// Arista eAPI client (JSON-RPC `runCmds` over HTTP(S))
pub struct EapiClient {
    endpoint: String,
    host: String,
    credentials: Credentials,
    client: Client,
}

impl EapiClient {
    pub fn new(host: &str, credentials: Credentials, settings: &EapiSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            // Lab switches present self-signed certificates
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            endpoint: format!("{}://{}:{}/command-api", settings.transport, host, settings.port),
            host: host.to_string(),
            credentials,
            client,
        })
    }

    /// Send commands exactly as given and return one result per command
    pub async fn run_commands(&self, cmds: &[String], format: Format) -> Result<Vec<serde_json::Value>> {
        let request = build_request(cmds, format, uuid::Uuid::new_v4().to_string());
        tracing::debug!("eAPI {} -> {:?}", self.host, cmds);

        let resp = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .json(&request)
            .send()
            .await
            .with_context(|| format!("eAPI connection to {} failed", self.host))?;

        if let Some(err) = resp.error_for_status_ref().err() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow::Error::new(err).context(format!("eAPI HTTP error {} from {}: {}", status, self.host, body)));
        }

        let body: serde_json::Value = resp.json().await?;
        parse_response(body)
    }

    /// Run commands in privileged mode
    pub async fn enable(&self, cmds: &[String]) -> Result<Vec<serde_json::Value>> {
        self.enable_with_format(cmds, Format::Json).await
    }

    /// Run commands in privileged mode and return their text output
    pub async fn enable_text(&self, cmds: &[String]) -> Result<Vec<String>> {
        let results = self.enable_with_format(cmds, Format::Text).await?;
        Ok(results
            .iter()
            .map(|r| r.get("output").and_then(|o| o.as_str()).unwrap_or_default().to_string())
            .collect())
    }

    async fn enable_with_format(&self, cmds: &[String], format: Format) -> Result<Vec<serde_json::Value>> {
        let mut full = Vec::with_capacity(cmds.len() + 1);
        full.push("enable".to_string());
        full.extend_from_slice(cmds);
        let mut results = self.run_commands(&full, format).await?;
        if !results.is_empty() {
            results.remove(0);
        }
        Ok(results)
    }

    /// Apply configuration commands inside `configure terminal`
    pub async fn config(&self, cmds: &[String]) -> Result<()> {
        let mut full = Vec::with_capacity(cmds.len() + 1);
        full.push("configure terminal".to_string());
        full.extend_from_slice(cmds);
        self.enable(&full).await?;
        Ok(())
    }

    /// Send a raw command list without privilege escalation
    pub async fn execute(&self, cmds: &[String]) -> Result<Vec<serde_json::Value>> {
        self.run_commands(cmds, Format::Json).await
    }

    /// Persist running config with the given command
    pub async fn save(&self, save_command: &str) -> Result<()> {
        self.enable(&[save_command.to_string()]).await?;
        Ok(())
    }

    /// Query `show interfaces <name> status` and extract the interface entry
    pub async fn interface_status(&self, name: &str) -> Result<Option<InterfaceStatus>> {
        let results = self.enable(&[format!("show interfaces {} status", name)]).await?;
        Ok(results.first().and_then(|r| parse_interface_status(r, name)))
    }
}

/// Link state of one interface as reported by `show interfaces status`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterfaceStatus {
    pub link_status: String,
    pub line_protocol_status: String,
    pub vlan: Option<String>,
}

impl InterfaceStatus {
    /// `disabled` link status means the port is administratively down
    pub fn is_shutdown(&self) -> bool {
        self.link_status == "disabled"
    }
}

fn build_request(cmds: &[String], format: Format, id: String) -> JsonRpcRequest<'_> {
    JsonRpcRequest {
        jsonrpc: "2.0",
        method: "runCmds",
        params: RunCmdsParams {
            version: 1,
            cmds,
            format: format.as_str(),
        },
        id,
    }
}

fn parse_response(body: serde_json::Value) -> Result<Vec<serde_json::Value>> {
    if let Some(err) = body.get("error") {
        let errors = err
            .get("data")
            .and_then(|d| d.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.get("errors").and_then(|e| e.as_array()))
                    .flatten()
                    .filter_map(|e| e.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        return Err(EapiError {
            code: err.get("code").and_then(|c| c.as_i64()).unwrap_or(-1),
            message: err
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error")
                .to_string(),
            errors,
        }
        .into());
    }

    match body.get("result").and_then(|r| r.as_array()) {
        Some(results) => Ok(results.clone()),
        None => Err(anyhow::anyhow!("eAPI response missing result")),
    }
}

fn parse_interface_status(result: &serde_json::Value, name: &str) -> Option<InterfaceStatus> {
    let entry = result.get("interfaceStatuses")?.get(name)?;
    let text = |key: &str| {
        entry
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string()
    };
    let vlan = entry
        .get("vlanInformation")
        .and_then(|v| v.get("vlanId"))
        .map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        });

    Some(InterfaceStatus {
        link_status: text("linkStatus"),
        line_protocol_status: text("lineProtocolStatus"),
        vlan,
    })
}
