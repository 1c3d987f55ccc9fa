use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use super::*;
use crate::render::config_lines;

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: String,
    method: &'a str,
    params: serde_json::Value,
}

/// Nokia SR Linux over its JSON-RPC interface.
///
/// Each JSON-RPC call runs in its own CLI session, so a private candidate
/// cannot outlive one request. The candidate is kept locally and replayed in
/// full for `diff` and `commit now`.
pub struct SrlDriver {
    endpoint: String,
    host: String,
    credentials: Credentials,
    client: Client,
    candidate: Option<Candidate>,
}

struct Candidate {
    lines: Vec<String>,
    replace: bool,
}

impl SrlDriver {
    pub fn new(host: &str, credentials: Credentials, options: &DriverOptions) -> DriverResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_secs))
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| DriverError::Other(format!("Failed to build HTTP client: {}", e)))?;

        let port = options.port_or(if options.transport == "http" { 80 } else { 443 });
        Ok(Self {
            endpoint: format!("{}://{}:{}/jsonrpc", options.transport, host, port),
            host: host.to_string(),
            credentials,
            client,
            candidate: None,
        })
    }

    async fn call(&self, method: &str, params: serde_json::Value) -> DriverResult<Vec<serde_json::Value>> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: uuid::Uuid::new_v4().to_string(),
            method,
            params,
        };
        tracing::debug!("SR Linux JSON-RPC {} -> {}", self.host, method);

        let resp = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .json(&request)
            .send()
            .await
            .map_err(|e| DriverError::Connection(format!("{}: {}", self.host, e)))?;

        let status = resp.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(DriverError::Connection(format!("{}: authentication failed ({})", self.host, status)));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DriverError::Other(format!("JSON-RPC HTTP error {}: {}", status, body)));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| DriverError::Other(format!("Invalid JSON-RPC response: {}", e)))?;
        parse_response(body)
    }

    async fn get_state(&self, paths: &[&str]) -> DriverResult<Vec<serde_json::Value>> {
        let commands: Vec<serde_json::Value> = paths
            .iter()
            .map(|p| serde_json::json!({"path": p, "datastore": "state"}))
            .collect();
        self.call("get", serde_json::json!({"commands": commands})).await
    }

    async fn cli(&self, commands: Vec<String>) -> DriverResult<Vec<serde_json::Value>> {
        self.call("cli", serde_json::json!({"commands": commands, "output-format": "text"}))
            .await
    }

    /// Commands that rebuild the candidate inside a fresh private session
    fn candidate_commands(&self, finish: &str) -> Option<Vec<String>> {
        let candidate = self.candidate.as_ref()?;
        let mut cmds = vec!["enter candidate private".to_string()];
        if candidate.replace {
            cmds.push("load factory".to_string());
        }
        cmds.extend(candidate.lines.iter().cloned());
        cmds.push(finish.to_string());
        Some(cmds)
    }
}

#[async_trait]
impl NetworkDriver for SrlDriver {
    async fn open(&mut self) -> DriverResult<()> {
        self.get_state(&["/system/information"])
            .await
            .map(|_| ())
            .map_err(|e| match e {
                DriverError::Other(msg) => DriverError::Connection(msg),
                other => other,
            })
    }

    async fn get_facts(&self) -> DriverResult<Facts> {
        let results = self
            .get_state(&["/system/name", "/system/information", "/platform/chassis", "/interface"])
            .await?;
        Ok(parse_facts(&results))
    }

    async fn get_interfaces(&self) -> DriverResult<BTreeMap<String, Interface>> {
        let results = self.get_state(&["/interface"]).await?;
        Ok(results.first().map(parse_interfaces).unwrap_or_default())
    }

    async fn get_interfaces_ip(&self) -> DriverResult<BTreeMap<String, InterfaceIps>> {
        let results = self.get_state(&["/interface"]).await?;
        Ok(results.first().map(parse_interfaces_ip).unwrap_or_default())
    }

    async fn get_lldp_neighbors(&self) -> DriverResult<BTreeMap<String, Vec<LldpNeighbor>>> {
        let results = self.get_state(&["/system/lldp"]).await?;
        Ok(results.first().map(parse_lldp).unwrap_or_default())
    }

    async fn load_merge_candidate(&mut self, config: &str) -> DriverResult<()> {
        self.candidate = Some(Candidate { lines: config_lines(config), replace: false });
        Ok(())
    }

    async fn load_replace_candidate(&mut self, config: &str) -> DriverResult<()> {
        let lines = config_lines(config);
        if lines.is_empty() {
            return Err(DriverError::Replace("refusing to replace with an empty configuration".to_string()));
        }
        self.candidate = Some(Candidate { lines, replace: true });
        Ok(())
    }

    async fn compare_config(&self) -> DriverResult<String> {
        let Some(cmds) = self.candidate_commands("diff") else {
            return Ok(String::new());
        };
        let replace = self.candidate.as_ref().map(|c| c.replace).unwrap_or(false);
        let results = self.cli(cmds).await.map_err(|e| match e {
            DriverError::Other(msg) if replace => DriverError::Replace(msg),
            other => other,
        })?;
        Ok(results.last().map(output_text).unwrap_or_default().trim().to_string())
    }

    async fn commit_config(&mut self) -> DriverResult<()> {
        let cmds = self
            .candidate_commands("commit now")
            .ok_or_else(|| DriverError::Commit("no candidate loaded".to_string()))?;
        self.candidate = None;
        self.cli(cmds).await.map(|_| ()).map_err(|e| match e {
            DriverError::Connection(msg) => DriverError::Connection(msg),
            other => DriverError::Commit(other.to_string()),
        })
    }

    async fn discard_config(&mut self) -> DriverResult<()> {
        self.candidate = None;
        Ok(())
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.candidate = None;
        Ok(())
    }
}

fn parse_response(body: serde_json::Value) -> DriverResult<Vec<serde_json::Value>> {
    if let Some(err) = body.get("error") {
        let message = err.get("message").and_then(|m| m.as_str()).unwrap_or("unknown error");
        return Err(DriverError::Other(format!("JSON-RPC error: {}", message)));
    }
    match body.get("result") {
        Some(serde_json::Value::Array(items)) => Ok(items.clone()),
        _ => Err(DriverError::Other("JSON-RPC response missing result".to_string())),
    }
}

/// Text of one `cli` result: a bare string, `{"text": ...}`, or JSON
fn output_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Object(map) if map.contains_key("text") => {
            map.get("text").and_then(|t| t.as_str()).unwrap_or_default().to_string()
        }
        serde_json::Value::Object(map) if map.is_empty() => String::new(),
        other => other.to_string(),
    }
}

/// Look up `key` ignoring a YANG module prefix (`srl_nokia-interfaces:interface`)
fn field<'a>(value: &'a serde_json::Value, key: &str) -> Option<&'a serde_json::Value> {
    let map = value.as_object()?;
    map.get(key).or_else(|| {
        map.iter()
            .find(|(k, _)| k.rsplit(':').next() == Some(key))
            .map(|(_, v)| v)
    })
}

fn text(value: &serde_json::Value, key: &str) -> String {
    field(value, key).and_then(|v| v.as_str()).unwrap_or_default().to_string()
}

fn interface_list(value: &serde_json::Value) -> Vec<serde_json::Value> {
    field(value, "interface")
        .and_then(|i| i.as_array())
        .cloned()
        .unwrap_or_default()
}

fn parse_facts(results: &[serde_json::Value]) -> Facts {
    let empty = serde_json::Value::Null;
    let name = results.first().unwrap_or(&empty);
    let info = results.get(1).unwrap_or(&empty);
    let chassis = results.get(2).unwrap_or(&empty);
    let interfaces = results.get(3).unwrap_or(&empty);

    let hostname = text(name, "host-name");
    let domain = text(name, "domain-name");
    let fqdn = if domain.is_empty() { hostname.clone() } else { format!("{}.{}", hostname, domain) };

    let uptime = chrono::DateTime::parse_from_rfc3339(&text(info, "last-booted"))
        .map(|booted| (chrono::Utc::now() - booted.with_timezone(&chrono::Utc)).num_seconds() as f64)
        .unwrap_or_default();

    Facts {
        hostname,
        fqdn,
        vendor: "Nokia".to_string(),
        model: text(chassis, "type"),
        os_version: text(info, "version"),
        serial_number: text(chassis, "serial-number"),
        uptime,
        interface_list: interface_list(interfaces).iter().map(|i| text(i, "name")).collect(),
    }
}

/// `25G`, `100G`, `1000M` -> Mbit/s
fn port_speed_mbps(speed: &str) -> f64 {
    let (num, unit) = speed.split_at(speed.len().saturating_sub(1));
    let value: f64 = num.parse().unwrap_or(0.0);
    match unit {
        "G" => value * 1000.0,
        "M" => value,
        _ => 0.0,
    }
}

fn parse_interfaces(result: &serde_json::Value) -> BTreeMap<String, Interface> {
    interface_list(result)
        .iter()
        .map(|i| {
            let ethernet = field(i, "ethernet").cloned().unwrap_or_default();
            (
                text(i, "name"),
                Interface {
                    is_up: text(i, "oper-state") == "up",
                    is_enabled: text(i, "admin-state") == "enable",
                    description: text(i, "description"),
                    mac_address: text(&ethernet, "hw-mac-address"),
                    mtu: field(i, "mtu").and_then(|m| m.as_u64()).unwrap_or(0) as u32,
                    speed: port_speed_mbps(&text(&ethernet, "port-speed")),
                },
            )
        })
        .collect()
}

fn parse_interfaces_ip(result: &serde_json::Value) -> BTreeMap<String, InterfaceIps> {
    let mut out = BTreeMap::new();
    for iface in interface_list(result) {
        let name = text(&iface, "name");
        let subifs = field(&iface, "subinterface").and_then(|s| s.as_array()).cloned().unwrap_or_default();
        for sub in subifs {
            let index = field(&sub, "index").and_then(|i| i.as_u64()).unwrap_or(0);
            let mut ips = InterfaceIps::default();
            for (family, target) in [("ipv4", &mut ips.ipv4), ("ipv6", &mut ips.ipv6)] {
                let addrs = field(&sub, family)
                    .and_then(|f| field(f, "address"))
                    .and_then(|a| a.as_array())
                    .cloned()
                    .unwrap_or_default();
                for addr in addrs {
                    let prefix = text(&addr, "ip-prefix");
                    if let Some((ip, len)) = prefix.split_once('/') {
                        target.insert(ip.to_string(), len.parse().unwrap_or(0));
                    }
                }
            }
            if !ips.ipv4.is_empty() || !ips.ipv6.is_empty() {
                out.insert(format!("{}.{}", name, index), ips);
            }
        }
    }
    out
}

fn parse_lldp(result: &serde_json::Value) -> BTreeMap<String, Vec<LldpNeighbor>> {
    let mut out = BTreeMap::new();
    for iface in interface_list(result) {
        let neighbors: Vec<LldpNeighbor> = field(&iface, "neighbor")
            .and_then(|n| n.as_array())
            .map(|items| {
                items
                    .iter()
                    .map(|n| LldpNeighbor {
                        hostname: text(n, "system-name"),
                        port: text(n, "port-id"),
                    })
                    .collect()
            })
            .unwrap_or_default();
        if !neighbors.is_empty() {
            out.insert(text(&iface, "name"), neighbors);
        }
    }
    out
}
