use async_trait::async_trait;
use std::collections::BTreeMap;

use super::*;
use crate::eapi::{EapiClient, EapiSettings};
use crate::render::config_lines;

/// Arista EOS over eAPI, staging candidates in a named configure session
pub struct EosDriver {
    client: EapiClient,
    session: Option<String>,
}

impl EosDriver {
    pub fn new(host: &str, credentials: Credentials, options: &DriverOptions) -> DriverResult<Self> {
        let settings = EapiSettings {
            transport: options.transport.clone(),
            port: options.port_or(if options.transport == "http" { 80 } else { 443 }),
            timeout_secs: options.timeout_secs,
        };
        let client = EapiClient::new(host, credentials, &settings).map_err(DriverError::from_transport)?;
        Ok(Self { client, session: None })
    }

    async fn show(&self, cmds: &[&str]) -> DriverResult<Vec<serde_json::Value>> {
        let cmds: Vec<String> = cmds.iter().map(|c| c.to_string()).collect();
        self.client.enable(&cmds).await.map_err(DriverError::from_transport)
    }

    fn session_name(&mut self) -> String {
        self.session
            .get_or_insert_with(|| format!("netlab_{}", &uuid::Uuid::new_v4().simple().to_string()[..8]))
            .clone()
    }

    async fn load_candidate(&mut self, config: &str, replace: bool) -> DriverResult<()> {
        let session = self.session_name();
        let mut cmds = vec![format!("configure session {}", session)];
        if replace {
            cmds.push("rollback clean-config".to_string());
        }
        cmds.extend(config_lines(config));
        cmds.push("end".to_string());

        if let Err(e) = self.client.enable(&cmds).await {
            // Leave no half-loaded session behind
            let _ = self.abort_session().await;
            return Err(if replace {
                DriverError::Replace(e.to_string())
            } else {
                DriverError::from_transport(e)
            });
        }
        Ok(())
    }

    async fn abort_session(&mut self) -> DriverResult<()> {
        if let Some(session) = self.session.take() {
            self.client
                .enable(&[format!("configure session {} abort", session)])
                .await
                .map_err(DriverError::from_transport)?;
        }
        Ok(())
    }
}

#[async_trait]
impl NetworkDriver for EosDriver {
    async fn open(&mut self) -> DriverResult<()> {
        self.show(&["show clock"])
            .await
            .map(|_| ())
            .map_err(|e| match e {
                DriverError::Other(msg) => DriverError::Connection(msg),
                other => other,
            })
    }

    async fn get_facts(&self) -> DriverResult<Facts> {
        let results = self.show(&["show version", "show hostname", "show interfaces"]).await?;
        Ok(parse_facts(&results))
    }

    async fn get_interfaces(&self) -> DriverResult<BTreeMap<String, Interface>> {
        let results = self.show(&["show interfaces"]).await?;
        Ok(results.first().map(parse_interfaces).unwrap_or_default())
    }

    async fn get_interfaces_ip(&self) -> DriverResult<BTreeMap<String, InterfaceIps>> {
        let results = self.show(&["show ip interface"]).await?;
        Ok(results.first().map(parse_interfaces_ip).unwrap_or_default())
    }

    async fn get_lldp_neighbors(&self) -> DriverResult<BTreeMap<String, Vec<LldpNeighbor>>> {
        let results = self.show(&["show lldp neighbors"]).await?;
        Ok(results.first().map(parse_lldp).unwrap_or_default())
    }

    async fn load_merge_candidate(&mut self, config: &str) -> DriverResult<()> {
        self.load_candidate(config, false).await
    }

    async fn load_replace_candidate(&mut self, config: &str) -> DriverResult<()> {
        self.load_candidate(config, true).await
    }

    async fn compare_config(&self) -> DriverResult<String> {
        let session = match &self.session {
            Some(s) => s,
            None => return Ok(String::new()),
        };
        let cmds = vec![format!("show session-config named {} diffs", session)];
        let outputs = self
            .client
            .enable_text(&cmds)
            .await
            .map_err(DriverError::from_transport)?;
        Ok(outputs.first().map(|o| o.trim().to_string()).unwrap_or_default())
    }

    async fn commit_config(&mut self) -> DriverResult<()> {
        let session = self
            .session
            .take()
            .ok_or_else(|| DriverError::Commit("no candidate loaded".to_string()))?;
        let cmds = vec![
            format!("configure session {} commit", session),
            "write memory".to_string(),
        ];
        self.client
            .enable(&cmds)
            .await
            .map(|_| ())
            .map_err(|e| DriverError::Commit(e.to_string()))
    }

    async fn discard_config(&mut self) -> DriverResult<()> {
        self.abort_session().await
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.abort_session().await
    }
}

fn text(value: &serde_json::Value, key: &str) -> String {
    value.get(key).and_then(|v| v.as_str()).unwrap_or_default().to_string()
}

/// Facts from `show version`, `show hostname` and `show interfaces`
fn parse_facts(results: &[serde_json::Value]) -> Facts {
    let empty = serde_json::Value::Null;
    let version = results.first().unwrap_or(&empty);
    let hostname = results.get(1).unwrap_or(&empty);
    let interfaces = results.get(2).unwrap_or(&empty);

    let mut interface_list: Vec<String> = interfaces
        .get("interfaces")
        .and_then(|i| i.as_object())
        .map(|m| m.keys().cloned().collect())
        .unwrap_or_default();
    interface_list.sort();

    Facts {
        hostname: text(hostname, "hostname"),
        fqdn: text(hostname, "fqdn"),
        vendor: "Arista".to_string(),
        model: text(version, "modelName"),
        os_version: text(version, "version"),
        serial_number: text(version, "serialNumber"),
        uptime: version.get("uptime").and_then(|u| u.as_f64()).unwrap_or_default(),
        interface_list,
    }
}

fn parse_interfaces(result: &serde_json::Value) -> BTreeMap<String, Interface> {
    let mut out = BTreeMap::new();
    let Some(map) = result.get("interfaces").and_then(|i| i.as_object()) else {
        return out;
    };

    for (name, data) in map {
        out.insert(
            name.clone(),
            Interface {
                is_up: data.get("lineProtocolStatus").and_then(|v| v.as_str()) == Some("up"),
                is_enabled: data.get("interfaceStatus").and_then(|v| v.as_str()) != Some("disabled"),
                description: text(data, "description"),
                mac_address: text(data, "physicalAddress"),
                mtu: data.get("mtu").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
                speed: data.get("bandwidth").and_then(|v| v.as_f64()).unwrap_or(0.0) / 1_000_000.0,
            },
        );
    }
    out
}

fn parse_interfaces_ip(result: &serde_json::Value) -> BTreeMap<String, InterfaceIps> {
    let mut out = BTreeMap::new();
    let Some(map) = result.get("interfaces").and_then(|i| i.as_object()) else {
        return out;
    };

    for (name, data) in map {
        let mut ips = InterfaceIps::default();
        // Older releases return a one-element list here
        let addr_block = match data.get("interfaceAddress") {
            Some(serde_json::Value::Array(items)) => items.first().cloned(),
            Some(v) => Some(v.clone()),
            None => None,
        };
        if let Some(block) = addr_block {
            let primary = block.get("primaryIp");
            let secondaries = block
                .get("secondaryIpsOrderedList")
                .and_then(|s| s.as_array())
                .cloned()
                .unwrap_or_default();
            for ip in primary.into_iter().chain(secondaries.iter()) {
                let address = text(ip, "address");
                let mask = ip.get("maskLen").and_then(|m| m.as_u64()).unwrap_or(0) as u8;
                if !address.is_empty() && address != "0.0.0.0" {
                    ips.ipv4.insert(address, mask);
                }
            }
        }
        if !ips.ipv4.is_empty() {
            out.insert(name.clone(), ips);
        }
    }
    out
}

fn parse_lldp(result: &serde_json::Value) -> BTreeMap<String, Vec<LldpNeighbor>> {
    let mut out: BTreeMap<String, Vec<LldpNeighbor>> = BTreeMap::new();
    let entries = result
        .get("lldpNeighbors")
        .and_then(|n| n.as_array())
        .cloned()
        .unwrap_or_default();

    for entry in entries {
        out.entry(text(&entry, "port")).or_default().push(LldpNeighbor {
            hostname: text(&entry, "neighborDevice"),
            port: text(&entry, "neighborPort"),
        });
    }
    out
}
