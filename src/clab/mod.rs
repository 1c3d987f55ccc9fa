//! Containerlab node lookup and reachability probes.

use regex_lite::Regex;
use serde::Serialize;
use std::time::Duration;
use tokio::process::Command;

/// Management addresses of the default lab, used when Docker can't be queried
pub const NODE_IPS: &[(&str, &str)] = &[
    ("clab-nautobot-lab-mgmt", "172.20.20.5"),
    ("clab-nautobot-lab-workstation1", "172.20.20.4"),
    ("clab-nautobot-lab-access1", "172.20.20.11"),
    ("clab-nautobot-lab-access2", "172.20.20.12"),
    ("clab-nautobot-lab-dist1", "172.20.20.13"),
    ("clab-nautobot-lab-rtr1", "172.20.20.14"),
];

const PING_TIMEOUT_SECS: u64 = 30;
const TCP_TIMEOUT_SECS: u64 = 3;

/// Full container name; short node names get the `clab-<lab>-` prefix
pub fn container_name(lab_name: &str, node: &str) -> String {
    if node.starts_with("clab-") {
        node.to_string()
    } else {
        format!("clab-{}-{}", lab_name, node)
    }
}

pub fn static_node_ip(container: &str) -> Option<&'static str> {
    NODE_IPS.iter().find(|(name, _)| *name == container).map(|(_, ip)| *ip)
}

/// First non-empty network address Docker reports for the container
async fn docker_container_ip(container: &str) -> Result<Option<String>, String> {
    let docker = bollard::Docker::connect_with_socket_defaults()
        .map_err(|e| format!("Docker not available: {}", e))?;

    let inspect = docker
        .inspect_container(container, None)
        .await
        .map_err(|e| format!("Failed to inspect {}: {}", container, e))?;

    let ip = inspect
        .network_settings
        .as_ref()
        .and_then(|ns| ns.networks.as_ref())
        .and_then(|nets| {
            nets.values()
                .filter_map(|net| net.ip_address.clone())
                .find(|ip| !ip.is_empty())
        });
    Ok(ip)
}

/// Resolve a node's management IP: Docker first, then the static table
pub async fn resolve_node_ip(lab_name: &str, node: &str) -> Option<String> {
    let container = container_name(lab_name, node);
    match docker_container_ip(&container).await {
        Ok(Some(ip)) => return Some(ip),
        Ok(None) => tracing::debug!("{} has no network address in Docker", container),
        Err(e) => tracing::debug!("{}", e),
    }
    static_node_ip(&container).map(|ip| ip.to_string())
}

/// Statistics parsed from `ping` output
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PingStats {
    pub transmitted: u32,
    pub received: u32,
    pub avg_ms: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PingResult {
    pub success: bool,
    pub stats: Option<PingStats>,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Parse iputils/busybox ping summary lines
pub fn parse_ping_output(output: &str) -> Option<PingStats> {
    let counts = Regex::new(r"(\d+) packets transmitted, (\d+) (?:packets )?received").ok()?;
    let rtt = Regex::new(r"min/avg/max(?:/[a-z]+)? = [\d.]+/([\d.]+)/").ok()?;

    let caps = counts.captures(output)?;
    let transmitted = caps.get(1)?.as_str().parse().ok()?;
    let received = caps.get(2)?.as_str().parse().ok()?;
    let avg_ms = rtt
        .captures(output)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok());

    Some(PingStats { transmitted, received, avg_ms })
}

/// `ping -c <count> -W 2 <ip>`, bounded by a 30 second timeout
pub async fn ping(ip: &str, count: u32) -> PingResult {
    if !crate::utils::is_valid_ipv4(ip) {
        return PingResult {
            success: false,
            stats: None,
            output: String::new(),
            error: Some("Invalid IP address".to_string()),
        };
    }

    let count = count.max(1).to_string();
    let run = Command::new("ping")
        .args(["-c", count.as_str(), "-W", "2", ip])
        .output();

    match tokio::time::timeout(Duration::from_secs(PING_TIMEOUT_SECS), run).await {
        Ok(Ok(output)) => {
            let stdout = String::from_utf8_lossy(&output.stdout).to_string();
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            PingResult {
                success: output.status.success(),
                stats: parse_ping_output(&stdout),
                output: stdout,
                error: if stderr.is_empty() { None } else { Some(stderr) },
            }
        }
        Ok(Err(e)) => PingResult {
            success: false,
            stats: None,
            output: String::new(),
            error: Some(format!("Failed to run ping: {}", e)),
        },
        Err(_) => PingResult {
            success: false,
            stats: None,
            output: String::new(),
            error: Some("timeout".to_string()),
        },
    }
}

/// TCP connect probe with a 3 second timeout
pub async fn tcp_port_open(ip: &str, port: u16) -> Result<(), String> {
    let connect = tokio::net::TcpStream::connect((ip, port));
    match tokio::time::timeout(Duration::from_secs(TCP_TIMEOUT_SECS), connect).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("connection to {}:{} timed out", ip, port)),
    }
}

/// Resolve a hostname through the system resolver
pub async fn resolve_hostname(hostname: &str) -> Result<Vec<String>, String> {
    let addrs = tokio::net::lookup_host((hostname, 0))
        .await
        .map_err(|e| e.to_string())?;
    Ok(addrs.map(|a| a.ip().to_string()).collect())
}
