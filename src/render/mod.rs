use anyhow::Result;
use std::path::Path;
use tera::{Context, Tera};

/// Template rendered by the render-config job from `TEMPLATES_DIR`
pub const CONTEXT_TEMPLATE_FILE: &str = "base_config_from_context.tera";

/// Hostname, loopback and per-interface admin state taken from inventory
const INVENTORY_TEMPLATE: &str = r#"
!
! === Configure hostname from Nautobot ===
!
hostname {{ device.name }}
!
! === Configure Loopback interface ===
!
interface Loopback0
  description Management Loopback
  ip address {{ loopback_ip }}/32
  no shutdown
!
! === Configure interfaces based on Nautobot state ===
!
{% for iface in interfaces %}
interface {{ iface.name }}
{% if iface.description %}
  description {{ iface.description }}
{% else %}
  description Configured by Nautobot automation
{% endif %}
{% if iface.enabled %}
  no shutdown
{% else %}
  shutdown
{% endif %}
!
{% endfor %}
"#;

/// Re-enable the data-plane access port and add a loopback
const CONNECTIVITY_FIX_TEMPLATE: &str = r#"
!
! === FIX: Enable Ethernet2 interfaces ===
!
interface Ethernet2
  description Connected to data plane
  switchport mode access
  switchport access vlan 10
  no shutdown
!
! === Add Loopback interface ===
!
interface Loopback0
  description {{ device.name }} Loopback
  ip address {{ loopback_ip }}/32
  no shutdown
!
"#;

/// Hostname plus a `no shutdown` for every inventory interface
const INTERFACES_TEMPLATE: &str = r#"
hostname {{ device.name }}
!
interface Management0
  no shutdown
!
{% for iface in interfaces %}
interface {{ iface.name }}
{% if iface.description %}
  description {{ iface.description }}
{% else %}
  description configured by automation
{% endif %}
  no shutdown
!
{% endfor %}
"#;

/// Config templates compiled into the binary
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum BuiltinTemplate {
    /// Hostname, loopback and interface state from inventory
    Inventory,
    /// Enable Ethernet2 in VLAN 10 and add a loopback
    ConnectivityFix,
    /// Hostname and `no shutdown` on every interface
    Interfaces,
}

impl BuiltinTemplate {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Inventory => "inventory",
            Self::ConnectivityFix => "connectivity-fix",
            Self::Interfaces => "interfaces",
        }
    }

    pub fn source(&self) -> &'static str {
        match self {
            Self::Inventory => INVENTORY_TEMPLATE,
            Self::ConnectivityFix => CONNECTIVITY_FIX_TEMPLATE,
            Self::Interfaces => INTERFACES_TEMPLATE,
        }
    }
}

/// Render a one-off template string
pub fn render_str(name: &str, source: &str, context: &Context) -> Result<String> {
    let mut tera = Tera::default();
    tera.add_raw_template(name, source)
        .map_err(|e| anyhow::anyhow!("Invalid template {}: {}", name, e))?;
    tera.render(name, context)
        .map_err(|e| anyhow::anyhow!("Failed to render template {}: {}", name, render_error_chain(&e)))
}

/// Tera hides the useful message in the error source chain
fn render_error_chain(err: &tera::Error) -> String {
    let mut msg = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        msg.push_str(": ");
        msg.push_str(&inner.to_string());
        source = inner.source();
    }
    msg
}

/// Read a template from `dir`
pub fn load_template(dir: &str, file: &str) -> Result<String> {
    let path = Path::new(dir).join(file);
    if !path.exists() {
        return Err(anyhow::anyhow!("Template not found at {}", path.display()));
    }
    std::fs::read_to_string(&path)
        .map_err(|e| anyhow::anyhow!("Failed to read template {}: {}", path.display(), e))
}

/// Build a context holding `device` plus every top-level config-context key
pub fn context_from_config<D: serde::Serialize>(device: &D, config_context: &serde_json::Value) -> Result<Context> {
    let mut context = Context::new();
    if let Some(map) = config_context.as_object() {
        for (key, value) in map {
            context.insert(key.as_str(), value);
        }
    }
    context.insert("device", device);
    Ok(context)
}

/// Lines worth sending to a device: no blanks, no `!` comments
pub fn config_lines(rendered: &str) -> Vec<String> {
    rendered
        .lines()
        .map(|l| l.trim_end())
        .filter(|l| {
            let t = l.trim();
            !t.is_empty() && !t.starts_with('!')
        })
        .map(|l| l.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn iface(name: &str, description: &str, enabled: bool) -> serde_json::Value {
        serde_json::json!({"name": name, "description": description, "enabled": enabled})
    }

    #[test]
    fn test_inventory_template() {
        let mut ctx = Context::new();
        ctx.insert("device", &serde_json::json!({"name": "access1"}));
        ctx.insert("loopback_ip", "10.99.1.11");
        ctx.insert(
            "interfaces",
            &vec![iface("Ethernet1", "uplink", true), iface("Ethernet2", "", false)],
        );

        let rendered = render_str("inventory", BuiltinTemplate::Inventory.source(), &ctx).unwrap();
        assert_eq!(
            config_lines(&rendered),
            vec![
                "hostname access1",
                "interface Loopback0",
                "  description Management Loopback",
                "  ip address 10.99.1.11/32",
                "  no shutdown",
                "interface Ethernet1",
                "  description uplink",
                "  no shutdown",
                "interface Ethernet2",
                "  description Configured by Nautobot automation",
                "  shutdown",
            ]
        );
    }

    #[test]
    fn test_connectivity_fix_template() {
        let mut ctx = Context::new();
        ctx.insert("device", &serde_json::json!({"name": "rtr1"}));
        ctx.insert("loopback_ip", "10.99.1.14");
        let rendered = render_str("fix", BuiltinTemplate::ConnectivityFix.source(), &ctx).unwrap();
        let lines = config_lines(&rendered);
        assert_eq!(lines[0], "interface Ethernet2");
        assert!(lines.contains(&"  switchport access vlan 10".to_string()));
        assert!(lines.contains(&"  description rtr1 Loopback".to_string()));
    }

    #[test]
    fn test_missing_variable_is_an_error() {
        let ctx = Context::new();
        let err = render_str("fix", BuiltinTemplate::ConnectivityFix.source(), &ctx).unwrap_err();
        assert!(err.to_string().contains("Failed to render template fix"));
    }

    #[test]
    fn test_context_flattens_config_keys() {
        let config = serde_json::json!({"ntp_servers": ["10.0.0.1"], "domain_name": "lab.local"});
        let ctx = context_from_config(&serde_json::json!({"name": "access1"}), &config).unwrap();
        let out = render_str(
            "t",
            "{{ device.name }}.{{ domain_name }} {% for s in ntp_servers %}{{ s }}{% endfor %}",
            &ctx,
        )
        .unwrap();
        assert_eq!(out, "access1.lab.local 10.0.0.1");
    }

    #[test]
    fn test_load_template() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("x.tera")).unwrap();
        write!(file, "hostname {{{{ device.name }}}}").unwrap();

        let dir_str = dir.path().to_string_lossy().to_string();
        assert_eq!(load_template(&dir_str, "x.tera").unwrap(), "hostname {{ device.name }}");
        assert!(load_template(&dir_str, "missing.tera").unwrap_err().to_string().contains("Template not found"));
    }

    #[test]
    fn test_bundled_context_template_renders() {
        let source = include_str!("../../templates/base_config_from_context.tera");
        let config = serde_json::json!({
            "domain_name": "lab.local",
            "ntp_servers": ["10.0.0.1"],
            "dns_servers": ["8.8.8.8"],
            "syslog_hosts": [{"host": "10.0.0.50", "port": 514}],
            "snmp": {"community": "labro", "location": "Lab"}
        });
        let ctx = context_from_config(&serde_json::json!({"name": "access1"}), &config).unwrap();
        let lines = config_lines(&render_str(CONTEXT_TEMPLATE_FILE, source, &ctx).unwrap());
        assert_eq!(lines[0], "hostname access1");
        assert!(lines.contains(&"ntp server 10.0.0.1".to_string()));
        assert!(lines.contains(&"snmp-server community labro ro".to_string()));
    }

    #[test]
    fn test_config_lines() {
        let rendered = "\n!\nhostname a\n  ! note\n\ninterface Ethernet1   \n";
        assert_eq!(config_lines(rendered), vec!["hostname a", "interface Ethernet1"]);
    }
}
