//! Per-vendor command dialects for the network-services builder.
//!
//! Arista sections reset the service to its defaults before re-applying the
//! desired state. SR Linux uses absolute `/ system ...` paths and has no reset
//! step.

use crate::models::{scalar_to_cli, ServicesContext};

/// Command dialect, detected from the management interface name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Arista,
    Nokia,
}

impl Platform {
    /// `Management0` is Arista EOS, `mgmt0` is Nokia SR Linux
    pub fn detect(management_interface: &str) -> Option<Self> {
        match management_interface {
            "Management0" => Some(Self::Arista),
            "mgmt0" => Some(Self::Nokia),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Arista => "arista",
            Self::Nokia => "nokia",
        }
    }
}

/// A configurable network service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Ntp,
    Dns,
    Syslog,
    Snmp,
}

impl Service {
    pub const ALL: [Service; 4] = [Service::Ntp, Service::Dns, Service::Syslog, Service::Snmp];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Ntp => "NTP",
            Self::Dns => "DNS",
            Self::Syslog => "Syslog",
            Self::Snmp => "SNMP",
        }
    }

    /// Whether the context carries the key this service is built from
    pub fn present_in(&self, ctx: &ServicesContext) -> bool {
        match self {
            Self::Ntp => ctx.ntp_servers.is_some(),
            Self::Dns => ctx.dns_servers.is_some(),
            Self::Syslog => ctx.syslog_hosts.is_some(),
            Self::Snmp => ctx.snmp.is_some(),
        }
    }
}

/// Which services a run should configure
#[derive(Debug, Clone, Copy)]
pub struct ServiceSelection {
    pub ntp: bool,
    pub dns: bool,
    pub syslog: bool,
    pub snmp: bool,
}

impl Default for ServiceSelection {
    fn default() -> Self {
        Self { ntp: true, dns: true, syslog: true, snmp: true }
    }
}

impl ServiceSelection {
    pub fn enabled(&self, service: Service) -> bool {
        match service {
            Service::Ntp => self.ntp,
            Service::Dns => self.dns,
            Service::Syslog => self.syslog,
            Service::Snmp => self.snmp,
        }
    }
}

/// Build the command list for one service
pub fn build_service(service: Service, ctx: &ServicesContext, platform: Platform) -> Vec<String> {
    match service {
        Service::Ntp => build_ntp(ctx, platform),
        Service::Dns => build_dns(ctx, platform),
        Service::Syslog => build_syslog(ctx, platform),
        Service::Snmp => build_snmp(ctx, platform),
    }
}

/// Build the full command list: every selected service whose key exists in
/// the context, in NTP, DNS, Syslog, SNMP order, with the domain commands
/// placed at the front.
pub fn build_commands(ctx: &ServicesContext, platform: Platform, selection: ServiceSelection) -> Vec<String> {
    let mut commands = Vec::new();
    for service in Service::ALL {
        if selection.enabled(service) && service.present_in(ctx) {
            commands.extend(build_service(service, ctx, platform));
        }
    }
    let mut domain = build_domain(ctx, platform);
    domain.append(&mut commands);
    domain
}

fn build_ntp(ctx: &ServicesContext, platform: Platform) -> Vec<String> {
    let servers = ctx.ntp_servers.as_deref().unwrap_or_default();
    let mut commands = Vec::new();

    match platform {
        Platform::Arista => {
            commands.push("default ntp".to_string());
            commands.extend(servers.iter().map(|s| format!("ntp server {}", s)));
            let source = ctx
                .platform_specific
                .as_ref()
                .and_then(|p| p.ntp_source_interface.as_deref())
                .filter(|s| !s.is_empty());
            if let Some(source) = source {
                commands.push(format!("ntp local-interface {}", source));
            }
        }
        Platform::Nokia => {
            commands.extend(servers.iter().map(|s| format!("/ system ntp server {}", s)));
        }
    }

    commands
}

fn build_dns(ctx: &ServicesContext, platform: Platform) -> Vec<String> {
    let servers = ctx.dns_servers.as_deref().unwrap_or_default();
    match platform {
        Platform::Arista => std::iter::once("default ip name-server".to_string())
            .chain(servers.iter().map(|s| format!("ip name-server {}", s)))
            .collect(),
        Platform::Nokia => servers
            .iter()
            .map(|s| format!("/ system dns server-list [ {} ]", s))
            .collect(),
    }
}

fn build_syslog(ctx: &ServicesContext, platform: Platform) -> Vec<String> {
    let hosts = ctx.syslog_hosts.as_deref().unwrap_or_default();
    let mut commands = Vec::new();

    match platform {
        Platform::Arista => {
            commands.push("default logging host".to_string());
            commands.extend(hosts.iter().map(|h| format!("logging host {}", h.host)));

            let logging = ctx.platform_specific.as_ref().and_then(|p| p.logging.as_ref());
            if let Some(logging) = logging {
                if let Some(intf) = logging.source_interface.as_deref().filter(|s| !s.is_empty()) {
                    commands.push(format!("logging source-interface {}", intf));
                }
                if let Some(size) = logging.buffer_size.as_ref().and_then(scalar_to_cli) {
                    commands.push(format!("logging buffered {}", size));
                }
            }
        }
        Platform::Nokia => {
            commands.extend(
                hosts
                    .iter()
                    .map(|h| format!("/ system logging remote-server {} port {}", h.host, h.port)),
            );
        }
    }

    commands
}

fn build_snmp(ctx: &ServicesContext, platform: Platform) -> Vec<String> {
    let snmp = ctx.snmp.clone().unwrap_or_default();
    let community = snmp.community.filter(|s| !s.is_empty());
    let location = snmp.location.filter(|s| !s.is_empty());
    let mut commands = Vec::new();

    match platform {
        Platform::Arista => {
            if community.is_some() || location.is_some() {
                commands.push("default snmp-server".to_string());
            }
            if let Some(c) = &community {
                commands.push(format!("snmp-server community {} ro", c));
            }
            if let Some(l) = &location {
                commands.push(format!("snmp-server location {}", l));
            }
        }
        Platform::Nokia => {
            if let Some(c) = &community {
                commands.push(format!("/ system snmp community {} access-permissions ro", c));
            }
            if let Some(l) = &location {
                commands.push(format!("/ system snmp location {}", l));
            }
        }
    }

    commands
}

fn build_domain(ctx: &ServicesContext, platform: Platform) -> Vec<String> {
    let domain = match ctx.domain_name.as_deref().filter(|d| !d.is_empty()) {
        Some(d) => d,
        None => return Vec::new(),
    };

    match platform {
        // `dns domain` replaced `ip domain-name` on current EOS releases
        Platform::Arista => vec![
            "default dns domain".to_string(),
            format!("dns domain {}", domain),
        ],
        Platform::Nokia => vec![format!("/ system name domain-name {}", domain)],
    }
}
