use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::dialect::ServiceSelection;
use crate::hooks;
use crate::jobs::{self, JobContext};
use crate::models::lab;
use crate::render::BuiltinTemplate;

#[derive(Debug, Parser)]
#[command(name = "netlab-jobs", version, about = "Inventory population, queries and config push for containerlab labs")]
pub struct Cli {
    /// Print the job result as JSON on stdout
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Push NTP/DNS/syslog/SNMP settings from config context
    ConfigureNetworkServices {
        /// Device names; all lab devices when omitted
        #[arg(long = "device")]
        devices: Vec<String>,
        #[arg(long)]
        no_ntp: bool,
        #[arg(long)]
        no_dns: bool,
        #[arg(long)]
        no_syslog: bool,
        #[arg(long)]
        no_snmp: bool,
        /// Push to devices; without it commands are only logged
        #[arg(long)]
        apply: bool,
    },
    /// Deploy the intended config of a device
    ProvisionDevice {
        device: String,
        /// Load and diff only unless set
        #[arg(long)]
        apply: bool,
        /// Replace instead of merge
        #[arg(long)]
        replace: bool,
        /// Discard the candidate instead of committing it
        #[arg(long)]
        no_commit: bool,
    },
    /// Pull facts and interfaces from a device into Nautobot
    DeviceSync { device: String },
    /// Check reachability and health of lab devices
    DeviceStatusMonitor {
        #[arg(long)]
        device: Option<String>,
        #[arg(long)]
        skip_interfaces: bool,
        #[arg(long)]
        skip_system: bool,
    },
    /// Discover interfaces and LLDP neighbors of lab devices
    NetworkDiscovery {
        #[arg(long)]
        device: Option<String>,
        #[arg(long)]
        skip_interfaces: bool,
        #[arg(long)]
        skip_neighbors: bool,
    },
    /// Render a device's config context through the base template
    RenderConfig {
        device: String,
        /// Also write the rendered config here
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Ping, SSH and DNS checks against a containerlab node
    ConnectivityTest {
        destination: String,
        #[arg(long, default_value_t = jobs::connectivity_test::DEFAULT_PING_COUNT)]
        count: u32,
    },
    /// Create the site, tags, VLANs, platforms and devices of the lab
    PreflightLabSetup {
        #[arg(long, default_value = "Lab Data Center")]
        site_name: String,
        #[arg(long, default_value = "172.20.20.0/24")]
        management_subnet: String,
        #[arg(long)]
        no_vlans: bool,
        #[arg(long)]
        no_tags: bool,
    },
    /// Ensure location types, custom fields and regions exist
    PreflightData {
        #[arg(long)]
        debug: bool,
        #[arg(long)]
        dry_run: bool,
    },
    /// Report conflicting location names and hierarchy problems
    LocationChecker {
        #[arg(long)]
        skip_existing: bool,
        #[arg(long)]
        skip_hierarchy: bool,
        #[arg(long)]
        skip_suggestions: bool,
    },
    /// Handle an interface change payload read from a file
    InterfaceHook {
        payload: PathBuf,
        #[arg(long)]
        dry_run: bool,
    },
    /// Handle a device change payload read from a file
    DeviceHook { payload: PathBuf },
    /// Assign Loopback0/Loopback1 on active access switches
    AccessLoopbacks {
        #[arg(long)]
        subnet: Option<String>,
    },
    /// Render a built-in template per inventory device and push it
    PushTemplate {
        #[arg(long, value_enum, default_value_t = BuiltinTemplate::Inventory)]
        template: BuiltinTemplate,
        #[arg(long = "device")]
        devices: Vec<String>,
        #[arg(long, default_value = jobs::access_loopbacks::ACCESS_ROLE)]
        role: String,
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the state of one interface on inventory devices
    DiagnoseInterfaces {
        #[arg(long = "device", default_values_t = vec!["access1".to_string(), "rtr1".to_string()])]
        devices: Vec<String>,
        #[arg(long, default_value = jobs::diagnose_interfaces::DEFAULT_INTERFACE)]
        interface: String,
    },
    /// Set the hostname of a host over eAPI
    SetHostname { host: String, hostname: String },
    /// Address and enable an interface over eAPI
    ConfigureInterface {
        host: String,
        name: String,
        ip_address: String,
        #[arg(long)]
        shutdown: bool,
        #[arg(long)]
        no_save: bool,
    },
    /// Hostname and Management0/Ethernet1 bring-up on the lab switches
    BasicLabConfig,
    /// Run show commands over SSH on an inventory device
    Exec {
        device: String,
        #[arg(required = true)]
        commands: Vec<String>,
    },
    /// Serve the hook endpoints
    Serve {
        /// Log interface changes without pushing them
        #[arg(long)]
        dry_run: bool,
    },
    /// Mint a bearer token for the hook endpoints
    HookToken {
        #[arg(long, default_value = "nautobot")]
        subject: String,
        #[arg(long, default_value_t = 24)]
        ttl_hours: i64,
    },
}

fn emit<T: Serialize>(json: bool, value: &T) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    }
    Ok(())
}

async fn read_payload(path: &Path) -> Result<jobs::hooks::WebhookPayload> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read payload {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid payload in {}", path.display()))
}

/// Fall back to the lab topology when no device names were given
fn lab_devices_if_empty(devices: Vec<String>) -> Vec<String> {
    if devices.is_empty() {
        lab::device_names().into_iter().map(String::from).collect()
    } else {
        devices
    }
}

pub async fn run(cli: Cli, config: Config) -> Result<()> {
    let json = cli.json;

    if let Command::HookToken { subject, ttl_hours } = &cli.command {
        if config.hook_jwt_secret.is_empty() {
            anyhow::bail!("HOOK_JWT_SECRET must be set to mint hook tokens");
        }
        let token = hooks::auth::mint_token(&config.hook_jwt_secret, subject, *ttl_hours)?;
        return if json {
            emit(true, &serde_json::json!({ "token": token }))
        } else {
            println!("{}", token);
            Ok(())
        };
    }

    let ctx = JobContext::new(config)?;
    tracing::info!("Job run {}", ctx.run_id);

    match cli.command {
        Command::ConfigureNetworkServices { devices, no_ntp, no_dns, no_syslog, no_snmp, apply } => {
            let opts = jobs::configure_network_services::Options {
                devices: lab_devices_if_empty(devices),
                services: ServiceSelection { ntp: !no_ntp, dns: !no_dns, syslog: !no_syslog, snmp: !no_snmp },
                dry_run: !apply,
            };
            emit(json, &jobs::configure_network_services::run(&ctx, &opts).await?)
        }
        Command::ProvisionDevice { device, apply, replace, no_commit } => {
            let opts = jobs::provision_device::Options { device, dry_run: !apply, replace, commit: !no_commit };
            emit(json, &jobs::provision_device::run(&ctx, &opts).await?)
        }
        Command::DeviceSync { device } => emit(json, &jobs::device_sync::run(&ctx, &device).await?),
        Command::DeviceStatusMonitor { device, skip_interfaces, skip_system } => {
            let opts = jobs::device_status_monitor::Options {
                device,
                check_interfaces: !skip_interfaces,
                check_system: !skip_system,
            };
            emit(json, &jobs::device_status_monitor::run(&ctx, &opts).await?)
        }
        Command::NetworkDiscovery { device, skip_interfaces, skip_neighbors } => {
            let opts = jobs::network_discovery::Options {
                device,
                discover_interfaces: !skip_interfaces,
                discover_neighbors: !skip_neighbors,
            };
            emit(json, &jobs::network_discovery::run(&ctx, &opts).await?)
        }
        Command::RenderConfig { device, output } => {
            let config = jobs::render_config::run(&ctx, &device, output.as_deref()).await?;
            emit(json, &serde_json::json!({ "device": device, "config": config }))
        }
        Command::ConnectivityTest { destination, count } => {
            let opts = jobs::connectivity_test::Options { destination, ping_count: count };
            emit(json, &jobs::connectivity_test::run(&ctx, &opts).await?)
        }
        Command::PreflightLabSetup { site_name, management_subnet, no_vlans, no_tags } => {
            let opts = jobs::preflight_lab_setup::Options {
                site_name,
                management_subnet,
                create_vlans: !no_vlans,
                create_tags: !no_tags,
            };
            emit(json, &jobs::preflight_lab_setup::run(&ctx, &opts).await?)
        }
        Command::PreflightData { debug, dry_run } => {
            let opts = jobs::preflight_data::Options { show_debug: debug, dry_run };
            emit(json, &jobs::preflight_data::run(&ctx, &opts).await?)
        }
        Command::LocationChecker { skip_existing, skip_hierarchy, skip_suggestions } => {
            let opts = jobs::location_checker::Options {
                check_existing: !skip_existing,
                check_hierarchy: !skip_hierarchy,
                suggest_cleanup: !skip_suggestions,
            };
            emit(json, &jobs::location_checker::run(&ctx, &opts).await?)
        }
        Command::InterfaceHook { payload, dry_run } => {
            let payload = read_payload(&payload).await?;
            emit(json, &jobs::hooks::interface_hook(&ctx, &payload, !dry_run).await?)
        }
        Command::DeviceHook { payload } => {
            let payload = read_payload(&payload).await?;
            emit(json, &serde_json::json!({ "message": jobs::hooks::device_hook(&payload) }))
        }
        Command::AccessLoopbacks { subnet } => {
            emit(json, &jobs::access_loopbacks::run(&ctx, subnet.as_deref()).await?)
        }
        Command::PushTemplate { template, devices, role, dry_run } => {
            // Explicit device names override the role filter
            let role = if devices.is_empty() { Some(role) } else { None };
            let opts = jobs::push_template::Options { devices, role, template, dry_run };
            emit(json, &jobs::push_template::run(&ctx, &opts).await?)
        }
        Command::DiagnoseInterfaces { devices, interface } => {
            let opts = jobs::diagnose_interfaces::Options { devices, interface };
            emit(json, &jobs::diagnose_interfaces::run(&ctx, &opts).await?)
        }
        Command::SetHostname { host, hostname } => {
            emit(json, &jobs::scripts::set_hostname(&ctx, &host, &hostname).await?)
        }
        Command::ConfigureInterface { host, name, ip_address, shutdown, no_save } => {
            let settings = jobs::scripts::InterfaceSettings { name, ip_address, enabled: !shutdown, save: !no_save };
            emit(json, &jobs::scripts::configure_interface(&ctx, &host, &settings).await?)
        }
        Command::BasicLabConfig => emit(json, &jobs::scripts::basic_lab_config(&ctx).await?),
        Command::Exec { device, commands } => emit(json, &jobs::exec::run(&ctx, &device, &commands).await?),
        Command::Serve { dry_run } => hooks::serve(ctx, !dry_run).await,
        Command::HookToken { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_push_template() {
        let cli = Cli::try_parse_from([
            "netlab-jobs", "--json", "push-template", "--template", "connectivity-fix", "--dry-run",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Command::PushTemplate { template, devices, role, dry_run } => {
                assert_eq!(template, BuiltinTemplate::ConnectivityFix);
                assert!(devices.is_empty());
                assert_eq!(role, "Access Switch");
                assert!(dry_run);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_diagnose_defaults() {
        let cli = Cli::try_parse_from(["netlab-jobs", "diagnose-interfaces"]).unwrap();
        match cli.command {
            Command::DiagnoseInterfaces { devices, interface } => {
                assert_eq!(devices, vec!["access1", "rtr1"]);
                assert_eq!(interface, "Ethernet2");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_services_without_devices_targets_lab() {
        let cli = Cli::try_parse_from(["netlab-jobs", "configure-network-services", "--apply"]).unwrap();
        match cli.command {
            Command::ConfigureNetworkServices { devices, apply, .. } => {
                assert!(apply);
                assert_eq!(lab_devices_if_empty(devices), vec!["access1", "access2", "dist1", "rtr1"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(lab_devices_if_empty(vec!["spine9".into()]), vec!["spine9"]);
    }

    #[test]
    fn test_exec_requires_commands() {
        assert!(Cli::try_parse_from(["netlab-jobs", "exec", "access1"]).is_err());
    }

    #[tokio::test]
    async fn test_read_payload_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.json");
        std::fs::write(&path, r#"{"event": "create", "data": {"id": "d1", "name": "access1"}}"#).unwrap();
        let payload = read_payload(&path).await.unwrap();
        assert_eq!(payload.action(), "created");
        assert_eq!(payload.object_repr(), "access1");
    }

    #[tokio::test]
    async fn test_hook_token_requires_secret() {
        let mut config = crate::jobs::testing::config("http://127.0.0.1:1");
        config.hook_jwt_secret = String::new();
        let cli = Cli::try_parse_from(["netlab-jobs", "hook-token"]).unwrap();
        assert!(run(cli, config).await.is_err());
    }
}
