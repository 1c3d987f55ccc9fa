//! Inventory and device jobs.
//!
//! Every job is a sequential procedure over a `JobContext`: it reads or
//! writes Nautobot objects, optionally talks to devices, logs progress and
//! returns a serializable outcome.

pub mod access_loopbacks;
pub mod configure_network_services;
pub mod device_status_monitor;
pub mod device_sync;
pub mod diagnose_interfaces;
pub mod exec;
pub mod hooks;
pub mod location_checker;
pub mod network_discovery;
pub mod preflight_data;
pub mod preflight_lab_setup;
pub mod provision_device;
pub mod push_template;
pub mod render_config;
pub mod scripts;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::Config;
use crate::drivers::{self, DriverOptions, DriverResult, NetworkDriver};
use crate::eapi::EapiClient;
use crate::models::Credentials;
use crate::nautobot::NautobotClient;

/// Shared state for one job run
pub struct JobContext {
    pub config: Config,
    pub nautobot: NautobotClient,
    pub run_id: uuid::Uuid,
}

impl JobContext {
    pub fn new(config: Config) -> Result<Self> {
        let nautobot = NautobotClient::new(
            &config.nautobot_url,
            &config.nautobot_token,
            config.nautobot_timeout_secs,
        )?;
        Ok(Self {
            config,
            nautobot,
            run_id: uuid::Uuid::new_v4(),
        })
    }

    /// First 8 hex digits of the run id, used in generated object names
    pub fn short_run_id(&self) -> String {
        self.run_id.simple().to_string()[..8].to_string()
    }

    /// eAPI client for `host` using the configured transport
    pub fn eapi(&self, host: &str, credentials: Credentials) -> Result<EapiClient> {
        EapiClient::new(host, credentials, &self.config.eapi_settings())
    }

    /// Driver options for `driver`, overlaid with the platform's `napalm_args`
    pub fn driver_options(&self, driver: &str, napalm_args: Option<&serde_json::Value>) -> Result<DriverOptions> {
        let port = if drivers::driver_name::SRL.contains(&driver) {
            self.config.srl_jsonrpc_port
        } else {
            self.config.eapi_port
        };
        let base = DriverOptions {
            transport: self.config.eapi_transport.clone(),
            port: Some(port),
            timeout_secs: self.config.device_timeout_secs,
        };
        DriverOptions::from_napalm_args(napalm_args, base)
    }

}

/// Opens device drivers for jobs that work from the static lab table
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, driver: &str, host: &str, credentials: Credentials) -> DriverResult<Box<dyn NetworkDriver>>;
}

#[async_trait]
impl Connector for JobContext {
    async fn connect(&self, driver: &str, host: &str, credentials: Credentials) -> DriverResult<Box<dyn NetworkDriver>> {
        let options = self
            .driver_options(driver, None)
            .map_err(|e| drivers::DriverError::Other(e.to_string()))?;
        drivers::open_driver(driver, host, credentials, &options).await
    }
}

/// `=` separator line
pub fn heavy_rule() -> String {
    "=".repeat(80)
}

/// `-` separator line
pub fn light_rule() -> String {
    "-".repeat(60)
}

/// Log a title between two `=` separators
pub fn banner(title: &str) {
    tracing::info!("{}", heavy_rule());
    tracing::info!("{}", title);
    tracing::info!("{}", heavy_rule());
}

/// Log a title between two `-` separators
pub fn section(title: &str) {
    tracing::info!("{}", light_rule());
    tracing::info!("{}", title);
    tracing::info!("{}", light_rule());
}

/// Log a success event
pub fn success(msg: &str) {
    tracing::info!(status = "success", "{}", msg);
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_separators() {
        assert_eq!(heavy_rule().len(), 80);
        assert_eq!(light_rule().len(), 60);
    }

    #[test]
    fn test_driver_options_per_driver() {
        let mut cfg = testing::config("http://127.0.0.1:1");
        cfg.eapi_port = 8443;
        cfg.srl_jsonrpc_port = 57400;
        let ctx = JobContext::new(cfg).unwrap();

        assert_eq!(ctx.driver_options("eos", None).unwrap().port, Some(8443));
        assert_eq!(ctx.driver_options("nokia_srl", None).unwrap().port, Some(57400));

        let args = serde_json::json!({"port": 9000});
        assert_eq!(ctx.driver_options("eos", Some(&args)).unwrap().port, Some(9000));
    }

    #[test]
    fn test_short_run_id() {
        let ctx = JobContext::new(testing::config("http://127.0.0.1:1")).unwrap();
        let short = ctx.short_run_id();
        assert_eq!(short.len(), 8);
        assert!(ctx.run_id.simple().to_string().starts_with(&short));
    }
}
