use std::env;

/// Config holds all application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub nautobot_url: String,
    pub nautobot_token: String,
    pub nautobot_timeout_secs: u64,
    pub device_username: String,
    pub device_password: String,
    pub eapi_transport: String,
    pub eapi_port: u16,
    pub srl_jsonrpc_port: u16,
    pub device_timeout_secs: u64,
    pub ssh_port: u16,
    pub templates_dir: String,
    pub listen_addr: String,
    pub hook_jwt_secret: String,
    pub monitor_schedule: String,
    pub clab_lab_name: String,
    pub access_loopback_subnet: String,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn load() -> Self {
        Self {
            nautobot_url: get_env("NAUTOBOT_URL", "http://localhost:8080"),
            nautobot_token: get_env("NAUTOBOT_TOKEN", ""),
            nautobot_timeout_secs: get_env("NAUTOBOT_TIMEOUT_SECS", "30")
                .parse()
                .unwrap_or(30),
            device_username: get_env("DEVICE_USERNAME", "admin"),
            device_password: get_env("DEVICE_PASSWORD", "admin"),
            eapi_transport: get_env("EAPI_TRANSPORT", "https"),
            eapi_port: get_env("EAPI_PORT", "443").parse().unwrap_or(443),
            srl_jsonrpc_port: get_env("SRL_JSONRPC_PORT", "443").parse().unwrap_or(443),
            device_timeout_secs: get_env("DEVICE_TIMEOUT_SECS", "10")
                .parse()
                .unwrap_or(10),
            ssh_port: get_env("SSH_PORT", "22").parse().unwrap_or(22),
            templates_dir: get_env("TEMPLATES_DIR", "templates"),
            listen_addr: get_env("LISTEN_ADDR", "0.0.0.0:8090"),
            hook_jwt_secret: get_env("HOOK_JWT_SECRET", ""),
            monitor_schedule: get_env("MONITOR_SCHEDULE", ""),
            clab_lab_name: get_env("CLAB_LAB_NAME", "nautobot-lab"),
            access_loopback_subnet: get_env("ACCESS_LOOPBACK_SUBNET", "10.99.1.0/24"),
        }
    }

    /// Default device login, used when a device has no resolvable secrets group
    pub fn default_credentials(&self) -> crate::models::Credentials {
        crate::models::Credentials {
            username: self.device_username.clone(),
            password: self.device_password.clone(),
        }
    }

    /// eAPI connection settings derived from the config
    pub fn eapi_settings(&self) -> crate::eapi::EapiSettings {
        crate::eapi::EapiSettings {
            transport: self.eapi_transport.clone(),
            port: self.eapi_port,
            timeout_secs: self.device_timeout_secs,
        }
    }
}

fn get_env(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
