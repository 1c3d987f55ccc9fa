pub mod client;
pub mod types;

use anyhow::Result;

use crate::models::Credentials;

pub use client::{DeviceFilter, NautobotClient};
pub use types::*;

/// Typed error for an inventory lookup miss, so callers can downcast
/// instead of matching on message text.
#[derive(Debug)]
pub struct NotFoundError {
    pub resource: String,
    pub id: String,
}

impl NotFoundError {
    pub fn new(resource: &str, id: &str) -> Self {
        Self {
            resource: resource.to_string(),
            id: id.to_string(),
        }
    }
}

impl std::fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} not found: {}", self.resource, self.id)
    }
}

impl std::error::Error for NotFoundError {}

/// Secret providers whose values can be read from this host
pub mod secret_provider {
    pub const ENVIRONMENT_VARIABLE: &str = "environment-variable";
    pub const TEXT_FILE: &str = "text-file";
}

/// Read a secret's value from its provider
pub fn resolve_secret_value(secret: &NbSecret) -> Result<String> {
    let param = |key: &str| {
        secret
            .parameters
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("Secret {} is missing the '{}' parameter", secret.name, key))
    };

    match secret.provider.as_str() {
        secret_provider::ENVIRONMENT_VARIABLE => {
            let var = param("variable")?;
            std::env::var(var)
                .map_err(|_| anyhow::anyhow!("Environment variable {} for secret {} is not set", var, secret.name))
        }
        secret_provider::TEXT_FILE => {
            let path = param("path")?;
            let value = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("Failed to read secret {} from {}: {}", secret.name, path, e))?;
            Ok(value.trim_end_matches(['\r', '\n']).to_string())
        }
        other => Err(anyhow::anyhow!(
            "Secret provider '{}' for {} is not supported",
            other,
            secret.name
        )),
    }
}

impl NautobotClient {
    /// Resolve the device's Generic username/password from its secrets group.
    ///
    /// Anything that cannot be resolved falls back to `fallback`, with a warning.
    pub async fn resolve_credentials(&self, device: &NbDevice, fallback: &Credentials) -> Credentials {
        let group = match &device.secrets_group {
            Some(g) => g,
            None => {
                tracing::warn!(
                    "Device {} has no secrets group, using default credentials",
                    device.display_name()
                );
                return fallback.clone();
            }
        };

        let associations = match self.list_secrets_group_associations(&group.id).await {
            Ok(a) => a,
            Err(e) => {
                tracing::warn!("Failed to read secrets group {}: {}, using default credentials", group.label(), e);
                return fallback.clone();
            }
        };

        let mut username = None;
        let mut password = None;
        for assoc in associations.iter().filter(|a| a.access_type.eq_ignore_ascii_case("generic")) {
            let slot = match assoc.secret_type.as_str() {
                "username" => &mut username,
                "password" => &mut password,
                _ => continue,
            };
            let value = match self.get_secret(&assoc.secret.id).await {
                Ok(secret) => resolve_secret_value(&secret),
                Err(e) => Err(e),
            };
            match value {
                Ok(v) => *slot = Some(v),
                Err(e) => tracing::warn!("Secret {} could not be resolved: {}", assoc.secret.label(), e),
            }
        }

        if username.is_none() || password.is_none() {
            tracing::warn!(
                "Secrets group {} did not yield a full Generic login for {}, filling from defaults",
                group.label(),
                device.display_name()
            );
        }

        Credentials {
            username: username.unwrap_or_else(|| fallback.username.clone()),
            password: password.unwrap_or_else(|| fallback.password.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn secret(provider: &str, key: &str, value: &str) -> NbSecret {
        let mut parameters = HashMap::new();
        parameters.insert(key.to_string(), serde_json::json!(value));
        NbSecret {
            id: "s1".into(),
            name: "device-password".into(),
            provider: provider.into(),
            parameters,
        }
    }

    fn defaults() -> Credentials {
        Credentials { username: "admin".into(), password: "admin".into() }
    }

    #[test]
    fn test_not_found_display() {
        let err = NotFoundError::new("Device", "spine9");
        assert_eq!(err.to_string(), "Device not found: spine9");
    }

    #[test]
    fn test_env_secret() {
        std::env::set_var("NETLAB_TEST_SECRET_PW", "s3cret");
        let s = secret(secret_provider::ENVIRONMENT_VARIABLE, "variable", "NETLAB_TEST_SECRET_PW");
        assert_eq!(resolve_secret_value(&s).unwrap(), "s3cret");
    }

    #[test]
    fn test_text_file_secret_strips_newline() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "filepass").unwrap();
        let path = file.path().to_string_lossy().to_string();
        let s = secret(secret_provider::TEXT_FILE, "path", &path);
        assert_eq!(resolve_secret_value(&s).unwrap(), "filepass");
    }

    #[test]
    fn test_unsupported_provider() {
        let s = secret("hashicorp-vault", "path", "kv/lab");
        assert!(resolve_secret_value(&s).unwrap_err().to_string().contains("not supported"));
    }

    #[tokio::test]
    async fn test_device_without_group_uses_defaults() {
        let client = NautobotClient::new("http://127.0.0.1:9", "t", 1).unwrap();
        let device: NbDevice = serde_json::from_value(serde_json::json!({"id": "d1", "name": "access1"})).unwrap();
        assert_eq!(client.resolve_credentials(&device, &defaults()).await, defaults());
    }

    #[tokio::test]
    async fn test_resolve_credentials_from_group() {
        std::env::set_var("NETLAB_TEST_SECRET_USER", "netops");
        std::env::set_var("NETLAB_TEST_SECRET_PASS", "hunter2");

        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/extras/secrets-groups-associations/")
                    .query_param("secrets_group", "g1");
                then.status(200).json_body(serde_json::json!({
                    "count": 2, "next": null, "previous": null,
                    "results": [
                        {"id": "a1", "secret": {"id": "su"}, "access_type": "Generic", "secret_type": "username"},
                        {"id": "a2", "secret": {"id": "sp"}, "access_type": "Generic", "secret_type": "password"}
                    ]
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/extras/secrets/su/");
                then.status(200).json_body(serde_json::json!({
                    "id": "su", "name": "user", "provider": "environment-variable",
                    "parameters": {"variable": "NETLAB_TEST_SECRET_USER"}
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/extras/secrets/sp/");
                then.status(200).json_body(serde_json::json!({
                    "id": "sp", "name": "pass", "provider": "environment-variable",
                    "parameters": {"variable": "NETLAB_TEST_SECRET_PASS"}
                }));
            })
            .await;

        let client = NautobotClient::new(&server.base_url(), "t", 5).unwrap();
        let device: NbDevice = serde_json::from_value(serde_json::json!({
            "id": "d1", "name": "access1", "secrets_group": {"id": "g1", "name": "lab-creds"}
        }))
        .unwrap();

        let creds = client.resolve_credentials(&device, &defaults()).await;
        assert_eq!(creds.username, "netops");
        assert_eq!(creds.password, "hunter2");
    }
}
