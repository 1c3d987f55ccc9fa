use anyhow::Result;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::types::*;
use super::NotFoundError;

/// Query-string pairs appended to an API request
pub type Query<'a> = [(&'a str, String)];

/// Device list filter; unset fields are not sent
#[derive(Debug, Clone, Default)]
pub struct DeviceFilter {
    pub names: Vec<String>,
    pub role: Option<String>,
    pub status: Option<String>,
    pub platform: Option<String>,
}

impl DeviceFilter {
    pub fn names(names: &[String]) -> Self {
        Self { names: names.to_vec(), ..Default::default() }
    }

    fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut query: Vec<(&'static str, String)> =
            self.names.iter().map(|n| ("name", n.clone())).collect();
        if let Some(role) = &self.role {
            query.push(("role", role.clone()));
        }
        if let Some(status) = &self.status {
            query.push(("status", status.clone()));
        }
        if let Some(platform) = &self.platform {
            query.push(("platform", platform.clone()));
        }
        query.push(("depth", "1".to_string()));
        query.push(("limit", "1000".to_string()));
        query
    }
}

/// Nautobot REST API client
pub struct NautobotClient {
    base_url: String,
    token: String,
    client: Client,
}

impl NautobotClient {
    pub fn new(url: &str, token: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            base_url: url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    fn auth_header(&self) -> String {
        format!("Token {}", self.token)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("Authorization", self.auth_header())
            .header("Accept", "application/json")
    }

    async fn read_json<T: DeserializeOwned>(resp: reqwest::Response, what: &str) -> Result<T> {
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Nautobot API {} error {}: {}", what, status, body));
        }
        Ok(resp.json().await?)
    }

    /// Helper to GET a single object
    async fn get_resource<T: DeserializeOwned>(&self, endpoint: &str, query: &Query<'_>) -> Result<T> {
        let resp = self
            .authed(self.client.get(self.api_url(endpoint)).query(query))
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(NotFoundError::new("Object", endpoint).into());
        }
        Self::read_json(resp, "get").await
    }

    /// Helper to perform a paginated GET list request, following `next` links
    async fn list_paginated<T: DeserializeOwned>(&self, endpoint: &str, query: &Query<'_>) -> Result<Vec<T>> {
        let resp = self
            .authed(self.client.get(self.api_url(endpoint)).query(query))
            .send()
            .await?;
        let mut page: PaginatedResponse<T> = Self::read_json(resp, "list").await?;
        let mut results = std::mem::take(&mut page.results);

        while let Some(next) = page.next.take() {
            let resp = self.authed(self.client.get(&next)).send().await?;
            page = Self::read_json(resp, "list").await?;
            results.append(&mut page.results);
        }

        Ok(results)
    }

    /// Helper to look up the first item matching a filter
    async fn find_one<T: DeserializeOwned>(&self, endpoint: &str, query: &Query<'_>) -> Result<Option<T>> {
        let resp = self
            .authed(self.client.get(self.api_url(endpoint)).query(query))
            .send()
            .await?;
        let page: PaginatedResponse<T> = Self::read_json(resp, "lookup").await?;
        Ok(page.results.into_iter().next())
    }

    /// Helper to create a resource via POST
    async fn create_resource<T, B>(&self, endpoint: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: serde::Serialize,
    {
        let resp = self
            .authed(self.client.post(self.api_url(endpoint)))
            .json(body)
            .send()
            .await?;
        Self::read_json(resp, "create").await
    }

    /// Helper to partially update a resource via PATCH
    async fn patch_resource<T, B>(&self, endpoint: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: serde::Serialize,
    {
        let resp = self
            .authed(self.client.patch(self.api_url(endpoint)))
            .json(body)
            .send()
            .await?;
        Self::read_json(resp, "update").await
    }

    /// Test connectivity to Nautobot
    pub async fn test_connection(&self) -> bool {
        match self.authed(self.client.get(self.api_url("/status/"))).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    // --- Devices ---

    pub async fn list_devices(&self, filter: &DeviceFilter) -> Result<Vec<NbDevice>> {
        self.list_paginated("/dcim/devices/", &filter.to_query()).await
    }

    pub async fn get_device(&self, id: &str) -> Result<NbDevice> {
        self.get_resource(&format!("/dcim/devices/{}/", id), &[("depth", "1".to_string())])
            .await
    }

    pub async fn get_device_by_name(&self, name: &str) -> Result<NbDevice> {
        self.find_one("/dcim/devices/", &[("name", name.to_string()), ("depth", "1".to_string())])
            .await?
            .ok_or_else(|| NotFoundError::new("Device", name).into())
    }

    /// Device with its rendered config context; `None` when the context is empty
    pub async fn get_config_context(&self, id: &str) -> Result<Option<serde_json::Value>> {
        let device: NbDevice = self
            .get_resource(
                &format!("/dcim/devices/{}/", id),
                &[("include", "config_context".to_string()), ("depth", "1".to_string())],
            )
            .await?;

        Ok(device.config_context.filter(|ctx| match ctx {
            serde_json::Value::Object(map) => !map.is_empty(),
            serde_json::Value::Null => false,
            _ => true,
        }))
    }

    pub async fn update_device(&self, id: &str, patch: &DevicePatch) -> Result<NbDevice> {
        self.patch_resource(&format!("/dcim/devices/{}/", id), patch).await
    }

    pub async fn get_or_create_device(&self, device: &DeviceCreate) -> Result<(NbDevice, bool)> {
        let query = [("name", device.name.clone()), ("location", device.location.clone())];
        if let Some(existing) = self.find_one::<NbDevice>("/dcim/devices/", &query).await? {
            return Ok((existing, false));
        }
        Ok((self.create_resource("/dcim/devices/", device).await?, true))
    }

    pub async fn get_or_create_device_type(&self, manufacturer: &str, model: &str) -> Result<NbDeviceType> {
        let mfr: NbNamed = match self
            .find_one("/dcim/manufacturers/", &[("name", manufacturer.to_string())])
            .await?
        {
            Some(m) => m,
            None => {
                self.create_resource(
                    "/dcim/manufacturers/",
                    &NamedCreate { name: manufacturer, description: "", content_types: vec![], color: None },
                )
                .await?
            }
        };

        if let Some(dt) = self
            .find_one("/dcim/device-types/", &[("model", model.to_string()), ("manufacturer", mfr.id.clone())])
            .await?
        {
            return Ok(dt);
        }

        self.create_resource("/dcim/device-types/", &DeviceTypeCreate { manufacturer: &mfr.id, model })
            .await
    }

    // --- Interfaces ---

    pub async fn list_interfaces(&self, device_id: &str) -> Result<Vec<NbInterface>> {
        self.list_paginated(
            "/dcim/interfaces/",
            &[("device_id", device_id.to_string()), ("limit", "1000".to_string())],
        )
        .await
    }

    pub async fn get_interface(&self, id: &str) -> Result<NbInterface> {
        self.get_resource(&format!("/dcim/interfaces/{}/", id), &[("depth", "1".to_string())])
            .await
    }

    pub async fn get_or_create_interface(
        &self,
        device_id: &str,
        name: &str,
        iface_type: &str,
        status: &str,
    ) -> Result<(NbInterface, bool)> {
        let query = [("device_id", device_id.to_string()), ("name", name.to_string())];
        if let Some(existing) = self.find_one::<NbInterface>("/dcim/interfaces/", &query).await? {
            return Ok((existing, false));
        }

        let created = self
            .create_resource(
                "/dcim/interfaces/",
                &InterfaceCreate {
                    device: device_id.to_string(),
                    name: name.to_string(),
                    iface_type: iface_type.to_string(),
                    status: status.to_string(),
                },
            )
            .await?;
        Ok((created, true))
    }

    pub async fn update_interface(&self, id: &str, patch: &InterfacePatch) -> Result<NbInterface> {
        self.patch_resource(&format!("/dcim/interfaces/{}/", id), patch).await
    }

    // --- IPAM ---

    pub async fn get_ip_address_by_address(&self, address: &str) -> Result<Option<NbIpAddress>> {
        self.find_one("/ipam/ip-addresses/", &[("address", address.to_string())])
            .await
    }

    pub async fn create_ip_address(&self, ip: &IpAddressCreate) -> Result<NbIpAddress> {
        self.create_resource("/ipam/ip-addresses/", ip).await
    }

    pub async fn update_ip_address(&self, id: &str, patch: &serde_json::Value) -> Result<NbIpAddress> {
        self.patch_resource(&format!("/ipam/ip-addresses/{}/", id), patch).await
    }

    /// Link an IP to an interface unless the association already exists
    pub async fn assign_ip_to_interface(&self, ip_id: &str, interface_id: &str) -> Result<bool> {
        let query = [("ip_address", ip_id.to_string()), ("interface", interface_id.to_string())];
        let existing: Option<serde_json::Value> =
            self.find_one("/ipam/ip-address-to-interface/", &query).await?;
        if existing.is_some() {
            return Ok(false);
        }

        let _: serde_json::Value = self
            .create_resource(
                "/ipam/ip-address-to-interface/",
                &IpToInterfaceCreate { ip_address: ip_id, interface: interface_id },
            )
            .await?;
        Ok(true)
    }

    pub async fn get_or_create_prefix(&self, prefix: &PrefixCreate) -> Result<(NbPrefix, bool)> {
        if let Some(existing) = self
            .find_one::<NbPrefix>("/ipam/prefixes/", &[("prefix", prefix.prefix.clone())])
            .await?
        {
            return Ok((existing, false));
        }
        Ok((self.create_resource("/ipam/prefixes/", prefix).await?, true))
    }

    pub async fn get_or_create_vlan(&self, vlan: &VlanCreate) -> Result<(NbVlan, bool)> {
        let mut query = vec![("vid", vlan.vid.to_string())];
        if let Some(location) = &vlan.location {
            query.push(("location", location.clone()));
        }
        if let Some(existing) = self.find_one::<NbVlan>("/ipam/vlans/", &query).await? {
            return Ok((existing, false));
        }
        Ok((self.create_resource("/ipam/vlans/", vlan).await?, true))
    }

    // --- Organization ---

    pub async fn get_status_by_name(&self, name: &str) -> Result<Option<NbStatus>> {
        self.find_one("/extras/statuses/", &[("name", name.to_string())]).await
    }

    pub async fn list_statuses(&self) -> Result<Vec<NbStatus>> {
        self.list_paginated("/extras/statuses/", &[("limit", "1000".to_string())])
            .await
    }

    pub async fn create_status(&self, name: &str, color: &str, content_types: Vec<String>) -> Result<NbStatus> {
        self.create_resource(
            "/extras/statuses/",
            &NamedCreate { name, description: "", content_types, color: Some(color) },
        )
        .await
    }

    /// Allow `content_type` ("app_label.model") on a status
    pub async fn add_status_content_type(&self, status: &NbStatus, content_type: &str) -> Result<bool> {
        self.add_content_type(&format!("/extras/statuses/{}/", status.id), &status.content_types, content_type)
            .await
    }

    pub async fn list_location_types(&self) -> Result<Vec<NbLocationType>> {
        self.list_paginated("/dcim/location-types/", &[("limit", "1000".to_string())])
            .await
    }

    pub async fn get_location_type_by_name(&self, name: &str) -> Result<Option<NbLocationType>> {
        self.find_one("/dcim/location-types/", &[("name", name.to_string())])
            .await
    }

    pub async fn get_or_create_location_type(&self, lt: &LocationTypeCreate) -> Result<(NbLocationType, bool)> {
        if let Some(existing) = self.get_location_type_by_name(&lt.name).await? {
            return Ok((existing, false));
        }
        Ok((self.create_resource("/dcim/location-types/", lt).await?, true))
    }

    /// Allow `content_type` on a location type; returns whether it was added
    pub async fn add_location_type_content_type(&self, lt: &NbLocationType, content_type: &str) -> Result<bool> {
        self.add_content_type(&format!("/dcim/location-types/{}/", lt.id), &lt.content_types, content_type)
            .await
    }

    pub async fn list_locations(&self) -> Result<Vec<NbLocation>> {
        self.list_paginated(
            "/dcim/locations/",
            &[("depth", "1".to_string()), ("limit", "1000".to_string())],
        )
        .await
    }

    pub async fn get_or_create_location(&self, loc: &LocationCreate) -> Result<(NbLocation, bool)> {
        let mut query = vec![("name", loc.name.clone()), ("location_type", loc.location_type.clone())];
        if let Some(parent) = &loc.parent {
            query.push(("parent", parent.clone()));
        }
        if let Some(existing) = self.find_one::<NbLocation>("/dcim/locations/", &query).await? {
            return Ok((existing, false));
        }
        Ok((self.create_resource("/dcim/locations/", loc).await?, true))
    }

    pub async fn update_location(&self, id: &str, patch: &serde_json::Value) -> Result<NbLocation> {
        self.patch_resource(&format!("/dcim/locations/{}/", id), patch).await
    }

    pub async fn get_or_create_tag(&self, name: &str, color: &str, content_types: Vec<String>) -> Result<(NbNamed, bool)> {
        if let Some(existing) = self.find_one::<NbNamed>("/extras/tags/", &[("name", name.to_string())]).await? {
            return Ok((existing, false));
        }
        let created = self
            .create_resource(
                "/extras/tags/",
                &NamedCreate { name, description: "", content_types, color: Some(color) },
            )
            .await?;
        Ok((created, true))
    }

    pub async fn get_or_create_role(&self, name: &str, color: &str, content_types: Vec<String>) -> Result<(NbNamed, bool)> {
        if let Some(existing) = self.find_one::<NbNamed>("/extras/roles/", &[("name", name.to_string())]).await? {
            return Ok((existing, false));
        }
        let created = self
            .create_resource(
                "/extras/roles/",
                &NamedCreate { name, description: "", content_types, color: Some(color) },
            )
            .await?;
        Ok((created, true))
    }

    pub async fn get_platform(&self, id: &str) -> Result<NbPlatform> {
        self.get_resource(&format!("/dcim/platforms/{}/", id), &[]).await
    }

    pub async fn get_or_create_platform(&self, platform: &PlatformCreate) -> Result<(NbPlatform, bool)> {
        if let Some(existing) = self
            .find_one::<NbPlatform>("/dcim/platforms/", &[("name", platform.name.clone())])
            .await?
        {
            return Ok((existing, false));
        }
        Ok((self.create_resource("/dcim/platforms/", platform).await?, true))
    }

    /// Look up a content type by its app label and lowercase model name
    pub async fn get_content_type(&self, app_label: &str, model: &str) -> Result<Option<NbContentType>> {
        self.find_one(
            "/extras/content-types/",
            &[("app_label", app_label.to_string()), ("model", model.to_lowercase())],
        )
        .await
    }

    // --- Extensibility ---

    pub async fn get_or_create_custom_field(&self, field: &CustomFieldCreate) -> Result<(NbCustomField, bool)> {
        if let Some(existing) = self
            .find_one::<NbCustomField>("/extras/custom-fields/", &[("key", field.key.clone())])
            .await?
        {
            return Ok((existing, false));
        }
        Ok((self.create_resource("/extras/custom-fields/", field).await?, true))
    }

    pub async fn add_custom_field_content_type(&self, field: &NbCustomField, content_type: &str) -> Result<bool> {
        self.add_content_type(&format!("/extras/custom-fields/{}/", field.id), &field.content_types, content_type)
            .await
    }

    pub async fn get_or_create_custom_field_choice(
        &self,
        field_id: &str,
        value: &str,
        weight: i32,
    ) -> Result<(NbCustomFieldChoice, bool)> {
        let query = [("custom_field", field_id.to_string()), ("value", value.to_string())];
        if let Some(existing) = self
            .find_one::<NbCustomFieldChoice>("/extras/custom-field-choices/", &query)
            .await?
        {
            return Ok((existing, false));
        }
        let created = self
            .create_resource(
                "/extras/custom-field-choices/",
                &CustomFieldChoiceCreate { custom_field: field_id, value, weight },
            )
            .await?;
        Ok((created, true))
    }

    async fn add_content_type(&self, endpoint: &str, current: &[String], content_type: &str) -> Result<bool> {
        if current.iter().any(|ct| ct == content_type) {
            return Ok(false);
        }
        let mut content_types = current.to_vec();
        content_types.push(content_type.to_string());
        let _: serde_json::Value = self
            .patch_resource(endpoint, &ContentTypesPatch { content_types })
            .await?;
        Ok(true)
    }

    // --- Secrets ---

    pub async fn list_secrets_group_associations(&self, group_id: &str) -> Result<Vec<NbSecretsGroupAssociation>> {
        self.list_paginated(
            "/extras/secrets-groups-associations/",
            &[("secrets_group", group_id.to_string()), ("depth", "1".to_string())],
        )
        .await
    }

    pub async fn get_secret(&self, id: &str) -> Result<NbSecret> {
        self.get_resource(&format!("/extras/secrets/{}/", id), &[]).await
    }

    // --- Golden Config ---

    /// Latest intended configuration produced by the Golden Config app
    pub async fn get_intended_config(&self, device_id: &str) -> Result<Option<String>> {
        let record: Option<NbGoldenConfig> = self
            .find_one(
                "/plugins/golden-config/golden-config/",
                &[("device_id", device_id.to_string())],
            )
            .await?;
        Ok(record
            .map(|r| r.intended_config)
            .filter(|cfg| !cfg.trim().is_empty()))
    }
}
