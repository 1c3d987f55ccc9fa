use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// --- Nautobot API types ---

#[derive(Debug, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

/// Related object; `depth=0` responses carry only the id and url
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NestedRef {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub display: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl NestedRef {
    /// Best human-readable label for log lines
    pub fn label(&self) -> &str {
        self.display
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceValue {
    pub value: String,
    #[serde(default)]
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NbIpRef {
    pub id: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub display: Option<String>,
}

impl NbIpRef {
    /// Host part of the CIDR address ("172.20.20.11/24" -> "172.20.20.11")
    pub fn host(&self) -> Option<String> {
        self.address
            .as_deref()
            .or(self.display.as_deref())
            .map(crate::utils::strip_prefix_len)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NbDevice {
    pub id: String,
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<NestedRef>,
    #[serde(default)]
    pub platform: Option<NestedRef>,
    #[serde(default)]
    pub status: Option<NestedRef>,
    #[serde(default)]
    pub location: Option<NestedRef>,
    #[serde(default)]
    pub device_type: Option<NestedRef>,
    #[serde(default)]
    pub serial: String,
    #[serde(default)]
    pub primary_ip4: Option<NbIpRef>,
    #[serde(default)]
    pub primary_ip6: Option<NbIpRef>,
    #[serde(default)]
    pub secrets_group: Option<NestedRef>,
    #[serde(default)]
    pub config_context: Option<serde_json::Value>,
    #[serde(default)]
    pub custom_fields: Option<HashMap<String, serde_json::Value>>,
}

impl NbDevice {
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.id.clone())
    }

    /// Management address: primary IPv4, falling back to primary IPv6
    pub fn primary_host(&self) -> Option<String> {
        self.primary_ip4
            .as_ref()
            .and_then(|ip| ip.host())
            .or_else(|| self.primary_ip6.as_ref().and_then(|ip| ip.host()))
    }

    pub fn primary_ipv4_host(&self) -> Option<String> {
        self.primary_ip4.as_ref().and_then(|ip| ip.host())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NbPlatform {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub napalm_driver: String,
    #[serde(default)]
    pub network_driver: String,
    /// JSON object, or a JSON-encoded string on older installs
    #[serde(default)]
    pub napalm_args: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NbInterface {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub device: Option<NestedRef>,
    #[serde(rename = "type", default)]
    pub iface_type: Option<ChoiceValue>,
    #[serde(default)]
    pub mode: Option<ChoiceValue>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub mtu: Option<u32>,
    #[serde(default)]
    pub mac_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NbIpAddress {
    pub id: String,
    pub address: String,
    #[serde(default)]
    pub status: Option<NestedRef>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NbStatus {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub content_types: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NbLocationType {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub parent: Option<NestedRef>,
    #[serde(default)]
    pub nestable: bool,
    #[serde(default)]
    pub content_types: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NbLocation {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub location_type: Option<NestedRef>,
    #[serde(default)]
    pub parent: Option<NestedRef>,
    #[serde(default)]
    pub status: Option<NestedRef>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NbNamed {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NbDeviceType {
    pub id: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NbPrefix {
    pub id: String,
    pub prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NbVlan {
    pub id: String,
    pub vid: u16,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NbContentType {
    pub id: i64,
    pub app_label: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NbCustomField {
    pub id: String,
    pub key: String,
    #[serde(default)]
    pub content_types: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NbCustomFieldChoice {
    pub id: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NbSecretsGroupAssociation {
    pub id: String,
    pub secret: NestedRef,
    pub access_type: String,
    pub secret_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NbSecret {
    pub id: String,
    pub name: String,
    pub provider: String,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NbGoldenConfig {
    pub id: String,
    #[serde(default)]
    pub intended_config: String,
    #[serde(default)]
    pub intended_last_success_date: Option<String>,
}

// --- Create / update request types ---

#[derive(Debug, Serialize)]
pub(crate) struct NamedCreate<'a> {
    pub name: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub description: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub content_types: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct LocationTypeCreate {
    pub name: String,
    pub description: String,
    pub nestable: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub content_types: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct LocationCreate {
    pub name: String,
    pub location_type: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct PlatformCreate {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub napalm_driver: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub network_driver: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct DeviceTypeCreate<'a> {
    pub manufacturer: &'a str,
    pub model: &'a str,
}

#[derive(Debug, Serialize)]
pub struct DeviceCreate {
    pub name: String,
    pub device_type: String,
    pub role: String,
    pub location: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

/// Partial device update; unset fields are left untouched
#[derive(Debug, Default, Serialize)]
pub struct DevicePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_ip4: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InterfaceCreate {
    pub device: String,
    pub name: String,
    #[serde(rename = "type")]
    pub iface_type: String,
    pub status: String,
}

/// Partial interface update; unset fields are left untouched
#[derive(Debug, Default, Serialize)]
pub struct InterfacePatch {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub iface_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct IpAddressCreate {
    pub address: String,
    pub status: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PrefixCreate {
    pub prefix: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct VlanCreate {
    pub vid: u16,
    pub name: String,
    pub description: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CustomFieldCreate {
    pub key: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub required: bool,
    pub description: String,
    pub weight: i32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub validation_regex: String,
    pub content_types: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CustomFieldChoiceCreate<'a> {
    pub custom_field: &'a str,
    pub value: &'a str,
    pub weight: i32,
}

#[derive(Debug, Serialize)]
pub(crate) struct IpToInterfaceCreate<'a> {
    pub ip_address: &'a str,
    pub interface: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct ContentTypesPatch {
    pub content_types: Vec<String>,
}
