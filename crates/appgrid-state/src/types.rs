//! Registry entry types.
//!
//! Each entry is persisted as one JSON row, key included, so a row can be
//! rebuilt without looking at the table key.

use serde::{Deserialize, Serialize};

use appgrid_core::{AppKey, AppStatus, InstanceId, InstanceStatus};

/// Network every instance is attached to unless told otherwise.
pub const DEFAULT_NETWORK: &str = "appgrid";

// ── Apps ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppEntry {
    pub key: AppKey,
    pub data: AppData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppData {
    pub status: AppStatus,
    pub desired: AppStatus,
    /// Free-form manifest category; `system` apps resist uninstall.
    pub category: String,
    /// Image size in bytes, recorded once the image is on disk.
    pub installed_size: u64,
    pub license_key: String,
    pub download_token: String,
}

impl AppEntry {
    pub fn new(key: AppKey, status: AppStatus, desired: AppStatus) -> Self {
        Self {
            key,
            data: AppData {
                status,
                desired,
                ..AppData::default()
            },
        }
    }

    pub fn is_system(&self) -> bool {
        self.data.category.split(',').any(|c| c.trim() == "system")
    }
}

// ── Instances ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceEntry {
    pub id: InstanceId,
    pub data: InstanceData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceData {
    pub app: String,
    pub version: String,
    pub description: String,
    pub status: InstanceStatus,
    pub desired: InstanceStatus,
    pub networks: Vec<NetworkAttachment>,
    pub flags: u32,
    pub startup_options: Vec<StartupOption>,
    pub environment: Vec<EnvVar>,
    pub ports: Vec<PortMapping>,
}

impl InstanceData {
    pub fn app_key(&self) -> AppKey {
        AppKey::new(self.app.clone(), self.version.clone())
    }
}

impl InstanceEntry {
    /// Container name used by the engine for this instance.
    pub fn container_name(&self) -> String {
        container_name(self.id)
    }
}

pub fn container_name(id: InstanceId) -> String {
    format!("appgrid-{}", id.hex())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAttachment {
    pub network: String,
    /// Empty when the engine assigns the address.
    #[serde(default)]
    pub ip_address: String,
}

impl NetworkAttachment {
    pub fn new(network: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            ip_address: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StartupOption {
    /// Connect networks only after the container has started.
    InitNetworkAfterStart,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub host_port: u16,
    pub container_port: u16,
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

fn default_protocol() -> String {
    "tcp".to_string()
}

impl PortMapping {
    /// Engine-style `host:container/proto` form.
    pub fn to_publish_arg(&self) -> String {
        format!("{}:{}/{}", self.host_port, self.container_port, self.protocol)
    }
}
