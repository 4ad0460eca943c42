//! appgridd.toml configuration parser.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Registry file, manifest copies and other daemon state live here.
    pub data_dir: PathBuf,
    pub socket_path: PathBuf,
    /// Local marketplace mirror laid out as `<name>/<version>/manifest.json`.
    pub manifest_mirror: PathBuf,
    pub export_dir: PathBuf,
    pub engine: EngineConfig,
    /// Periodic registry checkpoint; 0 disables it.
    pub persist_interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub binary: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        DaemonConfig {
            data_dir: PathBuf::from("/var/lib/appgrid"),
            socket_path: PathBuf::from("/run/appgrid/appgrid.sock"),
            manifest_mirror: PathBuf::from("/var/lib/appgrid/mirror"),
            export_dir: PathBuf::from("/var/lib/appgrid/exports"),
            engine: EngineConfig::default(),
            persist_interval_secs: 300,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            binary: "docker".to_string(),
        }
    }
}

impl DaemonConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: DaemonConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Like `from_file`, but a missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::from_file(path)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            anyhow::bail!("data_dir must not be empty");
        }
        if self.socket_path.as_os_str().is_empty() {
            anyhow::bail!("socket_path must not be empty");
        }
        if self.engine.binary.trim().is_empty() {
            anyhow::bail!("engine.binary must not be empty");
        }
        Ok(())
    }

    pub fn registry_path(&self) -> PathBuf {
        self.data_dir.join("appgrid.db")
    }

    pub fn manifests_dir(&self) -> PathBuf {
        self.data_dir.join("manifests")
    }
}
