//! App manifests: parsing, fetching from a marketplace mirror, and the
//! local copies kept for installed apps.

use std::path::{Path, PathBuf};

use appgrid_core::AppKey;
use appgrid_state::{EnvVar, PortMapping, StartupOption};
use serde::Deserialize;
use thiserror::Error;

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest is not valid JSON: {0}")]
    Parse(String),

    #[error("invalid manifest: {0}")]
    Invalid(String),

    #[error("no manifest for {0}")]
    NotFound(AppKey),

    #[error("manifest i/o on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type ManifestResult<T> = Result<T, ManifestError>;

/// Where a volume's data lives on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeSource {
    /// Engine-managed volume, named per instance.
    Named(String),
    /// Host path mounted as is; never removed by the daemon.
    Bind(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    pub source: VolumeSource,
    pub target: String,
}

/// Validated app manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct AppManifest {
    pub key: AppKey,
    pub title: String,
    pub category: String,
    pub image: String,
    pub multi_instance: bool,
    pub args: Vec<String>,
    pub volumes: Vec<VolumeMount>,
    pub networks: Vec<String>,
    pub env: Vec<EnvVar>,
    pub ports: Vec<PortMapping>,
    pub startup_options: Vec<StartupOption>,
}

/// Manifest as authored: `"KEY=value"`, `"8080:80/udp"`, `"data:/var/lib"`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawManifest {
    app: String,
    version: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    category: String,
    image: String,
    #[serde(default)]
    multi_instance: bool,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    volumes: Vec<String>,
    #[serde(default)]
    networks: Vec<String>,
    #[serde(default)]
    env: Vec<String>,
    #[serde(default)]
    ports: Vec<String>,
    #[serde(default)]
    startup_options: Vec<StartupOption>,
}

impl AppManifest {
    pub fn parse(bytes: &[u8]) -> ManifestResult<Self> {
        let raw: RawManifest =
            serde_json::from_slice(bytes).map_err(|e| ManifestError::Parse(e.to_string()))?;

        let key = AppKey::new(raw.app.clone(), raw.version.clone());
        if !key.is_valid() {
            return Err(ManifestError::Invalid(format!(
                "invalid app key {} ({})",
                raw.app, raw.version
            )));
        }
        if raw.image.trim().is_empty() {
            return Err(ManifestError::Invalid("image must not be empty".into()));
        }

        Ok(Self {
            key,
            title: raw.title,
            category: raw.category,
            image: raw.image,
            multi_instance: raw.multi_instance,
            args: raw.args,
            volumes: raw
                .volumes
                .iter()
                .map(|v| parse_volume(v))
                .collect::<ManifestResult<_>>()?,
            networks: raw.networks,
            env: raw
                .env
                .iter()
                .map(|e| parse_env(e))
                .collect::<ManifestResult<_>>()?,
            ports: raw
                .ports
                .iter()
                .map(|p| parse_port(p))
                .collect::<ManifestResult<_>>()?,
            startup_options: raw.startup_options,
        })
    }

    /// Image reference with the app version as tag unless one is given.
    pub fn image_ref(&self) -> String {
        let last = self.image.rsplit('/').next().unwrap_or(&self.image);
        if last.contains(':') || last.contains('@') {
            self.image.clone()
        } else {
            format!("{}:{}", self.image, self.key.version())
        }
    }

    pub fn named_volumes(&self) -> impl Iterator<Item = &str> {
        self.volumes.iter().filter_map(|v| match &v.source {
            VolumeSource::Named(name) => Some(name.as_str()),
            VolumeSource::Bind(_) => None,
        })
    }
}

fn parse_env(s: &str) -> ManifestResult<EnvVar> {
    match s.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok(EnvVar {
            name: name.to_string(),
            value: value.to_string(),
        }),
        _ => Err(ManifestError::Invalid(format!("bad env entry {s:?}"))),
    }
}

fn parse_port(s: &str) -> ManifestResult<PortMapping> {
    let bad = || ManifestError::Invalid(format!("bad port mapping {s:?}"));
    let (ports, protocol) = match s.split_once('/') {
        Some((ports, proto @ ("tcp" | "udp"))) => (ports, proto),
        Some(_) => return Err(bad()),
        None => (s, "tcp"),
    };
    let (host, container) = ports.split_once(':').ok_or_else(bad)?;
    Ok(PortMapping {
        host_port: host.parse().map_err(|_| bad())?,
        container_port: container.parse().map_err(|_| bad())?,
        protocol: protocol.to_string(),
    })
}

fn parse_volume(s: &str) -> ManifestResult<VolumeMount> {
    let bad = || ManifestError::Invalid(format!("bad volume {s:?}"));
    let (source, target) = s.split_once(':').ok_or_else(bad)?;
    if source.is_empty() || !target.starts_with('/') {
        return Err(bad());
    }
    let source = if source.starts_with('/') {
        VolumeSource::Bind(PathBuf::from(source))
    } else if source
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.')
    {
        VolumeSource::Named(source.to_string())
    } else {
        return Err(bad());
    };
    Ok(VolumeMount {
        source,
        target: target.to_string(),
    })
}

// ── Sources ────────────────────────────────────────────────────────

/// Somewhere manifests can be fetched from by app key.
pub trait ManifestSource: Send + Sync {
    fn fetch(&self, key: &AppKey) -> ManifestResult<Vec<u8>>;
}

/// A local marketplace mirror laid out as `<root>/<name>/<version>/manifest.json`.
#[derive(Debug, Clone)]
pub struct DirManifestSource {
    root: PathBuf,
}

impl DirManifestSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ManifestSource for DirManifestSource {
    fn fetch(&self, key: &AppKey) -> ManifestResult<Vec<u8>> {
        read_manifest(&manifest_path(&self.root, key), key)
    }
}

fn manifest_path(root: &Path, key: &AppKey) -> PathBuf {
    root.join(key.name()).join(key.version()).join(MANIFEST_FILE)
}

fn read_manifest(path: &Path, key: &AppKey) -> ManifestResult<Vec<u8>> {
    std::fs::read(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ManifestError::NotFound(key.clone())
        } else {
            ManifestError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

// ── Local copies ───────────────────────────────────────────────────

/// Manifests of installed apps under `<root>/<name>/<version>/manifest.json`.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    root: PathBuf,
}

impl ManifestStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self, key: &AppKey) -> PathBuf {
        manifest_path(&self.root, key)
    }

    pub fn exists(&self, key: &AppKey) -> bool {
        self.path(key).is_file()
    }

    pub fn save(&self, key: &AppKey, bytes: &[u8]) -> ManifestResult<()> {
        let path = self.path(key);
        let io_err = |source| ManifestError::Io {
            path: path.clone(),
            source,
        };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(io_err)?;
        }
        std::fs::write(&path, bytes).map_err(io_err)
    }

    pub fn load_bytes(&self, key: &AppKey) -> ManifestResult<Vec<u8>> {
        read_manifest(&self.path(key), key)
    }

    pub fn load(&self, key: &AppKey) -> ManifestResult<AppManifest> {
        AppManifest::parse(&self.load_bytes(key)?)
    }

    /// Remove the version directory, and the app directory once empty.
    pub fn remove(&self, key: &AppKey) -> ManifestResult<()> {
        let version_dir = self.root.join(key.name()).join(key.version());
        match std::fs::remove_dir_all(&version_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(ManifestError::Io {
                    path: version_dir,
                    source,
                });
            }
        }
        // Fails harmlessly while other versions remain.
        let _ = std::fs::remove_dir(self.root.join(key.name()));
        Ok(())
    }
}
