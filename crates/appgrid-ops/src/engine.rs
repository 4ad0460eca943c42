//! Container engine collaborator.
//!
//! Operations are blocking; they are only ever called from job threads or
//! from `spawn_blocking`.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use appgrid_state::{EnvVar, NetworkAttachment, PortMapping};
use thiserror::Error;
use tracing::debug;

use crate::network::Subnet;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("could not run {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("unexpected output from `{command}`: {output:?}")]
    UnexpectedOutput { command: String, output: String },
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Everything needed to create one instance's container.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub args: Vec<String>,
    pub env: Vec<EnvVar>,
    pub ports: Vec<PortMapping>,
    /// `(source, target)` pairs; sources are engine volume names or host paths.
    pub mounts: Vec<(String, String)>,
    pub networks: Vec<NetworkAttachment>,
    /// Leave `networks` for the caller to connect once the container runs.
    pub deferred_networks: bool,
}

pub trait ContainerEngine: Send + Sync {
    fn pull_image(&self, image: &str) -> EngineResult<()>;
    /// Size of a local image in bytes.
    fn image_size(&self, image: &str) -> EngineResult<u64>;
    fn remove_image(&self, image: &str) -> EngineResult<()>;
    fn save_image(&self, image: &str, dest: &Path) -> EngineResult<()>;
    fn load_image(&self, src: &Path) -> EngineResult<()>;
    /// Create the network if it does not exist yet.
    fn ensure_network(&self, network: &str) -> EngineResult<()>;
    fn create_container(&self, spec: &ContainerSpec) -> EngineResult<()>;
    fn connect_network(&self, container: &str, network: &NetworkAttachment) -> EngineResult<()>;
    fn start_container(&self, name: &str) -> EngineResult<()>;
    fn stop_container(&self, name: &str) -> EngineResult<()>;
    fn remove_container(&self, name: &str) -> EngineResult<()>;
    fn remove_volume(&self, name: &str) -> EngineResult<()>;
    fn is_running(&self, name: &str) -> EngineResult<bool>;
    /// First IPv4 subnet configured on the network, if any.
    fn network_subnet(&self, network: &str) -> EngineResult<Option<Subnet>>;
    /// Everything the container wrote to stdout and stderr so far.
    fn container_logs(&self, name: &str) -> EngineResult<String>;
}

/// Drives a docker-compatible CLI.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: PathBuf,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl DockerCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Run a command, failing on a non-zero exit.
    fn output<S: AsRef<str>>(&self, args: &[S]) -> EngineResult<Output> {
        let command = std::iter::once(self.binary.display().to_string())
            .chain(args.iter().map(|a| a.as_ref().to_string()))
            .collect::<Vec<_>>()
            .join(" ");
        debug!(%command, "engine command");

        let output = Command::new(&self.binary)
            .args(args.iter().map(|a| a.as_ref()))
            .output()
            .map_err(|source| EngineError::Spawn {
                binary: self.binary.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(EngineError::CommandFailed {
                command,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }

    /// Trimmed stdout of a successful command.
    fn run<S: AsRef<str>>(&self, args: &[S]) -> EngineResult<String> {
        let output = self.output(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// `docker create` arguments for a spec, image and command last.
pub fn create_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args = vec![
        "create".to_string(),
        "--name".to_string(),
        spec.name.clone(),
        "--hostname".to_string(),
        spec.name.clone(),
    ];
    for var in &spec.env {
        args.push("--env".to_string());
        args.push(format!("{}={}", var.name, var.value));
    }
    for port in &spec.ports {
        args.push("--publish".to_string());
        args.push(port.to_publish_arg());
    }
    for (source, target) in &spec.mounts {
        args.push("--volume".to_string());
        args.push(format!("{source}:{target}"));
    }
    if let (false, Some(first)) = (spec.deferred_networks, spec.networks.first()) {
        args.push("--network".to_string());
        args.push(first.network.clone());
        if !first.ip_address.is_empty() {
            args.push("--ip".to_string());
            args.push(first.ip_address.clone());
        }
    }
    args.push(spec.image.clone());
    args.extend(spec.args.iter().cloned());
    args
}

impl ContainerEngine for DockerCli {
    fn pull_image(&self, image: &str) -> EngineResult<()> {
        self.run(&["pull", image]).map(drop)
    }

    fn image_size(&self, image: &str) -> EngineResult<u64> {
        let output = self.run(&["image", "inspect", "--format", "{{.Size}}", image])?;
        output.parse().map_err(|_| EngineError::UnexpectedOutput {
            command: format!("image inspect {image}"),
            output,
        })
    }

    fn remove_image(&self, image: &str) -> EngineResult<()> {
        self.run(&["rmi", "-f", image]).map(drop)
    }

    fn save_image(&self, image: &str, dest: &Path) -> EngineResult<()> {
        let dest = dest.display().to_string();
        self.run(&["save", "--output", dest.as_str(), image]).map(drop)
    }

    fn load_image(&self, src: &Path) -> EngineResult<()> {
        let src = src.display().to_string();
        self.run(&["load", "--input", src.as_str()]).map(drop)
    }

    fn ensure_network(&self, network: &str) -> EngineResult<()> {
        if self.run(&["network", "inspect", network]).is_ok() {
            return Ok(());
        }
        self.run(&["network", "create", network]).map(drop)
    }

    fn create_container(&self, spec: &ContainerSpec) -> EngineResult<()> {
        self.run(&create_args(spec))?;
        if !spec.deferred_networks {
            for network in spec.networks.iter().skip(1) {
                self.connect_network(&spec.name, network)?;
            }
        }
        Ok(())
    }

    fn connect_network(&self, container: &str, network: &NetworkAttachment) -> EngineResult<()> {
        let mut args = vec!["network", "connect"];
        if !network.ip_address.is_empty() {
            args.extend(["--ip", network.ip_address.as_str()]);
        }
        args.extend([network.network.as_str(), container]);
        self.run(&args).map(drop)
    }

    fn start_container(&self, name: &str) -> EngineResult<()> {
        self.run(&["start", name]).map(drop)
    }

    fn stop_container(&self, name: &str) -> EngineResult<()> {
        self.run(&["stop", name]).map(drop)
    }

    fn remove_container(&self, name: &str) -> EngineResult<()> {
        self.run(&["rm", "-f", name]).map(drop)
    }

    fn remove_volume(&self, name: &str) -> EngineResult<()> {
        self.run(&["volume", "rm", "-f", name]).map(drop)
    }

    fn is_running(&self, name: &str) -> EngineResult<bool> {
        let output = self.run(&["inspect", "--format", "{{.State.Running}}", name])?;
        Ok(output == "true")
    }

    fn network_subnet(&self, network: &str) -> EngineResult<Option<Subnet>> {
        let output = self.run(&[
            "network",
            "inspect",
            "--format",
            "{{range .IPAM.Config}}{{.Subnet}} {{end}}",
            network,
        ])?;
        Ok(output.split_whitespace().find_map(Subnet::parse))
    }

    fn container_logs(&self, name: &str) -> EngineResult<String> {
        let output = self.output(&["logs", name])?;
        let mut logs = String::from_utf8_lossy(&output.stdout).into_owned();
        logs.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(logs)
    }
}
