//! Test fixtures: an in-memory container engine and a ready-to-use
//! orchestrator over a temp directory.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use appgrid_core::{AppKey, InstanceId, JobId};
use appgrid_jobs::{JobResult, JobScheduler};
use appgrid_state::{NetworkAttachment, Registry};
use tempfile::TempDir;
use tokio::sync::watch;

use crate::engine::{ContainerEngine, ContainerSpec, EngineError, EngineResult};
use crate::manifest::{DirManifestSource, MANIFEST_FILE, ManifestStore};
use crate::network::Subnet;
use crate::orchestrator::Orchestrator;

pub(crate) const IMAGE_SIZE: u64 = 4096;

/// Manifest of a multi-instance app with one of everything.
pub(crate) fn manifest_json(app: &str, version: &str) -> String {
    serde_json::json!({
        "app": app,
        "version": version,
        "title": "Web",
        "category": "tools",
        "image": format!("registry.example.com/{app}"),
        "multiInstance": true,
        "volumes": ["data:/var/lib/web", "/etc/hosts:/etc/hosts"],
        "networks": ["frontend"],
        "env": ["MODE=prod", "EMPTY="],
        "ports": ["8080:80", "5353:53/udp"],
        "startupOptions": ["init-network-after-start"],
    })
    .to_string()
}

// ── FakeEngine ─────────────────────────────────────────────────────

#[derive(Default)]
struct EngineState {
    images: BTreeSet<String>,
    /// name → (spec, running)
    containers: BTreeMap<String, (ContainerSpec, bool)>,
    networks: BTreeSet<String>,
    removed_volumes: Vec<String>,
    calls: Vec<String>,
    /// network → IPv4 subnet
    subnets: BTreeMap<String, String>,
    fail_pulls: u32,
    fail_creates: u32,
}

#[derive(Default)]
pub(crate) struct FakeEngine {
    state: Mutex<EngineState>,
}

fn failed(command: String, stderr: &str) -> EngineError {
    EngineError::CommandFailed {
        command,
        stderr: stderr.to_string(),
    }
}

impl FakeEngine {
    fn with_state<T>(&self, call: String, f: impl FnOnce(&mut EngineState, String) -> T) -> T {
        let mut state = self.state.lock().expect("engine lock");
        state.calls.push(call.clone());
        f(&mut state, call)
    }

    pub(crate) fn fail_pulls(&self, n: u32) {
        self.state.lock().unwrap().fail_pulls = n;
    }

    /// Refuse the next `n` container creations.
    pub(crate) fn fail_creates(&self, n: u32) {
        self.state.lock().unwrap().fail_creates = n;
    }

    pub(crate) fn set_subnet(&self, network: &str, cidr: &str) {
        self.state
            .lock()
            .unwrap()
            .subnets
            .insert(network.to_string(), cidr.to_string());
    }

    pub(crate) fn has_image(&self, image: &str) -> bool {
        self.state.lock().unwrap().images.contains(image)
    }

    pub(crate) fn has_network(&self, network: &str) -> bool {
        self.state.lock().unwrap().networks.contains(network)
    }

    pub(crate) fn has_container(&self, name: &str) -> bool {
        self.state.lock().unwrap().containers.contains_key(name)
    }

    pub(crate) fn is_container_running(&self, name: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .containers
            .get(name)
            .is_some_and(|(_, running)| *running)
    }

    /// Spec the container was last created with.
    pub(crate) fn created(&self, name: &str) -> Option<ContainerSpec> {
        self.state
            .lock()
            .unwrap()
            .containers
            .get(name)
            .map(|(spec, _)| spec.clone())
    }

    pub(crate) fn removed_volumes(&self) -> Vec<String> {
        self.state.lock().unwrap().removed_volumes.clone()
    }

    /// Number of recorded calls starting with `prefix`.
    pub(crate) fn calls_matching(&self, prefix: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

impl ContainerEngine for FakeEngine {
    fn pull_image(&self, image: &str) -> EngineResult<()> {
        self.with_state(format!("pull {image}"), |s, call| {
            if s.fail_pulls > 0 {
                s.fail_pulls -= 1;
                return Err(failed(call, "registry unavailable"));
            }
            s.images.insert(image.to_string());
            Ok(())
        })
    }

    fn image_size(&self, image: &str) -> EngineResult<u64> {
        self.with_state(format!("image inspect {image}"), |s, call| {
            if s.images.contains(image) {
                Ok(IMAGE_SIZE)
            } else {
                Err(failed(call, "no such image"))
            }
        })
    }

    fn remove_image(&self, image: &str) -> EngineResult<()> {
        self.with_state(format!("rmi {image}"), |s, _| {
            s.images.remove(image);
            Ok(())
        })
    }

    fn save_image(&self, image: &str, dest: &Path) -> EngineResult<()> {
        self.with_state(format!("save {image}"), |s, call| {
            if !s.images.contains(image) {
                return Err(failed(call, "no such image"));
            }
            std::fs::write(dest, image).map_err(|e| failed(call, &e.to_string()))
        })
    }

    fn load_image(&self, src: &Path) -> EngineResult<()> {
        self.with_state(format!("load {}", src.display()), |s, call| {
            let image = std::fs::read_to_string(src).map_err(|e| failed(call, &e.to_string()))?;
            s.images.insert(image);
            Ok(())
        })
    }

    fn ensure_network(&self, network: &str) -> EngineResult<()> {
        self.with_state(format!("network ensure {network}"), |s, _| {
            s.networks.insert(network.to_string());
            Ok(())
        })
    }

    fn create_container(&self, spec: &ContainerSpec) -> EngineResult<()> {
        self.with_state(format!("create {}", spec.name), |s, call| {
            if s.fail_creates > 0 {
                s.fail_creates -= 1;
                return Err(failed(call, "create refused"));
            }
            if s.containers.contains_key(&spec.name) {
                return Err(failed(call, "name already in use"));
            }
            s.containers.insert(spec.name.clone(), (spec.clone(), false));
            Ok(())
        })
    }

    fn connect_network(&self, container: &str, network: &NetworkAttachment) -> EngineResult<()> {
        self.with_state(
            format!("network connect {} {container}", network.network),
            |s, call| {
                if !s.containers.contains_key(container) {
                    return Err(failed(call, "no such container"));
                }
                s.networks.insert(network.network.clone());
                Ok(())
            },
        )
    }

    fn start_container(&self, name: &str) -> EngineResult<()> {
        self.with_state(format!("start {name}"), |s, call| match s.containers.get_mut(name) {
            Some((_, running)) => {
                *running = true;
                Ok(())
            }
            None => Err(failed(call, "no such container")),
        })
    }

    fn stop_container(&self, name: &str) -> EngineResult<()> {
        self.with_state(format!("stop {name}"), |s, call| match s.containers.get_mut(name) {
            Some((_, running)) => {
                *running = false;
                Ok(())
            }
            None => Err(failed(call, "no such container")),
        })
    }

    fn remove_container(&self, name: &str) -> EngineResult<()> {
        self.with_state(format!("rm {name}"), |s, _| {
            s.containers.remove(name);
            Ok(())
        })
    }

    fn remove_volume(&self, name: &str) -> EngineResult<()> {
        self.with_state(format!("volume rm {name}"), |s, _| {
            s.removed_volumes.push(name.to_string());
            Ok(())
        })
    }

    fn is_running(&self, name: &str) -> EngineResult<bool> {
        let state = self.state.lock().expect("engine lock");
        match state.containers.get(name) {
            Some((_, running)) => Ok(*running),
            None => Err(failed(format!("inspect {name}"), "no such container")),
        }
    }

    fn network_subnet(&self, network: &str) -> EngineResult<Option<Subnet>> {
        self.with_state(format!("network inspect {network}"), |s, _| {
            Ok(s.subnets.get(network).and_then(|cidr| Subnet::parse(cidr)))
        })
    }

    fn container_logs(&self, name: &str) -> EngineResult<String> {
        self.with_state(format!("logs {name}"), |s, call| match s.containers.get(name) {
            Some((spec, running)) => Ok(format!("{} running={running}\n", spec.image)),
            None => Err(failed(call, "no such container")),
        })
    }
}

// ── Harness ────────────────────────────────────────────────────────

/// Orchestrator wired to a [`FakeEngine`], a temp registry and a temp
/// marketplace mirror. Must be built inside a tokio runtime.
pub(crate) struct Harness {
    dir: TempDir,
    mirror: PathBuf,
    reopened: AtomicU32,
    pub registry: Arc<Registry>,
    pub engine: Arc<FakeEngine>,
    pub orchestrator: Orchestrator,
    _shutdown: watch::Sender<bool>,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mirror = dir.path().join("mirror");
        let registry = Arc::new(Registry::open(dir.path().join("appgrid.db")).unwrap());
        let engine = Arc::new(FakeEngine::default());
        engine.set_subnet("frontend", "10.20.0.0/24");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let jobs = JobScheduler::new(shutdown_rx);
        jobs.spawn();

        let orchestrator = Orchestrator::new(
            registry.clone(),
            jobs,
            engine.clone(),
            Arc::new(DirManifestSource::new(&mirror)),
            ManifestStore::new(dir.path().join("manifests")),
            dir.path().join("exports"),
        );
        Self {
            dir,
            mirror,
            reopened: AtomicU32::new(0),
            registry,
            engine,
            orchestrator,
            _shutdown: shutdown_tx,
        }
    }

    /// Put a manifest for `app` `version` into the mirror.
    pub fn publish(&self, app: &str, version: &str) {
        let path = self.mirror.join(app).join(version).join(MANIFEST_FILE);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, manifest_json(app, version)).unwrap();
    }

    pub async fn wait(&self, id: JobId) -> JobResult {
        self.orchestrator.jobs().wait_for(id).await.unwrap()
    }

    pub async fn install(&self, app: &str, version: &str) {
        self.publish(app, version);
        let id = self
            .orchestrator
            .install(AppKey::new(app, version), "")
            .unwrap();
        let result = self.wait(id).await;
        assert!(result.is_success(), "install failed: {result:?}");
    }

    pub async fn create(&self, app: &str, version: &str) -> InstanceId {
        let id = self
            .orchestrator
            .create_instance(AppKey::new(app, version), "test instance")
            .unwrap();
        let result = self.wait(id).await;
        assert!(result.is_success(), "create failed: {result:?}");
        result.message.parse().unwrap()
    }

    /// Open a copy of the registry file as last persisted.
    pub fn reopen(&self) -> Registry {
        let n = self.reopened.fetch_add(1, Ordering::Relaxed);
        let copy = self.dir.path().join(format!("reopened-{n}.db"));
        std::fs::copy(self.registry.path(), &copy).unwrap();
        Registry::open(copy).unwrap()
    }
}
