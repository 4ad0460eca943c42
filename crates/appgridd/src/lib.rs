//! appgridd — the AppGrid host daemon.
//!
//! Assembles the registry, job scheduler, orchestrator and control socket
//! into one process:
//!
//! ```text
//! Unix socket ──► Dispatcher ──► Orchestrator ──► JobScheduler ──► job thread
//!                                     │                              │
//!                                     └────────── Registry ◄─────────┘
//! ```
//!
//! Everything stops when the shutdown `watch` channel flips to `true`. The
//! registry is persisted once more after the last job has finished.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use appgrid_core::DaemonConfig;
use appgrid_jobs::JobScheduler;
use appgrid_ops::{DirManifestSource, DockerCli, ManifestStore, Orchestrator};
use appgrid_state::Registry;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Load the config file (defaults when missing) and apply CLI overrides.
pub fn load_config(
    path: &Path,
    socket: Option<PathBuf>,
    data_dir: Option<PathBuf>,
) -> anyhow::Result<DaemonConfig> {
    let mut config = DaemonConfig::load(path)?;
    if let Some(socket) = socket {
        config.socket_path = socket;
    }
    if let Some(data_dir) = data_dir {
        config.data_dir = data_dir;
    }
    config.validate()?;
    Ok(config)
}

/// Run the daemon until `shutdown` flips to `true`.
pub async fn run(config: DaemonConfig, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
    info!("appgridd starting");
    config.validate()?;
    std::fs::create_dir_all(&config.data_dir)?;

    // ── Registry ───────────────────────────────────────────────

    let registry = Arc::new(Registry::open(config.registry_path())?);
    info!(
        path = ?registry.path(),
        user_version = registry.user_version(),
        "registry opened"
    );

    // ── Orchestration ──────────────────────────────────────────

    let jobs = JobScheduler::new(shutdown.clone());
    let orchestrator = Orchestrator::new(
        registry.clone(),
        jobs.clone(),
        Arc::new(DockerCli::new(&config.engine.binary)),
        Arc::new(DirManifestSource::new(&config.manifest_mirror)),
        ManifestStore::new(config.manifests_dir()),
        &config.export_dir,
    );

    let report = orchestrator.reconcile()?;
    if !report.is_empty() {
        warn!(
            apps = ?report.orphaned_apps,
            instances = ?report.orphaned_instances,
            "orphaned registry entries"
        );
    }

    let scheduler_handle = jobs.spawn();
    let restarts = orchestrator.start_desired_instances();
    if !restarts.is_empty() {
        info!(count = restarts.len(), "restarting instances");
    }
    let checkpoint_handle = (config.persist_interval_secs > 0).then(|| {
        tokio::spawn(checkpoint(
            registry.clone(),
            Duration::from_secs(config.persist_interval_secs),
            shutdown.clone(),
        ))
    });

    // ── Control socket ─────────────────────────────────────────

    let listener = appgrid_api::server::bind(&config.socket_path)?;
    let dispatcher = Arc::new(appgrid_api::dispatcher(orchestrator));
    appgrid_api::server::serve(listener, dispatcher, shutdown).await;

    // ── Shutdown ───────────────────────────────────────────────

    let _ = scheduler_handle.await;
    if let Some(handle) = checkpoint_handle {
        let _ = handle.await;
    }
    registry.persist()?;
    info!("registry persisted");

    match std::fs::remove_file(&config.socket_path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(error = %e, "could not remove control socket"),
    }

    info!("appgridd stopped");
    Ok(())
}

/// Persist the registry every `interval` until shutdown.
async fn checkpoint(
    registry: Arc<Registry>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                let registry = registry.clone();
                match tokio::task::spawn_blocking(move || registry.persist()).await {
                    Ok(Ok(())) => debug!("registry checkpoint written"),
                    Ok(Err(e)) => warn!(error = %e, "registry checkpoint failed"),
                    Err(e) => warn!(error = %e, "registry checkpoint task failed"),
                }
            }
        }
    }
}
