//! Orchestrator over a temp directory with an engine that is never reached.

use std::sync::Arc;

use appgrid_jobs::JobScheduler;
use appgrid_ops::{DirManifestSource, DockerCli, ManifestStore, Orchestrator};
use appgrid_state::Registry;
use tempfile::TempDir;
use tokio::sync::watch;

use crate::service::Dispatcher;

pub(crate) struct Fixture {
    pub dir: TempDir,
    pub orchestrator: Orchestrator,
    _shutdown: watch::Sender<bool>,
}

impl Fixture {
    /// Must be called inside a tokio runtime.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(Registry::open(dir.path().join("appgrid.db")).unwrap());
        let (tx, rx) = watch::channel(false);
        let jobs = JobScheduler::new(rx);
        jobs.spawn();
        let orchestrator = Orchestrator::new(
            registry,
            jobs,
            Arc::new(DockerCli::new(dir.path().join("no-docker"))),
            Arc::new(DirManifestSource::new(dir.path().join("mirror"))),
            ManifestStore::new(dir.path().join("manifests")),
            dir.path().join("exports"),
        );
        Self {
            dir,
            orchestrator,
            _shutdown: tx,
        }
    }

    pub fn dispatcher(&self) -> Dispatcher {
        crate::dispatcher(self.orchestrator.clone())
    }
}
