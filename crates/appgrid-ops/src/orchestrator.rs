//! Orchestrator — turns client requests into jobs that drive the app and
//! instance state machines.
//!
//! Public operations validate their arguments synchronously and return the
//! id of the queued job. The job body runs later on the scheduler's worker
//! thread, records every status change in the registry and persists it.

use std::path::PathBuf;
use std::sync::Arc;

use appgrid_core::{AppKey, AppStatus, InstanceId, InstanceStatus, JobId};
use appgrid_jobs::{Job, JobResult, JobScheduler, Progress};
use appgrid_state::{AppEntry, InstanceEntry, Registry};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::engine::ContainerEngine;
use crate::error::{OpsError, OpsResult};
use crate::instances::volume_name;
use crate::manifest::{ManifestSource, ManifestStore};

/// Shared state handed to every job body.
pub(crate) struct Context {
    pub(crate) registry: Arc<Registry>,
    pub(crate) engine: Arc<dyn ContainerEngine>,
    pub(crate) source: Arc<dyn ManifestSource>,
    pub(crate) manifests: ManifestStore,
    pub(crate) export_dir: PathBuf,
}

#[derive(Clone)]
pub struct Orchestrator {
    pub(crate) ctx: Arc<Context>,
    jobs: JobScheduler,
}

/// Everything `details` reports about one instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceDetails {
    #[serde(flatten)]
    pub instance: InstanceEntry,
    pub container: String,
    pub image: String,
    pub volumes: Vec<String>,
}

/// What startup reconciliation changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub orphaned_apps: Vec<AppKey>,
    pub orphaned_instances: Vec<InstanceId>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.orphaned_apps.is_empty() && self.orphaned_instances.is_empty()
    }
}

/// Build an app key from client input, rejecting invalid names and versions.
pub fn parse_app_key(name: &str, version: &str) -> OpsResult<AppKey> {
    let key = AppKey::new(name, version);
    if key.is_valid() {
        Ok(key)
    } else {
        Err(OpsError::InvalidAppKey(format!("{name} ({version})")))
    }
}

/// Strictly parse an instance id from client input.
pub fn parse_instance_id(s: &str) -> OpsResult<InstanceId> {
    s.parse()
        .map_err(|_| OpsError::InvalidInstanceId(s.to_string()))
}

pub(crate) fn ensure_valid(key: &AppKey) -> OpsResult<()> {
    if key.is_valid() {
        Ok(())
    } else {
        Err(OpsError::InvalidAppKey(key.to_string()))
    }
}

impl Orchestrator {
    pub fn new(
        registry: Arc<Registry>,
        jobs: JobScheduler,
        engine: Arc<dyn ContainerEngine>,
        source: Arc<dyn ManifestSource>,
        manifests: ManifestStore,
        export_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            ctx: Arc::new(Context {
                registry,
                engine,
                source,
                manifests,
                export_dir: export_dir.into(),
            }),
            jobs,
        }
    }

    pub fn jobs(&self) -> &JobScheduler {
        &self.jobs
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.ctx.registry
    }

    /// Queue `body` as a job; its `Ok` message becomes the job result message.
    pub(crate) fn submit<F>(&self, description: String, body: F) -> JobId
    where
        F: FnOnce(&Context, &Progress) -> OpsResult<String> + Send + 'static,
    {
        let ctx = self.ctx.clone();
        self.jobs.submit(Job::new(description, move |progress| {
            match body(ctx.as_ref(), progress) {
                Ok(message) => JobResult::ok_with(message),
                Err(e) => JobResult::failed(e.to_string()),
            }
        }))
    }

    // ── Queries ────────────────────────────────────────────────────

    pub fn list_apps(&self) -> Vec<AppEntry> {
        self.ctx.registry.all_apps()
    }

    /// Every registered version of one app.
    pub fn list_versions(&self, app: &str) -> Vec<AppEntry> {
        self.ctx
            .registry
            .all_apps()
            .into_iter()
            .filter(|entry| entry.key.name() == app)
            .collect()
    }

    /// Instances, optionally narrowed to one app and one of its versions.
    pub fn list_instances(&self, app: Option<&str>, version: Option<&str>) -> Vec<InstanceEntry> {
        match (app, version) {
            (Some(app), Some(version)) => self.ctx.registry.instances_of_version(app, version),
            (Some(app), None) => self.ctx.registry.instances_of(app),
            _ => self.ctx.registry.all_instances(),
        }
    }

    pub fn instance_details(&self, id: InstanceId) -> OpsResult<InstanceDetails> {
        let instance = self
            .ctx
            .registry
            .query_instance(id)
            .ok_or(OpsError::InstanceNotFound(id))?;
        let (image, volumes) = match self.ctx.manifests.load(&instance.data.app_key()) {
            Ok(manifest) => (
                manifest.image_ref(),
                manifest.named_volumes().map(|v| volume_name(id, v)).collect(),
            ),
            Err(e) => {
                debug!(instance = %id, error = %e, "no manifest for instance details");
                (String::new(), Vec::new())
            }
        };
        Ok(InstanceDetails {
            container: instance.container_name(),
            instance,
            image,
            volumes,
        })
    }

    /// Container output of an instance. Blocks on the engine.
    pub fn instance_logs(&self, id: InstanceId) -> OpsResult<String> {
        let instance = self
            .ctx
            .registry
            .query_instance(id)
            .ok_or(OpsError::InstanceNotFound(id))?;
        Ok(self.ctx.engine.container_logs(&instance.container_name())?)
    }

    // ── Startup ────────────────────────────────────────────────────

    /// Queue a start job for every instance that should be running.
    pub fn start_desired_instances(&self) -> Vec<JobId> {
        let mut jobs = Vec::new();
        for instance in self.ctx.registry.all_instances() {
            if instance.data.desired != InstanceStatus::Running
                || !instance.data.status.is_runnable()
            {
                continue;
            }
            match self.start_instance(instance.id) {
                Ok(job) => {
                    info!(instance = %instance.id, %job, "restarting instance");
                    jobs.push(job);
                }
                Err(e) => warn!(instance = %instance.id, error = %e, "could not queue restart"),
            }
        }
        jobs
    }

    /// Mark apps whose manifest copy is gone and instances whose app is
    /// gone as orphaned. Persists only if something changed.
    pub fn reconcile(&self) -> OpsResult<ReconcileReport> {
        let ctx = &self.ctx;
        let mut report = ReconcileReport::default();

        for mut app in ctx.registry.all_apps() {
            if matches!(app.data.status, AppStatus::Orphaned | AppStatus::NotInstalled)
                || ctx.manifests.exists(&app.key)
            {
                continue;
            }
            match ctx.advance_app(&mut app, AppStatus::Orphaned) {
                Ok(()) => report.orphaned_apps.push(app.key),
                Err(e) => warn!(error = %e, "could not orphan app"),
            }
        }

        for mut instance in ctx.registry.all_instances() {
            if instance.data.status == InstanceStatus::Orphaned
                || ctx.registry.has_app(&instance.data.app_key())
            {
                continue;
            }
            match ctx.advance_instance(&mut instance, InstanceStatus::Orphaned) {
                Ok(()) => report.orphaned_instances.push(instance.id),
                Err(e) => warn!(error = %e, "could not orphan instance"),
            }
        }

        if !report.is_empty() {
            ctx.persist()?;
            info!(
                apps = report.orphaned_apps.len(),
                instances = report.orphaned_instances.len(),
                "registry reconciled"
            );
        }
        Ok(report)
    }
}

impl Context {
    /// Record a new app status if the state machine allows it.
    pub(crate) fn advance_app(&self, entry: &mut AppEntry, next: AppStatus) -> OpsResult<()> {
        let current = entry.data.status;
        if !current.can_transition_to(next) {
            return Err(OpsError::IllegalTransition {
                subject: entry.key.to_string(),
                from: current.as_str(),
                to: next.as_str(),
            });
        }
        debug!(app = %entry.key, from = %current, to = %next, "app status");
        entry.data.status = next;
        self.registry.insert_app(entry.clone());
        Ok(())
    }

    /// Record a new instance status if the state machine allows it.
    pub(crate) fn advance_instance(
        &self,
        entry: &mut InstanceEntry,
        next: InstanceStatus,
    ) -> OpsResult<()> {
        let current = entry.data.status;
        if !current.can_transition_to(next) {
            return Err(OpsError::IllegalTransition {
                subject: format!("instance {}", entry.id),
                from: current.as_str(),
                to: next.as_str(),
            });
        }
        debug!(instance = %entry.id, from = %current, to = %next, "instance status");
        entry.data.status = next;
        self.registry.insert_instance(entry.clone());
        Ok(())
    }

    pub(crate) fn persist(&self) -> OpsResult<()> {
        Ok(self.registry.persist()?)
    }

    /// Engine view of a container; errors read as "not running".
    pub(crate) fn container_running(&self, container: &str) -> bool {
        match self.engine.is_running(container) {
            Ok(running) => running,
            Err(e) => {
                debug!(%container, error = %e, "could not inspect container");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use appgrid_state::{InstanceData, NetworkAttachment};

    #[test]
    fn client_input_validation() {
        assert!(parse_app_key("tech.appgrid.web", "1.0").is_ok());
        assert!(matches!(
            parse_app_key("Tech.appgrid.web", "1.0"),
            Err(OpsError::InvalidAppKey(msg)) if msg == "Tech.appgrid.web (1.0)"
        ));
        assert!(parse_app_key("tech.appgrid.web", "").is_err());
        assert!(parse_app_key("tech.appgrid.web", "../../../etc").is_err());
        assert!(parse_app_key("tech.appgrid.web", "1.0/..").is_err());

        assert_eq!(parse_instance_id("0000002a").unwrap(), InstanceId::new(42));
        assert!(matches!(
            parse_instance_id("xyz"),
            Err(OpsError::InvalidInstanceId(_))
        ));
    }

    #[tokio::test]
    async fn queries_filter_instances() {
        let h = Harness::new();
        h.install("tech.appgrid.web", "1.0").await;
        h.install("tech.appgrid.web", "2.0").await;
        let a = h.create("tech.appgrid.web", "1.0").await;
        let b = h.create("tech.appgrid.web", "2.0").await;

        let o = &h.orchestrator;
        assert_eq!(o.list_apps().len(), 2);
        assert_eq!(o.list_instances(None, None).len(), 2);
        assert_eq!(o.list_instances(Some("tech.appgrid.web"), None).len(), 2);
        let v1 = o.list_instances(Some("tech.appgrid.web"), Some("1.0"));
        assert_eq!(v1.len(), 1);
        assert_eq!(v1[0].id, a);

        let details = o.instance_details(b).unwrap();
        assert_eq!(details.container, format!("appgrid-{}", b.hex()));
        assert_eq!(details.image, "registry.example.com/tech.appgrid.web:2.0");
        assert_eq!(details.volumes, vec![format!("appgrid-{}-data", b.hex())]);

        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["id"], b.hex());
        assert_eq!(json["data"]["status"], "created");

        assert!(matches!(
            o.instance_details(InstanceId::new(0)),
            Err(OpsError::InstanceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn reconcile_orphans_dangling_entries() {
        let h = Harness::new();
        h.install("tech.appgrid.web", "1.0").await;
        let key = AppKey::new("tech.appgrid.web", "1.0");
        let stray = InstanceEntry {
            id: InstanceId::new(7),
            data: InstanceData {
                app: "tech.appgrid.gone".into(),
                version: "1.0".into(),
                status: InstanceStatus::Stopped,
                networks: vec![NetworkAttachment::new("appgrid")],
                ..InstanceData::default()
            },
        };
        h.registry.insert_instance(stray);

        let report = h.orchestrator.reconcile().unwrap();
        assert!(report.orphaned_apps.is_empty());
        assert_eq!(report.orphaned_instances, vec![InstanceId::new(7)]);

        h.orchestrator.ctx.manifests.remove(&key).unwrap();
        let report = h.orchestrator.reconcile().unwrap();
        assert_eq!(report.orphaned_apps, vec![key.clone()]);
        assert!(report.orphaned_instances.is_empty());
        assert_eq!(
            h.registry.query_app(&key).unwrap().data.status,
            AppStatus::Orphaned
        );

        assert!(h.orchestrator.reconcile().unwrap().is_empty());
    }

    #[tokio::test]
    async fn versions_and_logs() {
        let h = Harness::new();
        h.install("tech.appgrid.web", "1.0").await;
        h.install("tech.appgrid.web", "2.0").await;
        h.install("tech.appgrid.db", "1.0").await;
        let id = h.create("tech.appgrid.web", "1.0").await;

        let o = &h.orchestrator;
        let versions: Vec<String> = o
            .list_versions("tech.appgrid.web")
            .iter()
            .map(|app| app.key.version().to_string())
            .collect();
        assert_eq!(versions, ["1.0", "2.0"]);
        assert!(o.list_versions("tech.appgrid.none").is_empty());

        let logs = o.instance_logs(id).unwrap();
        assert!(logs.starts_with("registry.example.com/tech.appgrid.web:1.0"));
        assert!(matches!(
            o.instance_logs(InstanceId::new(1)),
            Err(OpsError::InstanceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn startup_restarts_desired_instances() {
        let h = Harness::new();
        h.install("tech.appgrid.web", "1.0").await;
        let running = h.create("tech.appgrid.web", "1.0").await;
        let stopped = h.create("tech.appgrid.web", "1.0").await;
        let o = &h.orchestrator;
        assert!(h.wait(o.start_instance(running).unwrap()).await.is_success());
        assert!(h.wait(o.start_instance(stopped).unwrap()).await.is_success());
        assert!(h.wait(o.stop_instance(stopped).unwrap()).await.is_success());

        // Host reboot: every container is down.
        for id in [running, stopped] {
            h.engine.stop_container(&format!("appgrid-{}", id.hex())).unwrap();
        }
        let jobs = o.start_desired_instances();
        assert_eq!(jobs.len(), 1);
        assert!(h.wait(jobs[0]).await.is_success());
        assert!(h.engine.is_container_running(&format!("appgrid-{}", running.hex())));
        assert!(!h.engine.is_container_running(&format!("appgrid-{}", stopped.hex())));
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected() {
        let h = Harness::new();
        let mut entry = AppEntry::new(
            AppKey::new("tech.appgrid.web", "1.0"),
            AppStatus::NotInstalled,
            AppStatus::Installed,
        );
        let err = h
            .orchestrator
            .ctx
            .advance_app(&mut entry, AppStatus::Installed)
            .unwrap_err();
        assert!(err.to_string().contains("from not installed to installed"));
        assert!(!h.registry.has_app(&entry.key));
    }
}
