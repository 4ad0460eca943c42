//! Instance jobs: create, start, stop, delete and update.

use std::net::Ipv4Addr;

use appgrid_core::{AppKey, InstanceId, InstanceStatus, JobId};
use appgrid_jobs::Progress;
use appgrid_state::{
    DEFAULT_NETWORK, InstanceData, InstanceEntry, NetworkAttachment, StartupOption,
};
use tracing::{debug, info, warn};

use crate::engine::ContainerSpec;
use crate::error::{OpsError, OpsResult};
use crate::manifest::{AppManifest, VolumeSource};
use crate::orchestrator::{Context, Orchestrator, ensure_valid};

/// Engine volume backing the named volume `volume` of one instance.
pub(crate) fn volume_name(id: InstanceId, volume: &str) -> String {
    format!("appgrid-{}-{volume}", id.hex())
}

fn container_spec(entry: &InstanceEntry, manifest: &AppManifest) -> ContainerSpec {
    let data = &entry.data;
    ContainerSpec {
        name: entry.container_name(),
        image: manifest.image_ref(),
        args: manifest.args.clone(),
        env: data.environment.clone(),
        ports: data.ports.clone(),
        mounts: manifest
            .volumes
            .iter()
            .map(|v| {
                let source = match &v.source {
                    VolumeSource::Named(name) => volume_name(entry.id, name),
                    VolumeSource::Bind(path) => path.display().to_string(),
                };
                (source, v.target.clone())
            })
            .collect(),
        networks: data.networks.clone(),
        deferred_networks: data
            .startup_options
            .contains(&StartupOption::InitNetworkAfterStart),
    }
}

impl Orchestrator {
    /// Create a container for an installed app. The job message is the new
    /// instance id, or the existing one for single-instance apps.
    pub fn create_instance(
        &self,
        key: AppKey,
        description: impl Into<String>,
    ) -> OpsResult<JobId> {
        ensure_valid(&key)?;
        let description = description.into();
        Ok(self.submit(
            format!("Creating instance of {key}"),
            move |ctx, progress| ctx.create_instance(progress, &key, description),
        ))
    }

    pub fn start_instance(&self, id: InstanceId) -> OpsResult<JobId> {
        Ok(self.submit(format!("Starting instance {id}"), move |ctx, progress| {
            ctx.start_instance(progress, id)
        }))
    }

    pub fn stop_instance(&self, id: InstanceId) -> OpsResult<JobId> {
        Ok(self.submit(format!("Stopping instance {id}"), move |ctx, progress| {
            ctx.stop_instance(progress, id)
        }))
    }

    pub fn delete_instance(&self, id: InstanceId) -> OpsResult<JobId> {
        Ok(self.submit(format!("Deleting instance {id}"), move |ctx, progress| {
            ctx.delete_instance(progress, id)
        }))
    }

    /// Move an instance to another installed version of its app, keeping
    /// its id and volumes.
    pub fn update_instance(&self, id: InstanceId, to_version: impl Into<String>) -> OpsResult<JobId> {
        let to_version = to_version.into();
        if !AppKey::is_valid_version(&to_version) {
            return Err(OpsError::InvalidAppKey(format!("instance {id} ()")));
        }
        Ok(self.submit(
            format!("Updating instance {id} to {to_version}"),
            move |ctx, progress| ctx.update_instance(progress, id, &to_version),
        ))
    }
}

impl Context {
    fn instance(&self, id: InstanceId) -> OpsResult<InstanceEntry> {
        self.registry
            .query_instance(id)
            .ok_or(OpsError::InstanceNotFound(id))
    }

    fn installed_manifest(&self, key: &AppKey) -> OpsResult<AppManifest> {
        self.registry
            .query_app(key)
            .filter(|app| app.data.status.is_installed())
            .ok_or_else(|| OpsError::AppNotInstalled(key.clone()))?;
        Ok(self.manifests.load(key)?)
    }

    fn unused_instance_id(&self) -> InstanceId {
        loop {
            let id = InstanceId::new_random();
            if !id.is_zero() && !self.registry.has_instance(id) {
                return id;
            }
        }
    }

    fn create_instance(
        &self,
        progress: &Progress,
        key: &AppKey,
        description: String,
    ) -> OpsResult<String> {
        let manifest = self.installed_manifest(key)?;
        if !manifest.multi_instance {
            let existing = self.registry.instances_of_version(key.name(), key.version());
            if let Some(existing) = existing.first() {
                info!(app = %key, instance = %existing.id, "single-instance app already has an instance");
                return Ok(existing.id.hex());
            }
        }

        let networks = if manifest.networks.is_empty() {
            vec![NetworkAttachment::new(DEFAULT_NETWORK)]
        } else {
            manifest.networks.iter().map(NetworkAttachment::new).collect()
        };
        let mut entry = InstanceEntry {
            id: self.unused_instance_id(),
            data: InstanceData {
                app: key.name().to_string(),
                version: key.version().to_string(),
                description,
                status: InstanceStatus::NotCreated,
                desired: InstanceStatus::Created,
                networks,
                startup_options: manifest.startup_options.clone(),
                environment: manifest.env.clone(),
                ports: manifest.ports.clone(),
                ..InstanceData::default()
            },
        };
        self.registry.insert_instance(entry.clone());

        progress.set_num_steps(2);
        let outcome = self.provision(progress, &mut entry, &manifest);
        if let Err(e) = &outcome {
            warn!(instance = %entry.id, error = %e, "instance creation failed, rolling back");
            self.remove_instance(&entry, Some(&manifest));
        }
        let persisted = self.persist();
        outcome?;
        persisted?;
        info!(app = %key, instance = %entry.id, "instance created");
        Ok(entry.id.hex())
    }

    fn provision(
        &self,
        progress: &Progress,
        entry: &mut InstanceEntry,
        manifest: &AppManifest,
    ) -> OpsResult<()> {
        self.advance_instance(entry, InstanceStatus::Requested)?;
        progress.next_step("Preparing networks");
        for attachment in &entry.data.networks {
            self.engine.ensure_network(&attachment.network)?;
        }
        self.assign_addresses(entry)?;
        self.advance_instance(entry, InstanceStatus::ResourcesReady)?;

        progress.next_step("Creating container");
        self.engine.create_container(&container_spec(entry, manifest))?;
        self.advance_instance(entry, InstanceStatus::Created)
    }

    /// Give every attachment without an address the next free one in its
    /// network. Networks the engine reports no IPv4 subnet for are left to
    /// the engine.
    fn assign_addresses(&self, entry: &mut InstanceEntry) -> OpsResult<()> {
        let others: Vec<InstanceEntry> = self
            .registry
            .all_instances()
            .into_iter()
            .filter(|other| other.id != entry.id)
            .collect();
        for attachment in entry.data.networks.iter_mut() {
            if !attachment.ip_address.is_empty() {
                continue;
            }
            let Some(subnet) = self.engine.network_subnet(&attachment.network)? else {
                continue;
            };
            let used: Vec<Ipv4Addr> = others
                .iter()
                .flat_map(|other| &other.data.networks)
                .filter(|a| a.network == attachment.network)
                .filter_map(|a| a.ip_address.parse().ok())
                .collect();
            let ip = subnet
                .next_free(&used)
                .ok_or_else(|| OpsError::NetworkExhausted(attachment.network.clone()))?;
            debug!(instance = %entry.id, network = %attachment.network, %ip, "address assigned");
            attachment.ip_address = ip.to_string();
        }
        Ok(())
    }

    /// Start the container and attach networks deferred until after start.
    fn launch(&self, entry: &InstanceEntry) -> OpsResult<()> {
        let container = entry.container_name();
        self.engine.start_container(&container)?;
        if entry
            .data
            .startup_options
            .contains(&StartupOption::InitNetworkAfterStart)
        {
            for attachment in &entry.data.networks {
                if let Err(e) = self.engine.connect_network(&container, attachment) {
                    warn!(instance = %entry.id, network = %attachment.network, error = %e, "could not connect network");
                }
            }
        }
        Ok(())
    }

    fn start_instance(&self, progress: &Progress, id: InstanceId) -> OpsResult<String> {
        let mut entry = self.instance(id)?;
        if !entry.data.status.is_runnable() {
            return Err(OpsError::InstanceNotRunnable(id, entry.data.status));
        }
        entry.data.desired = InstanceStatus::Running;
        self.registry.insert_instance(entry.clone());

        let container = entry.container_name();
        progress.set_num_steps(1);
        progress.next_step("Starting container");
        if !self.container_running(&container) {
            self.launch(&entry)?;
        }
        self.advance_instance(&mut entry, InstanceStatus::Running)?;
        self.persist()?;
        info!(instance = %id, "instance started");
        Ok(id.hex())
    }

    fn stop_instance(&self, progress: &Progress, id: InstanceId) -> OpsResult<String> {
        let mut entry = self.instance(id)?;
        entry.data.desired = InstanceStatus::Stopped;
        self.registry.insert_instance(entry.clone());

        progress.set_num_steps(1);
        progress.next_step("Stopping container");
        let was_running = self.container_running(&entry.container_name());
        if was_running {
            self.engine.stop_container(&entry.container_name())?;
        }
        if was_running || entry.data.status == InstanceStatus::Running {
            self.advance_instance(&mut entry, InstanceStatus::Stopped)?;
        }
        self.persist()?;
        info!(instance = %id, "instance stopped");
        Ok(id.hex())
    }

    fn delete_instance(&self, progress: &Progress, id: InstanceId) -> OpsResult<String> {
        let entry = self.instance(id)?;
        let manifest = match self.manifests.load(&entry.data.app_key()) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                warn!(instance = %id, error = %e, "deleting instance without manifest");
                None
            }
        };
        progress.set_num_steps(1);
        progress.next_step("Removing container");
        self.remove_instance(&entry, manifest.as_ref());
        self.persist()?;
        info!(instance = %id, "instance deleted");
        Ok(id.hex())
    }

    /// Best-effort teardown of the container, its named volumes and the
    /// registry entry. Does not persist.
    pub(crate) fn remove_instance(&self, entry: &InstanceEntry, manifest: Option<&AppManifest>) {
        let container = entry.container_name();
        if self.container_running(&container) {
            if let Err(e) = self.engine.stop_container(&container) {
                warn!(instance = %entry.id, error = %e, "could not stop container");
            }
        }
        if let Err(e) = self.engine.remove_container(&container) {
            warn!(instance = %entry.id, error = %e, "could not remove container");
        }
        for volume in manifest.into_iter().flat_map(|m| m.named_volumes()) {
            let name = volume_name(entry.id, volume);
            if let Err(e) = self.engine.remove_volume(&name) {
                warn!(instance = %entry.id, volume = %name, error = %e, "could not remove volume");
            }
        }
        self.registry.delete_instance(entry.id);
    }

    fn update_instance(
        &self,
        progress: &Progress,
        id: InstanceId,
        to_version: &str,
    ) -> OpsResult<String> {
        let mut entry = self.instance(id)?;
        let target = AppKey::new(entry.data.app.clone(), to_version);
        let manifest = self.installed_manifest(&target)?;
        if entry.data.version == to_version {
            info!(instance = %id, version = to_version, "instance already at version");
            return Ok(id.hex());
        }
        if !entry.data.status.is_runnable() {
            return Err(OpsError::InstanceNotRunnable(id, entry.data.status));
        }

        progress.set_num_steps(3);
        progress.next_step("Stopping container");
        let container = entry.container_name();
        if self.container_running(&container) {
            self.engine.stop_container(&container)?;
        }
        self.advance_instance(&mut entry, InstanceStatus::Stopped)?;
        let previous = entry.clone();

        progress.next_step("Recreating container");
        let from_version = std::mem::replace(&mut entry.data.version, to_version.to_string());
        entry.data.startup_options = manifest.startup_options.clone();
        entry.data.environment = manifest.env.clone();
        entry.data.ports = manifest.ports.clone();
        if let Err(e) = self.recreate(progress, &mut entry, &manifest) {
            warn!(instance = %id, error = %e, version = %from_version, "update failed, restoring previous version");
            self.restore(previous);
            return Err(e);
        }
        self.persist()?;
        info!(instance = %id, from = %from_version, to = to_version, "instance updated");
        Ok(id.hex())
    }

    /// Replace the container of `entry` with one built from `manifest` and
    /// bring it back to its desired state.
    fn recreate(
        &self,
        progress: &Progress,
        entry: &mut InstanceEntry,
        manifest: &AppManifest,
    ) -> OpsResult<()> {
        self.engine.remove_container(&entry.container_name())?;
        for attachment in &entry.data.networks {
            self.engine.ensure_network(&attachment.network)?;
        }
        self.engine.create_container(&container_spec(entry, manifest))?;
        self.registry.insert_instance(entry.clone());

        progress.next_step("Restoring state");
        if entry.data.desired == InstanceStatus::Running {
            self.launch(entry)?;
            self.advance_instance(entry, InstanceStatus::Running)?;
        }
        Ok(())
    }

    /// Best-effort return to the stopped `previous` entry after a failed
    /// update, restarting it if it should be running.
    fn restore(&self, mut previous: InstanceEntry) {
        let id = previous.id;
        if let Err(e) = self.engine.remove_container(&previous.container_name()) {
            warn!(instance = %id, error = %e, "could not remove container");
        }
        let restored = self
            .installed_manifest(&previous.data.app_key())
            .and_then(|manifest| {
                for attachment in &previous.data.networks {
                    self.engine.ensure_network(&attachment.network)?;
                }
                self.engine.create_container(&container_spec(&previous, &manifest))?;
                if previous.data.desired == InstanceStatus::Running {
                    self.launch(&previous)?;
                    previous.data.status = InstanceStatus::Running;
                }
                Ok(())
            });
        if let Err(e) = restored {
            warn!(instance = %id, error = %e, "could not restore container");
        }
        self.registry.insert_instance(previous);
        if let Err(e) = self.persist() {
            warn!(instance = %id, error = %e, "could not persist restored instance");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Harness, manifest_json};

    const WEB: &str = "tech.appgrid.web";

    // ── create ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn create_builds_container_from_manifest() {
        let h = Harness::new();
        h.install(WEB, "1.0").await;
        let id = h.create(WEB, "1.0").await;

        let entry = h.registry.query_instance(id).unwrap();
        assert_eq!(entry.data.status, InstanceStatus::Created);
        assert_eq!(entry.data.desired, InstanceStatus::Created);
        assert_eq!(entry.data.networks.len(), 1);
        assert_eq!(entry.data.networks[0].network, "frontend");
        assert_eq!(entry.data.networks[0].ip_address, "10.20.0.2");
        assert_eq!(entry.data.ports.len(), 2);
        assert!(h.engine.has_network("frontend"));

        let spec = h.engine.created(&entry.container_name()).unwrap();
        assert_eq!(spec.image, "registry.example.com/tech.appgrid.web:1.0");
        assert!(spec.deferred_networks);
        assert_eq!(
            spec.mounts,
            vec![
                (volume_name(id, "data"), "/var/lib/web".to_string()),
                ("/etc/hosts".to_string(), "/etc/hosts".to_string()),
            ]
        );
        assert!(h.reopen().has_instance(id));
    }

    #[tokio::test]
    async fn create_uses_default_network() {
        let h = Harness::new();
        let json = r#"{"app":"tech.appgrid.min","version":"0.1","image":"min"}"#;
        let job = h.orchestrator.sideload(json.as_bytes().to_vec(), "").unwrap();
        assert!(h.wait(job).await.is_success());

        let id = h.create("tech.appgrid.min", "0.1").await;
        let entry = h.registry.query_instance(id).unwrap();
        assert_eq!(entry.data.networks.len(), 1);
        assert_eq!(entry.data.networks[0].network, DEFAULT_NETWORK);
        // The engine reports no subnet for this network.
        assert!(entry.data.networks[0].ip_address.is_empty());
    }

    #[tokio::test]
    async fn single_instance_app_reuses_instance() {
        let h = Harness::new();
        let json = r#"{"app":"tech.appgrid.min","version":"0.1","image":"min"}"#;
        let job = h.orchestrator.sideload(json.as_bytes().to_vec(), "").unwrap();
        assert!(h.wait(job).await.is_success());

        let first = h.create("tech.appgrid.min", "0.1").await;
        let second = h.create("tech.appgrid.min", "0.1").await;
        assert_eq!(first, second);
        assert_eq!(h.registry.all_instances().len(), 1);
    }

    #[tokio::test]
    async fn create_requires_installed_app() {
        let h = Harness::new();
        let job = h
            .orchestrator
            .create_instance(AppKey::new(WEB, "1.0"), "")
            .unwrap();
        let result = h.wait(job).await;
        assert!(result.message.contains("not installed"));
        assert!(h.registry.all_instances().is_empty());
    }

    #[tokio::test]
    async fn failed_create_rolls_back() {
        let h = Harness::new();
        h.install(WEB, "1.0").await;
        h.engine.fail_creates(1);

        let job = h
            .orchestrator
            .create_instance(AppKey::new(WEB, "1.0"), "")
            .unwrap();
        let result = h.wait(job).await;
        assert!(!result.is_success());
        assert!(h.registry.all_instances().is_empty());
        assert!(h.reopen().all_instances().is_empty());
        assert_eq!(h.engine.calls_matching("volume rm"), 1);
    }

    // ── start / stop ───────────────────────────────────────────────

    #[tokio::test]
    async fn start_and_stop() {
        let h = Harness::new();
        h.install(WEB, "1.0").await;
        let id = h.create(WEB, "1.0").await;
        let container = format!("appgrid-{}", id.hex());

        assert!(h.wait(h.orchestrator.start_instance(id).unwrap()).await.is_success());
        let entry = h.registry.query_instance(id).unwrap();
        assert_eq!(entry.data.status, InstanceStatus::Running);
        assert_eq!(entry.data.desired, InstanceStatus::Running);
        assert!(h.engine.is_container_running(&container));
        // Deferred networks are attached after start.
        assert_eq!(h.engine.calls_matching("network connect"), 1);

        // Starting a running instance does not restart it.
        assert!(h.wait(h.orchestrator.start_instance(id).unwrap()).await.is_success());
        assert_eq!(h.engine.calls_matching("start"), 1);

        assert!(h.wait(h.orchestrator.stop_instance(id).unwrap()).await.is_success());
        let entry = h.reopen().query_instance(id).unwrap();
        assert_eq!(entry.data.status, InstanceStatus::Stopped);
        assert_eq!(entry.data.desired, InstanceStatus::Stopped);
        assert!(!h.engine.is_container_running(&container));
    }

    #[tokio::test]
    async fn stop_of_created_instance_keeps_status() {
        let h = Harness::new();
        h.install(WEB, "1.0").await;
        let id = h.create(WEB, "1.0").await;
        assert!(h.wait(h.orchestrator.stop_instance(id).unwrap()).await.is_success());
        let entry = h.registry.query_instance(id).unwrap();
        assert_eq!(entry.data.status, InstanceStatus::Created);
        assert_eq!(entry.data.desired, InstanceStatus::Stopped);
        assert_eq!(h.engine.calls_matching("stop"), 0);
    }

    #[tokio::test]
    async fn start_rejects_orphaned_and_unknown_instances() {
        let h = Harness::new();
        let result = h.wait(h.orchestrator.start_instance(InstanceId::new(9)).unwrap()).await;
        assert!(result.message.contains("does not exist"));

        h.registry.insert_instance(InstanceEntry {
            id: InstanceId::new(9),
            data: InstanceData {
                app: "tech.appgrid.gone".into(),
                version: "1".into(),
                status: InstanceStatus::Orphaned,
                ..InstanceData::default()
            },
        });
        let result = h.wait(h.orchestrator.start_instance(InstanceId::new(9)).unwrap()).await;
        assert!(result.message.contains("cannot be started in state orphaned"));
    }

    // ── delete ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn delete_removes_container_and_volumes() {
        let h = Harness::new();
        h.install(WEB, "1.0").await;
        let id = h.create(WEB, "1.0").await;
        assert!(h.wait(h.orchestrator.start_instance(id).unwrap()).await.is_success());

        assert!(h.wait(h.orchestrator.delete_instance(id).unwrap()).await.is_success());
        assert!(!h.registry.has_instance(id));
        assert!(!h.reopen().has_instance(id));
        assert!(!h.engine.has_container(&format!("appgrid-{}", id.hex())));
        assert_eq!(h.engine.removed_volumes(), vec![volume_name(id, "data")]);
    }

    // ── update ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn update_recreates_on_new_version() {
        let h = Harness::new();
        h.install(WEB, "1.0").await;
        h.install(WEB, "2.0").await;
        let id = h.create(WEB, "1.0").await;
        assert!(h.wait(h.orchestrator.start_instance(id).unwrap()).await.is_success());

        let job = h.orchestrator.update_instance(id, "2.0").unwrap();
        let result = h.wait(job).await;
        assert!(result.is_success(), "{result:?}");

        let entry = h.reopen().query_instance(id).unwrap();
        assert_eq!(entry.data.version, "2.0");
        assert_eq!(entry.data.status, InstanceStatus::Running);
        let spec = h.engine.created(&entry.container_name()).unwrap();
        assert_eq!(spec.image, "registry.example.com/tech.appgrid.web:2.0");
        // Volumes survive the update.
        assert!(h.engine.removed_volumes().is_empty());
    }

    #[tokio::test]
    async fn update_of_stopped_instance_stays_stopped() {
        let h = Harness::new();
        h.install(WEB, "1.0").await;
        h.install(WEB, "2.0").await;
        let id = h.create(WEB, "1.0").await;

        assert!(h.wait(h.orchestrator.update_instance(id, "2.0").unwrap()).await.is_success());
        let entry = h.registry.query_instance(id).unwrap();
        assert_eq!(entry.data.version, "2.0");
        assert_eq!(entry.data.status, InstanceStatus::Stopped);
        assert!(!h.engine.is_container_running(&entry.container_name()));
    }

    #[tokio::test]
    async fn update_to_same_or_missing_version() {
        let h = Harness::new();
        h.install(WEB, "1.0").await;
        let id = h.create(WEB, "1.0").await;
        let creates = h.engine.calls_matching("create");

        assert!(h.wait(h.orchestrator.update_instance(id, "1.0").unwrap()).await.is_success());
        assert_eq!(h.engine.calls_matching("create"), creates);

        let result = h.wait(h.orchestrator.update_instance(id, "3.0").unwrap()).await;
        assert!(result.message.contains("not installed"));
        assert!(h.orchestrator.update_instance(id, "").is_err());
        assert!(h.orchestrator.update_instance(id, "../1.0").is_err());
    }

    #[tokio::test]
    async fn failed_update_restores_previous_version() {
        let h = Harness::new();
        h.install(WEB, "1.0").await;
        h.install(WEB, "2.0").await;
        let id = h.create(WEB, "1.0").await;
        assert!(h.wait(h.orchestrator.start_instance(id).unwrap()).await.is_success());
        h.engine.fail_creates(1);

        let result = h.wait(h.orchestrator.update_instance(id, "2.0").unwrap()).await;
        assert!(!result.is_success());
        assert!(result.message.contains("create refused"), "{result:?}");

        for entry in [
            h.registry.query_instance(id).unwrap(),
            h.reopen().query_instance(id).unwrap(),
        ] {
            assert_eq!(entry.data.version, "1.0");
            assert_eq!(entry.data.status, InstanceStatus::Running);
        }
        let container = format!("appgrid-{}", id.hex());
        let spec = h.engine.created(&container).unwrap();
        assert_eq!(spec.image, "registry.example.com/tech.appgrid.web:1.0");
        assert!(h.engine.is_container_running(&container));

        assert!(h.wait(h.orchestrator.stop_instance(id).unwrap()).await.is_success());
        assert!(h.wait(h.orchestrator.start_instance(id).unwrap()).await.is_success());
        assert!(h.engine.is_container_running(&container));
    }

    #[tokio::test]
    async fn addresses_are_unique_per_network() {
        let h = Harness::new();
        h.install(WEB, "1.0").await;
        let a = h.create(WEB, "1.0").await;
        let b = h.create(WEB, "1.0").await;

        let address = |id| h.registry.query_instance(id).unwrap().data.networks[0].ip_address.clone();
        assert_eq!(address(a), "10.20.0.2");
        assert_eq!(address(b), "10.20.0.3");

        // A freed address is handed out again.
        assert!(h.wait(h.orchestrator.delete_instance(a).unwrap()).await.is_success());
        let c = h.create(WEB, "1.0").await;
        assert_eq!(address(c), "10.20.0.2");
        assert_eq!(h.reopen().query_instance(c).unwrap().data.networks[0].ip_address, "10.20.0.2");
    }

    #[tokio::test]
    async fn exhausted_network_fails_create() {
        let h = Harness::new();
        h.install(WEB, "1.0").await;
        h.engine.set_subnet("frontend", "192.168.9.0/30");
        h.create(WEB, "1.0").await;

        let job = h.orchestrator.create_instance(AppKey::new(WEB, "1.0"), "").unwrap();
        let result = h.wait(job).await;
        assert!(result.message.contains("no free address left in network frontend"));
        assert_eq!(h.registry.all_instances().len(), 1);
    }

    #[test]
    fn spec_maps_bind_and_named_volumes() {
        let manifest =
            AppManifest::parse(manifest_json(WEB, "1.0").as_bytes()).unwrap();
        let entry = InstanceEntry {
            id: InstanceId::new(0x2a),
            data: InstanceData {
                app: WEB.into(),
                version: "1.0".into(),
                ..InstanceData::default()
            },
        };
        let spec = container_spec(&entry, &manifest);
        assert_eq!(spec.name, "appgrid-0000002a");
        assert_eq!(spec.mounts[0].0, "appgrid-0000002a-data");
        assert!(!spec.deferred_networks);
    }
}
