//! App jobs: install, sideload, uninstall, export and import.

use std::path::{Path, PathBuf};

use appgrid_core::{AppKey, AppStatus, JobId};
use appgrid_jobs::Progress;
use appgrid_state::AppEntry;
use tracing::{info, warn};

use crate::error::{OpsError, OpsResult};
use crate::manifest::{AppManifest, ManifestError};
use crate::orchestrator::{Context, Orchestrator, ensure_valid};

const PULL_ATTEMPTS: u32 = 3;

impl Orchestrator {
    /// Install an app from the marketplace mirror.
    pub fn install(&self, key: AppKey, license_key: impl Into<String>) -> OpsResult<JobId> {
        ensure_valid(&key)?;
        let license_key = license_key.into();
        Ok(self.submit(format!("Installing {key}"), move |ctx, progress| {
            progress.set_num_steps(5);
            progress.next_step("Downloading manifest");
            let bytes = ctx.source.fetch(&key)?;
            let manifest = AppManifest::parse(&bytes)?;
            if manifest.key != key {
                return Err(ManifestError::Invalid(format!(
                    "requested {key} but manifest describes {}",
                    manifest.key
                ))
                .into());
            }
            ctx.install_from(progress, &manifest, &bytes, license_key)
        }))
    }

    /// Install an app from a manifest supplied by the client.
    pub fn sideload(&self, manifest: Vec<u8>, license_key: impl Into<String>) -> OpsResult<JobId> {
        let parsed = AppManifest::parse(&manifest)?;
        let license_key = license_key.into();
        Ok(self.submit(
            format!("Sideloading {}", parsed.key),
            move |ctx, progress| {
                progress.set_num_steps(4);
                ctx.install_from(progress, &parsed, &manifest, license_key)
            },
        ))
    }

    /// Remove an app version, its instances and its image.
    pub fn uninstall(&self, key: AppKey, force: bool) -> OpsResult<JobId> {
        ensure_valid(&key)?;
        Ok(self.submit(format!("Uninstalling {key}"), move |ctx, progress| {
            ctx.uninstall(progress, &key, force)
        }))
    }

    /// Write `<export_dir>/<name>_<version>.tar` and `.json`.
    pub fn export_app(&self, key: AppKey) -> OpsResult<JobId> {
        ensure_valid(&key)?;
        Ok(self.submit(format!("Exporting {key}"), move |ctx, progress| {
            ctx.export_app(progress, &key)
        }))
    }

    /// Install from an exported manifest and the image tarball next to it.
    pub fn import_app(&self, manifest_path: impl Into<PathBuf>) -> OpsResult<JobId> {
        let manifest_path = manifest_path.into();
        let bytes = std::fs::read(&manifest_path).map_err(|source| ManifestError::Io {
            path: manifest_path.clone(),
            source,
        })?;
        let manifest = AppManifest::parse(&bytes)?;
        Ok(self.submit(
            format!("Importing {}", manifest.key),
            move |ctx, progress| ctx.import_app(progress, &manifest_path, &manifest, &bytes),
        ))
    }
}

impl Context {
    /// Shared install path; resumes from whatever step a previous attempt reached.
    fn install_from(
        &self,
        progress: &Progress,
        manifest: &AppManifest,
        bytes: &[u8],
        license_key: String,
    ) -> OpsResult<String> {
        let key = &manifest.key;
        let mut entry = match self.registry.query_app(key) {
            Some(entry) if entry.data.status.is_installed() => {
                info!(app = %key, "app already installed");
                return Ok(key.to_string());
            }
            Some(entry) => entry,
            None => AppEntry::new(key.clone(), AppStatus::NotInstalled, AppStatus::Installed),
        };

        progress.next_step("Saving manifest");
        self.manifests.save(key, bytes)?;
        entry.data.desired = AppStatus::Installed;
        entry.data.category = manifest.category.clone();
        if !license_key.is_empty() {
            entry.data.license_key = license_key;
        }
        if matches!(
            entry.data.status,
            AppStatus::NotInstalled | AppStatus::Orphaned
        ) {
            self.advance_app(&mut entry, AppStatus::ManifestDownloaded)?;
        }

        let outcome = self.resume_install(progress, manifest, &mut entry);
        let persisted = self.persist();
        outcome?;
        persisted?;
        info!(app = %key, size = entry.data.installed_size, "app installed");
        Ok(key.to_string())
    }

    fn resume_install(
        &self,
        progress: &Progress,
        manifest: &AppManifest,
        entry: &mut AppEntry,
    ) -> OpsResult<()> {
        let image = manifest.image_ref();
        loop {
            match entry.data.status {
                AppStatus::ManifestDownloaded => {
                    progress.next_step("Acquiring download token");
                    // Licensing is external; nothing to exchange the key for.
                    self.advance_app(entry, AppStatus::TokenAcquired)?;
                    self.persist()?;
                }
                AppStatus::TokenAcquired => {
                    progress.next_step("Downloading image");
                    self.pull_with_retries(&image)?;
                    self.advance_app(entry, AppStatus::ImageDownloaded)?;
                    self.persist()?;
                }
                AppStatus::ImageDownloaded => {
                    progress.next_step("Inspecting image");
                    match self.engine.image_size(&image) {
                        Ok(size) => entry.data.installed_size = size,
                        Err(e) => warn!(%image, error = %e, "could not determine image size"),
                    }
                    self.advance_app(entry, AppStatus::Installed)?;
                }
                AppStatus::Installed => return Ok(()),
                other => {
                    return Err(OpsError::IllegalTransition {
                        subject: entry.key.to_string(),
                        from: other.as_str(),
                        to: AppStatus::Installed.as_str(),
                    });
                }
            }
        }
    }

    fn pull_with_retries(&self, image: &str) -> OpsResult<()> {
        let mut attempt = 1;
        loop {
            match self.engine.pull_image(image) {
                Ok(()) => return Ok(()),
                Err(e) if attempt < PULL_ATTEMPTS => {
                    warn!(%image, attempt, error = %e, "image pull failed, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn uninstall(&self, progress: &Progress, key: &AppKey, force: bool) -> OpsResult<String> {
        let mut entry = self
            .registry
            .query_app(key)
            .ok_or_else(|| OpsError::AppNotInstalled(key.clone()))?;
        if entry.is_system() && !force {
            return Err(OpsError::SystemApp(key.clone()));
        }
        entry.data.desired = AppStatus::NotInstalled;
        self.registry.insert_app(entry);

        let manifest = match self.manifests.load(key) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                warn!(app = %key, error = %e, "uninstalling without manifest");
                None
            }
        };

        progress.set_num_steps(4);
        progress.next_step("Removing instances");
        for instance in self.registry.instances_of_version(key.name(), key.version()) {
            self.remove_instance(&instance, manifest.as_ref());
        }

        progress.next_step("Removing image");
        if let Some(manifest) = &manifest {
            if let Err(e) = self.engine.remove_image(&manifest.image_ref()) {
                warn!(app = %key, error = %e, "could not remove image");
            }
        }

        progress.next_step("Removing app");
        self.registry.delete_app(key);
        self.persist()?;

        progress.next_step("Removing manifest");
        if let Err(e) = self.manifests.remove(key) {
            warn!(app = %key, error = %e, "could not remove manifest");
        }
        info!(app = %key, "app uninstalled");
        Ok(key.to_string())
    }

    fn export_app(&self, progress: &Progress, key: &AppKey) -> OpsResult<String> {
        self.registry
            .query_app(key)
            .filter(|entry| entry.data.status.is_installed())
            .ok_or_else(|| OpsError::AppNotInstalled(key.clone()))?;
        let manifest = self.manifests.load(key)?;

        progress.set_num_steps(2);
        std::fs::create_dir_all(&self.export_dir)?;
        let stem = format!("{}_{}", key.name(), key.version());

        progress.next_step("Saving image");
        self.engine
            .save_image(&manifest.image_ref(), &self.export_dir.join(format!("{stem}.tar")))?;

        progress.next_step("Copying manifest");
        std::fs::copy(
            self.manifests.path(key),
            self.export_dir.join(format!("{stem}.json")),
        )?;

        let base = self.export_dir.join(stem);
        info!(app = %key, path = ?base, "app exported");
        Ok(base.display().to_string())
    }

    fn import_app(
        &self,
        progress: &Progress,
        manifest_path: &Path,
        manifest: &AppManifest,
        bytes: &[u8],
    ) -> OpsResult<String> {
        let key = &manifest.key;
        if let Some(existing) = self.registry.query_app(key) {
            if existing.data.status.is_installed() {
                info!(app = %key, "app already installed");
                return Ok(key.to_string());
            }
        }

        progress.set_num_steps(2);
        progress.next_step("Loading image");
        self.engine.load_image(&manifest_path.with_extension("tar"))?;

        progress.next_step("Registering app");
        self.manifests.save(key, bytes)?;
        let mut entry = AppEntry::new(key.clone(), AppStatus::Installed, AppStatus::Installed);
        entry.data.category = manifest.category.clone();
        match self.engine.image_size(&manifest.image_ref()) {
            Ok(size) => entry.data.installed_size = size,
            Err(e) => warn!(app = %key, error = %e, "could not determine image size"),
        }
        self.registry.insert_app(entry);
        self.persist()?;
        info!(app = %key, "app imported");
        Ok(key.to_string())
    }
}
