use crate::catalog::{read_catalog, resolution_error, resolve_version};
use crate::concurrency::{shutdown_requested, InstallLock};
use crate::lifecycle::{AddOperation, AddPhase};
use crate::resolve::{resolve_addition, AddRequest, Selection};
use crate::staging::{self, CandidateRequest};
use crate::template::{load_templates, TemplateResolver};
use crate::CoreError;
use provis_backend::{Backends, InstallerConfig};
use provis_schema::{
    ConfigId, FeaturePackCoordinate, LayerName, LicenseRecord, ProvisioningConfig,
};
use provis_store::{InstallLayout, LicenseStore, MetadataStore, WriteAheadLog};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A candidate that has been staged but not yet promoted.
#[derive(Debug, Clone, Serialize)]
pub struct PreparedCandidate {
    pub staging: PathBuf,
    pub feature_pack: FeaturePackCoordinate,
    pub config: ProvisioningConfig,
    pub accepted_licenses: Vec<LicenseRecord>,
}

/// Licenses an add would accept on top of those already accepted.
#[derive(Debug, Clone, Serialize)]
pub struct PendingLicenses {
    pub feature_pack: FeaturePackCoordinate,
    pub licenses: Vec<LicenseRecord>,
    /// The template demands explicit confirmation even when the caller
    /// pre-accepted licenses.
    pub requires_prompt: bool,
}

/// Entry point for adding feature-packs to one installation.
///
/// Every mutating operation holds the installation's writer lock for its
/// whole duration; a second writer fails fast with [`CoreError::Busy`].
pub struct Installer {
    layout: InstallLayout,
    meta_store: MetadataStore,
    license_store: LicenseStore,
    wal: WriteAheadLog,
    backends: Backends,
    templates: Box<dyn TemplateResolver>,
    cancel: Arc<AtomicBool>,
}

impl Installer {
    /// Open the installation at `root`, rolling back any promotion a crash
    /// interrupted.
    pub fn new(
        root: &Path,
        backends: Backends,
        templates: Box<dyn TemplateResolver>,
    ) -> Result<Self, CoreError> {
        let layout = InstallLayout::new(root);
        let wal = WriteAheadLog::new(&layout)?;
        wal.initialize()?;

        // Recovery touches the live tree, so it only runs when no other
        // writer is active.
        if let Some(_lock) = InstallLock::try_acquire(&layout.lock_file()?)? {
            let recovered = wal.recover()?;
            if recovered > 0 {
                warn!(
                    "rolled back {recovered} interrupted operations on {}",
                    root.display()
                );
            }
        } else {
            debug!("installation is locked, skipping WAL recovery");
        }

        Ok(Self {
            meta_store: MetadataStore::new(layout.clone()),
            license_store: LicenseStore::new(layout.clone()),
            layout,
            wal,
            backends,
            templates,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Installer settings persisted with the installation, or the defaults.
    pub fn load_settings(root: &Path) -> Result<InstallerConfig, CoreError> {
        let layout = InstallLayout::new(root);
        Ok(InstallerConfig::load_or_default(
            &layout.installer_config_file(),
        )?)
    }

    /// Open `root` with the collaborators `config` describes.
    pub fn from_config(root: &Path, config: &InstallerConfig) -> Result<Self, CoreError> {
        let backends = Backends::from_config(config)?;
        let templates = load_templates(config.templates.as_deref())?;
        Self::new(root, backends, templates)
    }

    /// Create an empty installation at `root` and persist `config` with it.
    pub fn init(root: &Path, config: &InstallerConfig) -> Result<ProvisioningConfig, CoreError> {
        let layout = InstallLayout::new(root);
        let _lock = InstallLock::try_acquire(&layout.lock_file()?)?
            .ok_or_else(|| CoreError::Busy(root.to_path_buf()))?;
        if layout.is_provisioned() {
            return Err(CoreError::AlreadyInitialized(root.to_path_buf()));
        }
        layout.initialize()?;
        config.save(&layout.installer_config_file())?;
        let record = MetadataStore::new(layout).save(&ProvisioningConfig::default())?;
        info!("initialized installation at {}", root.display());
        Ok(record.config)
    }

    pub fn layout(&self) -> &InstallLayout {
        &self.layout
    }

    /// Flag that cancels the running operation at its next phase boundary.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn check_cancelled(&self) -> Result<(), CoreError> {
        if self.cancel.load(Ordering::SeqCst) || shutdown_requested() {
            return Err(CoreError::Cancelled);
        }
        Ok(())
    }

    fn lock(&self) -> Result<InstallLock, CoreError> {
        InstallLock::try_acquire(&self.layout.lock_file()?)?
            .ok_or_else(|| CoreError::Busy(self.layout.root().to_path_buf()))
    }

    pub fn installed_config(&self) -> Result<ProvisioningConfig, CoreError> {
        Ok(self.meta_store.load_config()?)
    }

    pub fn accepted_licenses(&self) -> Result<Vec<LicenseRecord>, CoreError> {
        Ok(self.license_store.accepted()?)
    }

    /// `Ok(false)` when no channel lists the coordinate; an error when it is
    /// listed but its artifact cannot be fetched or read.
    pub fn is_feature_pack_available(&self, coordinate: &str) -> Result<bool, CoreError> {
        let location = FeaturePackCoordinate::parse(coordinate)?;
        let streams = self.backends.channel.resolve_manifest(&location)?;
        let stream = match location.version() {
            Some(version) => streams.iter().find(|s| s.version == version),
            None => streams.first(),
        };
        let Some(stream) = stream else {
            debug!("{location} is not listed by any channel");
            return Ok(false);
        };

        let resolved = stream.coordinate();
        self.backends
            .channel
            .fetch_artifact(&resolved)
            .map_err(|e| CoreError::ArtifactResolution(e.to_string()))?;
        self.backends
            .provisioning
            .read_feature_pack(&resolved)
            .map_err(|e| CoreError::ArtifactResolution(e.to_string()))?;
        Ok(true)
    }

    /// Licenses of `coordinate` that the installation has not accepted yet.
    pub fn pending_licenses(&self, coordinate: &str) -> Result<PendingLicenses, CoreError> {
        let location = FeaturePackCoordinate::parse(coordinate)?;
        let location = resolve_version(self.backends.channel.as_ref(), &location)?;
        let accepted: HashSet<String> = self
            .license_store
            .accepted()?
            .into_iter()
            .map(|l| l.id)
            .collect();
        let licenses = self
            .backends
            .licenses
            .get_licenses(&location)
            .map_err(resolution_error)?
            .into_iter()
            .filter(|l| !accepted.contains(&l.id))
            .collect();
        let requires_prompt = self
            .templates
            .resolve(&location)
            .is_some_and(|t| t.requires_license_acceptance);
        Ok(PendingLicenses {
            feature_pack: location,
            licenses,
            requires_prompt,
        })
    }

    /// Stage the installation that results from adding `coordinate` with the
    /// given configs (none selects the feature-pack's defaults).
    pub fn add_feature_pack(
        &self,
        coordinate: &str,
        configs: &[ConfigId],
        staging: &Path,
    ) -> Result<PreparedCandidate, CoreError> {
        let location = FeaturePackCoordinate::parse(coordinate)?;
        self.add(location, Selection::Configs(configs.to_vec()), staging)
    }

    /// Stage the installation that results from adding `coordinate` with only
    /// `layers`, merged into the config `target` selects.
    pub fn add_feature_pack_with_layers(
        &self,
        coordinate: &str,
        layers: BTreeSet<LayerName>,
        target: Option<ConfigId>,
        staging: &Path,
    ) -> Result<PreparedCandidate, CoreError> {
        let location = FeaturePackCoordinate::parse(coordinate)?;
        self.add(location, Selection::Layers { layers, target }, staging)
    }

    fn add(
        &self,
        location: FeaturePackCoordinate,
        selection: Selection,
        staging: &Path,
    ) -> Result<PreparedCandidate, CoreError> {
        let mut op = AddOperation::start(location.to_string());
        let _lock = self.lock().map_err(|e| op.fail(e))?;
        self.run_add(&mut op, location, selection, staging)
            .map_err(|e| op.fail(e))
    }

    fn run_add(
        &self,
        op: &mut AddOperation,
        location: FeaturePackCoordinate,
        selection: Selection,
        staging: &Path,
    ) -> Result<PreparedCandidate, CoreError> {
        let installed = self.meta_store.load_config()?;
        if installed.has_direct_dep(&location) {
            return Err(CoreError::AlreadyInstalled {
                coordinate: location.to_string(),
            });
        }
        self.check_cancelled()?;

        op.advance(AddPhase::CatalogResolving)?;
        let catalog = read_catalog(&self.backends, &location)?;
        let location = catalog.root().clone();
        self.check_cancelled()?;

        op.advance(AddPhase::Merging)?;
        let template = self.templates.resolve(&location);
        let request = AddRequest {
            location: location.clone(),
            selection,
        };
        let config = resolve_addition(&installed, &request, &catalog, template.as_ref())?;
        self.check_cancelled()?;

        op.advance(AddPhase::PreparingCandidate)?;
        let licenses = self
            .backends
            .licenses
            .get_licenses(&location)
            .map_err(resolution_error)?;
        let accepted_licenses = staging::prepare(
            &self.layout,
            &self.wal,
            self.backends.provisioning.as_ref(),
            &CandidateRequest {
                config: &config,
                feature_pack: &location,
                licenses: &licenses,
            },
            staging,
        )?;
        if let Err(e) = self.check_cancelled() {
            if let Err(discard_err) = staging::discard(staging) {
                warn!("failed to discard cancelled candidate: {discard_err}");
            }
            return Err(e);
        }

        Ok(PreparedCandidate {
            staging: staging.to_path_buf(),
            feature_pack: location,
            config,
            accepted_licenses,
        })
    }

    /// Promote a candidate returned by an add call.
    pub fn promote(&self, candidate: &PreparedCandidate) -> Result<ProvisioningConfig, CoreError> {
        self.apply_candidate(&candidate.staging)
    }

    /// Promote the candidate prepared in `staging`, possibly by an earlier run.
    pub fn apply_candidate(&self, staging: &Path) -> Result<ProvisioningConfig, CoreError> {
        let mut op = AddOperation::resume_prepared(staging.display().to_string());
        let _lock = self.lock().map_err(|e| op.fail(e))?;
        op.advance(AddPhase::Applying)?;

        if let Err(e) = self.check_cancelled() {
            if let Err(discard_err) = staging::discard(staging) {
                warn!("failed to discard cancelled candidate: {discard_err}");
            }
            return Err(op.fail(e));
        }

        let record =
            staging::apply(&self.layout, &self.wal, staging).map_err(|e| op.fail(e))?;
        op.advance(AddPhase::Done)?;
        Ok(record.config)
    }

    pub fn discard_candidate(&self, staging: &Path) -> Result<bool, CoreError> {
        let _lock = self.lock()?;
        staging::discard(staging)
    }
}
