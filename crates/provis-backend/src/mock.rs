use crate::backend::{LicenseSource, ProvisioningBackend};
use crate::channel::{ChannelResolver, Stream};
use crate::BackendError;
use provis_schema::{
    parse_feature_pack_str, FeaturePackCoordinate, FeaturePackSpec, LicenseRecord,
    ProvisioningConfig,
};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// In-memory provisioning backend, channel and license source.
///
/// Every registered feature-pack is listed by the channel with the version
/// of its descriptor. Invocation counters let tests assert that an
/// operation never reached a collaborator.
#[derive(Default)]
pub struct MockBackend {
    packs: Mutex<HashMap<String, FeaturePackSpec>>,
    unfetchable: Mutex<HashSet<String>>,
    fail_materialize: AtomicBool,
    reads: AtomicUsize,
    fetches: AtomicUsize,
    materializations: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_feature_pack(&self, spec: FeaturePackSpec) -> Result<(), BackendError> {
        self.lock_packs()?.insert(spec.location().producer(), spec);
        Ok(())
    }

    /// Register a feature-pack from its `feature-pack.toml` text.
    pub fn add_descriptor(&self, descriptor: &str) -> Result<(), BackendError> {
        self.add_feature_pack(parse_feature_pack_str(descriptor)?)
    }

    /// Keep a feature-pack listed by the channel but make its artifact unreachable.
    pub fn mark_unfetchable(&self, location: &FeaturePackCoordinate) -> Result<(), BackendError> {
        self.unfetchable
            .lock()
            .map_err(|e| BackendError::Materialize(format!("mutex poisoned: {e}")))?
            .insert(location.producer());
        Ok(())
    }

    pub fn fail_materialize(&self, fail: bool) {
        self.fail_materialize.store(fail, Ordering::SeqCst);
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn materialize_count(&self) -> usize {
        self.materializations.load(Ordering::SeqCst)
    }

    fn lock_packs(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, FeaturePackSpec>>, BackendError> {
        self.packs
            .lock()
            .map_err(|e| BackendError::Materialize(format!("mutex poisoned: {e}")))
    }

    fn is_unfetchable(&self, location: &FeaturePackCoordinate) -> bool {
        self.unfetchable
            .lock()
            .is_ok_and(|set| set.contains(&location.producer()))
    }

    fn lookup(&self, location: &FeaturePackCoordinate) -> Result<FeaturePackSpec, BackendError> {
        let not_found = |reason: &str| BackendError::Fetch {
            coordinate: location.to_string(),
            reason: reason.to_owned(),
        };
        if self.is_unfetchable(location) {
            return Err(not_found("artifact unreachable"));
        }
        let packs = self.lock_packs()?;
        let spec = packs
            .get(&location.producer())
            .ok_or_else(|| not_found("not in mock repository"))?;
        if location.version().is_some() && location.version() != spec.location().version() {
            return Err(not_found("version not in mock repository"));
        }
        Ok(spec.clone())
    }
}

impl ProvisioningBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn read_feature_pack(
        &self,
        location: &FeaturePackCoordinate,
    ) -> Result<FeaturePackSpec, BackendError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.lookup(location)
    }

    /// Writes `.provis-mock` listing the provisioned feature-packs.
    fn materialize(&self, config: &ProvisioningConfig, target: &Path) -> Result<(), BackendError> {
        self.materializations.fetch_add(1, Ordering::SeqCst);
        if self.fail_materialize.load(Ordering::SeqCst) {
            return Err(BackendError::Materialize("mock failure".to_owned()));
        }
        let listing: Vec<String> = config.all_deps().map(|d| d.location.to_string()).collect();
        let listing = listing.join("\n");
        let digest = blake3::hash(listing.as_bytes()).to_hex();
        std::fs::create_dir_all(target)?;
        std::fs::write(
            target.join(".provis-mock"),
            format!("{listing}\n# {digest}\n"),
        )?;
        Ok(())
    }
}

impl ChannelResolver for MockBackend {
    fn resolve_manifest(
        &self,
        location: &FeaturePackCoordinate,
    ) -> Result<Vec<Stream>, BackendError> {
        let packs = self.lock_packs()?;
        Ok(packs
            .get(&location.producer())
            .and_then(|spec| {
                spec.location().version().map(|version| Stream {
                    group: location.group_id().to_owned(),
                    artifact: location.artifact_id().to_owned(),
                    version: version.to_owned(),
                })
            })
            .into_iter()
            .collect())
    }

    fn fetch_artifact(&self, location: &FeaturePackCoordinate) -> Result<PathBuf, BackendError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.lookup(location)?;
        Ok(PathBuf::from(format!("mock://{location}")))
    }
}

impl LicenseSource for MockBackend {
    fn get_licenses(
        &self,
        location: &FeaturePackCoordinate,
    ) -> Result<Vec<LicenseRecord>, BackendError> {
        Ok(LicenseRecord::from_spec(&self.lookup(location)?))
    }
}
