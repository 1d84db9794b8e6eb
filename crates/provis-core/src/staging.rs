//! Two-phase candidate protocol.
//!
//! [`prepare`] builds a complete installation tree for a candidate config in
//! an isolated staging directory. [`apply`] validates a prepared candidate and
//! swaps it for the live tree with three renames, each preceded by a WAL
//! rollback step, so a crash at any point either leaves the old tree in place
//! or is undone on the next start.

use crate::CoreError;
use provis_backend::ProvisioningBackend;
use provis_schema::{FeaturePackCoordinate, LicenseRecord, ProvisioningConfig};
use provis_store::{
    fsync_dir, CandidateMarker, InstallLayout, LicenseStore, MetadataStore, ProvisioningRecord,
    RollbackStep, StoreError, WalOpKind, WriteAheadLog,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What to stage.
#[derive(Debug, Clone, Copy)]
pub struct CandidateRequest<'a> {
    pub config: &'a ProvisioningConfig,
    pub feature_pack: &'a FeaturePackCoordinate,
    /// Licenses of the feature-pack being added, in declaration order.
    pub licenses: &'a [LicenseRecord],
}

/// Absolute form of `path` with symlinks resolved for the part that exists.
pub(crate) fn resolve_path(path: &Path) -> Result<PathBuf, CoreError> {
    let mut existing = path;
    let mut missing = Vec::new();
    while !existing.as_os_str().is_empty() && !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_owned());
                existing = parent;
            }
            _ => break,
        }
    }
    let base = if existing.as_os_str().is_empty() {
        std::env::current_dir()?
    } else {
        existing.canonicalize()?
    };
    Ok(missing.iter().rev().fold(base, |acc, name| acc.join(name)))
}

fn check_staging_location(live: &InstallLayout, staging: &Path) -> Result<(), CoreError> {
    let live_root = resolve_path(live.root())?;
    let staging_root = resolve_path(staging)?;
    if staging_root.starts_with(&live_root) || live_root.starts_with(&staging_root) {
        return Err(CoreError::InvalidCandidate(format!(
            "staging directory {} overlaps the installation {}",
            staging_root.display(),
            live_root.display()
        )));
    }
    if staging.exists() {
        if !staging.is_dir() {
            return Err(CoreError::InvalidCandidate(format!(
                "{} is not a directory",
                staging.display()
            )));
        }
        if fs::read_dir(staging)?.next().is_some() {
            return Err(CoreError::InvalidCandidate(format!(
                "staging directory {} is not empty",
                staging.display()
            )));
        }
    }
    Ok(())
}

/// Copy the regular files of `src` into `dst`. A missing `src` copies nothing.
fn copy_files(src: &Path, dst: &Path) -> Result<usize, CoreError> {
    if !src.is_dir() {
        return Ok(0);
    }
    fs::create_dir_all(dst)?;
    let mut copied = 0;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            fs::copy(entry.path(), dst.join(entry.file_name()))?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Build the candidate tree in `staging`. Returns the accepted-license list
/// recorded in the candidate.
///
/// On failure everything created under `staging` is removed again; the live
/// installation is only ever read.
pub fn prepare(
    live: &InstallLayout,
    wal: &WriteAheadLog,
    backend: &dyn ProvisioningBackend,
    request: &CandidateRequest<'_>,
    staging: &Path,
) -> Result<Vec<LicenseRecord>, CoreError> {
    check_staging_location(live, staging)?;
    let base = MetadataStore::new(live.clone()).load()?;

    let op_id = wal.begin(WalOpKind::Prepare, staging)?;
    wal.add_rollback_step(&op_id, RollbackStep::RemoveDir(staging.to_path_buf()))?;

    let base_fingerprint = base.fingerprint()?;

    match build_candidate(live, backend, request, staging, base_fingerprint) {
        Ok(accepted) => {
            wal.commit(&op_id)?;
            info!(
                "prepared candidate for {} in {}",
                request.feature_pack,
                staging.display()
            );
            Ok(accepted)
        }
        Err(e) => {
            if let Err(rollback_err) = wal.rollback(&op_id) {
                warn!("failed to roll back staging {}: {rollback_err}", staging.display());
            }
            Err(e)
        }
    }
}

fn build_candidate(
    live: &InstallLayout,
    backend: &dyn ProvisioningBackend,
    request: &CandidateRequest<'_>,
    staging: &Path,
    base_fingerprint: String,
) -> Result<Vec<LicenseRecord>, CoreError> {
    fs::create_dir_all(staging)?;
    let staged = InstallLayout::new(staging);
    staged.initialize()?;

    backend.materialize(request.config, staging)?;
    debug!("materialized candidate with backend '{}'", backend.name());

    MetadataStore::new(staged.clone()).save(request.config)?;

    let installer_config = live.installer_config_file();
    if installer_config.is_file() {
        fs::copy(&installer_config, staged.installer_config_file())?;
    }

    let carried = copy_files(&live.licenses_dir(), &staged.licenses_dir())?;
    debug!("carried over {carried} license files");
    let accepted = LicenseStore::new(staged.clone()).record_agreements(request.licenses)?;

    CandidateMarker::new(
        resolve_path(live.root())?,
        request.feature_pack.to_string(),
        Some(base_fingerprint),
    )
    .save(&staged)?;
    fsync_dir(staging)?;
    Ok(accepted)
}

fn load_marker(staged: &InstallLayout) -> Result<CandidateMarker, CoreError> {
    CandidateMarker::load(staged).map_err(|e| match e {
        StoreError::CandidateMissing(path) => CoreError::InvalidCandidate(format!(
            "{} is not a prepared candidate",
            path.display()
        )),
        other => other.into(),
    })
}

/// Check that `staging` holds a well-formed candidate for `live`.
pub fn validate_candidate(
    live: &InstallLayout,
    staging: &Path,
) -> Result<(CandidateMarker, ProvisioningRecord), CoreError> {
    let staged = InstallLayout::new(staging);
    let marker = load_marker(&staged)?;

    let live_root = resolve_path(live.root())?;
    if resolve_path(&marker.target)? != live_root {
        return Err(CoreError::InvalidCandidate(format!(
            "candidate was prepared for {}, not {}",
            marker.target.display(),
            live_root.display()
        )));
    }

    let current = MetadataStore::new(live.clone()).load()?;
    if marker.base_checksum.as_deref() != Some(current.fingerprint()?.as_str()) {
        return Err(CoreError::InvalidCandidate(
            "the installation changed after the candidate was prepared".to_owned(),
        ));
    }

    let record = MetadataStore::new(staged)
        .load()
        .map_err(|e| CoreError::InvalidCandidate(format!("unreadable provisioning record: {e}")))?;
    record
        .config
        .validate()
        .map_err(|e| CoreError::InvalidCandidate(e.to_string()))?;
    Ok((marker, record))
}

/// Promote the candidate in `staging` to be the live installation.
///
/// Validation runs before anything is renamed. The swap itself parks the
/// candidate next to the live tree, moves the live tree aside, and renames
/// the candidate into place. `staging` must be on the same filesystem as the
/// installation.
pub fn apply(
    live: &InstallLayout,
    wal: &WriteAheadLog,
    staging: &Path,
) -> Result<ProvisioningRecord, CoreError> {
    let (marker, record) = validate_candidate(live, staging)?;

    let op_id = wal.begin(WalOpKind::Apply, live.root())?;
    let backup = match swap(live, wal, &op_id, staging) {
        Ok(backup) => backup,
        Err(e) => {
            if let Err(rollback_err) = wal.rollback(&op_id) {
                warn!("failed to roll back promotion: {rollback_err}");
            }
            return Err(e);
        }
    };
    wal.commit(&op_id)?;
    info!(
        "promoted candidate for {} to {}",
        marker.feature_pack,
        live.root().display()
    );

    finish_promotion(wal, live, &backup);
    Ok(record)
}

/// Tidy up after a committed promotion. Failures here are logged and never
/// undo the promotion.
fn finish_promotion(wal: &WriteAheadLog, live: &InstallLayout, backup: &Path) {
    if let Err(e) = CandidateMarker::remove(live) {
        warn!("failed to remove candidate marker from {}: {e}", live.root().display());
    }
    remove_backup(wal, live, backup);
}

fn swap(
    live: &InstallLayout,
    wal: &WriteAheadLog,
    op_id: &str,
    staging: &Path,
) -> Result<PathBuf, CoreError> {
    let root = live.root();
    let promotion = live.promotion_dir(op_id)?;
    let backup = live.backup_dir(op_id)?;

    wal.add_rollback_step(
        op_id,
        RollbackStep::MoveDir {
            from: promotion.clone(),
            to: staging.to_path_buf(),
        },
    )?;
    fs::rename(staging, &promotion)?;

    wal.add_rollback_step(
        op_id,
        RollbackStep::MoveDir {
            from: backup.clone(),
            to: root.to_path_buf(),
        },
    )?;
    fs::rename(root, &backup)?;

    wal.add_rollback_step(
        op_id,
        RollbackStep::MoveDir {
            from: root.to_path_buf(),
            to: promotion.clone(),
        },
    )?;
    fs::rename(&promotion, root)?;

    if let Some(parent) = root.parent() {
        fsync_dir(parent)?;
    }
    debug!("swapped {} into {}", staging.display(), root.display());
    Ok(backup)
}

/// Best effort: once the Cleanup op has begun, a leftover backup is removed
/// by WAL recovery.
fn remove_backup(wal: &WriteAheadLog, live: &InstallLayout, backup: &Path) {
    let cleanup = || -> Result<(), CoreError> {
        let op_id = wal.begin(WalOpKind::Cleanup, live.root())?;
        wal.add_rollback_step(&op_id, RollbackStep::RemoveDir(backup.to_path_buf()))?;
        fs::remove_dir_all(backup)?;
        wal.commit(&op_id)?;
        Ok(())
    };
    if let Err(e) = cleanup() {
        warn!("failed to remove previous tree {}: {e}", backup.display());
    }
}

/// Delete a prepared candidate. Returns `false` if `staging` does not exist.
pub fn discard(staging: &Path) -> Result<bool, CoreError> {
    if !staging.exists() {
        return Ok(false);
    }
    load_marker(&InstallLayout::new(staging))?;
    fs::remove_dir_all(staging)?;
    info!("discarded candidate {}", staging.display());
    Ok(true)
}
