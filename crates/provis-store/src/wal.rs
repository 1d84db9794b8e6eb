use crate::layout::InstallLayout;
use crate::{fsync_dir, write_atomic, StoreError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Disambiguates entries begun within the same millisecond.
static OP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// A single rollback step that can undo part of an operation.
///
/// Steps are recorded *before* the side effect they undo, so every step
/// must be a no-op when that side effect never happened.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum RollbackStep {
    /// Remove a directory tree (e.g. a half-built staging dir).
    RemoveDir(PathBuf),
    /// Remove a single file.
    RemoveFile(PathBuf),
    /// Rename `from` back to `to`, if `from` exists and `to` does not.
    MoveDir { from: PathBuf, to: PathBuf },
}

/// The type of mutating operation being tracked.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WalOpKind {
    Prepare,
    Apply,
    Cleanup,
}

impl std::fmt::Display for WalOpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WalOpKind::Prepare => write!(f, "prepare"),
            WalOpKind::Apply => write!(f, "apply"),
            WalOpKind::Cleanup => write!(f, "cleanup"),
        }
    }
}

/// A WAL entry representing an in-flight operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry {
    pub op_id: String,
    pub kind: WalOpKind,
    pub target: PathBuf,
    pub timestamp: String,
    pub rollback_steps: Vec<RollbackStep>,
}

/// Write-ahead log for crash recovery.
///
/// Staging and promotion create a WAL entry before starting work, append
/// rollback steps ahead of each side effect, and remove the entry on
/// successful completion. Incomplete entries are rolled back on the next
/// start.
pub struct WriteAheadLog {
    wal_dir: PathBuf,
}

impl WriteAheadLog {
    pub fn new(layout: &InstallLayout) -> Result<Self, StoreError> {
        Ok(Self {
            wal_dir: layout.wal_dir()?,
        })
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.wal_dir)?;
        Ok(())
    }

    /// Begin a new WAL entry for an operation. Returns the op_id.
    pub fn begin(&self, kind: WalOpKind, target: &Path) -> Result<String, StoreError> {
        let seq = OP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let op_id = format!(
            "{}-{}-{seq}",
            chrono::Utc::now().format("%Y%m%d%H%M%S%3f"),
            &blake3::hash(target.as_os_str().as_encoded_bytes()).to_hex()[..8]
        );
        let entry = WalEntry {
            op_id: op_id.clone(),
            kind,
            target: target.to_path_buf(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            rollback_steps: Vec::new(),
        };
        self.write_entry(&entry)?;
        debug!(
            "WAL begin: {kind} for {} (op_id={op_id})",
            target.display()
        );
        Ok(op_id)
    }

    pub fn add_rollback_step(&self, op_id: &str, step: RollbackStep) -> Result<(), StoreError> {
        let mut entry = self.read_entry(op_id)?;
        entry.rollback_steps.push(step);
        self.write_entry(&entry)
    }

    /// Commit (remove) a WAL entry after successful completion.
    pub fn commit(&self, op_id: &str) -> Result<(), StoreError> {
        let path = self.entry_path(op_id);
        if path.exists() {
            fs::remove_file(&path)?;
            debug!("WAL commit: {op_id}");
        }
        Ok(())
    }

    /// Undo one in-flight operation right away and drop its entry.
    pub fn rollback(&self, op_id: &str) -> Result<(), StoreError> {
        let entry = self.read_entry(op_id)?;
        debug!("WAL rollback: {} (op_id={op_id})", entry.kind);
        rollback_entry(&entry);
        self.commit(op_id)
    }

    pub fn list_incomplete(&self) -> Result<Vec<WalEntry>, StoreError> {
        if !self.wal_dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for dir_entry in fs::read_dir(&self.wal_dir)? {
            let path = dir_entry?.path();
            if !path.extension().is_some_and(|e| e == "json") {
                continue;
            }
            match fs::read_to_string(&path)
                .map_err(StoreError::from)
                .and_then(|c| serde_json::from_str::<WalEntry>(&c).map_err(StoreError::from))
            {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!("corrupt WAL entry {}: {e}", path.display());
                    let _ = fs::remove_file(&path);
                }
            }
        }
        entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(entries)
    }

    /// Roll back all incomplete WAL entries.
    /// Returns the number of entries rolled back.
    pub fn recover(&self) -> Result<usize, StoreError> {
        let entries = self.list_incomplete()?;
        let count = entries.len();
        for entry in &entries {
            info!(
                "WAL recovery: rolling back {} on {} (op_id={})",
                entry.kind,
                entry.target.display(),
                entry.op_id
            );
            rollback_entry(entry);
            let _ = fs::remove_file(self.entry_path(&entry.op_id));
        }
        if count > 0 {
            info!("WAL recovery complete: {count} entries rolled back");
        }
        Ok(count)
    }

    fn entry_path(&self, op_id: &str) -> PathBuf {
        self.wal_dir.join(format!("{op_id}.json"))
    }

    fn write_entry(&self, entry: &WalEntry) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(entry)?;
        write_atomic(&self.entry_path(&entry.op_id), content.as_bytes())
    }

    fn read_entry(&self, op_id: &str) -> Result<WalEntry, StoreError> {
        let content = fs::read_to_string(self.entry_path(op_id))?;
        Ok(serde_json::from_str(&content)?)
    }
}

fn rollback_entry(entry: &WalEntry) {
    // Reverse order: later side effects are undone first.
    for step in entry.rollback_steps.iter().rev() {
        match step {
            RollbackStep::RemoveDir(path) => {
                if path.exists() {
                    if let Err(e) = fs::remove_dir_all(path) {
                        warn!("WAL rollback: failed to remove dir {}: {e}", path.display());
                    } else {
                        debug!("WAL rollback: removed dir {}", path.display());
                    }
                }
            }
            RollbackStep::RemoveFile(path) => {
                if path.exists() {
                    if let Err(e) = fs::remove_file(path) {
                        warn!(
                            "WAL rollback: failed to remove file {}: {e}",
                            path.display()
                        );
                    } else {
                        debug!("WAL rollback: removed file {}", path.display());
                    }
                }
            }
            RollbackStep::MoveDir { from, to } => {
                if !from.exists() || to.exists() {
                    continue;
                }
                if let Err(e) = fs::rename(from, to) {
                    warn!(
                        "WAL rollback: failed to move {} back to {}: {e}",
                        from.display(),
                        to.display()
                    );
                    continue;
                }
                if let Some(parent) = to.parent() {
                    let _ = fsync_dir(parent);
                }
                debug!(
                    "WAL rollback: moved {} back to {}",
                    from.display(),
                    to.display()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, InstallLayout, WriteAheadLog) {
        let dir = tempfile::tempdir().unwrap();
        let layout = InstallLayout::new(dir.path().join("server"));
        layout.initialize().unwrap();
        let wal = WriteAheadLog::new(&layout).unwrap();
        wal.initialize().unwrap();
        (dir, layout, wal)
    }

    #[test]
    fn begin_creates_entry() {
        let (_dir, layout, wal) = setup();
        let op_id = wal.begin(WalOpKind::Prepare, layout.root()).unwrap();
        assert!(!op_id.is_empty());
        let entries = wal.list_incomplete().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].target, layout.root());
        assert_eq!(entries[0].kind, WalOpKind::Prepare);
    }

    #[test]
    fn successful_ops_leave_zero_entries() {
        let (_dir, layout, wal) = setup();
        let op1 = wal.begin(WalOpKind::Prepare, layout.root()).unwrap();
        let op2 = wal.begin(WalOpKind::Apply, layout.root()).unwrap();
        wal.commit(&op1).unwrap();
        wal.commit(&op2).unwrap();
        assert!(wal.list_incomplete().unwrap().is_empty());
    }

    #[test]
    fn add_rollback_step_persists() {
        let (_dir, layout, wal) = setup();
        let op_id = wal.begin(WalOpKind::Prepare, layout.root()).unwrap();
        wal.add_rollback_step(&op_id, RollbackStep::RemoveDir(PathBuf::from("/tmp/fake")))
            .unwrap();
        let entries = wal.list_incomplete().unwrap();
        assert_eq!(
            entries[0].rollback_steps,
            vec![RollbackStep::RemoveDir(PathBuf::from("/tmp/fake"))]
        );
    }

    #[test]
    fn recover_removes_partial_staging() {
        let (dir, layout, wal) = setup();
        let op_id = wal.begin(WalOpKind::Prepare, layout.root()).unwrap();

        let staging = dir.path().join("staging");
        fs::create_dir_all(staging.join("content")).unwrap();
        fs::write(staging.join("content").join("file.txt"), "data").unwrap();
        wal.add_rollback_step(&op_id, RollbackStep::RemoveDir(staging.clone()))
            .unwrap();
        let stray = dir.path().join("stray.json");
        fs::write(&stray, "{}").unwrap();
        wal.add_rollback_step(&op_id, RollbackStep::RemoveFile(stray.clone()))
            .unwrap();

        assert_eq!(wal.recover().unwrap(), 1);
        assert!(!staging.exists());
        assert!(!stray.exists());
        assert!(wal.list_incomplete().unwrap().is_empty());
    }

    #[test]
    fn recover_restores_live_tree_swapped_out_mid_promotion() {
        let (dir, layout, wal) = setup();
        let live = layout.root().to_path_buf();
        fs::write(live.join("marker"), "live").unwrap();
        let staging = dir.path().join("staging");
        fs::create_dir_all(&staging).unwrap();
        fs::write(staging.join("marker"), "candidate").unwrap();

        let op_id = wal.begin(WalOpKind::Apply, &live).unwrap();
        let promotion = layout.promotion_dir(&op_id).unwrap();
        let backup = layout.backup_dir(&op_id).unwrap();

        for (from, to) in [
            (&promotion, &staging),
            (&backup, &live),
            (&live, &promotion),
        ] {
            wal.add_rollback_step(
                &op_id,
                RollbackStep::MoveDir {
                    from: from.clone(),
                    to: to.clone(),
                },
            )
            .unwrap();
            fs::rename(to, from).unwrap();
        }
        assert_eq!(fs::read_to_string(live.join("marker")).unwrap(), "candidate");

        assert_eq!(wal.recover().unwrap(), 1);
        assert_eq!(fs::read_to_string(live.join("marker")).unwrap(), "live");
        assert_eq!(
            fs::read_to_string(staging.join("marker")).unwrap(),
            "candidate"
        );
        assert!(!backup.exists());
        assert!(!promotion.exists());
    }

    #[test]
    fn move_steps_for_renames_that_never_happened_are_skipped() {
        let (dir, layout, wal) = setup();
        let live = layout.root().to_path_buf();
        let op_id = wal.begin(WalOpKind::Apply, &live).unwrap();
        let backup = layout.backup_dir(&op_id).unwrap();
        wal.add_rollback_step(
            &op_id,
            RollbackStep::MoveDir {
                from: backup.clone(),
                to: live.clone(),
            },
        )
        .unwrap();

        assert_eq!(wal.recover().unwrap(), 1);
        assert!(live.is_dir());
        assert!(!backup.exists());
        assert!(dir.path().join("server").join(".installation").is_dir());
    }

    #[test]
    fn rollback_undoes_single_entry() {
        let (dir, layout, wal) = setup();
        let keep = wal.begin(WalOpKind::Prepare, layout.root()).unwrap();
        let undo = wal.begin(WalOpKind::Prepare, layout.root()).unwrap();
        let staging = dir.path().join("staging");
        fs::create_dir_all(&staging).unwrap();
        wal.add_rollback_step(&undo, RollbackStep::RemoveDir(staging.clone()))
            .unwrap();

        wal.rollback(&undo).unwrap();
        assert!(!staging.exists());
        let remaining = wal.list_incomplete().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].op_id, keep);
    }

    #[test]
    fn recover_with_no_entries_is_noop() {
        let (_dir, _layout, wal) = setup();
        assert_eq!(wal.recover().unwrap(), 0);
    }

    #[test]
    fn recover_corrupt_wal_entry_is_removed() {
        let (dir, layout, wal) = setup();
        let wal_dir = layout.wal_dir().unwrap();
        fs::write(wal_dir.join("corrupt-op.json"), "THIS IS NOT JSON{{{").unwrap();

        let op_id = wal.begin(WalOpKind::Prepare, layout.root()).unwrap();
        let orphan = dir.path().join("orphan_from_valid");
        fs::create_dir_all(&orphan).unwrap();
        wal.add_rollback_step(&op_id, RollbackStep::RemoveDir(orphan.clone()))
            .unwrap();

        assert_eq!(
            wal.recover().unwrap(),
            1,
            "only the valid entry should be counted as rolled back"
        );
        assert!(!orphan.exists(), "valid rollback must still execute");
        assert!(!wal_dir.join("corrupt-op.json").exists());
        assert!(wal.list_incomplete().unwrap().is_empty());
    }

    #[test]
    fn op_kind_display() {
        assert_eq!(WalOpKind::Prepare.to_string(), "prepare");
        assert_eq!(WalOpKind::Apply.to_string(), "apply");
        assert_eq!(WalOpKind::Cleanup.to_string(), "cleanup");
    }
}
