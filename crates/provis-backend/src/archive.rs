use crate::BackendError;
use provis_schema::{parse_feature_pack_str, FeaturePackSpec};
use std::fs;
use std::io::Read;
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};
use tracing::warn;

const DESCRIPTOR: &str = "feature-pack.toml";
const CONTENT_DIR: &str = "content";

/// Pack a directory into a deterministic tar archive (sorted entries,
/// zeroed mtime and ownership).
pub fn pack_dir(source_dir: &Path) -> Result<Vec<u8>, BackendError> {
    let mut entries = collect_entries(source_dir, source_dir)?;
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut ar = tar::Builder::new(Vec::new());
    ar.follow_symlinks(false);

    for (rel_path, full_path) in &entries {
        let ft = full_path.symlink_metadata()?.file_type();
        if ft.is_file() {
            let data = fs::read(full_path)?;
            let mut header = make_header(full_path, tar::EntryType::Regular)?;
            header.set_size(data.len() as u64);
            header.set_cksum();
            ar.append_data(&mut header, rel_path, data.as_slice())?;
        } else if ft.is_dir() {
            let mut header = make_header(full_path, tar::EntryType::Directory)?;
            header.set_size(0);
            header.set_cksum();
            ar.append_data(&mut header, format!("{rel_path}/"), &[] as &[u8])?;
        } else {
            warn!("skipping unsupported file type: {rel_path}");
        }
    }

    Ok(ar.into_inner()?)
}

/// Read and parse `feature-pack.toml` from an archive.
pub fn read_descriptor(archive: &Path) -> Result<FeaturePackSpec, BackendError> {
    let mut ar = tar::Archive::new(fs::File::open(archive)?);
    for entry in ar.entries()? {
        let mut entry = entry?;
        if normalized(&entry.path()?) == Path::new(DESCRIPTOR) {
            let mut content = String::new();
            entry.read_to_string(&mut content)?;
            return Ok(parse_feature_pack_str(&content)?);
        }
    }
    Err(BackendError::MissingDescriptor(
        archive.display().to_string(),
    ))
}

/// Extract the `content/` subtree of an archive into `target`.
/// Returns the number of files written.
pub fn unpack_content(archive: &Path, target: &Path) -> Result<usize, BackendError> {
    fs::create_dir_all(target)?;
    let mut ar = tar::Archive::new(fs::File::open(archive)?);
    let mut written = 0;
    for entry in ar.entries()? {
        let mut entry = entry?;
        let path = normalized(&entry.path()?);
        let Ok(rel) = path.strip_prefix(CONTENT_DIR) else {
            continue;
        };
        if rel.as_os_str().is_empty() {
            continue;
        }
        if !rel.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(BackendError::UnsafePath(path.display().to_string()));
        }
        let dest = target.join(rel);
        match entry.header().entry_type() {
            tar::EntryType::Directory => fs::create_dir_all(&dest)?,
            tar::EntryType::Regular => {
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)?;
                }
                entry.unpack(&dest)?;
                written += 1;
            }
            other => warn!("skipping {} entry {}", entry_kind(other), path.display()),
        }
    }
    Ok(written)
}

fn entry_kind(kind: tar::EntryType) -> &'static str {
    if kind.is_symlink() {
        "symlink"
    } else if kind.is_hard_link() {
        "hard link"
    } else {
        "special"
    }
}

/// Strip a leading `./` so archives built with either convention match.
fn normalized(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

fn collect_entries(root: &Path, current: &Path) -> Result<Vec<(String, PathBuf)>, BackendError> {
    let mut result = Vec::new();
    if !current.exists() {
        return Ok(result);
    }
    for entry in fs::read_dir(current)? {
        let full = entry?.path();
        let rel = full
            .strip_prefix(root)
            .map_err(|e| BackendError::Io(std::io::Error::other(format!("path strip: {e}"))))?
            .to_string_lossy()
            .to_string();

        if full.symlink_metadata()?.is_dir() {
            result.push((rel, full.clone()));
            result.extend(collect_entries(root, &full)?);
        } else {
            result.push((rel, full));
        }
    }
    Ok(result)
}

fn make_header(full_path: &Path, entry_type: tar::EntryType) -> Result<tar::Header, BackendError> {
    let meta = full_path.symlink_metadata()?;
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mode(meta.permissions().mode());
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pack(dir: &Path) -> PathBuf {
        let src = dir.join("src");
        fs::create_dir_all(src.join("content").join("modules")).unwrap();
        fs::write(
            src.join(DESCRIPTOR),
            "[feature_pack]\nlocation = \"org.test:base-pack:1.0.0\"\n",
        )
        .unwrap();
        fs::write(src.join("content").join("modules").join("base.txt"), "base").unwrap();
        let archive = dir.join("base-pack-1.0.0.tar");
        fs::write(&archive, pack_dir(&src).unwrap()).unwrap();
        archive
    }

    #[test]
    fn pack_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        sample_pack(dir.path());
        let a = pack_dir(&dir.path().join("src")).unwrap();
        let b = pack_dir(&dir.path().join("src")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn reads_descriptor_from_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive = sample_pack(dir.path());
        let spec = read_descriptor(&archive).unwrap();
        assert_eq!(spec.location().artifact_id(), "base-pack");
    }

    #[test]
    fn unpacks_only_content() {
        let dir = tempfile::tempdir().unwrap();
        let archive = sample_pack(dir.path());
        let target = dir.path().join("target");
        let written = unpack_content(&archive, &target).unwrap();
        assert_eq!(written, 1);
        assert_eq!(
            fs::read_to_string(target.join("modules").join("base.txt")).unwrap(),
            "base"
        );
        assert!(!target.join(DESCRIPTOR).exists());
    }

    #[test]
    fn archive_without_descriptor_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("content")).unwrap();
        let archive = dir.path().join("empty.tar");
        fs::write(&archive, pack_dir(&src).unwrap()).unwrap();
        assert!(matches!(
            read_descriptor(&archive),
            Err(BackendError::MissingDescriptor(_))
        ));
    }
}
