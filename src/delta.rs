//! Delta Packager (§4.5): packages the additions tree into a single tar archive
//! with its root remapped to `/`, producing byte-identical output across runs by
//! pinning every entry's mtime to a fixed epoch.

use crate::tree::Delta;
use anyhow::{Context, Result};
use std::fs::{self, File};
use std::path::Path;
use tar_rs::{Builder, EntryType, Header};
use walkdir::WalkDir;

const FIXED_MTIME: u64 = 0;

/// Packages `delta.additions_root` into `out_tar`. Returns `None` (and writes
/// nothing) if the additions tree is empty.
pub fn package_additions(delta: &Delta, out_tar: &Path) -> Result<Option<u64>> {
    if !delta.has_additions() {
        return Ok(None);
    }

    let file = File::create(out_tar)
        .with_context(|| format!("failed to create {}", out_tar.display()))?;
    let mut builder = Builder::new(file);

    let walker = WalkDir::new(&delta.additions_root)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()))
        .min_depth(1);

    for entry in walker {
        let entry = entry.context("failed to walk additions tree")?;
        let path = entry.path();
        let rel = path
            .strip_prefix(&delta.additions_root)
            .expect("walked entry is under additions_root");
        let meta = fs::symlink_metadata(path)
            .with_context(|| format!("failed to stat {}", path.display()))?;

        let mut header = Header::new_gnu();
        header.set_mtime(FIXED_MTIME);

        if meta.file_type().is_symlink() {
            let target = fs::read_link(path)?;
            header.set_entry_type(EntryType::Symlink);
            header.set_size(0);
            header.set_mode(0o777);
            header.set_link_name(&target)?;
            header.set_cksum();
            builder.append_data(&mut header, rel, std::io::empty())?;
        } else if meta.is_dir() {
            header.set_entry_type(EntryType::Directory);
            header.set_size(0);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append_data(&mut header, rel, std::io::empty())?;
        } else {
            header.set_entry_type(EntryType::Regular);
            header.set_size(meta.len());
            header.set_mode(0o644);
            header.set_cksum();
            let mut f = File::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            builder.append_data(&mut header, rel, &mut f)?;
        }
    }

    builder.finish().context("failed to finalize tar archive")?;
    let size = fs::metadata(out_tar)?.len();
    Ok(Some(size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::diff_trees;

    #[test]
    fn empty_additions_produces_no_tarball() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base");
        let update = dir.path().join("update");
        let out = dir.path().join("out");
        fs::create_dir_all(&base).unwrap();
        fs::create_dir_all(&update).unwrap();
        let delta = diff_trees(&base, &update, &out).unwrap();

        let tarball = dir.path().join("files.tar");
        let size = package_additions(&delta, &tarball).unwrap();
        assert!(size.is_none());
        assert!(!tarball.exists());
    }

    #[test]
    fn packages_added_file_deterministically() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base");
        let update = dir.path().join("update");
        let out = dir.path().join("out");
        fs::create_dir_all(&base).unwrap();
        fs::create_dir_all(update.join("etc")).unwrap();
        fs::write(update.join("etc/newconf"), b"v2\n").unwrap();
        let delta = diff_trees(&base, &update, &out).unwrap();

        let tarball_a = dir.path().join("a.tar");
        let tarball_b = dir.path().join("b.tar");
        let size_a = package_additions(&delta, &tarball_a).unwrap().unwrap();
        let size_b = package_additions(&delta, &tarball_b).unwrap().unwrap();
        assert_eq!(size_a, size_b);
        assert_eq!(fs::read(&tarball_a).unwrap(), fs::read(&tarball_b).unwrap());
    }
}
