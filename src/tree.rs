//! Tree Differ (§4.4): recursively compares two merged filesystem trees and produces
//! a [`Delta`] — an additions tree plus ordered removed-file/removed-dir path lists.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

/// The result of diffing a base tree against an update tree.
#[derive(Debug)]
pub struct Delta {
    /// Root of the materialized additions subtree.
    pub additions_root: PathBuf,
    /// Absolute container paths of files present in base but not (in the same form)
    /// in update.
    pub removed_files: Vec<String>,
    /// Absolute container paths of directories present in base but not in update.
    pub removed_dirs: Vec<String>,
}

impl Delta {
    pub fn has_additions(&self) -> bool {
        match fs::read_dir(&self.additions_root) {
            Ok(mut entries) => entries.next().is_some(),
            Err(_) => false,
        }
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
enum Kind {
    File,
    Dir,
    Symlink,
}

fn kind_of(meta: &fs::Metadata) -> Kind {
    let ft = meta.file_type();
    if ft.is_symlink() {
        Kind::Symlink
    } else if ft.is_dir() {
        Kind::Dir
    } else {
        Kind::File
    }
}

fn list_names(dir: &Path) -> Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))? {
        let entry = entry?;
        if let Some(n) = entry.file_name().to_str() {
            names.insert(n.to_string());
        }
    }
    Ok(names)
}

fn files_equal(a: &Path, b: &Path) -> Result<bool> {
    let meta_a = fs::metadata(a)?;
    let meta_b = fs::metadata(b)?;
    if meta_a.len() != meta_b.len() {
        return Ok(false);
    }
    let mut ra = BufReader::new(File::open(a)?);
    let mut rb = BufReader::new(File::open(b)?);
    let mut buf_a = [0u8; 8192];
    let mut buf_b = [0u8; 8192];
    loop {
        let na = ra.read(&mut buf_a)?;
        let nb = rb.read(&mut buf_b)?;
        if na != nb {
            return Ok(false);
        }
        if na == 0 {
            return Ok(true);
        }
        if buf_a[..na] != buf_b[..nb] {
            return Ok(false);
        }
    }
}

/// Recursively copies `src` into `dst`, preserving directory structure and symlinks,
/// hard-linking regular files where possible and falling back to a copy.
fn materialize(src: &Path, dst: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(src)
        .with_context(|| format!("failed to stat {}", src.display()))?;

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    match kind_of(&meta) {
        Kind::Symlink => {
            let target = fs::read_link(src)?;
            #[cfg(unix)]
            std::os::unix::fs::symlink(&target, dst).with_context(|| {
                format!("failed to create symlink {}", dst.display())
            })?;
        }
        Kind::Dir => {
            fs::create_dir_all(dst)?;
            let mut names: Vec<_> = list_names(src)?.into_iter().collect();
            names.sort();
            for name in names {
                materialize(&src.join(&name), &dst.join(&name))?;
            }
        }
        Kind::File => {
            if dst.exists() {
                fs::remove_file(dst).ok();
            }
            if fs::hard_link(src, dst).is_err() {
                fs::copy(src, dst)
                    .with_context(|| format!("failed to copy {} to {}", src.display(), dst.display()))?;
            }
        }
    }
    Ok(())
}

fn abs_path(rel: &Path) -> String {
    let s = rel.to_string_lossy().replace('\\', "/");
    format!("/{}", s)
}

/// Recursively diffs `base_root` against `update_root`, materializing additions
/// under `out_root` (must be empty) and collecting removed-file/removed-dir paths.
pub fn diff_trees(base_root: &Path, update_root: &Path, out_root: &Path) -> Result<Delta> {
    fs::create_dir_all(out_root)?;
    let mut removed_files = Vec::new();
    let mut removed_dirs = Vec::new();
    diff_dir(
        base_root,
        update_root,
        out_root,
        Path::new(""),
        &mut removed_files,
        &mut removed_dirs,
    )?;
    Ok(Delta {
        additions_root: out_root.to_path_buf(),
        removed_files,
        removed_dirs,
    })
}

fn diff_dir(
    rb: &Path,
    ru: &Path,
    o: &Path,
    rel: &Path,
    removed_files: &mut Vec<String>,
    removed_dirs: &mut Vec<String>,
) -> Result<()> {
    let base_names = list_names(rb)?;
    let update_names = list_names(ru)?;
    let all_names: BTreeSet<&String> = base_names.iter().chain(update_names.iter()).collect();

    for name in all_names {
        let in_base = base_names.contains(name);
        let in_update = update_names.contains(name);
        let b_path = rb.join(name);
        let u_path = ru.join(name);
        let rel_path = rel.join(name);

        match (in_base, in_update) {
            (false, true) => {
                materialize(&u_path, &o.join(name))?;
            }
            (true, false) => {
                let b_meta = fs::symlink_metadata(&b_path)?;
                match kind_of(&b_meta) {
                    Kind::Dir => removed_dirs.push(abs_path(&rel_path)),
                    _ => removed_files.push(abs_path(&rel_path)),
                }
            }
            (true, true) => {
                let b_meta = fs::symlink_metadata(&b_path)?;
                let u_meta = fs::symlink_metadata(&u_path)?;
                let b_kind = kind_of(&b_meta);
                let u_kind = kind_of(&u_meta);

                if b_kind == u_kind {
                    match b_kind {
                        Kind::Dir => {
                            diff_dir(&b_path, &u_path, &o.join(name), &rel_path, removed_files, removed_dirs)?;
                        }
                        Kind::Symlink => {
                            let b_target = fs::read_link(&b_path)?;
                            let u_target = fs::read_link(&u_path)?;
                            if b_target != u_target {
                                materialize(&u_path, &o.join(name))?;
                            }
                        }
                        Kind::File => {
                            if !files_equal(&b_path, &u_path)? {
                                materialize(&u_path, &o.join(name))?;
                            }
                        }
                    }
                } else {
                    // Funny entry: base and update disagree on kind. Delete base
                    // (unless it's a symlink, which the addition overwrites for free)
                    // and materialize update's entry regardless.
                    match b_kind {
                        Kind::Dir => removed_dirs.push(abs_path(&rel_path)),
                        Kind::Symlink => {}
                        Kind::File => removed_files.push(abs_path(&rel_path)),
                    }
                    materialize(&u_path, &o.join(name))?;
                }
            }
            (false, false) => unreachable!("name came from the union of both directories"),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    fn write_file(path: &Path, content: &[u8]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn no_spurious_diff_for_identical_trees() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base");
        let update = dir.path().join("update");
        let out = dir.path().join("out");
        write_file(&base.join("etc/same.conf"), b"v1");
        write_file(&update.join("etc/same.conf"), b"v1");

        let delta = diff_trees(&base, &update, &out).unwrap();
        assert!(!delta.has_additions());
        assert!(delta.removed_files.is_empty());
        assert!(delta.removed_dirs.is_empty());
    }

    #[test]
    fn single_file_added() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base");
        let update = dir.path().join("update");
        let out = dir.path().join("out");
        fs::create_dir_all(&base).unwrap();
        write_file(&update.join("etc/newconf"), b"v2\n");

        let delta = diff_trees(&base, &update, &out).unwrap();
        assert!(delta.has_additions());
        assert_eq!(fs::read(out.join("etc/newconf")).unwrap(), b"v2\n");
        assert!(delta.removed_files.is_empty());
    }

    #[test]
    fn single_file_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base");
        let update = dir.path().join("update");
        let out = dir.path().join("out");
        write_file(&base.join("etc/oldconf"), b"v1");
        fs::create_dir_all(&update).unwrap();

        let delta = diff_trees(&base, &update, &out).unwrap();
        assert_eq!(delta.removed_files, vec!["/etc/oldconf".to_string()]);
        assert!(!delta.has_additions());
    }

    #[test]
    fn directory_replaces_file_is_funny_entry() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base");
        let update = dir.path().join("update");
        let out = dir.path().join("out");
        write_file(&base.join("x"), b"file-content");
        write_file(&update.join("x/child"), b"dir-content");

        let delta = diff_trees(&base, &update, &out).unwrap();
        assert_eq!(delta.removed_files, vec!["/x".to_string()]);
        assert!(delta.removed_dirs.is_empty());
        assert!(out.join("x/child").exists());
    }

    #[test]
    fn symlink_target_change_is_additions_only() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base");
        let update = dir.path().join("update");
        let out = dir.path().join("out");
        fs::create_dir_all(base.join("bin")).unwrap();
        fs::create_dir_all(update.join("bin")).unwrap();
        symlink("/bin/dash", base.join("bin/sh")).unwrap();
        symlink("/bin/bash", update.join("bin/sh")).unwrap();

        let delta = diff_trees(&base, &update, &out).unwrap();
        assert!(delta.removed_files.is_empty());
        assert!(delta.removed_dirs.is_empty());
        assert_eq!(
            fs::read_link(out.join("bin/sh")).unwrap(),
            Path::new("/bin/bash")
        );
    }

    #[test]
    fn base_only_directory_is_not_recursed_into() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base");
        let update = dir.path().join("update");
        let out = dir.path().join("out");
        write_file(&base.join("var/cache/a"), b"1");
        write_file(&base.join("var/cache/b"), b"2");
        fs::create_dir_all(&update).unwrap();

        let delta = diff_trees(&base, &update, &out).unwrap();
        assert_eq!(delta.removed_dirs, vec!["/var/cache".to_string()]);
        assert!(delta.removed_files.is_empty());
    }

    #[test]
    fn funny_symlink_base_is_overwritten_without_explicit_delete() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base");
        let update = dir.path().join("update");
        let out = dir.path().join("out");
        fs::create_dir_all(&base).unwrap();
        symlink("/nonexistent", base.join("link")).unwrap();
        write_file(&update.join("link"), b"now-a-file");

        let delta = diff_trees(&base, &update, &out).unwrap();
        assert!(delta.removed_files.is_empty());
        assert!(delta.removed_dirs.is_empty());
        assert_eq!(fs::read(out.join("link")).unwrap(), b"now-a-file");
    }
}
