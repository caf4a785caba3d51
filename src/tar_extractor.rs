//! Low-level tar extraction, shared by archive unpacking and layer merging.
//!
//! [`unpack_flat`] lays an archive's own entries (manifest, config, layer blobs) flat
//! into a staging directory — no whiteout handling, since those entries aren't a
//! layer's rootfs contents.
//!
//! [`extract_tar`] extracts a single *layer* tarball into a merged-tree directory,
//! applying `.wh.*`/`.wh..wh..opq` whiteout markers inline as they are encountered in
//! the tar stream, against whatever the directory already holds from prior layers
//! (see §4.1/§9 on whiteout ordering).

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};
use tar_rs as tar;

/// Normalizes a path from a tar archive to be safe for extraction.
/// Removes any attempts to escape the root directory.
fn normalize_tar_path(p: &Path) -> PathBuf {
    let mut out = PathBuf::new();

    for comp in p.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(c) => out.push(c),
            Component::RootDir | Component::Prefix(_) => {}
        }
    }

    out
}

fn open_possibly_gzipped(tar_path: &Path) -> Result<tar::Archive<Box<dyn Read>>> {
    let file = File::open(tar_path)
        .with_context(|| format!("failed to open tar file: {}", tar_path.display()))?;

    let mut buf_reader = BufReader::new(file);
    let mut magic_bytes = [0u8; 2];
    let is_gzip = buf_reader.read_exact(&mut magic_bytes).is_ok() && magic_bytes == [0x1f, 0x8b];

    let file = File::open(tar_path)?;
    Ok(if is_gzip {
        tar::Archive::new(Box::new(GzDecoder::new(file)))
    } else {
        tar::Archive::new(Box::new(file))
    })
}

/// Unpacks an archive's own top-level entries (manifest, config, layer blobs) into
/// `dest`, preserving relative paths as-is. Plain, no whiteout interpretation.
pub fn unpack_flat(tar_path: &Path, dest: &Path) -> Result<()> {
    let mut archive = open_possibly_gzipped(tar_path)?;
    archive
        .unpack(dest)
        .with_context(|| format!("failed to unpack archive {}", tar_path.display()))
}

/// Attempts to create a hardlink, falling back to a copy if hardlinks aren't
/// supported by the destination filesystem.
fn link_or_copy(target: &Path, dest: &Path) -> Result<()> {
    if dest.exists() {
        fs::remove_file(dest)
            .with_context(|| format!("failed to remove existing file: {}", dest.display()))?;
    }

    if let Err(e) = fs::hard_link(target, dest) {
        log::debug!(
            "hardlink failed ({}), falling back to copy: {} -> {}",
            e,
            target.display(),
            dest.display()
        );
        fs::copy(target, dest)
            .with_context(|| format!("failed to copy {} to {}", target.display(), dest.display()))?;
    }
    Ok(())
}

struct PendingHardlink {
    dest: PathBuf,
    target: PathBuf,
}

fn apply_whiteout(extract_dir: &Path, rel_path: &Path) -> Result<bool> {
    let file_name = match rel_path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return Ok(false),
    };

    if file_name == ".wh..wh..opq" {
        if let Some(parent) = rel_path.parent() {
            let opaque_dir = extract_dir.join(parent);
            if opaque_dir.is_dir() {
                log::debug!("opaque directory marker, clearing: {}", opaque_dir.display());
                for entry in fs::read_dir(&opaque_dir)? {
                    let path = entry?.path();
                    if path.is_dir() {
                        fs::remove_dir_all(&path).ok();
                    } else {
                        fs::remove_file(&path).ok();
                    }
                }
            }
        }
        return Ok(true);
    }

    if let Some(deleted_name) = file_name.strip_prefix(".wh.") {
        let parent = rel_path.parent().unwrap_or_else(|| Path::new(""));
        let deleted_path = extract_dir.join(parent).join(deleted_name);
        if deleted_path.symlink_metadata().is_ok() {
            log::debug!("whiteout marker, deleting: {}", deleted_path.display());
            if deleted_path.is_dir() && !deleted_path.is_symlink() {
                fs::remove_dir_all(&deleted_path).ok();
            } else {
                fs::remove_file(&deleted_path).ok();
            }
        }
        return Ok(true);
    }

    Ok(false)
}

/// Extracts one layer's tar stream (plain or gzipped) into `extract_dir`, which
/// already holds the result of applying prior layers. Whiteout markers are resolved
/// per-entry, in stream order, against that existing state — not batched at the end.
pub fn extract_tar(tar_path: &Path, extract_dir: &Path) -> Result<()> {
    let mut archive = open_possibly_gzipped(tar_path)?;

    let mut pending_hardlinks = Vec::new();

    for entry_result in archive.entries()? {
        let mut entry = entry_result.context("failed to read tar entry")?;
        let header = entry.header();
        let entry_type = header.entry_type();

        let tar_path = entry.path().context("failed to get entry path")?.into_owned();
        let rel_path = normalize_tar_path(&tar_path);

        if apply_whiteout(extract_dir, &rel_path)? {
            continue;
        }

        let dest = extract_dir.join(&rel_path);

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory: {}", parent.display()))?;
        }

        match entry_type {
            tar::EntryType::Directory => {
                fs::create_dir_all(&dest)
                    .with_context(|| format!("failed to create directory: {}", dest.display()))?;
            }
            tar::EntryType::Regular | tar::EntryType::Continuous => {
                if let Ok(meta) = fs::symlink_metadata(&dest) {
                    if meta.is_dir() && !meta.file_type().is_symlink() {
                        fs::remove_dir_all(&dest).ok();
                    } else {
                        fs::remove_file(&dest).ok();
                    }
                }
                let mut out_file = File::create(&dest)
                    .with_context(|| format!("failed to create file: {}", dest.display()))?;
                std::io::copy(&mut entry, &mut out_file)
                    .with_context(|| format!("failed to write file: {}", dest.display()))?;

                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    if let Some(mode) = header.mode().ok() {
                        let _ = fs::set_permissions(&dest, fs::Permissions::from_mode(mode));
                    }
                }
            }
            tar::EntryType::Symlink => {
                let link_name = header
                    .link_name()
                    .context("failed to get symlink target")?
                    .ok_or_else(|| anyhow::anyhow!("symlink without target"))?;

                if let Ok(meta) = fs::symlink_metadata(&dest) {
                    if meta.is_dir() && !meta.file_type().is_symlink() {
                        fs::remove_dir_all(&dest).ok();
                    } else {
                        fs::remove_file(&dest).ok();
                    }
                }

                #[cfg(unix)]
                {
                    // Preserve the exact target string from the tar header; the merged
                    // tree's symlinks are compared and materialized by that string, not
                    // by the path it happens to resolve to.
                    std::os::unix::fs::symlink(&link_name, &dest).with_context(|| {
                        format!(
                            "failed to create symlink {} -> {}",
                            dest.display(),
                            link_name.display()
                        )
                    })?;
                }
                #[cfg(not(unix))]
                {
                    log::warn!("symlink support not implemented on this platform: {}", dest.display());
                }
            }
            tar::EntryType::Link => {
                let link_name = header
                    .link_name()
                    .context("failed to get hardlink target")?
                    .ok_or_else(|| anyhow::anyhow!("hardlink without target"))?;
                let target_rel = normalize_tar_path(&link_name);
                pending_hardlinks.push(PendingHardlink {
                    dest,
                    target: extract_dir.join(target_rel),
                });
            }
            _ => {
                log::debug!("skipping unsupported entry type: {:?}", entry_type);
            }
        }
    }

    // Hardlinks may reference content extracted later in the same stream; retry once.
    let mut retry = Vec::new();
    for hl in pending_hardlinks {
        if hl.target.exists() {
            link_or_copy(&hl.target, &hl.dest)?;
        } else {
            retry.push(hl);
        }
    }
    for hl in retry {
        if hl.target.exists() {
            link_or_copy(&hl.target, &hl.dest)?;
        } else {
            log::warn!(
                "skipping hardlink with missing target: {} -> {}",
                hl.dest.display(),
                hl.target.display()
            );
        }
    }

    Ok(())
}
