//! Archive Reader / Merged-Tree Builder (§4.1).
//!
//! Unpacks an image archive tarball flat into a staging directory, then builds a
//! *merged tree* by extracting an ordered list of layer tarballs into a single
//! destination directory, applying whiteouts as each layer is walked.

use crate::manifest::ImageArchive;
use crate::tar_extractor;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Unpacks `tarball` flat into `staging_dir` and parses its manifest/config.
pub fn open_archive(tarball: &Path, staging_dir: &Path) -> Result<ImageArchive> {
    fs::create_dir_all(staging_dir)
        .with_context(|| format!("failed to create staging dir {}", staging_dir.display()))?;
    tar_extractor::unpack_flat(tarball, staging_dir)
        .with_context(|| format!("failed to unpack archive {}", tarball.display()))?;
    ImageArchive::read(staging_dir)
}

/// Builds the merged tree for a (sub)sequence of layer tarballs by extracting them,
/// in order, into an empty destination directory.
pub fn build_merged_tree(layer_paths: &[PathBuf], dest: &Path) -> Result<()> {
    fs::create_dir_all(dest)
        .with_context(|| format!("failed to create merge dir {}", dest.display()))?;
    for layer in layer_paths {
        tar_extractor::extract_tar(layer, dest)
            .with_context(|| format!("failed to extract layer {}", layer.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{ArchiveBuilder, LayerSpec};

    #[test]
    fn open_archive_reads_layers_in_manifest_order() {
        let dir = tempfile::tempdir().unwrap();
        let tarball = ArchiveBuilder::new()
            .layer(LayerSpec::new().file("etc/a", b"a"))
            .layer(LayerSpec::new().file("etc/b", b"b"))
            .build(dir.path().join("image.tar"));

        let staging = dir.path().join("staging");
        let archive = open_archive(&tarball, &staging).unwrap();
        assert_eq!(archive.layer_ids.len(), 2);
        assert!(archive.layer_paths[0].exists());
    }

    #[test]
    fn build_merged_tree_applies_layers_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let tarball = ArchiveBuilder::new()
            .layer(LayerSpec::new().file("etc/conf", b"v1"))
            .layer(LayerSpec::new().file("etc/conf", b"v2"))
            .build(dir.path().join("image.tar"));

        let staging = dir.path().join("staging");
        let archive = open_archive(&tarball, &staging).unwrap();

        let merged = dir.path().join("merged");
        build_merged_tree(&archive.layer_paths, &merged).unwrap();
        assert_eq!(fs::read(merged.join("etc/conf")).unwrap(), b"v2");
    }
}
