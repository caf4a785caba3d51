//! Reads an unpacked image archive's `manifest.json` and referenced config JSON.
//!
//! An image archive, once unpacked flat into a staging directory, has the shape
//! `docker save`/`skopeo copy --format oci-archive` produces: a top-level
//! `manifest.json` whose first element names a config blob and an ordered list of
//! layer tarball paths, plus the config JSON itself (`rootfs.type`, `rootfs.diff_ids`,
//! `history`).

use crate::error::DeltaError;
use anyhow::{Context, Result};
use oci_spec::image::ImageConfiguration;
use std::fs;
use std::path::{Path, PathBuf};

/// A single entry of the config's `history` array.
///
/// A non-empty entry corresponds 1:1, in order, to an entry of `rootfs.diff_ids`
/// (i.e. to a real layer); an empty one is a metadata-only directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub created_by: String,
    pub empty_layer: bool,
}

/// The fields of the config JSON this engine cares about.
#[derive(Debug, Clone)]
pub struct ImageConfig {
    pub rootfs_type: String,
    pub diff_ids: Vec<String>,
    pub history: Vec<HistoryEntry>,
}

/// An unpacked image archive: its ordered layer identifiers (the manifest's own
/// `Layers[i]` path strings, per the data model's invariant) and parsed config.
#[derive(Debug, Clone)]
pub struct ImageArchive {
    pub root: PathBuf,
    pub layer_ids: Vec<String>,
    pub layer_paths: Vec<PathBuf>,
    pub config: ImageConfig,
}

impl ImageArchive {
    /// Reads `manifest.json` and its referenced config from an already-unpacked
    /// archive directory.
    pub fn read(root: &Path) -> Result<Self> {
        let manifest_path = root.join("manifest.json");
        let manifest_content = fs::read_to_string(&manifest_path).map_err(|e| {
            DeltaError::MalformedArchive(format!("missing manifest.json: {}", e))
        })?;

        let manifest: Vec<serde_json::Value> = serde_json::from_str(&manifest_content)
            .map_err(|e| DeltaError::MalformedManifest(format!("invalid manifest.json: {}", e)))?;

        let entry = manifest
            .first()
            .ok_or_else(|| DeltaError::MalformedManifest("manifest.json has no entries".into()))?;

        let config_rel = entry["Config"]
            .as_str()
            .ok_or_else(|| DeltaError::MalformedManifest("manifest entry missing Config".into()))?;

        let layers_arr = entry["Layers"].as_array().ok_or_else(|| {
            DeltaError::MalformedManifest("manifest entry missing Layers array".into())
        })?;

        let mut layer_ids = Vec::with_capacity(layers_arr.len());
        let mut layer_paths = Vec::with_capacity(layers_arr.len());
        for layer in layers_arr {
            let rel = layer.as_str().ok_or_else(|| {
                DeltaError::MalformedManifest("Layers entry is not a string".into())
            })?;
            layer_ids.push(rel.to_string());
            layer_paths.push(root.join(rel));
        }

        let config_path = root.join(config_rel);
        let config_content = fs::read_to_string(&config_path).with_context(|| {
            format!("failed to read config blob {}", config_path.display())
        })?;

        let config = ImageConfiguration::from_reader(config_content.as_bytes())
            .map_err(|e| DeltaError::MalformedManifest(format!("invalid config JSON: {}", e)))?;

        let rootfs = config.rootfs();
        let rootfs_type = rootfs.typ().clone();
        if rootfs_type != "layers" {
            return Err(DeltaError::UnsupportedRootfs(rootfs_type).into());
        }
        let diff_ids = rootfs.diff_ids().clone();

        let history = config
            .history()
            .as_ref()
            .map(|entries| {
                entries
                    .iter()
                    .map(|h| HistoryEntry {
                        created_by: h.created_by().clone().unwrap_or_default(),
                        empty_layer: h.empty_layer().unwrap_or(false),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(ImageArchive {
            root: root.to_path_buf(),
            layer_ids,
            layer_paths,
            config: ImageConfig {
                rootfs_type,
                diff_ids,
                history,
            },
        })
    }
}
