//! Top-level orchestration: wires the Archive Reader, Layer Prefix Matcher, Tree
//! Differ, Delta Packager, Recipe Synthesizer and Size Guard into the one-pass
//! pipeline described in §2, and writes the on-disk outputs described in §6.

use crate::archive;
use crate::delta;
use crate::guard::{self, SizeReport};
use crate::notifier::Notifier;
use crate::prefix;
use crate::recipe;
use crate::tree;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Caller-tunable knobs; see §6 for the function contract these map to.
#[derive(Debug, Clone)]
pub struct DeltaOptions {
    pub max_layers: usize,
    pub accept_bigger: bool,
    pub keep_workdir: bool,
}

impl Default for DeltaOptions {
    fn default() -> Self {
        Self {
            max_layers: 128,
            accept_bigger: false,
            keep_workdir: false,
        }
    }
}

/// What a successful run produced, for callers that want to report on it beyond
/// what was written to disk.
#[derive(Debug)]
pub struct DeltaOutcome {
    pub dockerfile_path: PathBuf,
    pub files_tar_path: Option<PathBuf>,
    pub files_dir: PathBuf,
    pub recipe_lines: Vec<String>,
    pub shared_layers: usize,
    pub size_report: Option<SizeReport>,
}

/// Runs the full base-vs-update delta synthesis, writing `Dockerfile`,
/// `files.tar` (if non-empty) and `files/` under `output_dir`.
pub fn build_delta(
    base_tarball: &Path,
    update_tarball: &Path,
    base_ref: &str,
    workdir: &Path,
    output_dir: &Path,
    options: &DeltaOptions,
    notifier: &Notifier,
) -> Result<DeltaOutcome> {
    fs::create_dir_all(workdir)
        .with_context(|| format!("failed to create working directory {}", workdir.display()))?;
    fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output directory {}", output_dir.display()))?;

    notifier.info("Unpacking base image archive...");
    let base_archive = archive::open_archive(base_tarball, &workdir.join("base-staging"))?;

    notifier.info("Unpacking update image archive...");
    let update_archive = archive::open_archive(update_tarball, &workdir.join("update-staging"))?;

    notifier.info("Matching layer prefix...");
    let (k, _base_tail_ids, _update_tail_ids) =
        prefix::common_prefix(&base_archive.layer_ids, &update_archive.layer_ids)?;

    let base_tail_paths = &base_archive.layer_paths[k..];
    let update_tail_paths = &update_archive.layer_paths[k..];

    notifier.debug(&format!(
        "{} shared layer(s), {} base-only, {} update-only",
        k,
        base_tail_paths.len(),
        update_tail_paths.len()
    ));

    notifier.info("Building merged tree for base tail...");
    let base_merge_dir = workdir.join("base-merged");
    archive::build_merged_tree(base_tail_paths, &base_merge_dir)?;

    notifier.info("Building merged tree for update tail...");
    let update_merge_dir = workdir.join("update-merged");
    archive::build_merged_tree(update_tail_paths, &update_merge_dir)?;

    notifier.info("Diffing merged trees...");
    let files_dir = output_dir.join("files");
    let delta = tree::diff_trees(&base_merge_dir, &update_merge_dir, &files_dir)?;

    let has_file_deletions = !delta.removed_files.is_empty();
    let has_dir_deletions = !delta.removed_dirs.is_empty();
    let has_additions = delta.has_additions();

    guard::check_layer_ceiling(
        k,
        has_file_deletions,
        has_dir_deletions,
        has_additions,
        options.max_layers,
    )?;

    notifier.info("Packaging additions tarball...");
    let files_tar_path = output_dir.join("files.tar");
    let delta_size = delta::package_additions(&delta, &files_tar_path)?;

    let size_report = if let Some(delta_size) = delta_size {
        let mut original_payload_size = 0u64;
        for layer in update_tail_paths {
            original_payload_size += fs::metadata(layer)
                .with_context(|| format!("failed to stat {}", layer.display()))?
                .len();
        }
        let report = SizeReport {
            original_payload_size,
            delta_size,
        };
        notifier.info(&format!(
            "Original update payload: {} bytes, delta: {} bytes ({:+} bytes)",
            report.original_payload_size,
            report.delta_size,
            report.savings()
        ));
        guard::check_delta_size(report, options.accept_bigger)?;
        Some(report)
    } else {
        None
    };

    notifier.info("Synthesizing recipe...");
    let recipe_lines = recipe::synthesize_recipe(
        base_ref,
        &delta,
        delta_size.is_some(),
        &base_archive.config.history,
        &update_archive.config.history,
    )?;

    let dockerfile_path = output_dir.join("Dockerfile");
    let mut content = recipe_lines.join("\n");
    content.push('\n');
    fs::write(&dockerfile_path, content)
        .with_context(|| format!("failed to write {}", dockerfile_path.display()))?;

    if !options.keep_workdir {
        fs::remove_dir_all(workdir).ok();
    }

    Ok(DeltaOutcome {
        dockerfile_path,
        files_tar_path: if delta_size.is_some() {
            Some(files_tar_path)
        } else {
            None
        },
        files_dir,
        recipe_lines,
        shared_layers: k,
        size_report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::Notifier;
    use crate::testutil::{ArchiveBuilder, LayerSpec};

    #[test]
    fn all_layers_shared_yields_from_only_recipe() {
        let dir = tempfile::tempdir().unwrap();
        let base_tar = ArchiveBuilder::new()
            .layer(LayerSpec::new().file("etc/a", b"a"))
            .build(dir.path().join("base.tar"));
        let update_tar = ArchiveBuilder::new()
            .layer(LayerSpec::new().file("etc/a", b"a"))
            .build(dir.path().join("update.tar"));

        let notifier = Notifier::new(3);
        let outcome = build_delta(
            &base_tar,
            &update_tar,
            "registry/base:1",
            &dir.path().join("work"),
            &dir.path().join("out"),
            &DeltaOptions::default(),
            &notifier,
        )
        .unwrap();

        assert_eq!(outcome.recipe_lines, vec!["FROM registry/base:1".to_string()]);
        assert!(outcome.files_tar_path.is_none());
    }

    #[test]
    fn single_file_added_produces_add_directive() {
        let dir = tempfile::tempdir().unwrap();
        let base_tar = ArchiveBuilder::new()
            .layer(LayerSpec::new().file("etc/a", b"a"))
            .build(dir.path().join("base.tar"));
        let update_tar = ArchiveBuilder::new()
            .layer(LayerSpec::new().file("etc/a", b"a"))
            .layer(LayerSpec::new().file("etc/newconf", b"v2\n"))
            .build(dir.path().join("update.tar"));

        let notifier = Notifier::new(3);
        let outcome = build_delta(
            &base_tar,
            &update_tar,
            "registry/base:1",
            &dir.path().join("work"),
            &dir.path().join("out"),
            &DeltaOptions::default(),
            &notifier,
        )
        .unwrap();

        assert!(outcome.recipe_lines.contains(&"ADD files.tar /".to_string()));
        assert!(!outcome
            .recipe_lines
            .iter()
            .any(|l| l.starts_with("RUN rm ")));
        let tar_path = outcome.files_tar_path.unwrap();
        assert!(tar_path.exists());
    }

    #[test]
    fn layer_ceiling_blocks_packaging() {
        // Shared first layer establishes k=1; each image's own tail then carries
        // the conflicting entry for "x", so the funny-entry deletion is visible to
        // the tail-only differ rather than being masked by shared-prefix inheritance.
        let dir = tempfile::tempdir().unwrap();
        let base_tar = ArchiveBuilder::new()
            .layer(LayerSpec::new().file("etc/base", b"shared"))
            .layer(LayerSpec::new().file("x", b"file-content"))
            .build(dir.path().join("base.tar"));
        let update_tar = ArchiveBuilder::new()
            .layer(LayerSpec::new().file("etc/base", b"shared"))
            .layer(LayerSpec::new().dir("x").file("x/child", b"v"))
            .build(dir.path().join("update.tar"));

        let notifier = Notifier::new(3);
        let mut options = DeltaOptions::default();
        options.max_layers = 2;
        let err = build_delta(
            &base_tar,
            &update_tar,
            "registry/base:1",
            &dir.path().join("work"),
            &dir.path().join("out"),
            &options,
            &notifier,
        )
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<crate::error::DeltaError>(),
            Some(crate::error::DeltaError::TooManyLayers { .. })
        ));
        assert!(!dir.path().join("out/files.tar").exists());
    }
}
