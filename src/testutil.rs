//! Builds minimal, well-formed OCI image archive tarballs in memory, so the engine
//! can be exercised without Docker/`skopeo`/network access.
//!
//! [`LayerSpec`] describes one layer's tar entries (files, directories, symlinks,
//! whiteouts); [`ArchiveBuilder`] assembles an ordered list of layers plus history
//! into a `manifest.json` + config JSON + layer blobs archive, written to a single
//! tarball path.
//!
//! Layer identity is a deterministic hash of the layer's own tar bytes, so two
//! `LayerSpec`s built from identical entries — even across different
//! [`ArchiveBuilder`]s — produce the same manifest `Layers[i]` path, which is what
//! makes them "shared" under the layer prefix matcher (§4.3).

use std::collections::hash_map::DefaultHasher;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tar_rs::{Builder, Header};

enum LayerEntry {
    File { path: String, content: Vec<u8> },
    Dir { path: String },
    Symlink { path: String, target: String },
    Whiteout { path: String },
    Opaque { dir: String },
}

/// Describes one layer's contents for [`ArchiveBuilder`].
#[derive(Default)]
pub struct LayerSpec {
    entries: Vec<LayerEntry>,
}

impl LayerSpec {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn file(mut self, path: &str, content: &[u8]) -> Self {
        self.entries.push(LayerEntry::File {
            path: path.to_string(),
            content: content.to_vec(),
        });
        self
    }

    pub fn dir(mut self, path: &str) -> Self {
        self.entries.push(LayerEntry::Dir { path: path.to_string() });
        self
    }

    pub fn symlink(mut self, path: &str, target: &str) -> Self {
        self.entries.push(LayerEntry::Symlink {
            path: path.to_string(),
            target: target.to_string(),
        });
        self
    }

    /// Deletes sibling `path` when this layer is applied (`.wh.<name>`).
    pub fn whiteout(mut self, path: &str) -> Self {
        self.entries.push(LayerEntry::Whiteout { path: path.to_string() });
        self
    }

    /// Discards `dir`'s inherited contents (`.wh..wh..opq`).
    pub fn opaque(mut self, dir: &str) -> Self {
        self.entries.push(LayerEntry::Opaque { dir: dir.to_string() });
        self
    }

    fn to_tar_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut builder = Builder::new(Cursor::new(&mut buf));
            for entry in &self.entries {
                match entry {
                    LayerEntry::File { path, content } => {
                        let mut header = Header::new_gnu();
                        header.set_size(content.len() as u64);
                        header.set_mode(0o644);
                        header.set_mtime(0);
                        header.set_cksum();
                        builder.append_data(&mut header, path, content.as_slice()).unwrap();
                    }
                    LayerEntry::Dir { path } => {
                        let mut header = Header::new_gnu();
                        header.set_entry_type(tar_rs::EntryType::Directory);
                        header.set_size(0);
                        header.set_mode(0o755);
                        header.set_mtime(0);
                        header.set_cksum();
                        builder.append_data(&mut header, path, std::io::empty()).unwrap();
                    }
                    LayerEntry::Symlink { path, target } => {
                        let mut header = Header::new_gnu();
                        header.set_entry_type(tar_rs::EntryType::Symlink);
                        header.set_size(0);
                        header.set_mode(0o777);
                        header.set_mtime(0);
                        header.set_link_name(target).unwrap();
                        header.set_cksum();
                        builder.append_data(&mut header, path, std::io::empty()).unwrap();
                    }
                    LayerEntry::Whiteout { path } => {
                        let p = Path::new(path);
                        let marker = match p.parent() {
                            Some(parent) if parent != Path::new("") => {
                                format!("{}/.wh.{}", parent.display(), p.file_name().unwrap().to_string_lossy())
                            }
                            _ => format!(".wh.{}", p.display()),
                        };
                        let mut header = Header::new_gnu();
                        header.set_size(0);
                        header.set_mode(0o644);
                        header.set_mtime(0);
                        header.set_cksum();
                        builder.append_data(&mut header, marker, std::io::empty()).unwrap();
                    }
                    LayerEntry::Opaque { dir } => {
                        let marker = format!("{}/.wh..wh..opq", dir);
                        let mut header = Header::new_gnu();
                        header.set_size(0);
                        header.set_mode(0o644);
                        header.set_mtime(0);
                        header.set_cksum();
                        builder.append_data(&mut header, marker, std::io::empty()).unwrap();
                    }
                }
            }
            builder.finish().unwrap();
        }
        buf
    }
}

fn content_digest(bytes: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Assembles an ordered list of [`LayerSpec`]s and history entries into an
/// OCI-shaped archive tarball.
#[derive(Default)]
pub struct ArchiveBuilder {
    layers: Vec<LayerSpec>,
    extra_history: Vec<(String, bool)>,
    rootfs_type: Option<String>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self {
            layers: Vec::new(),
            extra_history: Vec::new(),
            rootfs_type: None,
        }
    }

    pub fn layer(mut self, spec: LayerSpec) -> Self {
        self.layers.push(spec);
        self
    }

    /// Appends a metadata-only `#(nop)` history entry after all layers.
    pub fn history_nop(mut self, directive: &str, empty_layer: bool) -> Self {
        self.extra_history
            .push((format!("/bin/sh -c #(nop)  {}", directive), empty_layer));
        self
    }

    /// Overrides `rootfs.type` (default `"layers"`), to test rejection.
    pub fn rootfs_type(mut self, t: &str) -> Self {
        self.rootfs_type = Some(t.to_string());
        self
    }

    /// Builds the archive tarball at `out_path` and returns that path.
    pub fn build(self, out_path: PathBuf) -> PathBuf {
        let mut layer_bytes = Vec::new();
        let mut layer_paths = Vec::new();
        let mut diff_ids = Vec::new();
        for spec in &self.layers {
            let bytes = spec.to_tar_bytes();
            let digest = content_digest(&bytes);
            layer_paths.push(format!("blobs/sha256/{}.tar", digest));
            diff_ids.push(format!("sha256:{}", digest));
            layer_bytes.push(bytes);
        }

        let mut history = Vec::new();
        for (i, _) in self.layers.iter().enumerate() {
            history.push(serde_json::json!({
                "created": "2024-01-01T00:00:00Z",
                "created_by": format!("/bin/sh -c #(nop) ADD layer{} /", i),
            }));
        }
        for (created_by, empty_layer) in &self.extra_history {
            history.push(serde_json::json!({
                "created": "2024-01-01T00:00:00Z",
                "created_by": created_by,
                "empty_layer": empty_layer,
            }));
        }

        let config = serde_json::json!({
            "created": "2024-01-01T00:00:00Z",
            "architecture": "amd64",
            "os": "linux",
            "config": {},
            "rootfs": {
                "type": self.rootfs_type.unwrap_or_else(|| "layers".to_string()),
                "diff_ids": diff_ids,
            },
            "history": history,
        });
        let config_bytes = serde_json::to_vec_pretty(&config).unwrap();

        let manifest = serde_json::json!([{
            "Config": "config.json",
            "RepoTags": serde_json::Value::Null,
            "Layers": layer_paths,
        }]);
        let manifest_bytes = serde_json::to_vec_pretty(&manifest).unwrap();

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        let file = File::create(&out_path).unwrap();
        let mut builder = Builder::new(file);

        append_bytes(&mut builder, "manifest.json", &manifest_bytes);
        append_bytes(&mut builder, "config.json", &config_bytes);
        for (path, bytes) in layer_paths.iter().zip(layer_bytes.iter()) {
            append_bytes(&mut builder, path, bytes);
        }
        builder.finish().unwrap();

        out_path
    }
}

fn append_bytes<W: std::io::Write>(builder: &mut Builder<W>, path: &str, bytes: &[u8]) {
    let mut header = Header::new_gnu();
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_cksum();
    builder.append_data(&mut header, path, bytes).unwrap();
}
