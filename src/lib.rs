//! Synthesizes a minimal delta container image between a base image archive and an
//! update image archive that share a common layer prefix.
//!
//! Given `B` (base) and `U` (update) as `docker save`/`skopeo copy --format
//! oci-archive`-style tarballs, this crate finds the longest run of layers they share,
//! recursively diffs the filesystem trees produced by each image's non-shared layer
//! tail, and synthesizes:
//!
//! - an additions tree and tarball (`files/`, `files.tar`) holding everything new or
//!   changed in `U` relative to `B`
//! - a `Dockerfile`-shaped build recipe that starts `FROM` the base image, deletes
//!   what `U` removed, adds what it changed, and replays `U`'s trailing metadata-only
//!   history (`CMD`, `ENTRYPOINT`, `WORKDIR`, ...)
//!
//! # Usage
//!
//! `ocidelta <BASE> <UPDATE> [OPTIONS]`
//!
//! Arguments:
//! - `<BASE>` Path to the base image archive tarball
//! - `<UPDATE>` Path to the update image archive tarball
//! - Options:
//!     - `--base-ref <REF>`  Image reference the recipe's `FROM` line should name
//!     - `--workdir <DIR>`  Scratch directory for intermediate extraction
//!     - `-o` `--output <DIR>`  Output directory for the synthesized delta `[default: ./delta]`
//!     - `--max-layers <N>`  Layer-count ceiling the projected recipe must not exceed `[default: 128]`
//!     - `--accept-bigger`  Accept a delta that is not smaller than the update's own tail payload
//!     - `--keep-workdir`  Do not remove the scratch directory on success
//!     - `-v`  Verbose mode (repeatable: `-v` info, `-vv` debug, `-vvv` trace)

pub mod archive;
pub mod delta;
pub mod error;
pub mod guard;
pub mod manifest;
pub mod notifier;
pub mod pipeline;
pub mod prefix;
pub mod recipe;
pub mod tar_extractor;
pub mod tree;

#[cfg(any(test, feature = "test-utils"))]
pub mod testutil;

pub use error::{exit_code_for, DeltaError};
pub use manifest::ImageArchive;
pub use notifier::Notifier;
pub use pipeline::{build_delta, DeltaOptions, DeltaOutcome};
pub use tree::Delta;
