//! Typed failure kinds for the delta engine.
//!
//! Internal plumbing returns `anyhow::Result` with `.context(...)` chains, same as the
//! rest of this crate. The kinds below are the subset of failures the caller needs to
//! distinguish (to pick a process exit code); they are raised with `.into()` and
//! recovered at the CLI boundary via [`anyhow::Error::downcast_ref`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeltaError {
    #[error("malformed archive: {0}")]
    MalformedArchive(String),

    #[error("malformed manifest: {0}")]
    MalformedManifest(String),

    #[error("unsupported rootfs type: {0} (expected \"layers\")")]
    UnsupportedRootfs(String),

    #[error("base image has {base_layers} layers, more than update image's {update_layers}")]
    BaseLargerThanUpdate {
        base_layers: usize,
        update_layers: usize,
    },

    #[error("base and update images share no common ancestor layer")]
    NoCommonAncestor,

    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("projected layer count {projected} exceeds ceiling {ceiling}")]
    TooManyLayers { projected: usize, ceiling: usize },

    #[error(
        "delta payload ({delta_size} bytes) is not smaller than the original update payload ({original_size} bytes)"
    )]
    DeltaNotSmaller { delta_size: u64, original_size: u64 },
}

impl DeltaError {
    /// Exit code per the CLI convention: 0 success, -1 validation, -2 delta-not-smaller,
    /// -3 layer ceiling exceeded.
    pub fn exit_code(&self) -> i32 {
        match self {
            DeltaError::DeltaNotSmaller { .. } => -2,
            DeltaError::TooManyLayers { .. } => -3,
            _ => -1,
        }
    }
}

/// Walks an `anyhow::Error` chain looking for a [`DeltaError`], returning the exit code
/// it maps to, or `-1` for any other (I/O, parse, generic) failure.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<DeltaError>())
        .map(DeltaError::exit_code)
        .unwrap_or(-1)
}
