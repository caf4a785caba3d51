//! Size Guard (§4.7): enforces the layer-count ceiling before packaging and
//! classifies the packaged delta against the original update payload size.

use crate::error::DeltaError;
use anyhow::Result;

/// A report of the size comparison performed after packaging.
#[derive(Debug, Clone, Copy)]
pub struct SizeReport {
    pub original_payload_size: u64,
    pub delta_size: u64,
}

impl SizeReport {
    pub fn savings(&self) -> i64 {
        self.original_payload_size as i64 - self.delta_size as i64
    }

    pub fn is_smaller(&self) -> bool {
        self.delta_size < self.original_payload_size
    }
}

/// Computes the projected final layer count (`k` shared layers plus one per
/// deletion/addition directive the recipe will emit) and fails with
/// [`DeltaError::TooManyLayers`] if it exceeds `max_layers`. Must run before
/// packaging — the projection only needs counts, not the packaged bytes.
pub fn check_layer_ceiling(
    k: usize,
    has_file_deletions: bool,
    has_dir_deletions: bool,
    has_additions: bool,
    max_layers: usize,
) -> Result<()> {
    let projected =
        k + has_file_deletions as usize + has_dir_deletions as usize + has_additions as usize;

    if projected > max_layers {
        return Err(DeltaError::TooManyLayers {
            projected,
            ceiling: max_layers,
        }
        .into());
    }
    Ok(())
}

/// Compares the packaged delta's size against the original update payload size.
/// Fails with [`DeltaError::DeltaNotSmaller`] unless the delta is strictly smaller
/// or the caller has opted in (`accept_bigger`) to the degenerate case.
pub fn check_delta_size(report: SizeReport, accept_bigger: bool) -> Result<()> {
    if !report.is_smaller() && !accept_bigger {
        return Err(DeltaError::DeltaNotSmaller {
            delta_size: report.delta_size,
            original_size: report.original_payload_size,
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceiling_respects_all_directive_flags() {
        // scenario 7: max_layers = 2, a funny-entry delta needs RUN rm + ADD = 2
        // directives; with any non-empty shared prefix that's already over budget.
        let err = check_layer_ceiling(1, true, false, true, 2).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DeltaError>(),
            Some(DeltaError::TooManyLayers { projected: 3, ceiling: 2 })
        ));
    }

    #[test]
    fn ceiling_passes_when_within_budget() {
        assert!(check_layer_ceiling(1, false, false, true, 2).is_ok());
    }

    #[test]
    fn delta_not_smaller_fails_without_opt_in() {
        let report = SizeReport {
            original_payload_size: 10,
            delta_size: 20,
        };
        let err = check_delta_size(report, false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DeltaError>(),
            Some(DeltaError::DeltaNotSmaller { .. })
        ));
        assert!(check_delta_size(report, true).is_ok());
    }

    #[test]
    fn smaller_delta_always_passes() {
        let report = SizeReport {
            original_payload_size: 100,
            delta_size: 10,
        };
        assert!(check_delta_size(report, false).is_ok());
    }
}
