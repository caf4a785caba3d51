//! Layer Prefix Matcher (§4.3).

use crate::error::DeltaError;
use anyhow::Result;

/// Computes the longest common prefix of two ordered layer identifier lists and
/// returns its length along with the two tails.
pub fn common_prefix<'a>(
    base: &'a [String],
    update: &'a [String],
) -> Result<(usize, &'a [String], &'a [String])> {
    if base.len() > update.len() {
        return Err(DeltaError::BaseLargerThanUpdate {
            base_layers: base.len(),
            update_layers: update.len(),
        }
        .into());
    }

    let k = base
        .iter()
        .zip(update.iter())
        .take_while(|(b, u)| b == u)
        .count();

    if k == 0 {
        return Err(DeltaError::NoCommonAncestor.into());
    }

    Ok((k, &base[k..], &update[k..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_prefix_when_layers_identical() {
        let a = vec!["l1".to_string(), "l2".to_string()];
        let b = a.clone();
        let (k, base_tail, update_tail) = common_prefix(&a, &b).unwrap();
        assert_eq!(k, 2);
        assert!(base_tail.is_empty());
        assert!(update_tail.is_empty());
    }

    #[test]
    fn partial_prefix_returns_tails() {
        let base = vec!["l1".to_string(), "l2".to_string()];
        let update = vec!["l1".to_string(), "l2".to_string(), "l3".to_string()];
        let (k, base_tail, update_tail) = common_prefix(&base, &update).unwrap();
        assert_eq!(k, 2);
        assert!(base_tail.is_empty());
        assert_eq!(update_tail, ["l3".to_string()]);
    }

    #[test]
    fn no_common_ancestor_fails() {
        let base = vec!["x".to_string()];
        let update = vec!["y".to_string()];
        let err = common_prefix(&base, &update).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DeltaError>(),
            Some(DeltaError::NoCommonAncestor)
        ));
    }

    #[test]
    fn base_larger_than_update_fails() {
        let base = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let update = vec!["a".to_string()];
        let err = common_prefix(&base, &update).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DeltaError>(),
            Some(DeltaError::BaseLargerThanUpdate { .. })
        ));
    }
}
