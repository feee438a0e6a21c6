//! Thin facade over the `dmp` (diff-match-patch) crate.
//!
//! The rest of the engine never names `dmp` directly; it speaks in terms
//! of this module's `diff`, `to_delta`, `from_delta`, and `patch` so the
//! diff/match/patch primitive stays swappable, per the spec's treatment of
//! it as an external black box.

use dmp::Dmp;

/// One diff hunk, re-exported as-is from `dmp`.
pub type Diff = dmp::Diff;

/// Error returned when a delta cannot be decoded against its base text —
/// the base text's length no longer matches what the delta expects.
#[derive(Debug, Clone, thiserror::Error)]
#[error("delta could not be applied to the given shadow")]
pub struct DeltaDecodeError;

fn engine() -> Dmp {
    Dmp::new()
}

/// Compute the diff between `a` and `b`.
pub fn diff(a: &str, b: &str) -> Vec<Diff> {
    engine().diff_main(a, b)
}

/// Run the heuristic efficiency cleanup pass in place.
pub fn cleanup_efficiency(diffs: &mut Vec<Diff>) {
    engine().diff_cleanup_efficiency(diffs);
}

/// Encode a diff list as MobWrite's compact delta text.
pub fn to_delta(diffs: &[Diff]) -> String {
    engine().diff_to_delta(diffs)
}

/// Decode a delta against a known base text, reconstructing the diff list.
pub fn from_delta(base: &str, delta: &str) -> Result<Vec<Diff>, DeltaDecodeError> {
    engine().diff_from_delta(base, delta).map_err(|_| DeltaDecodeError)
}

/// Apply a diff (recomputed as patches against `base`) to `target`,
/// silently dropping hunks that no longer match (fuzzy-patch semantics).
pub fn patch(base: &str, diffs: &[Diff], target: &str) -> String {
    let patches = engine().patch_make(base, diffs.to_vec());
    let (result, _applied) = engine().patch_apply(&patches, target);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_delta() {
        let mut diffs = diff("Hello", "Hello!");
        cleanup_efficiency(&mut diffs);
        let delta = to_delta(&diffs);
        let decoded = from_delta("Hello", &delta).unwrap();
        let patched = patch("Hello", &decoded, "Hello");
        assert_eq!(patched, "Hello!");
    }

    #[test]
    fn bad_delta_is_rejected() {
        assert!(from_delta("Hello", "=999\tgarbage").is_err());
    }
}
