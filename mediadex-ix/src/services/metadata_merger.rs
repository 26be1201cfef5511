//! Descriptive metadata merging
//!
//! Combines freshly derived metadata with previously stored metadata.
//! Fields a user has edited are never overwritten; everything else adopts
//! the fresh value. Idempotent: merging the same fresh map twice is a
//! no-op the second time.

use mediadex_common::model::DescriptiveMetadata;
use std::collections::BTreeMap;

/// Merge `fresh` into `current`, protecting user edits.
///
/// For every field present in `fresh`: keep the current value when the
/// field is flagged entered-by-user, otherwise adopt the fresh value and
/// flag it as machine-derived. Fields absent from `fresh` are untouched.
pub fn merge(
    current: &DescriptiveMetadata,
    fresh: &BTreeMap<String, serde_json::Value>,
) -> DescriptiveMetadata {
    let mut merged = current.clone();

    for (field, value) in fresh {
        if merged.is_user_entered(field) {
            continue;
        }
        merged.data.insert(field.clone(), value.clone());
        merged.entered_by_user.insert(field.clone(), false);
    }

    merged
}
