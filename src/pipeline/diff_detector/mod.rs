use std::collections::BTreeSet;

use crate::types::{Action, Inventory, ObjectRecord, SyncPlan};

pub use content_signature_diff_detector::ContentSignatureDiffDetector;
pub use size_diff_detector::SizeDiffDetector;

pub mod content_signature_diff_detector;
pub mod size_diff_detector;

pub type DiffDetector = Box<dyn DiffDetectionStrategy + Send + Sync>;

/// Decides whether an object present on both sides needs to be copied again.
pub trait DiffDetectionStrategy {
    fn is_different(&self, source_object: &ObjectRecord, target_object: &ObjectRecord) -> bool;
}

/// Classifies every key of both inventories with the canonical content signature.
pub fn diff(source: &Inventory, target: &Inventory, delete_extraneous: bool) -> SyncPlan {
    diff_with(
        source,
        target,
        delete_extraneous,
        &ContentSignatureDiffDetector,
    )
}

/// Produces exactly one action per key in the union of both inventories.
/// A target-only key produces nothing unless `delete_extraneous` is set.
///
/// Actions are ordered by key. Neither inventory is modified.
pub fn diff_with(
    source: &Inventory,
    target: &Inventory,
    delete_extraneous: bool,
    diff_detector: &dyn DiffDetectionStrategy,
) -> SyncPlan {
    let keys: BTreeSet<&str> = source.keys().chain(target.keys()).collect();

    let actions = keys
        .into_iter()
        .filter_map(|key| match (source.get(key), target.get(key)) {
            (Some(source_object), None) => Some(Action::CopyNew(source_object.clone())),
            (Some(source_object), Some(target_object)) => {
                if diff_detector.is_different(source_object, target_object) {
                    Some(Action::CopyChanged {
                        source: source_object.clone(),
                        target: target_object.clone(),
                    })
                } else {
                    Some(Action::Skip(source_object.clone()))
                }
            }
            (None, Some(target_object)) if delete_extraneous => {
                Some(Action::DeleteExtraneous(target_object.clone()))
            }
            _ => None,
        })
        .collect();

    SyncPlan {
        bucket: source.bucket().to_string(),
        actions,
    }
}
