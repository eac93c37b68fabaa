use tracing::debug;

use crate::pipeline::diff_detector::{DiffDetectionStrategy, DiffDetector};
use crate::storage::e_tag::{is_simple_e_tag, normalize_e_tag};
use crate::types::ObjectRecord;

const FILTER_NAME: &str = "ContentSignatureDiffDetector";

/// Compares sizes first, then MD5 ETags.
///
/// Multipart ETags depend on how the object was chunked when it was uploaded,
/// so they are not comparable across endpoints. When either side has one (or has
/// no ETag at all) only the size is compared. `last_modified` is never consulted.
pub struct ContentSignatureDiffDetector;

impl DiffDetectionStrategy for ContentSignatureDiffDetector {
    fn is_different(&self, source_object: &ObjectRecord, target_object: &ObjectRecord) -> bool {
        let key = source_object.key.as_str();

        if source_object.size != target_object.size {
            debug!(
                name = FILTER_NAME,
                key = key,
                source_size = source_object.size,
                target_size = target_object.size,
                "object size is different."
            );
            return true;
        }

        if !is_simple_e_tag(&source_object.e_tag) || !is_simple_e_tag(&target_object.e_tag) {
            debug!(
                name = FILTER_NAME,
                key = key,
                source_e_tag = ?source_object.e_tag,
                target_e_tag = ?target_object.e_tag,
                "ETag is not comparable. size matched."
            );
            return false;
        }

        let source_e_tag = normalize_e_tag(&source_object.e_tag);
        let target_e_tag = normalize_e_tag(&target_object.e_tag);
        if source_e_tag != target_e_tag {
            debug!(
                name = FILTER_NAME,
                key = key,
                source_e_tag = ?source_e_tag,
                target_e_tag = ?target_e_tag,
                "ETag is different."
            );
            return true;
        }

        debug!(name = FILTER_NAME, key = key, "object filtered.");

        false
    }
}

impl ContentSignatureDiffDetector {
    pub fn boxed_new() -> DiffDetector {
        Box::new(ContentSignatureDiffDetector {})
    }
}
