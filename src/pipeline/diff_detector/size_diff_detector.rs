use tracing::debug;

use crate::pipeline::diff_detector::{DiffDetectionStrategy, DiffDetector};
use crate::types::ObjectRecord;

pub struct SizeDiffDetector;

const FILTER_NAME: &str = "SizeDiffDetector";

impl DiffDetectionStrategy for SizeDiffDetector {
    fn is_different(&self, source_object: &ObjectRecord, target_object: &ObjectRecord) -> bool {
        let different_size = source_object.size != target_object.size;
        if !different_size {
            debug!(
                name = FILTER_NAME,
                content_length = source_object.size,
                key = source_object.key.as_str(),
                "object filtered."
            );
        }

        different_size
    }
}

impl SizeDiffDetector {
    pub fn boxed_new() -> DiffDetector {
        Box::new(SizeDiffDetector {})
    }
}
