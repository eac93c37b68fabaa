use anyhow::Error;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum S3mirrorError {
    #[error("failed to list objects in bucket `{bucket}`: {message}")]
    ListError { bucket: String, message: String },
    #[error("transient transfer error: {0}")]
    TransientTransferError(String),
    #[error("permanent transfer error: {0}")]
    PermanentTransferError(String),
    #[error("failed to abort multipart upload `{upload_id}` of `{key}`: {message}")]
    MultipartAbortError {
        key: String,
        upload_id: String,
        message: String,
    },
    #[error("cancelled")]
    Cancelled,
}

/// Finds the first [`S3mirrorError`] in the error or its context chain.
pub fn find_s3mirror_error(e: &Error) -> Option<&S3mirrorError> {
    if let Some(error) = e.downcast_ref::<S3mirrorError>() {
        return Some(error);
    }

    e.chain()
        .find_map(|cause| cause.downcast_ref::<S3mirrorError>())
}

pub fn is_cancelled_error(e: &Error) -> bool {
    matches!(find_s3mirror_error(e), Some(S3mirrorError::Cancelled))
}

pub fn is_transient_error(e: &Error) -> bool {
    matches!(
        find_s3mirror_error(e),
        Some(S3mirrorError::TransientTransferError(_))
    )
}

pub fn is_list_error(e: &Error) -> bool {
    matches!(find_s3mirror_error(e), Some(S3mirrorError::ListError { .. }))
}
