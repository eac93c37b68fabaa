use aws_sdk_s3::types::ServerSideEncryption;

/// Strips surrounding quotes and lowercases an ETag so that values from
/// different endpoints can be compared.
pub fn normalize_e_tag(e_tag: &Option<String>) -> Option<String> {
    e_tag
        .as_ref()
        .map(|e_tag| e_tag.trim_matches('"').to_ascii_lowercase())
}

/// ETags of objects encrypted with a KMS key are not derived from the content.
pub fn is_verification_supported_sse(sse: &Option<ServerSideEncryption>) -> bool {
    matches!(sse, None | Some(ServerSideEncryption::Aes256))
}

/// A plain MD5 ETag is the hex digest of the whole body.
pub fn is_simple_e_tag(e_tag: &Option<String>) -> bool {
    normalize_e_tag(e_tag).is_some_and(|e_tag| {
        e_tag.len() == 32 && e_tag.chars().all(|c| c.is_ascii_hexdigit())
    })
}

/// Computes the quoted ETag S3 reports for an object.
///
/// With `parts_count == 0` the input is the MD5 digest of the whole body.
/// Otherwise it is the concatenation of every part's MD5 digest.
pub fn generate_e_tag_hash(concatenated_md5_hash: &[u8], parts_count: i64) -> String {
    if parts_count == 0 {
        format!("\"{}\"", hex::encode(concatenated_md5_hash))
    } else {
        format!(
            "\"{}-{}\"",
            hex::encode(md5::compute(concatenated_md5_hash).as_slice()),
            parts_count
        )
    }
}

/// Returns `None` when either side has no ETag to compare.
pub fn verify_e_tag(source_e_tag: &Option<String>, target_e_tag: &Option<String>) -> Option<bool> {
    if source_e_tag.is_none() || target_e_tag.is_none() {
        return None;
    }

    Some(normalize_e_tag(source_e_tag) == normalize_e_tag(target_e_tag))
}
