const INVALID_LENGTH: &str = "bucket name must be between 3 and 63 characters long";
const INVALID_CHARACTER: &str =
    "bucket name can consist only of lowercase letters, numbers, dots (.), and hyphens (-)";
const INVALID_START_OR_END: &str = "bucket name must begin and end with a letter or number";
const ADJACENT_DOTS: &str = "bucket name must not contain two adjacent periods";

pub fn check_bucket_name(bucket: &str) -> Result<String, String> {
    if !(3..=63).contains(&bucket.len()) {
        return Err(INVALID_LENGTH.to_string());
    }

    if !bucket
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-')
    {
        return Err(INVALID_CHARACTER.to_string());
    }

    let is_alphanumeric = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric());
    if !is_alphanumeric(bucket.chars().next()) || !is_alphanumeric(bucket.chars().last()) {
        return Err(INVALID_START_OR_END.to_string());
    }

    if bucket.contains("..") {
        return Err(ADJACENT_DOTS.to_string());
    }

    Ok(bucket.to_string())
}
