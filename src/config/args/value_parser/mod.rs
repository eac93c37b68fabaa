pub mod bucket_name;
pub mod human_bytes;
pub mod url;
