pub mod json_identity_file;
pub mod shared_identity_store;
