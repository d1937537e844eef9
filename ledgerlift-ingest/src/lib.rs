//! ledgerlift-ingest: statement upload intake (type resolution) and request-scoped staging.

pub mod types;
pub mod staging;

pub use types::{resolve_extension, resolve_mime, UploadedFile};
pub use staging::{stage, StagedUpload};
