//! Request-scoped staging of uploaded statements.
//!
//! The upload is written to a uniquely named file under the staging directory. The
//! file lives exactly as long as the returned [`StagedUpload`]: dropping it removes the
//! file, whichever way the request ends.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tempfile::NamedTempFile;

use crate::types::UploadedFile;

#[derive(Debug)]
pub struct StagedUpload {
    file: NamedTempFile,
    mime_type: String,
    original_name: Option<String>,
}

impl StagedUpload {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Unique name of the staged file, extension included.
    pub fn file_name(&self) -> String {
        self.path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string())
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn original_name(&self) -> Option<&str> {
        self.original_name.as_deref()
    }
}

/// Write `upload` into `dir` under a unique name carrying the resolved extension.
pub fn stage(upload: &UploadedFile, dir: &Path) -> Result<StagedUpload> {
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;

    let suffix = format!(".{}", upload.extension());
    let mut file = tempfile::Builder::new()
        .prefix("upload-")
        .suffix(&suffix)
        .tempfile_in(dir)
        .with_context(|| format!("create staging file in {}", dir.display()))?;

    file.write_all(&upload.bytes)
        .with_context(|| format!("write {}", file.path().display()))?;
    file.flush()?;

    tracing::debug!(path = %file.path().display(), bytes = upload.bytes.len(), "staged upload");

    Ok(StagedUpload {
        file,
        mime_type: upload.resolved_mime(),
        original_name: upload.original_name.clone(),
    })
}
