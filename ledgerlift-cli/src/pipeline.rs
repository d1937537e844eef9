//! Statement → CSV pipeline shared by the HTTP handler and `ledgerlift convert`.

use std::path::Path;

use anyhow::{Context, Result};
use ledgerlift_core::{parse_records, project, CsvOptions};
use ledgerlift_extract::ExtractionService;
use ledgerlift_ingest::{stage, UploadedFile};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    pub csv: String,
    pub rows: usize,
}

/// Stage the upload, run extraction, and project the recovered records.
///
/// The staged file is removed when this returns, on success and on error alike.
/// An extraction reply that holds no usable JSON is not an error: it yields a
/// header-only CSV.
pub async fn convert_statement(
    extractor: &dyn ExtractionService,
    upload: &UploadedFile,
    staging_dir: &Path,
    csv: &CsvOptions,
) -> Result<Conversion> {
    let staged = stage(upload, staging_dir).context("stage upload")?;
    tracing::info!(path = %staged.path().display(), mime = staged.mime_type(), "staged file for extraction");

    let raw = extractor
        .extract(&staged)
        .await
        .context("extract transactions")?;

    let records = parse_records(&raw);
    if records.is_empty() {
        tracing::warn!(file = upload.display_name(), "no transactions recovered from extraction response");
    }

    let csv = project(&records, csv)?;
    Ok(Conversion {
        csv,
        rows: records.len(),
    })
}
