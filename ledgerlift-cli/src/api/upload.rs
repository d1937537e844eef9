use std::time::Instant;

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ledgerlift_ingest::UploadedFile;

use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::pipeline::convert_statement;

const FILE_FIELD: &str = "file";
const DOWNLOAD_DISPOSITION: &str = "attachment; filename=\"transactions.csv\"";

/// `POST /api/upload`: multipart field `file`, answered with a CSV attachment.
pub async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let mut multipart = multipart.map_err(|e| {
        tracing::warn!(error = %e, "upload is not multipart");
        ApiError::NoFile
    })?;

    let upload = read_file_field(&mut multipart).await?.ok_or(ApiError::NoFile)?;
    tracing::info!(
        file = upload.display_name(),
        mime = upload.mime_type.as_deref().unwrap_or("-"),
        bytes = upload.bytes.len(),
        "received upload"
    );

    let started = Instant::now();
    let conversion = convert_statement(state.extractor.as_ref(), &upload, &state.staging_dir, &state.csv)
        .await
        .map_err(ApiError::processing)?;

    tracing::info!(
        rows = conversion.rows,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "statement converted"
    );

    Ok(csv_attachment(conversion.csv))
}

/// Pull the `file` field out of the form. Other fields are ignored.
///
/// A `file` field with neither a file name nor content is what browsers send when
/// nothing was picked; it counts as no file.
async fn read_file_field(multipart: &mut Multipart) -> Result<Option<UploadedFile>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadUpload(e.body_text()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let original_name = field
            .file_name()
            .map(str::to_string)
            .filter(|n| !n.is_empty());
        let mime_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadUpload(e.body_text()))?;

        if original_name.is_none() && bytes.is_empty() {
            continue;
        }
        return Ok(Some(UploadedFile::new(original_name, mime_type, bytes.to_vec())));
    }
    Ok(None)
}

fn csv_attachment(csv: String) -> Response {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/csv"), (CONTENT_DISPOSITION, DOWNLOAD_DISPOSITION)],
        csv,
    )
        .into_response()
}
