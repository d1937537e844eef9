use std::path::Path;

const DEFAULT_EXTENSION: &str = "pdf";
const OCTET_STREAM: &str = "application/octet-stream";

/// A statement file as received from the client (multipart field or local file).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Client-supplied file name, if any
    pub original_name: Option<String>,
    /// Client-supplied content type, if any
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(original_name: Option<String>, mime_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            original_name,
            mime_type,
            bytes,
        }
    }

    pub fn extension(&self) -> String {
        resolve_extension(self.original_name.as_deref(), self.mime_type.as_deref())
    }

    pub fn resolved_mime(&self) -> String {
        resolve_mime(self.original_name.as_deref(), self.mime_type.as_deref())
    }

    /// Name used in log lines.
    pub fn display_name(&self) -> &str {
        self.original_name.as_deref().unwrap_or("<unnamed>")
    }
}

/// Pick the extension the staged file gets.
///
/// Priority: original file name > declared mime type > `pdf`.
pub fn resolve_extension(original_name: Option<&str>, mime_type: Option<&str>) -> String {
    original_name
        .and_then(name_extension)
        .or_else(|| mime_type.and_then(mime_extension))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

/// Pick the content type sent to the extraction service.
///
/// A declared type wins unless it is missing or the generic octet-stream; then the
/// type is guessed from the file name.
pub fn resolve_mime(original_name: Option<&str>, mime_type: Option<&str>) -> String {
    if let Some(declared) = mime_type
        .map(str::trim)
        .filter(|m| !m.is_empty() && !m.eq_ignore_ascii_case(OCTET_STREAM))
    {
        return declared.to_string();
    }

    original_name
        .and_then(|name| mime_guess::from_path(name).first())
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| OCTET_STREAM.to_string())
}

fn name_extension(name: &str) -> Option<String> {
    let ext = Path::new(name).extension()?.to_str()?;
    if ext.is_empty() || ext.len() > 10 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn mime_extension(mime_type: &str) -> Option<String> {
    let essence = mime_type.split(';').next()?.trim().to_ascii_lowercase();
    let known = match essence.as_str() {
        "application/pdf" => Some("pdf"),
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        _ => None,
    };
    if let Some(ext) = known {
        return Some(ext.to_string());
    }

    mime_guess::get_mime_extensions_str(&essence)?
        .first()
        .map(|ext| ext.to_string())
}
