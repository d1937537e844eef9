//! OpenAI-compatible extraction client.
//!
//! One extraction is three calls:
//!   1. `POST /v1/files` uploads the staged statement (purpose `assistants`)
//!   2. `POST /v1/responses` asks the model to read it, referencing the file id
//!   3. `DELETE /v1/files/{id}` removes the upload again (best-effort)
//!
//! Every call has a request timeout. Transport failures (connect, timeout, broken
//! send) are retried a bounded number of times; HTTP error statuses are not. A timed
//! out upload is not retried: the service may have stored it, and a second upload
//! would leave a file whose id is never seen and so never deleted.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use ledgerlift_ingest::StagedUpload;
use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ExtractError;
use crate::prompt::{SYSTEM_INSTRUCTION, USER_INSTRUCTION};
use crate::ExtractionService;

const STAGE_UPLOAD: &str = "file upload";
const STAGE_GENERATE: &str = "generation";
const STAGE_DELETE: &str = "file delete";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorSettings {
    pub base_url: String,
    pub model: String,
    /// Usually left unset in the file and supplied by `OPENAI_API_KEY`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            timeout_secs: 120,
            max_retries: 2,
            retry_delay_ms: 500,
        }
    }
}

pub struct OpenAiExtractor {
    settings: ExtractorSettings,
    client: reqwest::Client,
}

impl OpenAiExtractor {
    pub fn new(settings: ExtractorSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("build http client")?;
        Ok(Self { settings, client })
    }

    pub fn settings(&self) -> &ExtractorSettings {
        &self.settings
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.settings.base_url.trim_end_matches('/'), path)
    }

    fn api_key(&self) -> Result<&str, ExtractError> {
        self.settings
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ExtractError::MissingApiKey)
    }

    /// Send the request built by `build`, rebuilding it for each retry.
    /// Timeouts are only retried when `retry_timeouts` is set.
    async fn send_with_retry<F>(
        &self,
        stage: &'static str,
        retry_timeouts: bool,
        build: F,
    ) -> Result<reqwest::Response, ExtractError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt: u32 = 0;
        loop {
            match build().send().await {
                Ok(resp) => return Ok(resp),
                Err(e)
                    if !e.is_builder()
                        && (retry_timeouts || !e.is_timeout())
                        && attempt < self.settings.max_retries =>
                {
                    attempt += 1;
                    warn!(stage, attempt, error = %e, "transport failure, retrying");
                    tokio::time::sleep(Duration::from_millis(self.settings.retry_delay_ms)).await;
                }
                Err(source) => return Err(ExtractError::Transport { stage, source }),
            }
        }
    }

    async fn upload_file(&self, key: &str, upload: &StagedUpload) -> Result<String, ExtractError> {
        let bytes = tokio::fs::read(upload.path()).await?;
        let file_name = upload.file_name();
        let url = self.endpoint("/v1/files");

        let resp = self
            .send_with_retry(STAGE_UPLOAD, false, || {
                let form = Form::new()
                    .text("purpose", "assistants")
                    .part("file", file_part(&bytes, &file_name, upload.mime_type()));
                self.client
                    .post(&url)
                    .header(AUTHORIZATION, format!("Bearer {key}"))
                    .multipart(form)
            })
            .await?;

        let file: FileObject = decode(STAGE_UPLOAD, ensure_success(STAGE_UPLOAD, resp).await?).await?;
        Ok(file.id)
    }

    async fn generate(&self, key: &str, file_id: &str) -> Result<String, ExtractError> {
        let body = ResponsesRequest::new(&self.settings.model, file_id);
        let url = self.endpoint("/v1/responses");

        let resp = self
            .send_with_retry(STAGE_GENERATE, true, || {
                self.client
                    .post(&url)
                    .header(AUTHORIZATION, format!("Bearer {key}"))
                    .json(&body)
            })
            .await?;

        let reply: ResponsesReply = decode(STAGE_GENERATE, ensure_success(STAGE_GENERATE, resp).await?).await?;
        Ok(reply.text())
    }

    async fn delete_file(&self, key: &str, file_id: &str) {
        let url = self.endpoint(&format!("/v1/files/{file_id}"));
        let result = self
            .client
            .delete(&url)
            .header(AUTHORIZATION, format!("Bearer {key}"))
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => debug!(file_id, "deleted remote file"),
            Ok(resp) => warn!(file_id, stage = STAGE_DELETE, status = %resp.status(), "remote file not deleted"),
            Err(e) => warn!(file_id, stage = STAGE_DELETE, error = %e, "remote file not deleted"),
        }
    }
}

#[async_trait]
impl ExtractionService for OpenAiExtractor {
    async fn extract(&self, upload: &StagedUpload) -> Result<String, ExtractError> {
        let key = self.api_key()?;

        let file_id = self.upload_file(key, upload).await?;
        info!(file_id = %file_id, "uploaded statement to extraction service");

        let generated = self.generate(key, &file_id).await;
        self.delete_file(key, &file_id).await;

        let text = generated?;
        info!(model = %self.settings.model, chars = text.len(), "extraction response received");
        Ok(text)
    }
}

fn file_part(bytes: &[u8], file_name: &str, mime_type: &str) -> Part {
    let part = || Part::bytes(bytes.to_vec()).file_name(file_name.to_string());
    part().mime_str(mime_type).unwrap_or_else(|_| part())
}

async fn ensure_success(stage: &'static str, resp: reqwest::Response) -> Result<reqwest::Response, ExtractError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ExtractError::Service { stage, status, body })
}

async fn decode<T: serde::de::DeserializeOwned>(stage: &'static str, resp: reqwest::Response) -> Result<T, ExtractError> {
    resp.json::<T>().await.map_err(|e| ExtractError::Decode {
        stage,
        message: e.to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct FileObject {
    id: String,
}

#[derive(Debug, Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: Vec<InputMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct InputMessage<'a> {
    role: &'a str,
    content: MessageContent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    InputText { text: &'a str },
    InputFile { file_id: &'a str },
}

impl<'a> ResponsesRequest<'a> {
    fn new(model: &'a str, file_id: &'a str) -> Self {
        Self {
            model,
            input: vec![
                InputMessage {
                    role: "system",
                    content: MessageContent::Text(SYSTEM_INSTRUCTION),
                },
                InputMessage {
                    role: "user",
                    content: MessageContent::Parts(vec![
                        ContentPart::InputText { text: USER_INSTRUCTION },
                        ContentPart::InputFile { file_id },
                    ]),
                },
            ],
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ResponsesReply {
    #[serde(default)]
    output_text: Option<String>,
    #[serde(default)]
    output: Option<Vec<OutputItem>>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(default)]
    content: Option<Vec<OutputContent>>,
}

#[derive(Debug, Deserialize)]
struct OutputContent {
    #[serde(rename = "type")]
    t: String,
    text: Option<String>,
}

impl ResponsesReply {
    /// `output_text` when the service provides it, else every `output_text` part joined.
    /// A reply with no text at all reads as an empty JSON array.
    fn text(&self) -> String {
        if let Some(t) = self.output_text.as_deref().filter(|t| !t.is_empty()) {
            return t.to_string();
        }

        let mut s = String::new();
        for item in self.output.iter().flatten() {
            for c in item.content.iter().flatten() {
                if c.t == "output_text" {
                    if let Some(t) = &c.text {
                        s.push_str(t);
                    }
                }
            }
        }

        if s.is_empty() { "[]".to_string() } else { s }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use axum::extract::{Multipart, Path};
    use axum::http::StatusCode;
    use axum::routing::{delete, post};
    use axum::{Json, Router};
    use ledgerlift_ingest::{stage, UploadedFile};
    use serde_json::json;

    const REPLY: &str = r#"[{"date":"2024-01-05","description":"Coffee Shop","amount":"-4.50","type":"debit"}]"#;

    async fn spawn_mock(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn settings(base_url: String) -> ExtractorSettings {
        ExtractorSettings {
            base_url,
            api_key: Some("sk-test".to_string()),
            timeout_secs: 1,
            max_retries: 1,
            retry_delay_ms: 10,
            ..ExtractorSettings::default()
        }
    }

    fn staged(dir: &std::path::Path) -> StagedUpload {
        let upload = UploadedFile::new(
            Some("jan.pdf".to_string()),
            Some("application/pdf".to_string()),
            b"%PDF-1.4 statement".to_vec(),
        );
        stage(&upload, dir).unwrap()
    }

    #[test]
    fn test_request_body_shape() {
        let body = serde_json::to_value(ResponsesRequest::new("gpt-4o-mini", "file-1")).unwrap();
        assert_eq!(
            body,
            json!({
                "model": "gpt-4o-mini",
                "input": [
                    {"role": "system", "content": SYSTEM_INSTRUCTION},
                    {"role": "user", "content": [
                        {"type": "input_text", "text": "Extract transactions from this file."},
                        {"type": "input_file", "file_id": "file-1"}
                    ]}
                ]
            })
        );
    }

    #[test]
    fn test_reply_text_prefers_output_text() {
        let reply: ResponsesReply = serde_json::from_value(json!({
            "output_text": "[1]",
            "output": [{"content": [{"type": "output_text", "text": "[2]"}]}]
        }))
        .unwrap();
        assert_eq!(reply.text(), "[1]");
    }

    #[test]
    fn test_reply_text_joins_output_parts() {
        let reply: ResponsesReply = serde_json::from_value(json!({
            "output": [
                {"type": "reasoning", "summary": []},
                {"type": "message", "content": [
                    {"type": "output_text", "text": "[{\"date\":"},
                    {"type": "refusal", "refusal": "no"},
                    {"type": "output_text", "text": "\"d\"}]"}
                ]}
            ]
        }))
        .unwrap();
        assert_eq!(reply.text(), "[{\"date\":\"d\"}]");
    }

    #[test]
    fn test_reply_without_text_is_empty_array() {
        let reply: ResponsesReply = serde_json::from_value(json!({"output": []})).unwrap();
        assert_eq!(reply.text(), "[]");
        assert_eq!(ResponsesReply::default().text(), "[]");
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings("http://127.0.0.1:9".to_string());
        s.api_key = None;
        let extractor = OpenAiExtractor::new(s).unwrap();

        let err = extractor.extract(&staged(dir.path())).await.unwrap_err();
        assert!(matches!(err, ExtractError::MissingApiKey));
    }

    #[tokio::test]
    async fn test_upload_generate_delete_flow() {
        let calls = Arc::new(Mutex::new(Vec::<String>::new()));

        let c1 = calls.clone();
        let c2 = calls.clone();
        let c3 = calls.clone();
        let app = Router::new()
            .route(
                "/v1/files",
                post(move |mut multipart: Multipart| {
                    let calls = c1.clone();
                    async move {
                        let mut fields = Vec::new();
                        while let Ok(Some(field)) = multipart.next_field().await {
                            let name = field.name().unwrap_or("").to_string();
                            let file_name = field.file_name().map(str::to_string);
                            let content_type = field.content_type().map(str::to_string);
                            let data = field.bytes().await.unwrap();
                            match name.as_str() {
                                "purpose" => fields.push(format!("purpose={}", String::from_utf8_lossy(&data))),
                                "file" => fields.push(format!(
                                    "file={}|{}|{}",
                                    file_name.map(|n| n.ends_with(".pdf")).unwrap_or(false),
                                    content_type.unwrap_or_default(),
                                    data.len()
                                )),
                                _ => {}
                            }
                        }
                        calls.lock().unwrap().push(format!("upload {}", fields.join(" ")));
                        Json(json!({"id": "file-abc", "object": "file"}))
                    }
                }),
            )
            .route(
                "/v1/responses",
                post(move |Json(body): Json<serde_json::Value>| {
                    let calls = c2.clone();
                    async move {
                        let file_id = body["input"][1]["content"][1]["file_id"].as_str().unwrap_or("").to_string();
                        calls.lock().unwrap().push(format!("generate {file_id}"));
                        Json(json!({
                            "output": [{"type": "message", "content": [{"type": "output_text", "text": REPLY}]}]
                        }))
                    }
                }),
            )
            .route(
                "/v1/files/:id",
                delete(move |Path(id): Path<String>| {
                    let calls = c3.clone();
                    async move {
                        calls.lock().unwrap().push(format!("delete {id}"));
                        Json(json!({"id": id, "deleted": true}))
                    }
                }),
            );

        let base = spawn_mock(app).await;
        let dir = tempfile::tempdir().unwrap();
        let extractor = OpenAiExtractor::new(settings(base)).unwrap();

        let text = extractor.extract(&staged(dir.path())).await.unwrap();
        assert_eq!(text, REPLY);

        let calls = calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                "upload purpose=assistants file=true|application/pdf|18".to_string(),
                "generate file-abc".to_string(),
                "delete file-abc".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_generation_timeout_is_retried() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let app = Router::new()
            .route(
                "/v1/files",
                post(|| async { Json(json!({"id": "file-retry"})) }),
            )
            .route(
                "/v1/responses",
                post(move || {
                    let hits = h.clone();
                    async move {
                        if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                            tokio::time::sleep(Duration::from_secs(3)).await;
                        }
                        Json(json!({"output_text": "[]"}))
                    }
                }),
            )
            .route("/v1/files/:id", delete(|| async { StatusCode::OK }));

        let base = spawn_mock(app).await;
        let dir = tempfile::tempdir().unwrap();
        let extractor = OpenAiExtractor::new(settings(base)).unwrap();

        let text = extractor.extract(&staged(dir.path())).await.unwrap();
        assert_eq!(text, "[]");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_upload_timeout_is_not_retried() {
        let uploads = Arc::new(AtomicUsize::new(0));
        let generations = Arc::new(AtomicUsize::new(0));
        let u = uploads.clone();
        let g = generations.clone();
        let app = Router::new()
            .route(
                "/v1/files",
                post(move || {
                    let uploads = u.clone();
                    async move {
                        uploads.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_secs(3)).await;
                        Json(json!({"id": "file-slow"}))
                    }
                }),
            )
            .route(
                "/v1/responses",
                post(move || {
                    let generations = g.clone();
                    async move {
                        generations.fetch_add(1, Ordering::SeqCst);
                        Json(json!({"output_text": "[]"}))
                    }
                }),
            );

        let base = spawn_mock(app).await;
        let dir = tempfile::tempdir().unwrap();
        let extractor = OpenAiExtractor::new(settings(base)).unwrap();

        let err = extractor.extract(&staged(dir.path())).await.unwrap_err();
        match err {
            ExtractError::Transport { stage, source } => {
                assert_eq!(stage, STAGE_UPLOAD);
                assert!(source.is_timeout());
            }
            other => panic!("expected transport error, got {other:?}"),
        }
        assert_eq!(uploads.load(Ordering::SeqCst), 1);
        assert_eq!(generations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_error_status_is_not_retried() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let app = Router::new().route(
            "/v1/files",
            post(move || {
                let hits = h.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded")
                }
            }),
        );

        let base = spawn_mock(app).await;
        let dir = tempfile::tempdir().unwrap();
        let extractor = OpenAiExtractor::new(settings(base)).unwrap();

        let err = extractor.extract(&staged(dir.path())).await.unwrap_err();
        match err {
            ExtractError::Service { stage, status, body } => {
                assert_eq!(stage, STAGE_UPLOAD);
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body, "upstream exploded");
            }
            other => panic!("expected service error, got {other:?}"),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_connection_refused_exhausts_retries() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let dir = tempfile::tempdir().unwrap();
        let extractor = OpenAiExtractor::new(settings(format!("http://{addr}"))).unwrap();

        let err = extractor.extract(&staged(dir.path())).await.unwrap_err();
        assert!(matches!(err, ExtractError::Transport { stage: STAGE_UPLOAD, .. }));
    }

    #[tokio::test]
    async fn test_generation_failure_still_deletes_file() {
        let calls = Arc::new(Mutex::new(Vec::<String>::new()));
        let c = calls.clone();
        let app = Router::new()
            .route("/v1/files", post(|| async { Json(json!({"id": "file-x"})) }))
            .route(
                "/v1/responses",
                post(|| async { (StatusCode::BAD_REQUEST, "unsupported file") }),
            )
            .route(
                "/v1/files/:id",
                delete(move |Path(id): Path<String>| {
                    let calls = c.clone();
                    async move {
                        calls.lock().unwrap().push(id);
                        StatusCode::OK
                    }
                }),
            );

        let base = spawn_mock(app).await;
        let dir = tempfile::tempdir().unwrap();
        let extractor = OpenAiExtractor::new(settings(base)).unwrap();

        let err = extractor.extract(&staged(dir.path())).await.unwrap_err();
        assert!(matches!(err, ExtractError::Service { stage: STAGE_GENERATE, .. }));
        assert_eq!(calls.lock().unwrap().as_slice(), ["file-x".to_string()]);
    }

    #[test]
    fn test_endpoint_trims_slash() {
        let extractor = OpenAiExtractor::new(settings("http://localhost:1234/".to_string())).unwrap();
        assert_eq!(extractor.endpoint("/v1/files"), "http://localhost:1234/v1/files");
    }
}
