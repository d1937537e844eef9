use reqwest::StatusCode;

/// Failures talking to the extraction service. All of them are fatal for the request.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("missing API key; set OPENAI_API_KEY or extraction.api_key")]
    MissingApiKey,

    #[error("{stage} request failed: {source}")]
    Transport {
        stage: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{stage} error: {status} {body}")]
    Service {
        stage: &'static str,
        status: StatusCode,
        body: String,
    },

    #[error("{stage} response could not be decoded: {message}")]
    Decode { stage: &'static str, message: String },

    #[error("read staged file: {0}")]
    Io(#[from] std::io::Error),
}
