//! ledgerlift-extract: client for the external text-generation service that reads statements.

pub mod error;
pub mod openai;
pub mod prompt;

use async_trait::async_trait;
use ledgerlift_ingest::StagedUpload;

pub use error::ExtractError;
pub use openai::{ExtractorSettings, OpenAiExtractor};
pub use prompt::{SYSTEM_INSTRUCTION, USER_INSTRUCTION};

/// Something that turns a staged statement into free-form text expected to hold JSON.
#[async_trait]
pub trait ExtractionService: Send + Sync {
    async fn extract(&self, upload: &StagedUpload) -> Result<String, ExtractError>;
}
