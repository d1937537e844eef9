use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ledgerlift_core::CsvOptions;
use ledgerlift_extract::ExtractionService;

use crate::config::Config;

/// Per-server state handed to every handler. Read-only; requests share nothing mutable.
#[derive(Clone)]
pub struct AppState {
    pub extractor: Arc<dyn ExtractionService>,
    pub staging_dir: PathBuf,
    pub csv: CsvOptions,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(extractor: Arc<dyn ExtractionService>, config: &Config) -> Self {
        Self {
            extractor,
            staging_dir: config.server.staging_dir.clone(),
            csv: config.csv,
            started_at: Utc::now(),
        }
    }
}
