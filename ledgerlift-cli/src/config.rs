use anyhow::{bail, Context, Result};
use ledgerlift_core::CsvOptions;
use ledgerlift_extract::ExtractorSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_FILE: &str = "ledgerlift.toml";
const CONFIG_ENV: &str = "LEDGERLIFT_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerSection,
    pub extraction: ExtractorSettings,
    pub csv: CsvOptions,
    pub log: LogSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    /// Browser origins allowed to call the API
    pub allowed_origins: Vec<String>,
    pub max_upload_bytes: usize,
    /// Where uploads are staged for the duration of a request
    pub staging_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// `EnvFilter` directives used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            allowed_origins: vec![
                "http://localhost:5173".to_string(),
                "http://localhost:3000".to_string(),
                "https://bank-parser-frontend.onrender.com".to_string(),
            ],
            max_upload_bytes: 25 * 1024 * 1024,
            staging_dir: PathBuf::from("tmp"),
        }
    }
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Apply environment overrides. `lookup` is `std::env::var` in production.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("PORT is not a valid port: {port}"))?;
        }
        if let Some(key) = lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.extraction.api_key = Some(key.trim().to_string());
        }
        if let Some(url) = lookup("OPENAI_BASE_URL").filter(|u| !u.trim().is_empty()) {
            self.extraction.base_url = url.trim().to_string();
        }
        if let Some(model) = lookup("LEDGERLIFT_MODEL").filter(|m| !m.trim().is_empty()) {
            self.extraction.model = model.trim().to_string();
        }
        if let Some(flag) = lookup("LEDGERLIFT_INCLUDE_CATEGORY") {
            self.csv.include_category = parse_flag(&flag).context("LEDGERLIFT_INCLUDE_CATEGORY")?;
        }
        Ok(())
    }
}

fn parse_flag(s: &str) -> Result<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => bail!("expected a boolean, got {other:?}"),
    }
}

/// `--config` wins, then `LEDGERLIFT_CONFIG`, then `./ledgerlift.toml`.
pub fn config_path(explicit: Option<PathBuf>, lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    explicit
        .or_else(|| lookup(CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    toml::from_str(&s).with_context(|| format!("parse {}", path.display()))
}

pub fn save_config(path: &Path, cfg: &Config) -> Result<()> {
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

pub fn init_config(path: &Path) -> Result<()> {
    if path.exists() {
        println!("Config already exists: {}", path.display());
        return Ok(());
    }
    save_config(path, &Config::default())?;
    println!("Wrote {}", path.display());
    Ok(())
}
