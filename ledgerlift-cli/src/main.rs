use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ledgerlift_core::response_to_csv;
use ledgerlift_extract::{ExtractionService, OpenAiExtractor};
use ledgerlift_ingest::UploadedFile;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod pipeline;
mod server;

use config::Config;

#[derive(Parser, Debug)]
#[command(
    name = "ledgerlift",
    version,
    long_version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("LEDGERLIFT_BUILD_SHA"), ")"),
    about = "Turn bank statements (PDF/images) into transaction CSVs"
)]
struct Cli {
    /// Config file (default: $LEDGERLIFT_CONFIG or ./ledgerlift.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (POST /api/upload)
    Serve {
        /// Override server.host
        #[arg(long)]
        host: Option<String>,

        /// Override server.port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Convert a local statement file to CSV via the extraction service
    Convert {
        /// Statement file (PDF, JPEG, PNG)
        file: PathBuf,

        /// Output CSV path
        #[arg(long, default_value = "transactions.csv")]
        out: PathBuf,

        /// Add a Category column
        #[arg(long)]
        include_category: bool,
    },

    /// Turn a saved extraction response into CSV on stdout (no network)
    ParseResponse {
        /// File holding the raw response text
        file: PathBuf,

        /// Add a Category column
        #[arg(long)]
        include_category: bool,
    },

    /// Write a default config file
    InitConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config_path = config::config_path(cli.config.clone(), |k| std::env::var(k).ok());
    if let Command::InitConfig = cli.command {
        return config::init_config(&config_path);
    }

    let mut cfg = config::load_config(&config_path)?;
    cfg.apply_env(|k| std::env::var(k).ok())?;
    init_tracing(&cfg.log.filter);
    tracing::debug!(path = %config_path.display(), "configuration loaded");

    match cli.command {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                cfg.server.host = host;
            }
            if let Some(port) = port {
                cfg.server.port = port;
            }
            let extractor: Arc<dyn ExtractionService> =
                Arc::new(OpenAiExtractor::new(cfg.extraction.clone())?);
            if cfg.extraction.api_key.is_none() {
                tracing::warn!("no API key configured; uploads will fail until OPENAI_API_KEY is set");
            }
            server::serve(&cfg, extractor).await?;
        }

        Command::Convert {
            file,
            out,
            include_category,
        } => {
            cfg.csv.include_category |= include_category;
            convert_file(&cfg, &file, &out).await?;
        }

        Command::ParseResponse {
            file,
            include_category,
        } => {
            cfg.csv.include_category |= include_category;
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("read {}", file.display()))?;
            print!("{}", response_to_csv(&raw, &cfg.csv)?);
        }

        // written before the config is loaded
        Command::InitConfig => {}
    }

    Ok(())
}

fn init_tracing(default_filter: &str) {
    // Logs go to stderr so `parse-response` output stays clean on stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn convert_file(cfg: &Config, file: &Path, out: &Path) -> Result<()> {
    if !file.exists() {
        bail!("file not found: {}", file.display());
    }

    let bytes = std::fs::read(file).with_context(|| format!("read {}", file.display()))?;
    let name = file.file_name().map(|n| n.to_string_lossy().into_owned());
    let upload = UploadedFile::new(name, None, bytes);
    let extractor = OpenAiExtractor::new(cfg.extraction.clone())?;

    println!(
        "Processing {} ({}, {} bytes) with {}…",
        file.display(),
        upload.resolved_mime(),
        upload.bytes.len(),
        cfg.extraction.model
    );

    let started = Instant::now();
    let conversion =
        pipeline::convert_statement(&extractor, &upload, &cfg.server.staging_dir, &cfg.csv)
            .await
            .with_context(|| format!("converting {}", file.display()))?;

    std::fs::write(out, &conversion.csv).with_context(|| format!("write {}", out.display()))?;

    println!(
        "Parsed {} transactions in {:.1}s",
        conversion.rows,
        started.elapsed().as_secs_f64()
    );
    println!("Wrote {}", out.display());
    Ok(())
}
