use std::sync::Arc;

use anyhow::{Context, Result};
use ledgerlift_extract::ExtractionService;
use tokio::net::TcpListener;

use crate::api::{api_router, AppState};
use crate::config::Config;

/// Bind and serve until Ctrl-C.
pub async fn serve(config: &Config, extractor: Arc<dyn ExtractionService>) -> Result<()> {
    let state = AppState::new(extractor, config);
    let app = api_router(state, &config.server);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    let local = listener.local_addr().context("read bound address")?;

    tracing::info!(
        addr = %local,
        model = %config.extraction.model,
        staging_dir = %config.server.staging_dir.display(),
        "server running"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown requested"),
        Err(e) => {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    }
}
